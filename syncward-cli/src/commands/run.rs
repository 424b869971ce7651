//! `syncward run [-p CODE]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use syncward_daemon::{init_tracing, run_once, RunOutcome};
use syncward_pipeline::Collaborators;

use super::{load_settings, project_code};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Serve this project first in every queue it is pending in.
    #[arg(long, short = 'p', value_name = "CODE")]
    pub priority_project: Option<String>,
}

impl RunArgs {
    pub fn run(self, base_dir: Option<PathBuf>) -> Result<()> {
        let settings = load_settings(base_dir)?;
        init_tracing(&settings).context("failed to set up logging")?;
        let priority = self.priority_project.as_deref().map(project_code).transpose()?;

        let collaborators = Collaborators::from_settings(&settings);
        match run_once(settings, collaborators, priority).context("scheduler run failed")? {
            RunOutcome::LockHeld { path } => {
                eprintln!(
                    "{} another syncward process holds {}",
                    "skipped:".yellow().bold(),
                    path.display()
                );
            }
            RunOutcome::Completed { janitor, sweep } => {
                if !janitor.rescheduled.is_empty() {
                    println!(
                        "rescheduled {} unclean project(s): {}",
                        janitor.rescheduled.len(),
                        janitor
                            .rescheduled
                            .iter()
                            .map(|c| c.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                }
                let failed = if sweep.failed > 0 {
                    format!("{} failed", sweep.failed).red().to_string()
                } else {
                    "0 failed".green().to_string()
                };
                println!("swept {} project turn(s), {failed}", sweep.processed);
                for (stage, count) in &sweep.per_stage {
                    println!("  {stage}: {count}");
                }
            }
        }
        Ok(())
    }
}
