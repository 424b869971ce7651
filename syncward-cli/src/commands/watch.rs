//! `syncward watch [-p CODE]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use syncward_daemon::{init_tracing, start_blocking, DaemonError};
use syncward_pipeline::Collaborators;

use super::{load_settings, project_code};

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Serve this project first in every queue it is pending in.
    #[arg(long, short = 'p', value_name = "CODE")]
    pub priority_project: Option<String>,
}

impl WatchArgs {
    pub fn run(self, base_dir: Option<PathBuf>) -> Result<()> {
        let settings = load_settings(base_dir)?;
        init_tracing(&settings).context("failed to set up logging")?;
        let priority = self.priority_project.as_deref().map(project_code).transpose()?;

        let collaborators = Collaborators::from_settings(&settings);
        match start_blocking(settings, collaborators, priority) {
            Ok(()) => Ok(()),
            Err(DaemonError::LockHeld { path }) => {
                eprintln!("another syncward process holds {}", path.display());
                Ok(())
            }
            Err(err) => Err(err).context("watch loop exited with error"),
        }
    }
}
