//! `syncward init`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::load_settings;

#[derive(Args, Debug)]
pub struct InitArgs {}

impl InitArgs {
    pub fn run(self, base_dir: Option<PathBuf>) -> Result<()> {
        let settings = load_settings(base_dir)?;
        settings
            .ensure_layout()
            .with_context(|| format!("failed to create layout under {}", settings.base_dir.display()))?;
        let wrote = settings
            .write_default_file()
            .context("failed to write settings file")?;

        println!("✓ Initialized {}", settings.base_dir.display());
        if wrote {
            println!("  Wrote default settings.yaml");
        } else {
            println!("  Kept existing settings.yaml");
        }
        println!("  Queues: {}", settings.queues_dir().display());
        println!("  State:  {}", settings.state_dir().display());
        Ok(())
    }
}
