//! `syncward hold` and `syncward release`: the operator circuit breaker.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use syncward_core::{StateStore, Status};

use super::{load_settings, project_code};

#[derive(Args, Debug)]
pub struct HoldArgs {
    /// Project code.
    pub project: String,

    /// Recorded as the project's error message.
    #[arg(long)]
    pub reason: String,
}

impl HoldArgs {
    pub fn run(self, base_dir: Option<PathBuf>) -> Result<()> {
        let settings = load_settings(base_dir)?;
        let code = project_code(&self.project)?;
        let mut state = StateStore::new(&settings)
            .open(&code)
            .with_context(|| format!("failed to load state for '{code}'"))?;
        state
            .put_on_hold(&self.reason)
            .with_context(|| format!("failed to hold '{code}'"))?;
        println!("✓ '{code}' is on hold");
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct ReleaseArgs {
    /// Project code.
    pub project: String,
}

impl ReleaseArgs {
    pub fn run(self, base_dir: Option<PathBuf>) -> Result<()> {
        let settings = load_settings(base_dir)?;
        let code = project_code(&self.project)?;
        let mut state = StateStore::new(&settings)
            .open(&code)
            .with_context(|| format!("failed to load state for '{code}'"))?;
        if !matches!(state.status(), Status::Hold | Status::Error) {
            println!("'{code}' is not on hold ({})", state.status());
            return Ok(());
        }
        state
            .clear_hold()
            .with_context(|| format!("failed to release '{code}'"))?;
        println!("✓ '{code}' released; it runs again once queued");
        Ok(())
    }
}
