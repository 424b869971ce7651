//! `syncward enqueue CODE [--stage edit|synchronize]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use syncward_core::QueueStage;
use syncward_queue::Queue;

use super::{load_settings, project_code};

#[derive(Args, Debug)]
pub struct EnqueueArgs {
    /// Project code.
    pub project: String,

    /// Queue to add the project to.
    #[arg(long, default_value_t = QueueStage::Synchronize)]
    pub stage: QueueStage,
}

impl EnqueueArgs {
    pub fn run(self, base_dir: Option<PathBuf>) -> Result<()> {
        let settings = load_settings(base_dir)?;
        let code = project_code(&self.project)?;
        let queue = Queue::new(self.stage, &settings)
            .with_context(|| format!("cannot open the {} queue", self.stage))?;

        if queue
            .enqueue(&code)
            .with_context(|| format!("failed to queue '{code}'"))?
        {
            println!("✓ Queued '{code}' for {}", self.stage);
        } else {
            println!("'{code}' is already queued for {}", self.stage);
        }
        Ok(())
    }
}
