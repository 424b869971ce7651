pub mod enqueue;
pub mod hold;
pub mod init;
pub mod run;
pub mod status;
pub mod watch;

use std::path::PathBuf;

use anyhow::{Context, Result};

use syncward_core::{ProjectCode, Settings};

pub(crate) fn load_settings(base_dir: Option<PathBuf>) -> Result<Settings> {
    Settings::load(base_dir).context("failed to load settings")
}

pub(crate) fn project_code(raw: &str) -> Result<ProjectCode> {
    let code = ProjectCode::from(raw);
    code.validate()
        .with_context(|| format!("'{raw}' is not a usable project code"))?;
    Ok(code)
}
