//! Crash reporting. Reporters are fire-and-forget: `notify` cannot fail.

use thiserror::Error;
use tracing::error;

use syncward_core::{ProjectCode, Status};

pub trait CrashReporter: Send + Sync {
    fn notify(&self, error: &(dyn std::error::Error + 'static));
}

/// Reports to the log under the `crash` target.
#[derive(Debug, Clone, Default)]
pub struct LogCrashReporter;

impl CrashReporter for LogCrashReporter {
    fn notify(&self, err: &(dyn std::error::Error + 'static)) {
        let mut chain = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push_str(": ");
            chain.push_str(&cause.to_string());
            source = cause.source();
        }
        error!(target: "crash", "{chain}");
    }
}

/// A project found mid-flight at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UncleanStateError {
    #[error("QueueManager detected project '{project}' in unclean state '{status}'; rescheduled")]
    Unclean { project: ProjectCode, status: Status },

    #[error("QueueManager detected unknown state '{status}' for project '{project}'; rescheduled")]
    Unknown { project: ProjectCode, status: Status },
}

impl UncleanStateError {
    pub fn for_status(project: ProjectCode, status: Status) -> Self {
        match status {
            Status::Unrecognized(_) => UncleanStateError::Unknown { project, status },
            _ => UncleanStateError::Unclean { project, status },
        }
    }
}
