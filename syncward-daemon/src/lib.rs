//! Scheduler runtime: host lock, crash recovery, one sweep over the
//! queues, and a watch loop that sweeps again when a queue changes.

mod error;
pub mod janitor;
pub mod lock;
pub mod log_rotation;
pub mod logging;
pub mod scheduler;
pub mod watch;

pub use error::DaemonError;
pub use janitor::{clean_up_after_crash, JanitorSummary};
pub use lock::HostLock;
pub use logging::init_tracing;
pub use scheduler::{prepare_run, run_once, run_once_with, RunOutcome, Scheduler, SweepSummary};
pub use watch::start_blocking;
