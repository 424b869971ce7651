//! One sweep over every queue, and the locked run wrapped around it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use syncward_core::cycle::{action_for_stage, successor};
use syncward_core::{ActionKind, ProjectCode, QueueStage, Settings, Status};
use syncward_pipeline::{ActionError, Collaborators, SyncContext, SyncProject};
use syncward_queue::Queue;

use crate::error::DaemonError;
use crate::janitor::{clean_up_after_crash, JanitorSummary};
use crate::lock::HostLock;
use crate::log_rotation::rotate_logs;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub processed: usize,
    pub failed: usize,
    /// Queued projects left for a later sweep because their retry delay has
    /// not passed.
    pub deferred: usize,
    /// Failed turns put back on their queue for another attempt.
    pub requeued: usize,
    pub per_stage: BTreeMap<QueueStage, usize>,
}

#[derive(Debug)]
pub enum RunOutcome {
    Completed {
        janitor: JanitorSummary,
        sweep: SweepSummary,
    },
    /// Another process holds the host lock; no queue was touched.
    LockHeld { path: PathBuf },
}

/// Longest wait between attempts at a project that keeps failing.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30 * 60);

/// Wait before attempt `retries + 1`: `base` doubled per earlier failure,
/// capped at [`MAX_RETRY_DELAY`]. No failures, no wait.
pub fn retry_delay(base: Duration, retries: u32) -> Duration {
    if retries == 0 || base.is_zero() {
        return Duration::ZERO;
    }
    let factor = 1u32.checked_shl(retries - 1).unwrap_or(u32::MAX);
    base.checked_mul(factor)
        .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
}

pub struct Scheduler<'a> {
    ctx: &'a SyncContext,
    priority: Option<ProjectCode>,
    retry_base: Duration,
}

impl<'a> Scheduler<'a> {
    pub fn new(ctx: &'a SyncContext, priority: Option<ProjectCode>) -> Self {
        Self {
            ctx,
            priority,
            retry_base: Duration::ZERO,
        }
    }

    /// Hold back projects whose last turn failed with a retryable error
    /// until [`retry_delay`] has passed since that failure.
    pub fn with_retry_backoff(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    /// Drain each non-empty stage once, in pipeline order starting at the
    /// first action. A failing project only ends its own turn.
    pub fn sweep(&self) -> Result<SweepSummary, DaemonError> {
        let mut summary = SweepSummary::default();
        let mut drained = BTreeSet::new();

        let mut next = self.ctx.queues().first_queue_with_work()?;
        while let Some(queue) = next {
            let stage = queue.stage();
            if !drained.insert(stage) {
                break;
            }
            self.drain(queue, &mut summary)?;
            next = self
                .ctx
                .queues()
                .next_queue_with_work(successor(action_for_stage(stage)))?;
        }

        info!(
            processed = summary.processed,
            failed = summary.failed,
            deferred = summary.deferred,
            "sweep finished"
        );
        Ok(summary)
    }

    fn drain(&self, queue: &Queue, summary: &mut SweepSummary) -> Result<(), DaemonError> {
        let stage = queue.stage();
        let projects = queue.queued_projects(self.priority.as_ref())?;
        debug!(stage = %stage, pending = projects.len(), "draining queue");

        for code in projects {
            if self.retry_pending(&code)? {
                summary.deferred += 1;
                continue;
            }
            *summary.per_stage.entry(stage).or_default() += 1;
            summary.processed += 1;
            let started = Instant::now();
            if let Err(err) = self.turn(queue, &code, started) {
                summary.failed += 1;
                error!(project = %code, stage = %stage, error = %err, "project turn failed");
                if err.is_retryable() {
                    if let Err(requeue) = queue.enqueue(&code) {
                        warn!(project = %code, error = %requeue, "could not requeue project");
                    } else {
                        summary.requeued += 1;
                        info!(project = %code, stage = %stage, "requeued after transient failure");
                    }
                }
            }
        }
        Ok(())
    }

    fn retry_pending(&self, code: &ProjectCode) -> Result<bool, DaemonError> {
        if self.retry_base.is_zero() {
            return Ok(false);
        }
        let record = self.ctx.states().load(code)?;
        let delay = retry_delay(self.retry_base, record.retry_counter);
        let since = (Utc::now() - record.last_state_change)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if since < delay {
            debug!(
                project = %code,
                retries = record.retry_counter,
                wait_secs = (delay - since).as_secs(),
                "retry not due yet"
            );
            return Ok(true);
        }
        Ok(false)
    }

    /// One project's turn: make sure a clone exists, then run the stage's
    /// action chain.
    fn turn(&self, queue: &Queue, code: &ProjectCode, started: Instant) -> Result<(), ActionError> {
        queue.dequeue(code)?;
        let mut project = self.ctx.open_project(code)?;

        let result = self.run_chain(queue.stage(), &mut project);

        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let retrying = matches!(&result, Err(err) if err.is_retryable());
        let recorded = project.state.update(|s| {
            s.previous_run_total_ms = elapsed;
            if retrying {
                s.retry_counter += 1;
            } else if result.is_ok() {
                s.retry_counter = 0;
            }
        });
        if let Err(err) = recorded {
            warn!(project = %code, error = %err, "could not record run time");
        }
        result
    }

    fn run_chain(&self, stage: QueueStage, project: &mut SyncProject) -> Result<(), ActionError> {
        self.ctx.run(ActionKind::EnsureClone, project)?;
        if matches!(project.status(), Status::Cloned | Status::Hold) {
            debug!(project = %project.code(), status = %project.status(), "turn ends after clone");
            return Ok(());
        }

        let mut kind = action_for_stage(stage);
        loop {
            self.ctx.run(kind, project)?;
            if *project.status() == Status::Hold {
                break;
            }
            let next = self.ctx.actions().get(kind)?.next_action_kind();
            if next == ActionKind::None {
                break;
            }
            if let Some(queue) = self.ctx.queues().for_action(next) {
                queue.enqueue(project.code())?;
                debug!(project = %project.code(), stage = %queue.stage(), "queued for next action");
                break;
            }
            kind = next;
        }

        if project.status().is_transient() {
            project.state.set_status(Status::Idle)?;
        }
        Ok(())
    }
}

/// Lock, rotate logs, recover from a crash, then sweep once.
pub fn run_once(
    settings: Settings,
    collaborators: Collaborators,
    priority: Option<ProjectCode>,
) -> Result<RunOutcome, DaemonError> {
    settings.ensure_layout()?;
    let ctx = SyncContext::new(settings, collaborators)?;
    run_once_with(&ctx, priority)
}

/// [`run_once`] against an existing context.
pub fn run_once_with(
    ctx: &SyncContext,
    priority: Option<ProjectCode>,
) -> Result<RunOutcome, DaemonError> {
    let lock_path = ctx.settings().lock_file();
    let Some(_lock) = HostLock::acquire(&lock_path)? else {
        error!(path = %lock_path.display(), "another scheduler holds the host lock, exiting");
        return Ok(RunOutcome::LockHeld { path: lock_path });
    };

    let janitor = prepare_run(ctx)?;
    let sweep = Scheduler::new(ctx, priority).sweep()?;
    Ok(RunOutcome::Completed { janitor, sweep })
}

/// Startup housekeeping run under the host lock, before any queue drains:
/// log rotation, removal of interrupted queue writes, crash recovery.
pub fn prepare_run(ctx: &SyncContext) -> Result<JanitorSummary, DaemonError> {
    rotate_logs(ctx.settings());
    for queue in ctx.queues().iter() {
        let removed = queue.sweep_temp_files()?;
        if removed > 0 {
            warn!(stage = %queue.stage(), removed, "removed interrupted queue writes");
        }
    }

    let janitor = clean_up_after_crash(ctx)?;
    if !janitor.rescheduled.is_empty() {
        info!(count = janitor.rescheduled.len(), "rescheduled unclean projects");
    }
    Ok(janitor)
}
