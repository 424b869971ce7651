//! Long-running mode: hold the host lock and sweep whenever a queue
//! directory changes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use syncward_core::{ProjectCode, Settings};
use syncward_pipeline::{Collaborators, SyncContext};

use crate::error::{io_err, DaemonError};
use crate::lock::HostLock;
use crate::log_rotation::rotate_logs;
use crate::scheduler::{prepare_run, Scheduler};

pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

pub const ROTATION_INTERVAL: Duration = Duration::from_secs(60);

/// First wait before a project that failed with a retryable error is tried
/// again; doubles with each further failure.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// How often a sweep looks for retries that have come due.
pub const RETRY_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Why a sweep was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepTrigger {
    Startup,
    QueueChanged,
    RetryDue,
}

pub fn start_blocking(
    settings: Settings,
    collaborators: Collaborators,
    priority: Option<ProjectCode>,
) -> Result<(), DaemonError> {
    settings.ensure_layout()?;
    let ctx = Arc::new(SyncContext::new(settings, collaborators)?);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(ctx, priority))
}

/// Watch until ctrl-c. The host lock is held for the whole run, so crash
/// recovery happens once up front.
pub async fn run(ctx: Arc<SyncContext>, priority: Option<ProjectCode>) -> Result<(), DaemonError> {
    let _lock = HostLock::require(&ctx.settings().lock_file())?;
    {
        let ctx = Arc::clone(&ctx);
        tokio::task::spawn_blocking(move || prepare_run(&ctx))
            .await
            .map_err(|e| DaemonError::Task {
                task: "startup",
                message: e.to_string(),
            })??;
    }

    // One pending sweep is enough: triggers arriving while one is queued
    // are folded into it.
    let (sweep_tx, sweep_rx) = mpsc::channel::<SweepTrigger>(1);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let _ = sweep_tx.try_send(SweepTrigger::Startup);

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let dirs: Vec<PathBuf> = ctx.queues().iter().map(|q| q.dir().to_path_buf()).collect();
        let sweep_tx = sweep_tx.clone();
        tokio::spawn(async move {
            let result = watcher_task(dirs, sweep_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };
    drop(sweep_tx);

    let sweep_handle = {
        let shutdown = shutdown_tx.clone();
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            let result = sweep_task(ctx, priority, sweep_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        let settings = ctx.settings().clone();
        tokio::spawn(async move {
            let result = log_rotation_task(settings, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => {
                        tracing::info!("received ctrl-c, shutting down");
                        let _ = shutdown.send(());
                        Ok(())
                    }
                    Err(err) => Err(DaemonError::Task {
                        task: "signal_handler",
                        message: format!("ctrl-c handler failed: {err}"),
                    }),
                }
            }
        })
    };

    let (watcher_result, sweep_result, rotation_result, signal_result) =
        tokio::join!(watcher_handle, sweep_handle, rotation_handle, signal_handle);

    joined("watcher", watcher_result)?;
    joined("sweep", sweep_result)?;
    joined("log_rotation", rotation_result)?;
    joined("signal_handler", signal_result)
}

async fn watcher_task(
    dirs: Vec<PathBuf>,
    sweep_tx: mpsc::Sender<SweepTrigger>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    for dir in &dirs {
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        tracing::debug!(dir = %dir.display(), "watching queue");
    }

    let mut debouncer = Debouncer::new(DEBOUNCE_WINDOW);
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    continue;
                }
                let now = Instant::now();
                let wanted = event
                    .paths
                    .iter()
                    .filter(|path| is_queue_entry(path))
                    .fold(false, |wanted, path| debouncer.admit(path, now) || wanted);
                if !wanted {
                    continue;
                }
                match sweep_tx.try_send(SweepTrigger::QueueChanged) {
                    Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        return Err(DaemonError::ChannelClosed("sweep trigger"));
                    }
                }
            }
        }
    }
    Ok(())
}

/// Sweep once per trigger. While retries are waiting out their backoff a
/// timer keeps sweeping, since a deferred project writes nothing the
/// watcher would see.
async fn sweep_task(
    ctx: Arc<SyncContext>,
    priority: Option<ProjectCode>,
    mut sweep_rx: mpsc::Receiver<SweepTrigger>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut retry_poll = tokio::time::interval(RETRY_POLL_INTERVAL);
    retry_poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    retry_poll.tick().await;
    let mut retries_waiting = false;

    loop {
        let trigger = tokio::select! {
            _ = shutdown_rx.recv() => break,
            trigger = sweep_rx.recv() => match trigger {
                Some(trigger) => trigger,
                None => break,
            },
            _ = retry_poll.tick(), if retries_waiting => SweepTrigger::RetryDue,
        };

        let ctx = Arc::clone(&ctx);
        let priority = priority.clone();
        let result = tokio::task::spawn_blocking(move || {
            Scheduler::new(&ctx, priority)
                .with_retry_backoff(RETRY_BACKOFF)
                .sweep()
        })
        .await
        .map_err(|e| DaemonError::Task { task: "sweep", message: e.to_string() })?;

        match result {
            Ok(summary) => {
                retries_waiting = summary.deferred > 0 || summary.requeued > 0;
                tracing::info!(
                    trigger = ?trigger,
                    processed = summary.processed,
                    failed = summary.failed,
                    deferred = summary.deferred,
                    "triggered sweep completed",
                );
            }
            Err(err) => tracing::error!(trigger = ?trigger, error = %err, "triggered sweep failed"),
        }
    }
    Ok(())
}

async fn log_rotation_task(
    settings: Settings,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(ROTATION_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // Startup already rotated.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let settings = settings.clone();
                tokio::task::spawn_blocking(move || rotate_logs(&settings)).await.ok();
            }
        }
    }
    Ok(())
}

/// Entry files, not the temp files written on the way to one.
fn is_queue_entry(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) != Some("tmp")
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| !name.starts_with('.'))
}

/// Admits a path at most once per window. A queue write shows up as a burst
/// of create and modify events for the same entry.
struct Debouncer {
    window: Duration,
    seen: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    fn admit(&mut self, path: &Path, now: Instant) -> bool {
        let window = self.window;
        self.seen.retain(|_, at| now.duration_since(*at) < window);
        if self.seen.contains_key(path) {
            return false;
        }
        self.seen.insert(path.to_path_buf(), now);
        true
    }
}

fn joined(
    task: &'static str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    result.map_err(|err| DaemonError::Task {
        task,
        message: format!("join failure: {err}"),
    })?
}
