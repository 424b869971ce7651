//! Subscriber setup for the scheduler binary.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, EnvFilter};

use syncward_core::{LogFormat, Settings};

use crate::error::{io_err, DaemonError};

/// The file the global subscriber writes to, when logging to a file.
static ACTIVE_LOG: OnceLock<Arc<LogFile>> = OnceLock::new();

/// `RUST_LOG` wins; otherwise the configured level.
pub fn env_filter(settings: &Settings) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init_tracing(settings: &Settings) -> Result<(), DaemonError> {
    let filter = env_filter(settings);
    let builder = fmt().with_env_filter(filter).with_target(false);

    if settings.log_to_file {
        let dir = settings.logs_dir();
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        let log = Arc::new(LogFile::open(settings.log_file())?);
        let builder = builder.with_ansi(false).with_writer(SharedLog(Arc::clone(&log)));
        let installed = match settings.log_format {
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Text => builder.try_init(),
        };
        if installed.is_ok() {
            let _ = ACTIVE_LOG.set(log);
        }
    } else {
        let builder = builder.with_writer(std::io::stderr);
        let _ = match settings.log_format {
            LogFormat::Json => builder.json().try_init(),
            LogFormat::Text => builder.try_init(),
        };
    }
    Ok(())
}

/// Point the installed subscriber at a fresh file after `path` was rotated.
pub(crate) fn reopen_active_log(path: &Path) -> io::Result<()> {
    match ACTIVE_LOG.get() {
        Some(log) if log.path == path => log.reopen(),
        _ => Ok(()),
    }
}

/// An append handle on a log path that can be swapped for whatever file
/// sits at that path now.
pub struct LogFile {
    path: PathBuf,
    file: Mutex<File>,
}

impl LogFile {
    pub fn open(path: PathBuf) -> Result<Self, DaemonError> {
        let file = append(&path).map_err(|e| io_err(&path, e))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reopen `path`, creating it if rotation left nothing there.
    pub fn reopen(&self) -> io::Result<()> {
        let fresh = append(&self.path)?;
        *self.lock() = fresh;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Write for &LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock().flush()
    }
}

/// [`MakeWriter`] over a shared [`LogFile`].
#[derive(Clone)]
pub struct SharedLog(pub Arc<LogFile>);

impl<'a> MakeWriter<'a> for SharedLog {
    type Writer = &'a LogFile;

    fn make_writer(&'a self) -> Self::Writer {
        &self.0
    }
}

fn append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_rotation::rotate_if_needed;
    use tempfile::TempDir;

    #[test]
    fn file_logging_creates_the_log_file() {
        let tmp = TempDir::new().unwrap();
        let mut settings = Settings::with_base_dir(tmp.path());
        settings.log_to_file = true;

        init_tracing(&settings).unwrap();
        assert!(settings.log_file().exists());
    }

    #[test]
    fn lines_after_rotation_land_in_the_live_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("syncward.log");
        let log = Arc::new(LogFile::open(path.clone()).unwrap());
        let subscriber = fmt()
            .with_ansi(false)
            .with_writer(SharedLog(Arc::clone(&log)))
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("before rotation");
            assert!(rotate_if_needed(&path, 1, 5).unwrap());
            log.reopen().unwrap();
            tracing::info!("after rotation");
        });

        let live = std::fs::read_to_string(&path).unwrap();
        let rotated = std::fs::read_to_string(tmp.path().join("syncward.log.1")).unwrap();
        assert!(live.contains("after rotation"));
        assert!(!live.contains("before rotation"));
        assert!(rotated.contains("before rotation"));
        assert!(!rotated.contains("after rotation"));
    }

    #[test]
    fn reopen_recreates_a_removed_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("syncward.log");
        let log = LogFile::open(path.clone()).unwrap();
        std::fs::remove_file(&path).unwrap();

        log.reopen().unwrap();
        (&log).write_all(b"still here\n").unwrap();
        assert_eq!(std::fs::read_to_string(log.path()).unwrap(), "still here\n");
    }
}
