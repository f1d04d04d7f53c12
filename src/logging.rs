//! Logger object for a single run.
//!
//! [`Logger::init`] opens a timestamped log file and builds a dispatcher with
//! two layers: everything from `level` up goes to the file, INFO and up to
//! stderr. The dispatcher is only installed for the closure passed to
//! [`Logger::in_scope`]; there is no global subscriber. Dropping the logger
//! flushes the file.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing::Dispatch;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::{MakeWriter, format::Writer, time::FormatTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Layer, fmt as tfmt};

const LOG_PREFIX: &str = "ap_reboot_log";
const TIMESTAMP: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const FILE_STAMP: &[FormatItem<'static>] =
    format_description!("[year][month][day]_[hour][minute][second]");

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level `{0}`")]
    InvalidLevel(String),
    #[error("creating log directory {path:?}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("creating log file {path:?}: {source}")]
    CreateFile { path: PathBuf, source: io::Error },
    #[error("formatting log file name: {0}")]
    FileName(#[from] time::error::Format),
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub dir: PathBuf,
    pub level: String,
}

/// `YYYY-MM-DD HH:MM:SS` in the offset detected at init.
#[derive(Debug, Clone, Copy)]
struct LocalTime {
    offset: UtcOffset,
}

impl LocalTime {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.offset)
    }
}

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        match self.now().format(TIMESTAMP) {
            Ok(ts) => write!(w, "{ts}:"),
            Err(_) => write!(w, "<invalid-time>:"),
        }
    }
}

#[derive(Debug, Clone)]
struct LogFile(Arc<Mutex<BufWriter<File>>>);

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?
            .flush()
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

pub struct Logger {
    dispatch: Dispatch,
    file: LogFile,
    clock: LocalTime,
    #[cfg(test)]
    path: PathBuf,
}

impl Logger {
    pub fn init(cfg: &LogConfig) -> Result<Self, LoggingError> {
        let file_level: LevelFilter = cfg
            .level
            .parse()
            .map_err(|_| LoggingError::InvalidLevel(cfg.level.clone()))?;

        // Detected once: the offset lookup is unreliable after threads spawn.
        let clock = LocalTime {
            offset: UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC),
        };

        fs::create_dir_all(&cfg.dir).map_err(|source| LoggingError::CreateDir {
            path: cfg.dir.clone(),
            source,
        })?;
        let path = cfg.dir.join(log_file_name(clock.now())?);
        let handle = File::create(&path).map_err(|source| LoggingError::CreateFile {
            path: path.clone(),
            source,
        })?;
        let file = LogFile(Arc::new(Mutex::new(BufWriter::new(handle))));

        let file_layer = tfmt::layer()
            .with_writer(file.clone())
            .with_ansi(false)
            .with_target(true)
            .with_timer(clock)
            .with_filter(file_level);
        let console_layer = tfmt::layer()
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_target(true)
            .without_time()
            .with_filter(LevelFilter::INFO);

        let subscriber = tracing_subscriber::registry()
            .with(file_layer)
            .with(console_layer);

        Ok(Self {
            dispatch: Dispatch::new(subscriber),
            file,
            clock,
            #[cfg(test)]
            path,
        })
    }

    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Wall-clock time in the offset detected at init, matching the log lines.
    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    /// Runs `f` with this logger as the current thread's dispatcher.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }

    pub fn flush(&self) -> io::Result<()> {
        self.file.clone().flush()
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

fn log_file_name(at: OffsetDateTime) -> Result<String, LoggingError> {
    Ok(format!("{LOG_PREFIX}_{}.txt", at.format(FILE_STAMP)?))
}
