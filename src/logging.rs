//! Per-run logging.
//!
//! Every scenario gets its own `RunLog`: a `tracing` subscriber with a
//! console layer and an append-only file layer, both stamped with local
//! time. The subscriber is installed as the thread default for the lifetime
//! of the `RunLog`, so nested runs restore the outer sinks when closed.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::Local;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::{self, format::Writer, time::FormatTime, MakeWriter};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

struct LocalTimestamp;

impl FormatTime for LocalTimestamp {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format(TIMESTAMP_FORMAT))
    }
}

/// Which sinks a run writes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogSinks {
    pub console: bool,
    pub file: bool,
}

impl Default for LogSinks {
    fn default() -> Self {
        Self {
            console: true,
            file: true,
        }
    }
}

/// Shared handle to the run's log file. Each formatted event is written
/// straight through so a crash never loses buffered lines.
#[derive(Clone)]
struct FileSink {
    file: Arc<Mutex<File>>,
}

impl FileSink {
    fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }

    fn sync(&self) -> io::Result<()> {
        let file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        file.sync_all()
    }
}

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        file.flush()
    }
}

impl<'a> MakeWriter<'a> for FileSink {
    type Writer = FileSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Log sinks for one run. Dropping it closes the run without flushing.
pub struct RunLog {
    path: Option<PathBuf>,
    sink: Option<FileSink>,
    guard: Option<DefaultGuard>,
}

impl RunLog {
    /// Opens `<records>/<scenario>/<scenario>_log.txt` and installs the
    /// subscriber as the thread default.
    pub fn open(records_dir: &Path, scenario: &str, sinks: LogSinks) -> Result<Self> {
        let path = sinks
            .file
            .then(|| crate::paths::log_file(records_dir, scenario));
        let sink = match &path {
            Some(p) => Some(
                FileSink::open(p)
                    .with_context(|| format!("Failed to open log file {}", p.display()))?,
            ),
            None => None,
        };
        Ok(Self::install(path, sink, sinks.console))
    }

    /// Console-only log for work outside a scenario.
    pub fn console() -> Self {
        Self::install(None, None, true)
    }

    fn install(path: Option<PathBuf>, sink: Option<FileSink>, console: bool) -> Self {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let console_layer = console.then(|| {
            fmt::layer()
                .with_timer(LocalTimestamp)
                .with_target(false)
        });
        let file_layer = sink.clone().map(|writer| {
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(LocalTimestamp)
                .with_target(false)
        });

        let subscriber = Registry::default()
            .with(filter)
            .with(console_layer)
            .with(file_layer);
        let guard = tracing::subscriber::set_default(subscriber);

        Self {
            path,
            sink,
            guard: Some(guard),
        }
    }

    /// Path of the file sink, if one is open.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Flushes the file sink and restores the previous subscriber.
    pub fn close(mut self) -> Result<()> {
        self.guard.take();
        if let Some(sink) = self.sink.take() {
            sink.sync().context("Failed to flush run log")?;
        }
        Ok(())
    }
}
