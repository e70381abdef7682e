//! The broker's process-wide append-only log sink:
//! `<logger_dir>/hashpwd.log`, opened truncate-write at startup, one line
//! per record prefixed `[info]`/`[debug]`/`[warning]`/`[error]`.
//!
//! Paired with `tracing`, the way a service binary pairs structured spans
//! with a `tracing-subscriber::fmt` sink — the file is an explicit,
//! durable record of broker activity, `tracing` is the ambient
//! observability layer carried alongside it.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum LoggerError {
    #[snafu(display("failed to create logger directory {}", dir.display()))]
    CreateDir {
        dir: std::path::PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to open log file {}", path.display()))]
    OpenFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

/// A single writer over `hashpwd.log`. Single-writer by construction: the
/// broker owns one `Logger` for its lifetime and the single-threaded
/// dispatch model means no two tasks ever write concurrently, so a
/// `std::sync::Mutex` (not an async one) is enough.
pub struct Logger {
    file: Mutex<BufWriter<File>>,
}

impl Logger {
    /// Open (truncating) `<logger_dir>/hashpwd.log`, creating `logger_dir`
    /// if needed.
    pub fn open(logger_dir: &Path) -> Result<Self, LoggerError> {
        std::fs::create_dir_all(logger_dir).context(CreateDir { dir: logger_dir })?;
        let path = logger_dir.join("hashpwd.log");
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .context(OpenFile { path })?;
        Ok(Self {
            file: Mutex::new(BufWriter::new(file)),
        })
    }

    fn write_line(&self, prefix: &str, message: &str) {
        let mut file = self.file.lock().unwrap();
        let _ = writeln!(file, "{} {}", prefix, message);
        let _ = file.flush();
    }

    pub fn info(&self, message: impl AsRef<str>) {
        tracing::info!("{}", message.as_ref());
        self.write_line("[info]", message.as_ref());
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        tracing::debug!("{}", message.as_ref());
        self.write_line("[debug]", message.as_ref());
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        tracing::warn!("{}", message.as_ref());
        self.write_line("[warning]", message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        tracing::error!("{}", message.as_ref());
        self.write_line("[error]", message.as_ref());
    }

    /// Flush and drop the underlying file handle. Called from the
    /// broker's clean-up path.
    pub fn close(&self) {
        let mut file = self.file.lock().unwrap();
        let _ = file.flush();
    }
}

/// Initialize the `tracing` stderr subscriber: honor `RUST_LOG` if set,
/// otherwise default to `"info"`.
pub fn init_tracing() {
    if let Ok(filter) = tracing_subscriber::EnvFilter::try_from_default_env() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter("info").init();
    }
}
