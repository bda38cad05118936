use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{error, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::cache::lock;

pub const DEFAULT_ERROR_LOG: &str = "./errors.txt";

/// Append-only record of rows that could not be uploaded.
///
/// The file is opened and closed on every call; recording never fails the
/// caller.
pub struct ErrorLog {
    path: Utf8PathBuf,
    write_lock: Mutex<()>,
}

impl ErrorLog {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn record(&self, line: Option<usize>, message: &str, sink: &dyn ProgressSink) {
        warn!("{message}");
        sink.event(ProgressEvent::error(line, message));

        let _guard = lock(&self.write_lock);
        if let Err(err) = self.append(message) {
            error!(path = %self.path, "failed to write error log: {err}");
        }
    }

    fn append(&self, message: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_std_path())?;
        file.write_all(format!("{message}\n\n").as_bytes())
    }
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_LOG)
    }
}
