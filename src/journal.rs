//! Append-only operation journal.
//!
//! The user-visible record of purge/preload activity: one line per event,
//! `[timestamp] message`. Diagnostics for operators go through `tracing`;
//! the journal is the stable, grep-friendly log the site owner reads.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use parking_lot::Mutex;

/// Sink for journal lines. Appends must be safe to call from concurrent
/// tasks; implementations serialize writes.
pub trait EventLog: Send + Sync {
    fn record(&self, message: &str);
}

/// Journal that appends to a text file, one line per event.
pub struct FileEventLog {
    file: Mutex<File>,
}

impl FileEventLog {
    /// Open (creating if needed) the journal file in append mode.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl EventLog for FileEventLog {
    fn record(&self, message: &str) {
        let line = format!(
            "[{}] {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            message
        );
        let mut file = self.file.lock();
        if let Err(error) = file.write_all(line.as_bytes()) {
            // A broken journal must never break cache maintenance.
            tracing::error!(error = %error, "Failed to append journal line");
        }
    }
}

/// Journal that discards everything. Used when logging is disabled.
pub struct NullEventLog;

impl EventLog for NullEventLog {
    fn record(&self, _message: &str) {}
}
