//! JSON-lines record sinks
//!
//! `JsonLinesSink` appends one record per line to a file and syncs it to
//! disk before returning. `MemorySink` keeps records in memory for dry
//! runs and tests.

use crate::output::traits::{OutputError, OutputResult, PhoneRecord, RecordSink};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// File-backed append-only sink
pub struct JsonLinesSink {
    file: Mutex<Option<File>>,
    path: PathBuf,
    emitted: AtomicU64,
}

impl JsonLinesSink {
    /// Opens `path` for appending, creating it and its parent directories
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the records file
    ///
    /// # Returns
    ///
    /// * `Ok(JsonLinesSink)` - Sink ready for appending
    /// * `Err(OutputError)` - Failed to create or open the file
    pub fn open(path: &Path) -> OutputResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        tracing::debug!(path = %path.display(), "Opened records file");

        Ok(Self {
            file: Mutex::new(Some(file)),
            path: path.to_path_buf(),
            emitted: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, Option<File>> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordSink for JsonLinesSink {
    fn emit(&self, record: &PhoneRecord) -> OutputResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut guard = self.lock();
        let file = guard.as_mut().ok_or(OutputError::Closed)?;

        // One write per record keeps concurrent lines from interleaving
        file.write_all(&line)?;
        file.sync_data()?;
        drop(guard);

        self.emitted.fetch_add(1, Ordering::Relaxed);
        tracing::info!(model = %record.model_name, brand = %record.brand, "Saved record");
        Ok(())
    }

    fn flush(&self) -> OutputResult<()> {
        if let Some(file) = self.lock().as_mut() {
            file.flush()?;
            file.sync_all()?;
        }
        Ok(())
    }

    fn close(&self) -> OutputResult<()> {
        let Some(mut file) = self.lock().take() else {
            return Ok(());
        };

        file.flush()?;
        file.sync_all()?;
        tracing::debug!(path = %self.path.display(), "Closed records file");
        Ok(())
    }

    fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }
}

/// Sink that keeps records in memory
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<PhoneRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the records emitted so far
    pub fn records(&self) -> Vec<PhoneRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RecordSink for MemorySink {
    fn emit(&self, record: &PhoneRecord) -> OutputResult<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }

    fn flush(&self) -> OutputResult<()> {
        Ok(())
    }

    fn close(&self) -> OutputResult<()> {
        Ok(())
    }

    fn emitted(&self) -> u64 {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len() as u64
    }
}

/// Counts the records already present in a JSON-lines file
///
/// A missing file counts as empty.
pub fn count_records(path: &Path) -> OutputResult<u64> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(contents.lines().filter(|l| !l.trim().is_empty()).count() as u64),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e.into()),
    }
}
