//! Audit trail for the broker handler.
//!
//! Each delivered message becomes exactly one line in
//! `<audit_dir>/audit-<epoch-millis>.log`:
//!
//! ```text
//! 🪵 [alice] hi (CPU: 0.42%, MEM: 35.10 MB)
//! ```

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{MessageSink, SinkError};
use crate::bus::ChatRecord;
use crate::console::Console;
use crate::message::ChatMessage;

/// Reported for a sample value that cannot be read on this host.
pub const UNAVAILABLE: f64 = -1.0;

/// One resource-usage reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadSample {
    /// One-minute system load average.
    pub cpu_load: f64,
    /// Resident memory of this process in MB.
    pub memory_used_mb: f64,
}

/// Source of resource-usage samples.
pub trait LoadSampler: Send + Sync {
    fn sample(&self) -> LoadSample;
}

/// Samples load from procfs.
#[derive(Debug, Clone)]
pub struct ProcLoadSampler {
    loadavg_path: PathBuf,
    status_path: PathBuf,
}

impl Default for ProcLoadSampler {
    fn default() -> Self {
        Self::with_paths("/proc/loadavg", "/proc/self/status")
    }
}

impl ProcLoadSampler {
    pub fn with_paths(loadavg: impl Into<PathBuf>, status: impl Into<PathBuf>) -> Self {
        Self {
            loadavg_path: loadavg.into(),
            status_path: status.into(),
        }
    }
}

impl LoadSampler for ProcLoadSampler {
    fn sample(&self) -> LoadSample {
        let cpu_load = std::fs::read_to_string(&self.loadavg_path)
            .ok()
            .and_then(|text| parse_load_average(&text))
            .unwrap_or(UNAVAILABLE);
        let memory_used_mb = std::fs::read_to_string(&self.status_path)
            .ok()
            .and_then(|text| parse_resident_mb(&text))
            .unwrap_or(UNAVAILABLE);

        LoadSample {
            cpu_load,
            memory_used_mb,
        }
    }
}

fn parse_load_average(text: &str) -> Option<f64> {
    text.split_whitespace().next()?.parse().ok()
}

fn parse_resident_mb(text: &str) -> Option<f64> {
    let value = text.lines().find_map(|line| line.strip_prefix("VmRSS:"))?;
    let kib: f64 = value.split_whitespace().next()?.parse().ok()?;
    Some(kib / 1024.0)
}

/// Append-only destination for audit entries.
#[async_trait]
pub trait AuditWriter: Send {
    /// Append one entry and flush it.
    async fn append(&mut self, entry: &str) -> io::Result<()>;

    async fn close(&mut self) -> io::Result<()>;
}

/// Audit log file, one per process run.
pub struct FileAuditWriter {
    path: PathBuf,
    file: File,
}

impl FileAuditWriter {
    /// Create a fresh audit file under `dir`, creating the directory if needed.
    pub fn create(dir: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(audit_file_name(Utc::now()));
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;

        info!(path = %path.display(), "Audit log opened");
        Ok(Self {
            path,
            file: File::from_std(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `audit-<epoch-millis>.log`
pub fn audit_file_name(created_at: DateTime<Utc>) -> String {
    format!("audit-{}.log", created_at.timestamp_millis())
}

#[async_trait]
impl AuditWriter for FileAuditWriter {
    async fn append(&mut self, entry: &str) -> io::Result<()> {
        self.file.write_all(entry.as_bytes()).await?;
        self.file.write_all(b"\n").await?;
        self.file.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.file.flush().await?;
        debug!(path = %self.path.display(), "Audit log closed");
        Ok(())
    }
}

/// Render an audit entry.
pub fn format_entry(value: &str, sample: LoadSample) -> String {
    format!(
        "🪵 {} (CPU: {:.2}%, MEM: {:.2} MB)",
        value, sample.cpu_load, sample.memory_used_mb
    )
}

/// Echoes each record with a fresh load sample and appends it to the audit log.
pub struct AuditSink<W, L> {
    writer: W,
    sampler: L,
    console: Arc<dyn Console>,
    recorded: usize,
}

impl<W: AuditWriter, L: LoadSampler> AuditSink<W, L> {
    pub fn new(writer: W, sampler: L, console: Arc<dyn Console>) -> Self {
        Self {
            writer,
            sampler,
            console,
            recorded: 0,
        }
    }

    /// Entries appended so far.
    pub fn recorded(&self) -> usize {
        self.recorded
    }
}

#[async_trait]
impl<W: AuditWriter, L: LoadSampler> MessageSink for AuditSink<W, L> {
    async fn deliver(&mut self, record: &ChatRecord) -> Result<(), SinkError> {
        let entry = format_entry(&record.value, self.sampler.sample());
        self.console.line(&entry);
        self.writer.append(&entry).await?;
        self.recorded += 1;

        if let Some(message) = ChatMessage::parse(&record.value) {
            debug!(sender = %message.sender, offset = record.offset, "Message audited");
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        debug!(recorded = self.recorded, "Closing audit sink");
        self.writer.close().await?;
        Ok(())
    }
}
