//! Test utilities and fake capabilities.
//!
//! Fakes for the console, the load sampler and the audit writer so the
//! consume path can be exercised without a terminal, procfs or a filesystem.

use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::bus::ChatRecord;
use crate::console::Console;
use crate::sink::{AuditWriter, LoadSample, LoadSampler};

/// Build a record on `global.chat` with no key.
pub fn record(offset: i64, value: &str) -> ChatRecord {
    ChatRecord {
        topic: "global.chat".to_string(),
        key: None,
        value: value.to_string(),
        offset,
    }
}

/// Console that keeps everything printed to it.
#[derive(Default)]
pub struct CapturedConsole {
    lines: Mutex<Vec<String>>,
}

impl CapturedConsole {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }

    /// Chat messages printed by a `ConsoleSink`, without the `📩 ` prefix.
    pub fn received(&self) -> Vec<String> {
        self.lines()
            .iter()
            .filter_map(|line| line.strip_prefix("📩 ").map(str::to_string))
            .collect()
    }
}

impl Console for CapturedConsole {
    fn line(&self, text: &str) {
        self.lines.lock().unwrap().push(text.to_string());
    }

    fn prompt(&self, text: &str) {
        self.lines.lock().unwrap().push(text.to_string());
    }
}

/// Sampler returning the same reading every time.
#[derive(Debug, Clone, Copy)]
pub struct FixedLoadSampler(pub LoadSample);

impl LoadSampler for FixedLoadSampler {
    fn sample(&self) -> LoadSample {
        self.0
    }
}

/// Audit writer keeping entries in memory, optionally failing after a
/// number of successful appends.
#[derive(Default)]
pub struct MemoryAuditWriter {
    entries: Arc<Mutex<Vec<String>>>,
    closed: Arc<Mutex<bool>>,
    fail_after: Option<usize>,
}

impl MemoryAuditWriter {
    pub fn failing_after(successes: usize) -> Self {
        Self {
            fail_after: Some(successes),
            ..Self::default()
        }
    }

    pub fn entries(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.entries)
    }

    pub fn closed(&self) -> Arc<Mutex<bool>> {
        Arc::clone(&self.closed)
    }
}

#[async_trait]
impl AuditWriter for MemoryAuditWriter {
    async fn append(&mut self, entry: &str) -> io::Result<()> {
        let mut entries = self.entries.lock().unwrap();
        if self.fail_after.is_some_and(|limit| entries.len() >= limit) {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        entries.push(entry.to_string());
        Ok(())
    }

    async fn close(&mut self) -> io::Result<()> {
        *self.closed.lock().unwrap() = true;
        Ok(())
    }
}
