//! Per-message handlers invoked by the consume loop.
//!
//! - `ConsoleSink`: echoes every message to the operator
//! - `AuditSink`: echoes, samples local load, and appends to the audit log

use std::io;
use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::ChatRecord;
use crate::console::Console;

pub mod audit;

pub use audit::{AuditSink, AuditWriter, FileAuditWriter, LoadSample, LoadSampler, ProcLoadSampler};

/// Errors raised by a sink. Any of them ends the consume loop.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Failed to write audit log: {0}")]
    AuditWrite(#[from] io::Error),
}

/// Handler for records delivered by a subscription.
#[async_trait]
pub trait MessageSink: Send {
    /// Handle one record. Called in arrival order, one at a time.
    async fn deliver(&mut self, record: &ChatRecord) -> Result<(), SinkError>;

    /// Release resources held by the sink. Called once when the loop ends.
    async fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Prints `📩 <value>` for every record.
pub struct ConsoleSink {
    console: Arc<dyn Console>,
}

impl ConsoleSink {
    pub fn new(console: Arc<dyn Console>) -> Self {
        Self { console }
    }
}

#[async_trait]
impl MessageSink for ConsoleSink {
    async fn deliver(&mut self, record: &ChatRecord) -> Result<(), SinkError> {
        self.console.line(&format!("📩 {}", record.value));
        Ok(())
    }
}
