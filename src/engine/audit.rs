use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::models::{AuditRecord, EngineEvent};

/// Default capacity of the event fan-out channel
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Append-only record of every state change, with a live fan-out to subscribers
pub struct AuditLog {
    records: Vec<AuditRecord>,
    sender: broadcast::Sender<AuditRecord>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            records: Vec::new(),
            sender,
        }
    }

    /// Append an event and publish it. Sequence numbers start at 1.
    pub fn append(
        &mut self,
        event: EngineEvent,
        timestamp: DateTime<Utc>,
        config_version: u64,
    ) -> AuditRecord {
        let record = AuditRecord {
            sequence: self.records.len() as u64 + 1,
            timestamp,
            config_version,
            event,
        };
        tracing::debug!(
            sequence = record.sequence,
            event = record.event.name(),
            "audit record appended"
        );
        self.records.push(record.clone());
        // Ignore if no subscribers
        let _ = self.sender.send(record.clone());
        record
    }

    /// Receive every record appended from now on
    pub fn subscribe(&self) -> broadcast::Receiver<AuditRecord> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    /// Records with a sequence number greater than `sequence`
    pub fn since(&self, sequence: u64) -> &[AuditRecord] {
        let start = (sequence as usize).min(self.records.len());
        &self.records[start..]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}
