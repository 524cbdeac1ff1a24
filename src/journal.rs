//! Order journal storage trait

use serde::{Deserialize, Serialize};

/// Journal storage trait
pub trait OrderJournal: Send + Sync + 'static {
    fn append(&self, outcome: OrderOutcome, message: &str) -> Result<u64, JournalError>;
    fn entries(&self) -> Result<Vec<JournalEntry>, JournalError>;
}

/// How an order attempt ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderOutcome {
    Accepted,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JournalEntry {
    pub sequence: u64,
    pub recorded_at_millis: u64,
    pub outcome: OrderOutcome,
    pub message: Box<str>,
}

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("Storage error: {0}")]
    Storage(Box<str>),
}

/// Current time in milliseconds since UNIX epoch
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// In-memory order log. Diagnostic only, lost on restart
pub struct InMemoryOrderJournal {
    data: std::sync::RwLock<Vec<JournalEntry>>,
    counter: std::sync::atomic::AtomicU64,
}

impl InMemoryOrderJournal {
    pub fn new() -> Self {
        Self {
            data: std::sync::RwLock::new(Vec::new()),
            counter: std::sync::atomic::AtomicU64::new(1),
        }
    }
}

impl OrderJournal for InMemoryOrderJournal {
    fn append(&self, outcome: OrderOutcome, message: &str) -> Result<u64, JournalError> {
        let seq = self.counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let entry = JournalEntry {
            sequence: seq,
            recorded_at_millis: now_millis(),
            outcome,
            message: message.into(),
        };

        let mut data = self.data.write().map_err(|e| JournalError::Storage(e.to_string().into()))?;
        data.push(entry);

        Ok(seq)
    }

    fn entries(&self) -> Result<Vec<JournalEntry>, JournalError> {
        let data = self.data.read().map_err(|e| JournalError::Storage(e.to_string().into()))?;
        Ok(data.clone())
    }
}

impl Default for InMemoryOrderJournal {
    fn default() -> Self {
        Self::new()
    }
}
