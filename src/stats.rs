//! Bridge and lifecycle statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-bridge statistics, shared between callers and the session worker
pub struct BridgeStats {
    pub commands_sent: AtomicU64,
    pub commands_processed: AtomicU64,
    pub command_failures: AtomicU64,
    pub timeouts: AtomicU64,
    pub discarded_replies: AtomicU64,
    pub orders_submitted: AtomicU64,
    pub orders_failed: AtomicU64,
    pub position_checks_degraded: AtomicU64,
}

impl BridgeStats {
    pub fn new() -> Self {
        Self {
            commands_sent: AtomicU64::new(0),
            commands_processed: AtomicU64::new(0),
            command_failures: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            discarded_replies: AtomicU64::new(0),
            orders_submitted: AtomicU64::new(0),
            orders_failed: AtomicU64::new(0),
            position_checks_degraded: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> BridgeStatsSnapshot {
        BridgeStatsSnapshot {
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            commands_processed: self.commands_processed.load(Ordering::Relaxed),
            command_failures: self.command_failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            discarded_replies: self.discarded_replies.load(Ordering::Relaxed),
            orders_submitted: self.orders_submitted.load(Ordering::Relaxed),
            orders_failed: self.orders_failed.load(Ordering::Relaxed),
            position_checks_degraded: self.position_checks_degraded.load(Ordering::Relaxed),
        }
    }
}

impl Default for BridgeStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BridgeStatsSnapshot {
    pub commands_sent: u64,
    pub commands_processed: u64,
    pub command_failures: u64,
    pub timeouts: u64,
    pub discarded_replies: u64,
    pub orders_submitted: u64,
    pub orders_failed: u64,
    pub position_checks_degraded: u64,
}

/// Lifecycle manager statistics
pub struct ManagerStats {
    pub initializations_started: AtomicU64,
    pub initializations_succeeded: AtomicU64,
    pub initializations_failed: AtomicU64,
    pub sessions_replaced: AtomicU64,
}

impl ManagerStats {
    pub fn new() -> Self {
        Self {
            initializations_started: AtomicU64::new(0),
            initializations_succeeded: AtomicU64::new(0),
            initializations_failed: AtomicU64::new(0),
            sessions_replaced: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> ManagerStatsSnapshot {
        ManagerStatsSnapshot {
            initializations_started: self.initializations_started.load(Ordering::Relaxed),
            initializations_succeeded: self.initializations_succeeded.load(Ordering::Relaxed),
            initializations_failed: self.initializations_failed.load(Ordering::Relaxed),
            sessions_replaced: self.sessions_replaced.load(Ordering::Relaxed),
        }
    }
}

impl Default for ManagerStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManagerStatsSnapshot {
    pub initializations_started: u64,
    pub initializations_succeeded: u64,
    pub initializations_failed: u64,
    pub sessions_replaced: u64,
}
