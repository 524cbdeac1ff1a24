//! Session lifecycle observer trait

use crate::{BridgeError, Instrument};

/// Observer trait for external observability
pub trait SessionObserver: Send + Sync + 'static {
    fn on_initialization_started(&self, attempt: u64);
    fn on_initialization_succeeded(&self, attempt: u64, instrument: &Instrument);
    fn on_initialization_failed(&self, attempt: u64, error: &BridgeError);
    fn on_session_degraded(&self, reason: &str);
    fn on_order_submitted(&self, summary: &str, status: &str);
    fn on_order_failed(&self, summary: &str, error: &BridgeError);
}

/// No-op observer
pub struct NoOpObserver;

impl SessionObserver for NoOpObserver {
    fn on_initialization_started(&self, _attempt: u64) {}
    fn on_initialization_succeeded(&self, _attempt: u64, _instrument: &Instrument) {}
    fn on_initialization_failed(&self, _attempt: u64, _error: &BridgeError) {}
    fn on_session_degraded(&self, _reason: &str) {}
    fn on_order_submitted(&self, _summary: &str, _status: &str) {}
    fn on_order_failed(&self, _summary: &str, _error: &BridgeError) {}
}

/// Tracing-based observer
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_initialization_started(&self, attempt: u64) {
        tracing::info!(attempt, "Session initialization started");
    }

    fn on_initialization_succeeded(&self, attempt: u64, instrument: &Instrument) {
        tracing::info!(attempt, instrument = %instrument, "Session ready");
    }

    fn on_initialization_failed(&self, attempt: u64, error: &BridgeError) {
        tracing::warn!(attempt, error = %error, kind = ?error.kind(), "Session initialization failed");
    }

    fn on_session_degraded(&self, reason: &str) {
        tracing::warn!(reason = %reason, "Session degraded");
    }

    fn on_order_submitted(&self, summary: &str, status: &str) {
        tracing::info!(order = %summary, status = %status, "Order submitted");
    }

    fn on_order_failed(&self, summary: &str, error: &BridgeError) {
        tracing::error!(order = %summary, error = %error, kind = ?error.kind(), "Order failed");
    }
}
