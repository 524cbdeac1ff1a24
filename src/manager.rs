//! Session lifecycle manager.
//!
//! Keeps zero or one published [`Bridge`]. When the published bridge is
//! missing or unhealthy, [`LifecycleManager::get_session`] starts a background
//! initialization, never more than one at a time and never more often than
//! the configured retry interval.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Instant;

use serde::Serialize;

use crate::{
    Bridge, BridgeConfig, BridgeError, InMemoryOrderJournal, ManagerStats, ManagerStatsSnapshot,
    NoOpObserver, OrderJournal, SessionFactory, SessionObserver,
};

/// Manager's view of the trading session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing published and nothing in flight
    Absent,
    /// An initialization attempt is running
    Initializing,
    /// Published bridge is healthy
    Ready,
    /// Published bridge lost its worker or instrument
    Degraded,
}

#[derive(Default)]
struct ManagerInner {
    bridge: Option<Arc<Bridge>>,
    initializing: bool,
    last_attempt: Option<Instant>,
    attempts: u64,
    closed: bool,
}

struct Shared<F> {
    factory: F,
    config: BridgeConfig,
    inner: Mutex<ManagerInner>,
    stats: ManagerStats,
    journal: Arc<dyn OrderJournal>,
    observer: Arc<dyn SessionObserver>,
}

impl<F> Shared<F> {
    fn lock(&self) -> MutexGuard<'_, ManagerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the in-flight flag when initialization ends, including by panic
struct InFlight<'a, F>(&'a Shared<F>);

impl<F> Drop for InFlight<'_, F> {
    fn drop(&mut self) {
        self.0.lock().initializing = false;
    }
}

/// Supervisor for the single venue session
pub struct LifecycleManager<F: SessionFactory> {
    shared: Arc<Shared<F>>,
}

impl<F: SessionFactory> Clone for LifecycleManager<F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<F: SessionFactory> LifecycleManager<F> {
    /// Create a manager. Nothing connects until the first [`get_session`](Self::get_session)
    pub fn new(factory: F, config: BridgeConfig) -> Self {
        Self::with_observer(
            factory,
            config,
            Arc::new(InMemoryOrderJournal::new()),
            Arc::new(NoOpObserver),
        )
    }

    pub fn with_observer(
        factory: F,
        config: BridgeConfig,
        journal: Arc<dyn OrderJournal>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                factory,
                config,
                inner: Mutex::new(ManagerInner::default()),
                stats: ManagerStats::new(),
                journal,
                observer,
            }),
        }
    }

    /// Return the published bridge, starting a background initialization
    /// first if it is missing or unhealthy and a retry is due.
    ///
    /// Never waits for the initialization; the result may be `None` or a
    /// degraded bridge.
    pub fn get_session(&self) -> Option<Arc<Bridge>> {
        let mut inner = self.shared.lock();
        let healthy = inner.bridge.as_ref().is_some_and(|b| b.is_healthy());

        if !healthy && !inner.closed && !inner.initializing && self.retry_due(&inner) {
            if inner.bridge.is_some() {
                self.shared.observer.on_session_degraded("published session unhealthy");
            }
            inner.initializing = true;
            inner.last_attempt = Some(Instant::now());
            inner.attempts += 1;
            let attempt = inner.attempts;

            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name(format!("session-init-{attempt}"))
                .spawn(move || initialize(&shared, attempt));
            if let Err(e) = spawned {
                tracing::error!(attempt, error = %e, "Failed to spawn session initializer");
                inner.initializing = false;
            }
        }

        inner.bridge.clone()
    }

    fn retry_due(&self, inner: &ManagerInner) -> bool {
        inner
            .last_attempt
            .map_or(true, |t| t.elapsed() >= self.shared.config.retry_interval())
    }

    /// Current session state. Does not trigger initialization
    pub fn state(&self) -> SessionState {
        let inner = self.shared.lock();
        if inner.initializing {
            return SessionState::Initializing;
        }
        match &inner.bridge {
            None => SessionState::Absent,
            Some(bridge) if bridge.is_healthy() => SessionState::Ready,
            Some(_) => SessionState::Degraded,
        }
    }

    pub fn stats(&self) -> ManagerStatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.shared.config
    }

    /// Stop the published bridge and refuse further initializations
    pub fn shutdown(&self) {
        let bridge = {
            let mut inner = self.shared.lock();
            inner.closed = true;
            inner.bridge.take()
        };
        if let Some(bridge) = bridge {
            tracing::info!("Shutting down trading session");
            bridge.shutdown();
        }
    }
}

fn initialize<F: SessionFactory>(shared: &Shared<F>, attempt: u64) {
    let _in_flight = InFlight(shared);
    shared
        .stats
        .initializations_started
        .fetch_add(1, Ordering::Relaxed);
    shared.observer.on_initialization_started(attempt);

    match start_bridge(shared) {
        Ok(bridge) => {
            shared
                .stats
                .initializations_succeeded
                .fetch_add(1, Ordering::Relaxed);
            if let Some(instrument) = bridge.instrument() {
                shared.observer.on_initialization_succeeded(attempt, &instrument);
            }

            let replaced = {
                let mut inner = shared.lock();
                if inner.closed {
                    drop(inner);
                    bridge.shutdown();
                    return;
                }
                inner.bridge.replace(Arc::new(bridge))
            };
            if let Some(old) = replaced {
                shared.stats.sessions_replaced.fetch_add(1, Ordering::Relaxed);
                old.shutdown();
            }
        }
        Err(err) => {
            shared
                .stats
                .initializations_failed
                .fetch_add(1, Ordering::Relaxed);
            shared.observer.on_initialization_failed(attempt, &err);
        }
    }
}

fn start_bridge<F: SessionFactory>(shared: &Shared<F>) -> Result<Bridge, BridgeError> {
    let bridge = Bridge::start(
        shared.factory.create(),
        &shared.config,
        Arc::clone(&shared.journal),
        Arc::clone(&shared.observer),
    )?;

    if let Err(err) = bridge.resolve_configured() {
        bridge.shutdown();
        return Err(err);
    }
    Ok(bridge)
}
