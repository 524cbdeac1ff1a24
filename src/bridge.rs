//! Synchronous facade over the session worker.
//!
//! Every operation enqueues one [`Command`] with its own reply channel and
//! blocks the calling thread on that channel up to an operation-specific
//! deadline. Call these from plain threads or `spawn_blocking`, never from
//! inside an async task.

use std::sync::atomic::Ordering;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use crate::worker::{self, WorkerHandle, WorkerSettings, WorkerShared};
use crate::{
    BridgeConfig, BridgeError, BridgeStats, BridgeStatsSnapshot, Command, Direction,
    InMemoryOrderJournal, InstrumentConfig, Instrument, NoOpObserver, OrderJournal, OrderRequest,
    ReplyTo, SessionObserver, TimeoutConfig, VenueSession, WorkerState,
};

/// Result of acting on a trade signal
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignalOutcome {
    /// A position of at least the minimum size already exists
    AlreadyHeld(Direction),
    /// An order was sent; carries the venue status message
    Submitted(String),
}

/// Blocking, timeout-bounded access to one venue session
pub struct Bridge {
    worker: WorkerHandle,
    instrument: RwLock<Option<Instrument>>,
    instrument_config: InstrumentConfig,
    timeouts: TimeoutConfig,
    min_order_size: f64,
    stats: Arc<BridgeStats>,
    journal: Arc<dyn OrderJournal>,
    observer: Arc<dyn SessionObserver>,
    signal_guard: Mutex<()>,
}

impl Bridge {
    /// Start a worker for `venue` and wait until it is serving.
    ///
    /// No instrument is resolved yet; see [`Bridge::resolve_configured`].
    pub fn start<V: VenueSession>(
        venue: V,
        config: &BridgeConfig,
        journal: Arc<dyn OrderJournal>,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Self, BridgeError> {
        let stats = Arc::new(BridgeStats::new());
        let settings = WorkerSettings {
            endpoint: config.endpoint(),
            connect_timeout: Duration::from_secs(config.venue.connect_timeout_secs),
            poll_interval: config.timeouts.poll_interval(),
            order_settle: Duration::from_millis(config.trading.order_settle_ms),
        };
        let shared = WorkerShared {
            stats: Arc::clone(&stats),
            journal: Arc::clone(&journal),
            observer: Arc::clone(&observer),
        };

        let worker = worker::spawn(venue, settings, shared)?;

        Ok(Self {
            worker,
            instrument: RwLock::new(None),
            instrument_config: config.instrument.clone(),
            timeouts: config.timeouts.clone(),
            min_order_size: config.trading.min_order_size,
            stats,
            journal,
            observer,
            signal_guard: Mutex::new(()),
        })
    }

    /// Start with an in-memory journal and no observer
    pub fn start_default<V: VenueSession>(
        venue: V,
        config: &BridgeConfig,
    ) -> Result<Self, BridgeError> {
        Self::start(
            venue,
            config,
            Arc::new(InMemoryOrderJournal::new()),
            Arc::new(NoOpObserver),
        )
    }

    fn call<T>(
        &self,
        operation: &'static str,
        deadline: Duration,
        build: impl FnOnce(ReplyTo<T>) -> Command,
    ) -> Result<T, BridgeError> {
        let (reply_to, rx) = ReplyTo::channel();
        self.worker.send(build(reply_to))?;
        self.stats.commands_sent.fetch_add(1, Ordering::Relaxed);

        match rx.recv_timeout(deadline) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                Err(BridgeError::Timeout {
                    operation,
                    waited: deadline,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(BridgeError::WorkerStopped),
        }
    }

    /// Qualify `symbol` through the configured candidate list.
    ///
    /// On success the result becomes this bridge's instrument. On failure the
    /// instrument is left unset and the error is logged and returned.
    pub fn resolve_instrument(
        &self,
        market: &str,
        kind: &str,
        symbol: &str,
    ) -> Result<Instrument, BridgeError> {
        let candidates = self.instrument_config.candidates_for(market, kind, symbol);
        let result = self.call("instrument resolution", self.timeouts.resolve(), |reply_to| {
            Command::ResolveInstrument {
                symbol: symbol.into(),
                candidates,
                reply_to,
            }
        });

        match result {
            Ok(instrument) => {
                tracing::info!(symbol = %symbol, instrument = %instrument, "Instrument set");
                *self
                    .instrument
                    .write()
                    .unwrap_or_else(PoisonError::into_inner) = Some(instrument.clone());
                Ok(instrument)
            }
            Err(err) => {
                tracing::error!(symbol = %symbol, error = %err, "Instrument resolution failed");
                Err(err)
            }
        }
    }

    /// Resolve the instrument named in the configuration
    pub fn resolve_configured(&self) -> Result<Instrument, BridgeError> {
        let cfg = &self.instrument_config;
        self.resolve_instrument(&cfg.market, &cfg.security_type, &cfg.symbol)
    }

    /// Whether a position of at least the minimum size exists in `direction`.
    ///
    /// Lookup failures and timeouts are logged and reported as `false`.
    pub fn check_position(&self, direction: Direction, instrument: &Instrument) -> bool {
        let result = self.call("position check", self.timeouts.position_check(), |reply_to| {
            Command::CheckPosition {
                direction,
                instrument: instrument.clone(),
                minimum: self.min_order_size,
                reply_to,
            }
        });

        match result {
            Ok(held) => held,
            Err(err) => {
                self.stats
                    .position_checks_degraded
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    direction = %direction,
                    symbol = %instrument.symbol,
                    error = %err,
                    "Position check failed, assuming no position"
                );
                false
            }
        }
    }

    /// Place a market order and return the venue's status message
    pub fn submit_order(
        &self,
        instrument: &Instrument,
        direction: Direction,
        quantity: f64,
    ) -> Result<String, BridgeError> {
        let request = OrderRequest::market(instrument.clone(), direction, quantity);
        request.validate()?;

        tracing::info!(order = %request.summary(), "Submitting order");
        self.call("order submission", self.timeouts.order_submit(), |reply_to| {
            Command::SubmitOrder { request, reply_to }
        })
    }

    /// Qualify the configured probe contract
    pub fn test_permissions(&self) -> Result<String, BridgeError> {
        let probe = self.instrument_config.permission_probe.clone();
        self.call("permission test", self.timeouts.permissions(), |reply_to| {
            Command::TestPermissions { probe, reply_to }
        })
    }

    /// Check the position for `direction` and order the minimum size if absent.
    ///
    /// Signals on one bridge are handled one at a time, so two concurrent
    /// signals cannot both pass the position check.
    pub fn execute_signal(&self, direction: Direction) -> Result<SignalOutcome, BridgeError> {
        let _guard = self
            .signal_guard
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let instrument = self
            .instrument()
            .ok_or_else(|| BridgeError::connection("instrument not resolved"))?;

        if self.check_position(direction, &instrument) {
            tracing::info!(direction = %direction, symbol = %instrument.symbol, "Position already held, skipping order");
            return Ok(SignalOutcome::AlreadyHeld(direction));
        }

        self.submit_order(&instrument, direction, self.min_order_size)
            .map(SignalOutcome::Submitted)
    }

    pub fn instrument(&self) -> Option<Instrument> {
        self.instrument
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn worker_state(&self) -> WorkerState {
        self.worker.state()
    }

    /// Worker serving and instrument resolved
    pub fn is_healthy(&self) -> bool {
        self.worker_state() == WorkerState::Serving && self.instrument().is_some()
    }

    pub fn min_order_size(&self) -> f64 {
        self.min_order_size
    }

    pub fn stats(&self) -> BridgeStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn journal(&self) -> &Arc<dyn OrderJournal> {
        &self.journal
    }

    /// Stop the worker and wait for it to release the venue session
    pub fn shutdown(&self) {
        if self.worker_state() != WorkerState::Terminated {
            self.observer.on_session_degraded("bridge shut down");
        }
        self.worker.stop_and_join();
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.worker.request_stop();
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("worker_state", &self.worker_state())
            .field("instrument", &self.instrument())
            .finish()
    }
}
