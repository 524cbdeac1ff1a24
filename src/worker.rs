//! Session worker.
//!
//! A dedicated OS thread that owns the venue session and is its only caller.
//! It runs a current-thread tokio runtime, connects, then serves commands
//! one at a time in arrival order until stopped or the session drops.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::{
    resolver, BridgeError, BridgeStats, Command, ContractSpec, Direction, Instrument,
    OrderJournal, OrderOutcome, OrderRequest, OrderStatus, ReplyTo, SessionObserver,
    VenueEndpoint, VenueSession,
};

/// Worker lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Thread started, venue connect in progress
    Connecting,
    /// Accepting commands
    Serving,
    /// Loop exited; a new worker is needed
    Terminated,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WorkerState::Connecting,
            1 => WorkerState::Serving,
            _ => WorkerState::Terminated,
        }
    }
}

#[derive(Clone)]
struct StateCell(Arc<AtomicU8>);

impl StateCell {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(WorkerState::Connecting as u8)))
    }

    fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn set(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

/// Timing and target for one worker
#[derive(Clone, Debug)]
pub(crate) struct WorkerSettings {
    pub endpoint: VenueEndpoint,
    pub connect_timeout: Duration,
    pub poll_interval: Duration,
    pub order_settle: Duration,
}

/// Collaborators shared with the owning bridge
#[derive(Clone)]
pub(crate) struct WorkerShared {
    pub stats: Arc<BridgeStats>,
    pub journal: Arc<dyn OrderJournal>,
    pub observer: Arc<dyn SessionObserver>,
}

/// Caller side of a running worker
pub(crate) struct WorkerHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: StateCell,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerHandle {
    /// Enqueue a command
    pub fn send(&self, command: Command) -> Result<(), BridgeError> {
        self.commands
            .send(command)
            .map_err(|_| BridgeError::WorkerStopped)
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    /// Ask the loop to exit without waiting for it
    pub fn request_stop(&self) {
        let _ = self.commands.send(Command::Stop);
    }

    /// Ask the loop to exit and wait for the thread to finish
    pub fn stop_and_join(&self) {
        self.request_stop();
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::error!("Session worker thread panicked");
            }
        }
    }
}

/// Start a worker thread and wait until it is serving.
///
/// Returns the connection error if the venue cannot be reached within the
/// connect timeout; the thread has then already exited.
pub(crate) fn spawn<V: VenueSession>(
    venue: V,
    settings: WorkerSettings,
    shared: WorkerShared,
) -> Result<WorkerHandle, BridgeError> {
    let (commands, rx) = mpsc::unbounded_channel();
    let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);
    let state = StateCell::new();
    let connect_timeout = settings.connect_timeout;

    let thread_state = state.clone();
    let thread = thread::Builder::new()
        .name("venue-session-worker".into())
        .spawn(move || run(venue, settings, shared, rx, ready_tx, thread_state))
        .map_err(|e| BridgeError::connection(format!("failed to spawn session worker: {e}")))?;

    // The worker bounds its own connect; the margin covers runtime startup.
    match ready_rx.recv_timeout(connect_timeout + Duration::from_secs(1)) {
        Ok(Ok(())) => Ok(WorkerHandle {
            commands,
            state,
            thread: Mutex::new(Some(thread)),
        }),
        Ok(Err(err)) => {
            let _ = thread.join();
            Err(err)
        }
        Err(RecvTimeoutError::Timeout) => {
            // Dropping the sender makes the loop exit once it starts serving
            drop(commands);
            Err(BridgeError::connection(format!(
                "session worker not ready after {}ms",
                connect_timeout.as_millis()
            )))
        }
        Err(RecvTimeoutError::Disconnected) => {
            let _ = thread.join();
            Err(BridgeError::WorkerStopped)
        }
    }
}

fn run<V: VenueSession>(
    venue: V,
    settings: WorkerSettings,
    shared: WorkerShared,
    rx: mpsc::UnboundedReceiver<Command>,
    ready: SyncSender<Result<(), BridgeError>>,
    state: StateCell,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            state.set(WorkerState::Terminated);
            let _ = ready.send(Err(BridgeError::connection(format!(
                "failed to build worker runtime: {e}"
            ))));
            return;
        }
    };

    runtime.block_on(async move {
        let mut worker = Worker {
            venue,
            settings,
            shared,
        };

        if let Err(err) = worker.connect().await {
            tracing::warn!(venue = %worker.venue.name(), error = %err, "Session worker failed to connect");
            state.set(WorkerState::Terminated);
            let _ = ready.send(Err(err));
            return;
        }

        state.set(WorkerState::Serving);
        if ready.send(Ok(())).is_err() {
            // Starter gave up waiting
            state.set(WorkerState::Terminated);
            worker.venue.disconnect().await;
            return;
        }

        worker.serve(rx).await;
        state.set(WorkerState::Terminated);
        worker.venue.disconnect().await;
        tracing::info!(venue = %worker.venue.name(), "Session worker terminated");
    });
}

struct Worker<V> {
    venue: V,
    settings: WorkerSettings,
    shared: WorkerShared,
}

impl<V: VenueSession> Worker<V> {
    async fn connect(&mut self) -> Result<(), BridgeError> {
        let endpoint = self.settings.endpoint.clone();
        tracing::info!(venue = %self.venue.name(), endpoint = %endpoint, "Connecting to venue");

        match tokio::time::timeout(self.settings.connect_timeout, self.venue.connect(&endpoint)).await
        {
            Ok(Ok(())) => {
                tracing::info!(venue = %self.venue.name(), endpoint = %endpoint, "Venue connected");
                Ok(())
            }
            Ok(Err(e)) => Err(BridgeError::connection(format!(
                "failed to connect to {endpoint}: {e}"
            ))),
            Err(_) => Err(BridgeError::connection(format!(
                "connect to {endpoint} timed out after {}ms",
                self.settings.connect_timeout.as_millis()
            ))),
        }
    }

    async fn serve(&mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            match tokio::time::timeout(self.settings.poll_interval, rx.recv()).await {
                Ok(Some(Command::Stop)) => {
                    tracing::info!("Stop command received");
                    return;
                }
                Ok(Some(command)) => {
                    tracing::debug!(command = command.name(), "Processing command");
                    self.dispatch(command).await;
                }
                Ok(None) => {
                    tracing::debug!("All command senders dropped");
                    return;
                }
                Err(_) => {}
            }

            if !self.venue.is_connected() {
                tracing::error!(venue = %self.venue.name(), "Venue session dropped");
                self.shared.observer.on_session_degraded("venue session dropped");
                return;
            }
        }
    }

    async fn dispatch(&mut self, command: Command) {
        match command {
            Command::ResolveInstrument {
                symbol,
                candidates,
                reply_to,
            } => {
                let result = resolver::resolve_first(&mut self.venue, &symbol, &candidates).await;
                self.deliver(reply_to, result);
            }
            Command::TestPermissions { probe, reply_to } => {
                let result = self.test_permissions(&probe).await;
                self.deliver(reply_to, result);
            }
            Command::CheckPosition {
                direction,
                instrument,
                minimum,
                reply_to,
            } => {
                let result = self.check_position(direction, &instrument, minimum).await;
                self.deliver(reply_to, result);
            }
            Command::SubmitOrder { request, reply_to } => {
                let result = self.submit_order(&request).await;
                self.record_order(&request, &result);
                self.deliver(reply_to, result);
            }
            Command::Stop => {}
        }
    }

    fn deliver<T>(&self, reply_to: ReplyTo<T>, result: Result<T, BridgeError>) {
        let stats = &self.shared.stats;
        stats.commands_processed.fetch_add(1, Ordering::Relaxed);
        if result.is_err() {
            stats.command_failures.fetch_add(1, Ordering::Relaxed);
        }
        if !reply_to.send(result) {
            stats.discarded_replies.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Reply discarded, caller stopped waiting");
        }
    }

    async fn test_permissions(&mut self, probe: &ContractSpec) -> Result<String, BridgeError> {
        let found = self.venue.qualify(probe).await?;
        if found.is_empty() {
            return Err(BridgeError::venue(format!(
                "No market data permission for {}",
                probe.label()
            )));
        }
        Ok(format!("Market data permissions OK for {}", probe.symbol))
    }

    async fn check_position(
        &mut self,
        direction: Direction,
        instrument: &Instrument,
        minimum: f64,
    ) -> Result<bool, BridgeError> {
        let positions = self.venue.positions().await?;
        let held = positions.iter().any(|p| {
            p.instrument.same_contract(instrument) && direction.is_held_by(p.quantity, minimum)
        });

        tracing::debug!(symbol = %instrument.symbol, direction = %direction, held, "Position checked");
        Ok(held)
    }

    async fn submit_order(&mut self, request: &OrderRequest) -> Result<String, BridgeError> {
        request.validate()?;
        let summary = request.summary();

        let order_id = self.venue.place_order(request).await?;
        tracing::info!(order_id = %order_id, order = %summary, "Order placed");

        if !self.settings.order_settle.is_zero() {
            tokio::time::sleep(self.settings.order_settle).await;
        }

        match self.venue.order_status(order_id).await? {
            OrderStatus::Filled => Ok(format!("Order Filled: {summary}")),
            OrderStatus::PartiallyFilled => Ok(format!("Order PartiallyFilled: {summary}")),
            OrderStatus::Submitted => Ok(format!("Order submitted: {summary}")),
            OrderStatus::Cancelled { reason } => Err(BridgeError::venue(format!(
                "Order cancelled: {}",
                reason.as_deref().unwrap_or("Unknown reason")
            ))),
            other => Ok(format!("Order status: {} - {summary}", other.name())),
        }
    }

    fn record_order(&self, request: &OrderRequest, result: &Result<String, BridgeError>) {
        let summary = request.summary();
        let (outcome, line) = match result {
            Ok(message) => {
                self.shared.stats.orders_submitted.fetch_add(1, Ordering::Relaxed);
                self.shared.observer.on_order_submitted(&summary, message);
                (OrderOutcome::Accepted, message.clone())
            }
            Err(err) => {
                self.shared.stats.orders_failed.fetch_add(1, Ordering::Relaxed);
                self.shared.observer.on_order_failed(&summary, err);
                (OrderOutcome::Failed, format!("{summary}: {err}"))
            }
        };
        if let Err(e) = self.shared.journal.append(outcome, &line) {
            tracing::warn!(error = %e, "Failed to journal order");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryOrderJournal, NoOpObserver, PaperVenue, PaperVenueHandle};

    fn settings() -> WorkerSettings {
        WorkerSettings {
            endpoint: VenueEndpoint {
                host: "127.0.0.1".into(),
                port: 4002,
                client_id: 130,
            },
            connect_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(10),
            order_settle: Duration::ZERO,
        }
    }

    fn shared() -> WorkerShared {
        WorkerShared {
            stats: Arc::new(BridgeStats::new()),
            journal: Arc::new(InMemoryOrderJournal::new()),
            observer: Arc::new(NoOpObserver),
        }
    }

    fn tracker() -> Instrument {
        Instrument {
            contract_id: 2800,
            symbol: "2800".into(),
            exchange: "SEHK".into(),
            security_type: "STK".into(),
            currency: "HKD".into(),
            primary_exchange: None,
        }
    }

    fn start() -> (WorkerHandle, PaperVenueHandle, WorkerShared) {
        let (venue, handle) = PaperVenue::new();
        let shared = shared();
        let worker = spawn(venue, settings(), shared.clone()).unwrap();
        (worker, handle, shared)
    }

    fn wait_for(worker: &WorkerHandle, state: WorkerState) -> bool {
        for _ in 0..100 {
            if worker.state() == state {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_replies_in_enqueue_order() {
        let (worker, handle, shared) = start();
        handle.set_position(tracker(), 5.0);

        let mut receivers = Vec::new();
        for direction in [Direction::Long, Direction::Short, Direction::Long] {
            let (reply_to, rx) = ReplyTo::channel();
            worker
                .send(Command::CheckPosition {
                    direction,
                    instrument: tracker(),
                    minimum: 1.0,
                    reply_to,
                })
                .unwrap();
            receivers.push(rx);
        }

        let answers: Vec<bool> = receivers
            .iter()
            .map(|rx| rx.recv_timeout(Duration::from_secs(2)).unwrap().unwrap())
            .collect();
        assert_eq!(answers, vec![true, false, true]);
        assert_eq!(handle.calls().iter().filter(|c| *c == "positions").count(), 3);
        assert_eq!(shared.stats.snapshot().commands_processed, 3);

        worker.stop_and_join();
        assert_eq!(worker.state(), WorkerState::Terminated);
        assert!(!handle.is_connected());
    }

    #[test]
    fn test_any_matching_position_counts() {
        let (worker, handle, _shared) = start();
        handle.set_position(tracker(), 0.5);
        let mut other_lot = tracker();
        other_lot.contract_id = 2801;
        other_lot.currency = "USD".into();
        handle.add_position(other_lot, 3.0);

        let (reply_to, rx) = ReplyTo::channel();
        worker
            .send(Command::CheckPosition {
                direction: Direction::Long,
                instrument: tracker(),
                minimum: 1.0,
                reply_to,
            })
            .unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(2)).unwrap().unwrap());
        worker.stop_and_join();
    }

    #[test]
    fn test_connect_failure_terminates() {
        let (venue, handle) = PaperVenue::new();
        handle.fail_connect("gateway down");

        let err = spawn(venue, settings(), shared()).err().unwrap();
        assert!(err.is_connection());
        assert!(err.to_string().contains("gateway down"));
    }

    #[test]
    fn test_command_error_does_not_stop_loop() {
        let (worker, handle, shared) = start();
        handle.reject_orders("insufficient margin");

        let (reply_to, rx) = ReplyTo::channel();
        worker
            .send(Command::SubmitOrder {
                request: OrderRequest::market(tracker(), Direction::Long, 1.0),
                reply_to,
            })
            .unwrap();
        let err = rx.recv_timeout(Duration::from_secs(2)).unwrap().unwrap_err();
        assert!(err.to_string().contains("insufficient margin"));

        let (reply_to, rx) = ReplyTo::channel();
        worker
            .send(Command::CheckPosition {
                direction: Direction::Long,
                instrument: tracker(),
                minimum: 1.0,
                reply_to,
            })
            .unwrap();
        assert!(!rx.recv_timeout(Duration::from_secs(2)).unwrap().unwrap());
        assert_eq!(worker.state(), WorkerState::Serving);

        let entries = shared.journal.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].outcome, OrderOutcome::Failed);
        worker.stop_and_join();
    }

    #[test]
    fn test_order_status_messages() {
        let (worker, handle, _shared) = start();

        let submit = |status: OrderStatus| {
            handle.set_order_outcome(status);
            let (reply_to, rx) = ReplyTo::channel();
            worker
                .send(Command::SubmitOrder {
                    request: OrderRequest::market(tracker(), Direction::Short, 1.0),
                    reply_to,
                })
                .unwrap();
            rx.recv_timeout(Duration::from_secs(2)).unwrap()
        };

        assert_eq!(submit(OrderStatus::Filled).unwrap(), "Order Filled: SELL 1 2800");
        assert_eq!(submit(OrderStatus::Submitted).unwrap(), "Order submitted: SELL 1 2800");
        assert_eq!(
            submit(OrderStatus::PreSubmitted).unwrap(),
            "Order status: PreSubmitted - SELL 1 2800"
        );
        let err = submit(OrderStatus::Cancelled { reason: None }).unwrap_err();
        assert_eq!(err.to_string(), "Order cancelled: Unknown reason");
        worker.stop_and_join();
    }

    #[test]
    fn test_dropped_session_terminates_worker() {
        let (worker, handle, _shared) = start();
        handle.drop_connection();
        assert!(wait_for(&worker, WorkerState::Terminated));

        let (reply_to, _rx) = ReplyTo::<bool>::channel();
        let sent = worker.send(Command::CheckPosition {
            direction: Direction::Long,
            instrument: tracker(),
            minimum: 1.0,
            reply_to,
        });
        assert!(matches!(sent, Err(BridgeError::WorkerStopped)));
    }

    #[test]
    fn test_stale_reply_is_discarded() {
        let (worker, handle, shared) = start();
        handle.set_positions_delay(Duration::from_millis(100));

        let (reply_to, rx) = ReplyTo::channel();
        worker
            .send(Command::CheckPosition {
                direction: Direction::Long,
                instrument: tracker(),
                minimum: 1.0,
                reply_to,
            })
            .unwrap();
        drop(rx);

        for _ in 0..100 {
            if shared.stats.snapshot().discarded_replies == 1 {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(shared.stats.snapshot().discarded_replies, 1);
        worker.stop_and_join();
    }
}
