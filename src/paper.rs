//! Simulated venue.
//!
//! `PaperVenue` implements [`VenueSession`] against in-memory state. The state
//! is shared with a [`PaperVenueHandle`] so a test or an operator can script
//! listings, positions and order outcomes while the worker owns the session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::{
    Action, ContractSpec, Instrument, OrderId, OrderRequest, OrderStatus, Position, VenueEndpoint,
    VenueError, VenueSession,
};

#[derive(Default)]
struct PaperState {
    listings: Vec<Instrument>,
    positions: Vec<Position>,
    orders: HashMap<i64, OrderStatus>,
    placed: Vec<OrderRequest>,
    calls: Vec<String>,
    next_order_id: i64,
    sessions: u64,
    active_session: Option<u64>,
    connects: usize,
    connect_failure: Option<String>,
    connect_delay: Duration,
    positions_failure: Option<String>,
    positions_delay: Duration,
    order_rejection: Option<String>,
    order_outcome: Option<OrderStatus>,
}

impl PaperState {
    fn apply_fill(&mut self, request: &OrderRequest) {
        let signed = match request.action {
            Action::Buy => request.quantity,
            Action::Sell => -request.quantity,
        };
        match self
            .positions
            .iter_mut()
            .find(|p| p.instrument.same_contract(&request.instrument))
        {
            Some(position) => position.quantity += signed,
            None => self.positions.push(Position {
                instrument: request.instrument.clone(),
                quantity: signed,
                average_cost: 0.0,
            }),
        }
    }
}

fn lock(state: &Mutex<PaperState>) -> std::sync::MutexGuard<'_, PaperState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripting and inspection side of a [`PaperVenue`]
#[derive(Clone, Default)]
pub struct PaperVenueHandle {
    state: Arc<Mutex<PaperState>>,
}

impl PaperVenueHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// New session sharing this handle's state
    pub fn venue(&self) -> PaperVenue {
        let id = {
            let mut state = lock(&self.state);
            state.sessions += 1;
            state.sessions
        };
        PaperVenue {
            state: Arc::clone(&self.state),
            id,
        }
    }

    /// Make a contract qualifiable
    pub fn list(&self, instrument: Instrument) {
        lock(&self.state).listings.push(instrument);
    }

    /// Set the signed position for an instrument, replacing any existing one
    pub fn set_position(&self, instrument: Instrument, quantity: f64) {
        let mut state = lock(&self.state);
        state.positions.retain(|p| !p.instrument.same_contract(&instrument));
        state.positions.push(Position {
            instrument,
            quantity,
            average_cost: 0.0,
        });
    }

    /// Append a position without replacing existing lots of the same contract
    pub fn add_position(&self, instrument: Instrument, quantity: f64) {
        lock(&self.state).positions.push(Position {
            instrument,
            quantity,
            average_cost: 0.0,
        });
    }

    pub fn clear_positions(&self) {
        lock(&self.state).positions.clear();
    }

    /// Fail every subsequent connect with a transport error
    pub fn fail_connect(&self, reason: &str) {
        lock(&self.state).connect_failure = Some(reason.into());
    }

    pub fn allow_connect(&self) {
        lock(&self.state).connect_failure = None;
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        lock(&self.state).connect_delay = delay;
    }

    /// Fail position queries, or restore them with `None`
    pub fn fail_positions(&self, reason: Option<&str>) {
        lock(&self.state).positions_failure = reason.map(Into::into);
    }

    pub fn set_positions_delay(&self, delay: Duration) {
        lock(&self.state).positions_delay = delay;
    }

    /// Refuse every subsequent order at placement
    pub fn reject_orders(&self, reason: &str) {
        lock(&self.state).order_rejection = Some(reason.into());
    }

    /// Status reported for orders placed from now on. Default: `Filled`
    pub fn set_order_outcome(&self, status: OrderStatus) {
        lock(&self.state).order_outcome = Some(status);
    }

    /// Simulate the venue closing the session
    pub fn drop_connection(&self) {
        lock(&self.state).active_session = None;
    }

    /// Whether any session is currently connected
    pub fn is_connected(&self) -> bool {
        lock(&self.state).active_session.is_some()
    }

    /// Number of connect attempts seen so far
    pub fn connect_count(&self) -> usize {
        lock(&self.state).connects
    }

    pub fn placed_orders(&self) -> Vec<OrderRequest> {
        lock(&self.state).placed.clone()
    }

    /// Venue operations in call order, e.g. `qualify 2800@SEHK`
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    pub fn positions(&self) -> Vec<Position> {
        lock(&self.state).positions.clone()
    }
}

/// Simulated venue session
pub struct PaperVenue {
    state: Arc<Mutex<PaperState>>,
    id: u64,
}

impl PaperVenue {
    /// Session plus the handle that scripts it
    pub fn new() -> (Self, PaperVenueHandle) {
        let handle = PaperVenueHandle::new();
        (handle.venue(), handle)
    }

    fn with<R>(&self, f: impl FnOnce(&mut PaperState) -> R) -> R {
        f(&mut lock(&self.state))
    }

    fn ensure_connected(&self, op: &str) -> Result<(), VenueError> {
        let id = self.id;
        self.with(|s| {
            s.calls.push(op.to_string());
            if s.active_session == Some(id) {
                Ok(())
            } else {
                Err(VenueError::Disconnected("paper session closed".into()))
            }
        })
    }
}

#[async_trait]
impl VenueSession for PaperVenue {
    fn name(&self) -> &str {
        "paper"
    }

    async fn connect(&mut self, endpoint: &VenueEndpoint) -> Result<(), VenueError> {
        let delay = self.with(|s| {
            s.connects += 1;
            s.calls.push(format!("connect {endpoint}"));
            s.connect_delay
        });
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let id = self.id;
        self.with(|s| match &s.connect_failure {
            Some(reason) => Err(VenueError::Transport(reason.as_str().into())),
            None => {
                s.active_session = Some(id);
                Ok(())
            }
        })
    }

    fn is_connected(&self) -> bool {
        let id = self.id;
        self.with(|s| s.active_session == Some(id))
    }

    async fn qualify(&mut self, spec: &ContractSpec) -> Result<Vec<Instrument>, VenueError> {
        self.ensure_connected(&format!("qualify {}", spec.label()))?;
        Ok(self.with(|s| {
            s.listings
                .iter()
                .filter(|i| {
                    i.symbol == spec.symbol
                        && i.exchange == spec.exchange
                        && i.security_type == spec.security_type
                        && i.currency == spec.currency
                })
                .cloned()
                .collect()
        }))
    }

    async fn positions(&mut self) -> Result<Vec<Position>, VenueError> {
        self.ensure_connected("positions")?;
        let delay = self.with(|s| s.positions_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.with(|s| match &s.positions_failure {
            Some(reason) => Err(VenueError::Rejected(reason.as_str().into())),
            None => Ok(s.positions.clone()),
        })
    }

    async fn place_order(&mut self, request: &OrderRequest) -> Result<OrderId, VenueError> {
        self.ensure_connected(&format!("place_order {}", request.summary()))?;
        self.with(|s| {
            if let Some(reason) = &s.order_rejection {
                return Err(VenueError::Rejected(reason.as_str().into()));
            }
            s.next_order_id += 1;
            let id = s.next_order_id;
            let status = s.order_outcome.clone().unwrap_or(OrderStatus::Filled);
            if status == OrderStatus::Filled {
                s.apply_fill(request);
            }
            s.orders.insert(id, status);
            s.placed.push(request.clone());
            Ok(OrderId(id))
        })
    }

    async fn order_status(&mut self, order_id: OrderId) -> Result<OrderStatus, VenueError> {
        self.ensure_connected(&format!("order_status {order_id}"))?;
        self.with(|s| {
            s.orders
                .get(&order_id.0)
                .cloned()
                .ok_or_else(|| VenueError::NotFound(format!("order {order_id}").into()))
        })
    }

    async fn disconnect(&mut self) {
        let id = self.id;
        self.with(|s| {
            if s.active_session == Some(id) {
                s.active_session = None;
            }
            s.calls.push("disconnect".to_string());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Direction;

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

    fn endpoint() -> VenueEndpoint {
        VenueEndpoint {
            host: "127.0.0.1".into(),
            port: 4002,
            client_id: 130,
        }
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let (mut venue, handle) = PaperVenue::new();
        let spec = ContractSpec::new("2800", "SEHK", "STK", "HKD");
        assert!(matches!(
            venue.qualify(&spec).await,
            Err(VenueError::Disconnected(_))
        ));

        venue.connect(&endpoint()).await.unwrap();
        assert!(venue.qualify(&spec).await.unwrap().is_empty());

        handle.list(tracker());
        assert_eq!(venue.qualify(&spec).await.unwrap(), vec![tracker()]);
    }

    #[tokio::test]
    async fn test_filled_order_updates_position() {
        let (mut venue, handle) = PaperVenue::new();
        venue.connect(&endpoint()).await.unwrap();

        let id = venue
            .place_order(&OrderRequest::market(tracker(), Direction::Short, 3.0))
            .await
            .unwrap();
        assert_eq!(venue.order_status(id).await.unwrap(), OrderStatus::Filled);
        assert_eq!(handle.positions()[0].quantity, -3.0);
    }

    #[tokio::test]
    async fn test_connect_failure_and_drop() {
        let (mut venue, handle) = PaperVenue::new();
        handle.fail_connect("gateway down");
        assert!(matches!(
            venue.connect(&endpoint()).await,
            Err(VenueError::Transport(_))
        ));

        handle.allow_connect();
        venue.connect(&endpoint()).await.unwrap();
        assert!(venue.is_connected());
        handle.drop_connection();
        assert!(!venue.is_connected());
        assert_eq!(handle.connect_count(), 2);
    }
}
