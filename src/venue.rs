//! Venue session seam
//!
//! The broker client is consumed as an opaque service. Implementations are
//! not required to be `Sync`: the session worker is their only caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{ContractSpec, Instrument, OrderId, OrderRequest, OrderStatus, Position, VenueError};

/// Where and as whom to connect
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueEndpoint {
    pub host: String,
    pub port: u16,
    pub client_id: i32,
}

impl std::fmt::Display for VenueEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} (client {})", self.host, self.port, self.client_id)
    }
}

/// Client to the trading venue.
///
/// # Example
///
/// ```rust,ignore
/// #[async_trait]
/// impl VenueSession for GatewayClient {
///     async fn connect(&mut self, endpoint: &VenueEndpoint) -> Result<(), VenueError> {
///         self.socket = Some(open_socket(&endpoint.host, endpoint.port).await?);
///         Ok(())
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait VenueSession: Send + 'static {
    /// Venue name for logs
    fn name(&self) -> &str;

    /// Open the session
    async fn connect(&mut self, endpoint: &VenueEndpoint) -> Result<(), VenueError>;

    /// Whether the session is still usable
    fn is_connected(&self) -> bool;

    /// Qualify a contract spec.
    ///
    /// An empty result means the venue knows no matching contract.
    async fn qualify(&mut self, spec: &ContractSpec) -> Result<Vec<Instrument>, VenueError>;

    /// All current positions of the account
    async fn positions(&mut self) -> Result<Vec<Position>, VenueError>;

    /// Send an order
    async fn place_order(&mut self, request: &OrderRequest) -> Result<OrderId, VenueError>;

    /// Latest known status of a placed order
    async fn order_status(&mut self, order_id: OrderId) -> Result<OrderStatus, VenueError>;

    /// Close the session. Default: nothing to release
    async fn disconnect(&mut self) {}
}

/// Produces fresh, unconnected venue sessions for each initialization attempt
pub trait SessionFactory: Send + Sync + 'static {
    /// Session type produced
    type Session: VenueSession;

    /// Create a new session
    fn create(&self) -> Self::Session;
}

impl<F, S> SessionFactory for F
where
    F: Fn() -> S + Send + Sync + 'static,
    S: VenueSession,
{
    type Session = S;

    fn create(&self) -> S {
        self()
    }
}
