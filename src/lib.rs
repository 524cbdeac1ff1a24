//! Synchronous-to-exclusive venue session bridge
//!
//! Many short-lived callers (webhook handlers) submit operations to one
//! long-running worker that owns the trading venue session. A lifecycle
//! manager keeps that worker alive, retried and singly instantiated.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! // 1. Describe how to create a venue session
//! let factory = || GatewayClient::new();
//!
//! // 2. Build the manager; nothing connects yet
//! let manager = Arc::new(LifecycleManager::new(factory, BridgeConfig::default()));
//!
//! // 3. Ask for a session; the first call starts initialization in the background
//! if let Some(bridge) = manager.get_session().filter(|b| b.is_healthy()) {
//!     bridge.execute_signal(Direction::Long)?;
//! }
//!
//! // 4. Or serve it over HTTP
//! axum::serve(listener, webhook::router(manager)).await?;
//! ```

// === Core Types ===
mod command;
mod errors;
mod types;

// === Venue ===
mod paper;
mod resolver;
mod venue;

// === Session ===
mod bridge;
mod manager;
mod worker;

// === Storage ===
mod journal;

// === Observability ===
mod observer;
mod stats;

// === Configuration ===
mod config;

// === Surfaces ===
pub mod telemetry;
pub mod webhook;

// === Re-exports ===

// Types
pub use types::{
    Action, ContractSpec, Direction, Instrument, OrderId, OrderRequest, OrderStatus, OrderType,
    Position, TimeInForce,
};

// Commands
pub use command::{Command, CommandResult, ReplyTo};

// Errors
pub use errors::{BridgeError, CandidateFailure, ErrorKind, VenueError};

// Venue
pub use paper::{PaperVenue, PaperVenueHandle};
pub use resolver::resolve_first;
pub use venue::{SessionFactory, VenueEndpoint, VenueSession};

// Session
pub use bridge::{Bridge, SignalOutcome};
pub use manager::{LifecycleManager, SessionState};
pub use worker::WorkerState;

// Storage
pub use journal::{
    now_millis, InMemoryOrderJournal, JournalEntry, JournalError, OrderJournal, OrderOutcome,
};

// Observability
pub use observer::{NoOpObserver, SessionObserver, TracingObserver};
pub use stats::{BridgeStats, BridgeStatsSnapshot, ManagerStats, ManagerStatsSnapshot};

// Configuration
pub use config::{
    BridgeConfig, CandidateTemplate, ConfigError, InstrumentConfig, LifecycleConfig, ServerConfig,
    TimeoutConfig, TradingConfig, VenueConfig,
};
