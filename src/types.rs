//! Instrument, position and order identity types

use serde::{Deserialize, Serialize};

use crate::BridgeError;

/// Trade direction carried by an inbound signal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Open or hold a long position
    Long,
    /// Open or hold a short position
    Short,
}

impl Direction {
    /// Venue action that opens a position in this direction
    pub fn action(self) -> Action {
        match self {
            Direction::Long => Action::Buy,
            Direction::Short => Action::Sell,
        }
    }

    /// Lowercase wire name
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }

    /// Whether a signed position quantity satisfies this direction at `minimum` size
    pub fn is_held_by(self, quantity: f64, minimum: f64) -> bool {
        match self {
            Direction::Long => quantity >= minimum,
            Direction::Short => quantity <= -minimum,
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "long" => Ok(Direction::Long),
            "short" => Ok(Direction::Short),
            other => Err(BridgeError::validation(format!(
                "Invalid direction: {other}. Must be 'long' or 'short'"
            ))),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order side as understood by the venue
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Buy => f.write_str("BUY"),
            Action::Sell => f.write_str("SELL"),
        }
    }
}

/// Unresolved contract description handed to the venue for qualification
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractSpec {
    pub symbol: String,
    pub exchange: String,
    pub security_type: String,
    pub currency: String,
}

impl ContractSpec {
    /// Create a contract spec
    pub fn new(
        symbol: impl Into<String>,
        exchange: impl Into<String>,
        security_type: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: exchange.into(),
            security_type: security_type.into(),
            currency: currency.into(),
        }
    }

    /// Short label used in logs and aggregated errors
    pub fn label(&self) -> String {
        format!("{}@{}", self.symbol, self.exchange)
    }
}

/// Resolved, unambiguous identity of a tradeable contract
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    /// Venue-assigned contract id
    pub contract_id: i64,
    pub symbol: String,
    pub exchange: String,
    pub security_type: String,
    pub currency: String,
    /// Listing exchange when the contract is smart-routed
    #[serde(default)]
    pub primary_exchange: Option<String>,
}

impl Instrument {
    /// Exact match on (symbol, exchange, security type)
    pub fn same_contract(&self, other: &Instrument) -> bool {
        self.symbol == other.symbol
            && self.exchange == other.exchange
            && self.security_type == other.security_type
    }
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} on {} ({}, conId {})",
            self.security_type, self.symbol, self.exchange, self.currency, self.contract_id
        )
    }
}

/// Venue-reported holding
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: Instrument,
    /// Signed quantity: positive long, negative short
    pub quantity: f64,
    pub average_cost: f64,
}

/// Order type sent to the venue
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
}

/// Time in force sent to the venue
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good till cancelled
    Gtc,
    Day,
}

/// Order handed to the venue
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub instrument: Instrument,
    pub action: Action,
    pub quantity: f64,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub outside_regular_hours: bool,
}

impl OrderRequest {
    /// Market order, good till cancelled, allowed outside regular hours
    pub fn market(instrument: Instrument, direction: Direction, quantity: f64) -> Self {
        Self {
            instrument,
            action: direction.action(),
            quantity,
            order_type: OrderType::Market,
            time_in_force: TimeInForce::Gtc,
            outside_regular_hours: true,
        }
    }

    /// Reject quantities the venue must never see
    pub fn validate(&self) -> Result<(), BridgeError> {
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(BridgeError::validation(format!(
                "Quantity must be positive, got {}",
                self.quantity
            )));
        }
        Ok(())
    }

    /// `BUY 1 2800` style summary
    pub fn summary(&self) -> String {
        format!("{} {} {}", self.action, self.quantity, self.instrument.symbol)
    }
}

/// Venue order identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub i64);

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order lifecycle status reported by the venue
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    PendingSubmit,
    PreSubmitted,
    Submitted,
    PartiallyFilled,
    Filled,
    /// Cancelled, with the venue's last log message if any
    Cancelled { reason: Option<String> },
    Inactive,
    Other(String),
}

impl OrderStatus {
    /// Venue status name
    pub fn name(&self) -> &str {
        match self {
            OrderStatus::PendingSubmit => "PendingSubmit",
            OrderStatus::PreSubmitted => "PreSubmitted",
            OrderStatus::Submitted => "Submitted",
            OrderStatus::PartiallyFilled => "PartiallyFilled",
            OrderStatus::Filled => "Filled",
            OrderStatus::Cancelled { .. } => "Cancelled",
            OrderStatus::Inactive => "Inactive",
            OrderStatus::Other(name) => name,
        }
    }
}
