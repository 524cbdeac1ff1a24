//! Configuration for the bridge.
//!
//! Loaded from a TOML file where every field has a default, then patched by
//! environment overrides and checked with [`BridgeConfig::validate`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ContractSpec, VenueEndpoint};

/// Configuration loading or validation failure
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(Box<str>),
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub venue: VenueConfig,
    pub instrument: InstrumentConfig,
    pub trading: TradingConfig,
    pub timeouts: TimeoutConfig,
    pub lifecycle: LifecycleConfig,
    pub server: ServerConfig,
    /// Tracing filter directive
    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            venue: VenueConfig::default(),
            instrument: InstrumentConfig::default(),
            trading: TradingConfig::default(),
            timeouts: TimeoutConfig::default(),
            lifecycle: LifecycleConfig::default(),
            server: ServerConfig::default(),
            log_level: "info".into(),
        }
    }
}

/// Venue connection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VenueConfig {
    pub host: String,
    pub port: u16,
    pub client_id: i32,
    /// How long the worker may take to reach the serving state
    pub connect_timeout_secs: u64,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 4002,
            client_id: 130,
            connect_timeout_secs: 10,
        }
    }
}

/// Fallback candidate template.
///
/// Missing fields inherit from the resolution request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateTemplate {
    /// Exchange to qualify on; `None` uses the requested market
    #[serde(default)]
    pub exchange: Option<String>,
    /// Appended to the symbol, e.g. `.HK`
    #[serde(default)]
    pub symbol_suffix: String,
    /// Currency override
    #[serde(default)]
    pub currency: Option<String>,
}

impl CandidateTemplate {
    pub fn on(exchange: &str) -> Self {
        Self {
            exchange: Some(exchange.into()),
            symbol_suffix: String::new(),
            currency: None,
        }
    }

    pub fn with_suffix(mut self, suffix: &str) -> Self {
        self.symbol_suffix = suffix.into();
        self
    }

    /// Concrete contract spec for a request
    pub fn build(&self, symbol: &str, market: &str, kind: &str, currency: &str) -> ContractSpec {
        ContractSpec::new(
            format!("{symbol}{}", self.symbol_suffix),
            self.exchange.as_deref().unwrap_or(market),
            kind,
            self.currency.as_deref().unwrap_or(currency),
        )
    }
}

/// Target instrument and the resolution policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    pub market: String,
    pub symbol: String,
    pub security_type: String,
    pub currency: String,
    /// Ordered fallback list; empty means "the requested market only"
    pub candidates: Vec<CandidateTemplate>,
    /// Contract qualified by the permission test
    pub permission_probe: ContractSpec,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            market: "SMART".into(),
            symbol: "2800".into(),
            security_type: "STK".into(),
            currency: "HKD".into(),
            candidates: vec![
                CandidateTemplate::on("SEHK"),
                CandidateTemplate::on("SMART"),
                CandidateTemplate::on("SMART").with_suffix(".HK"),
            ],
            permission_probe: ContractSpec::new("0005", "SEHK", "STK", "HKD"),
        }
    }
}

impl InstrumentConfig {
    /// Ordered candidate specs for a resolution request
    pub fn candidates_for(&self, market: &str, kind: &str, symbol: &str) -> Vec<ContractSpec> {
        if self.candidates.is_empty() {
            return vec![ContractSpec::new(symbol, market, kind, self.currency.as_str())];
        }
        self.candidates
            .iter()
            .map(|t| t.build(symbol, market, kind, &self.currency))
            .collect()
    }
}

/// Order sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Order quantity, and the position size that counts as "already held"
    pub min_order_size: f64,
    /// Wait after placement before reading the order status
    pub order_settle_ms: u64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            min_order_size: 1.0,
            order_settle_ms: 2000,
        }
    }
}

/// Per-operation deadlines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub resolve_secs: u64,
    pub permissions_secs: u64,
    pub position_check_secs: u64,
    pub order_submit_secs: u64,
    /// Worker wait between commands
    pub poll_interval_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            resolve_secs: 10,
            permissions_secs: 10,
            position_check_secs: 10,
            order_submit_secs: 30,
            poll_interval_ms: 100,
        }
    }
}

/// Reconnection throttling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Minimum time between two initialization attempts
    pub retry_interval_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            retry_interval_secs: 30,
        }
    }
}

/// HTTP listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8001".into(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Unparseable values are ignored
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("VENUE_HOST") {
            self.venue.host = host;
        }
        if let Some(port) = lookup("VENUE_PORT").and_then(|v| v.parse().ok()) {
            self.venue.port = port;
        }
        if let Some(id) = lookup("VENUE_CLIENT_ID").and_then(|v| v.parse().ok()) {
            self.venue.client_id = id;
        }
        if let Some(level) = lookup("BRIDGE_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(bind) = lookup("BRIDGE_BIND") {
            self.server.bind = bind;
        }
    }

    /// Reject configurations the bridge cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.into()));

        if self.venue.host.trim().is_empty() {
            return invalid("venue.host must not be empty");
        }
        if self.venue.connect_timeout_secs == 0 {
            return invalid("venue.connect_timeout_secs must be > 0");
        }
        if self.instrument.symbol.trim().is_empty() {
            return invalid("instrument.symbol must not be empty");
        }
        if self.instrument.market.trim().is_empty() {
            return invalid("instrument.market must not be empty");
        }
        if !self.trading.min_order_size.is_finite() || self.trading.min_order_size <= 0.0 {
            return invalid("trading.min_order_size must be > 0");
        }
        let t = &self.timeouts;
        if t.resolve_secs == 0
            || t.permissions_secs == 0
            || t.position_check_secs == 0
            || t.order_submit_secs == 0
        {
            return invalid("timeouts must be > 0");
        }
        if t.poll_interval_ms == 0 {
            return invalid("timeouts.poll_interval_ms must be > 0");
        }
        Ok(())
    }

    pub fn endpoint(&self) -> VenueEndpoint {
        VenueEndpoint {
            host: self.venue.host.clone(),
            port: self.venue.port,
            client_id: self.venue.client_id,
        }
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.lifecycle.retry_interval_secs)
    }
}

impl TimeoutConfig {
    pub fn resolve(&self) -> Duration {
        Duration::from_secs(self.resolve_secs)
    }

    pub fn permissions(&self) -> Duration {
        Duration::from_secs(self.permissions_secs)
    }

    pub fn position_check(&self) -> Duration {
        Duration::from_secs(self.position_check_secs)
    }

    pub fn order_submit(&self) -> Duration {
        Duration::from_secs(self.order_submit_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.venue.port, 4002);
        assert_eq!(config.timeouts.order_submit(), Duration::from_secs(30));
        assert_eq!(config.timeouts.position_check(), Duration::from_secs(10));
        assert_eq!(config.instrument.candidates.len(), 3);
    }

    #[test]
    fn test_default_candidates_order() {
        let config = InstrumentConfig::default();
        let specs = config.candidates_for("SMART", "STK", "2800");
        let labels: Vec<_> = specs.iter().map(|s| s.label()).collect();
        assert_eq!(labels, vec!["2800@SEHK", "2800@SMART", "2800.HK@SMART"]);
        assert!(specs.iter().all(|s| s.currency == "HKD" && s.security_type == "STK"));
    }

    #[test]
    fn test_empty_candidates_uses_requested_market() {
        let config = InstrumentConfig {
            candidates: Vec::new(),
            currency: "USD".into(),
            ..InstrumentConfig::default()
        };
        let specs = config.candidates_for("NASDAQ", "STK", "AAPL");
        assert_eq!(specs, vec![ContractSpec::new("AAPL", "NASDAQ", "STK", "USD")]);
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            log_level = "debug"

            [venue]
            host = "10.0.0.5"
            port = 7497

            [instrument]
            market = "NASDAQ"
            symbol = "AAPL"
            currency = "USD"

            [[instrument.candidates]]
            exchange = "NASDAQ"

            [[instrument.candidates]]
            symbol_suffix = ".US"

            [timeouts]
            order_submit_secs = 45
        "#;

        let config = BridgeConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.venue.host, "10.0.0.5");
        assert_eq!(config.venue.port, 7497);
        // Unset fields keep their defaults
        assert_eq!(config.venue.client_id, 130);
        assert_eq!(config.timeouts.order_submit_secs, 45);
        assert_eq!(config.timeouts.position_check_secs, 10);

        let specs = config.instrument.candidates_for("NASDAQ", "STK", "AAPL");
        assert_eq!(specs[0].label(), "AAPL@NASDAQ");
        assert_eq!(specs[1].label(), "AAPL.US@NASDAQ");
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config = BridgeConfig::from_toml_str(include_str!("../config/bridge.toml")).unwrap();
        assert_eq!(config, BridgeConfig::default());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bridge.toml");
        std::fs::write(&path, "[trading]\nmin_order_size = 100.0\n").unwrap();

        let config = BridgeConfig::from_file(&path).unwrap();
        assert_eq!(config.trading.min_order_size, 100.0);

        let missing = BridgeConfig::from_file(dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("VENUE_HOST", "gateway"),
            ("VENUE_PORT", "not-a-port"),
            ("VENUE_CLIENT_ID", "7"),
            ("BRIDGE_BIND", "127.0.0.1:9000"),
        ]
        .into_iter()
        .collect();

        let mut config = BridgeConfig::default();
        config.apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.venue.host, "gateway");
        assert_eq!(config.venue.port, 4002);
        assert_eq!(config.venue.client_id, 7);
        assert_eq!(config.server.bind, "127.0.0.1:9000");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = BridgeConfig::default();
        config.trading.min_order_size = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = BridgeConfig::default();
        config.timeouts.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = BridgeConfig::default();
        config.instrument.symbol = "  ".into();
        assert!(config.validate().is_err());
    }
}
