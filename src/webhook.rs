//! HTTP webhook front end.
//!
//! - `POST /webhook` - `{"direction": "long" | "short"}` trade signal
//! - `GET /test` - liveness text
//! - `POST /test` - echoes the request body
//! - `GET /health` - session state as JSON
//!
//! Bridge calls block, so signal handling runs on `spawn_blocking`.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::Value;

use crate::{
    Bridge, BridgeConfig, BridgeError, Direction, LifecycleManager, SessionFactory, SessionState,
    SignalOutcome, VenueSession,
};

/// Where the HTTP layer gets its trading session from
pub trait SessionSource: Send + Sync + 'static {
    /// Bridge to use for a signal, if any
    fn session(&self) -> Option<Arc<Bridge>>;

    /// Session state for health reporting. Must not trigger initialization
    fn state(&self) -> SessionState;

    /// Response when no healthy session is available
    fn not_ready(&self) -> (StatusCode, String);
}

impl<F: SessionFactory> SessionSource for LifecycleManager<F> {
    fn session(&self) -> Option<Arc<Bridge>> {
        self.get_session()
    }

    fn state(&self) -> SessionState {
        LifecycleManager::state(self)
    }

    fn not_ready(&self) -> (StatusCode, String) {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "Error: trading session not ready, retry later".into(),
        )
    }
}

/// Session created once at startup and never replaced
pub struct StaticSession {
    bridge: Option<Arc<Bridge>>,
}

impl StaticSession {
    pub fn new(bridge: Option<Bridge>) -> Self {
        Self {
            bridge: bridge.map(Arc::new),
        }
    }

    /// Connect and resolve the configured instrument once.
    ///
    /// Failures are logged; the webhook then answers 500 for every signal.
    pub fn connect<V: VenueSession>(venue: V, config: &BridgeConfig) -> Self {
        let bridge = match Bridge::start_default(venue, config) {
            Ok(bridge) => bridge,
            Err(e) => {
                tracing::error!(error = %e, "Failed to start trading session");
                return Self::new(None);
            }
        };
        if let Err(e) = bridge.resolve_configured() {
            tracing::error!(error = %e, "Trading session has no instrument");
        }
        Self::new(Some(bridge))
    }

    pub fn bridge(&self) -> Option<&Arc<Bridge>> {
        self.bridge.as_ref()
    }
}

impl SessionSource for StaticSession {
    fn session(&self) -> Option<Arc<Bridge>> {
        self.bridge.clone()
    }

    fn state(&self) -> SessionState {
        match &self.bridge {
            None => SessionState::Absent,
            Some(bridge) if bridge.is_healthy() => SessionState::Ready,
            Some(_) => SessionState::Degraded,
        }
    }

    fn not_ready(&self) -> (StatusCode, String) {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Error: Bot contract not initialized".into(),
        )
    }
}

/// Build the router
pub fn router<S: SessionSource>(source: Arc<S>) -> Router {
    Router::new()
        .route("/webhook", post(webhook::<S>))
        .route("/test", get(test_get).post(test_post))
        .route("/health", get(health::<S>))
        .with_state(source)
}

async fn webhook<S: SessionSource>(State(source): State<Arc<S>>, body: Bytes) -> impl IntoResponse {
    handle_webhook(source, &body).await
}

async fn test_get() -> &'static str {
    "Webhook server is running! Use POST to /webhook with JSON data."
}

async fn test_post(body: Bytes) -> String {
    format!("Test POST received. Data: {}", String::from_utf8_lossy(&body))
}

async fn health<S: SessionSource>(State(source): State<Arc<S>>) -> impl IntoResponse {
    let state = source.state();
    let status = match state {
        SessionState::Ready => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(serde_json::json!({ "session": state })))
}

fn bad_request(message: impl Into<String>) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, message.into())
}

/// Extract and validate the direction of a signal body
pub fn parse_signal(body: &[u8]) -> Result<Direction, (StatusCode, String)> {
    let no_json = || bad_request("Error: No JSON data received or invalid JSON format");

    let message: Value = serde_json::from_slice(body).map_err(|_| no_json())?;
    let fields = match message.as_object() {
        Some(fields) if !fields.is_empty() => fields,
        _ => return Err(no_json()),
    };

    let raw = match fields.get("direction") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) if n.as_f64() == Some(0.0) => String::new(),
        Some(Value::Array(items)) if items.is_empty() => String::new(),
        Some(Value::Object(map)) if map.is_empty() => String::new(),
        Some(other) => other.to_string(),
    };
    if raw.is_empty() {
        return Err(bad_request("Error: 'direction' field is required"));
    }

    raw.parse().map_err(|_| {
        tracing::warn!(direction = %raw, "Invalid direction value");
        bad_request(format!(
            "Error: Invalid direction '{raw}'. Must be 'long' or 'short'"
        ))
    })
}

enum Dispatch {
    NotReady,
    Done(Result<SignalOutcome, BridgeError>),
}

/// Handle one webhook body against a session source
pub async fn handle_webhook<S: SessionSource>(source: Arc<S>, body: &[u8]) -> (StatusCode, String) {
    tracing::debug!(raw = %String::from_utf8_lossy(body), "Webhook received");

    let direction = match parse_signal(body) {
        Ok(direction) => direction,
        Err(response) => return response,
    };

    let worker_source = Arc::clone(&source);
    let dispatched = tokio::task::spawn_blocking(move || match worker_source.session() {
        Some(bridge) if bridge.is_healthy() => Dispatch::Done(bridge.execute_signal(direction)),
        _ => Dispatch::NotReady,
    })
    .await;

    let response = match dispatched {
        Ok(Dispatch::NotReady) => {
            tracing::warn!(direction = %direction, "Signal received while session not ready");
            source.not_ready()
        }
        Ok(Dispatch::Done(Ok(SignalOutcome::Submitted(status)))) => {
            (StatusCode::OK, format!("Webhook received: {status}"))
        }
        Ok(Dispatch::Done(Ok(SignalOutcome::AlreadyHeld(direction)))) => (
            StatusCode::OK,
            format!("Webhook received: {direction} position already exists, skipping order"),
        ),
        Ok(Dispatch::Done(Err(e))) => bad_request(format!("Error processing webhook: {e}")),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error processing webhook: {e}"),
        ),
    };

    tracing::info!(status = response.0.as_u16(), message = %response.1, "Webhook handled");
    response
}
