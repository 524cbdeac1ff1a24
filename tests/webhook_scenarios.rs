use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use venue_bridge::webhook::{handle_webhook, SessionSource, StaticSession};
use venue_bridge::{
    Action, BridgeConfig, Instrument, LifecycleManager, PaperVenue, PaperVenueHandle,
    SessionFactory, SessionState,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("venue_bridge=debug")
        .try_init();
}

fn config() -> BridgeConfig {
    let mut config = BridgeConfig::default();
    config.trading.order_settle_ms = 0;
    config.timeouts.poll_interval_ms = 10;
    config.venue.connect_timeout_secs = 2;
    config.lifecycle.retry_interval_secs = 0;
    config
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

fn listed_venue() -> PaperVenueHandle {
    let handle = PaperVenueHandle::new();
    handle.list(tracker());
    handle
}

fn manager_for(
    handle: &PaperVenueHandle,
) -> Arc<LifecycleManager<impl SessionFactory<Session = PaperVenue>>> {
    let venue_handle = handle.clone();
    Arc::new(LifecycleManager::new(move || venue_handle.venue(), config()))
}

async fn wait_for_state<F: SessionFactory>(manager: &LifecycleManager<F>, want: SessionState) {
    for _ in 0..300 {
        if manager.state() == want {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("manager never reached {want:?}, stuck in {:?}", manager.state());
}

async fn ready_manager(
    handle: &PaperVenueHandle,
) -> Arc<LifecycleManager<impl SessionFactory<Session = PaperVenue>>> {
    let manager = manager_for(handle);
    manager.get_session();
    wait_for_state(&manager, SessionState::Ready).await;
    manager
}

#[tokio::test]
async fn long_signal_without_position_places_buy() {
    init_tracing();
    let handle = listed_venue();
    let manager = ready_manager(&handle).await;

    let (status, message) =
        handle_webhook(Arc::clone(&manager), br#"{"direction": "long"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert!(
        message.contains("submitted") || message.contains("Filled"),
        "unexpected response: {message}"
    );
    let orders = handle.placed_orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].action, Action::Buy);
    assert_eq!(orders[0].quantity, manager.config().trading.min_order_size);
    assert_eq!(orders[0].instrument, tracker());
    manager.shutdown();
}

#[tokio::test]
async fn short_signal_with_existing_short_is_skipped() {
    init_tracing();
    let handle = listed_venue();
    handle.set_position(tracker(), -3.0);
    let manager = ready_manager(&handle).await;

    let (status, message) =
        handle_webhook(Arc::clone(&manager), br#"{"direction": "short"}"#).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        message,
        "Webhook received: short position already exists, skipping order"
    );
    assert!(handle.placed_orders().is_empty());
    manager.shutdown();
}

#[tokio::test]
async fn signal_before_initialization_is_503_and_schedules_init() {
    init_tracing();
    let handle = listed_venue();
    handle.set_connect_delay(Duration::from_millis(200));
    let manager = manager_for(&handle);
    assert_eq!(manager.state(), SessionState::Absent);

    let (status, message) =
        handle_webhook(Arc::clone(&manager), br#"{"direction": "long"}"#).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(message, "Error: trading session not ready, retry later");
    assert_eq!(manager.state(), SessionState::Initializing);

    wait_for_state(&manager, SessionState::Ready).await;
    assert!(handle.placed_orders().is_empty());
    assert_eq!(manager.stats().initializations_started, 1);
    manager.shutdown();
}

#[tokio::test]
async fn static_variant_without_session_is_500() {
    init_tracing();
    let source = Arc::new(StaticSession::new(None));

    let (status, message) = handle_webhook(source, br#"{"direction": "short"}"#).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(message, "Error: Bot contract not initialized");
}

#[tokio::test]
async fn invalid_direction_never_reaches_session() {
    init_tracing();
    let handle = listed_venue();
    let manager = manager_for(&handle);

    let (status, message) =
        handle_webhook(Arc::clone(&manager), br#"{"direction": "sideways"}"#).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        message,
        "Error: Invalid direction 'sideways'. Must be 'long' or 'short'"
    );
    // Not even an initialization was triggered
    assert_eq!(manager.state(), SessionState::Absent);
    assert_eq!(handle.connect_count(), 0);
    assert!(handle.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_signals_place_one_order() {
    init_tracing();
    let handle = listed_venue();
    let manager = ready_manager(&handle).await;

    let signals: Vec<_> = (0..4)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { handle_webhook(manager, br#"{"direction": "long"}"#).await })
        })
        .collect();

    let mut skipped = 0;
    for signal in signals {
        let (status, message) = signal.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        if message.contains("already exists, skipping") {
            skipped += 1;
        }
    }

    assert_eq!(skipped, 3);
    assert_eq!(handle.placed_orders().len(), 1);
    manager.shutdown();
}

#[tokio::test]
async fn dropped_session_recovers_through_manager() {
    init_tracing();
    let handle = listed_venue();
    let manager = ready_manager(&handle).await;

    handle.drop_connection();
    wait_for_state(&manager, SessionState::Degraded).await;

    let (status, _) = handle_webhook(Arc::clone(&manager), br#"{"direction": "long"}"#).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    wait_for_state(&manager, SessionState::Ready).await;
    let (status, message) =
        handle_webhook(Arc::clone(&manager), br#"{"direction": "long"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert!(message.contains("Filled"));
    assert_eq!(manager.stats().sessions_replaced, 1);
    manager.shutdown();
}

#[tokio::test]
async fn static_session_places_order() {
    let (venue, handle) = PaperVenue::new();
    handle.list(tracker());
    let source = Arc::new(StaticSession::connect(venue, &config()));
    assert_eq!(source.state(), SessionState::Ready);

    let (status, message) = handle_webhook(source, br#"{"direction": "short"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message, "Webhook received: Order Filled: SELL 1 2800");
}
