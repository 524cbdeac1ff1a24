//! Tracing subscriber setup for the binary.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install the global tracing subscriber.
///
/// `filter` is an `EnvFilter` directive such as `info` or
/// `venue_bridge=debug,axum=info`. `RUST_LOG` takes precedence when set.
pub fn init_tracing(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_thread_names(true)
        .with_filter(filter);
    tracing_subscriber::registry().with(stdout_layer).try_init()?;
    Ok(())
}
