use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use venue_bridge::telemetry::init_tracing;
use venue_bridge::webhook::{router, StaticSession};
use venue_bridge::{
    BridgeConfig, InMemoryOrderJournal, Instrument, LifecycleManager, PaperVenueHandle,
    TracingObserver,
};

/// CLI arguments for venue-bridge.
#[derive(Parser, Debug)]
#[command(name = "venue-bridge")]
#[command(about = "Webhook server that forwards trade signals to a single venue session")]
#[command(version)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config/bridge.toml")]
    config: PathBuf,

    /// Listen address (overrides config file)
    #[arg(long)]
    bind: Option<String>,

    /// Tracing filter directive (overrides config file)
    #[arg(long)]
    log_level: Option<String>,

    /// Connect once at startup instead of running the lifecycle manager
    #[arg(long)]
    static_session: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let config_found = args.config.exists();
    let mut config = if config_found {
        BridgeConfig::from_file(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?
    } else {
        BridgeConfig::default()
    };
    config.apply_env_overrides();
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    init_tracing(&config.log_level)?;
    if !config_found {
        warn!(path = ?args.config, "Config file not found, using defaults");
    }
    config.validate().context("Configuration validation failed")?;

    info!(
        venue = %config.endpoint(),
        symbol = %config.instrument.symbol,
        market = %config.instrument.market,
        "Starting venue-bridge"
    );

    // Real venue connectors live outside this crate; the binary trades on paper.
    let paper = PaperVenueHandle::new();
    paper.list(paper_listing(&config));

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(bind = %config.server.bind, "Webhook server listening");

    if args.static_session {
        let venue = paper.venue();
        let boot_config = config.clone();
        let source = tokio::task::spawn_blocking(move || {
            let source = StaticSession::connect(venue, &boot_config);
            if let Some(bridge) = source.bridge() {
                match bridge.test_permissions() {
                    Ok(message) => info!("{message}"),
                    Err(e) => warn!(error = %e, "Permission test failed"),
                }
            }
            source
        })
        .await
        .context("Session startup task failed")?;
        let source = Arc::new(source);

        serve(listener, router(Arc::clone(&source))).await?;

        if let Some(bridge) = source.bridge().cloned() {
            tokio::task::spawn_blocking(move || bridge.shutdown()).await?;
        }
    } else {
        let factory = {
            let paper = paper.clone();
            move || paper.venue()
        };
        let manager = Arc::new(LifecycleManager::with_observer(
            factory,
            config.clone(),
            Arc::new(InMemoryOrderJournal::new()),
            Arc::new(TracingObserver),
        ));
        // First connect starts now rather than on the first signal
        manager.get_session();

        serve(listener, router(Arc::clone(&manager))).await?;

        tokio::task::spawn_blocking(move || manager.shutdown()).await?;
    }

    info!("venue-bridge stopped");
    Ok(())
}

async fn serve(listener: TcpListener, app: Router) -> Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Webhook server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn paper_listing(config: &BridgeConfig) -> Instrument {
    let cfg = &config.instrument;
    let spec = cfg
        .candidates_for(&cfg.market, &cfg.security_type, &cfg.symbol)
        .into_iter()
        .next()
        .unwrap_or_else(|| {
            venue_bridge::ContractSpec::new(
                cfg.symbol.as_str(),
                cfg.market.as_str(),
                cfg.security_type.as_str(),
                cfg.currency.as_str(),
            )
        });
    Instrument {
        contract_id: 1,
        symbol: spec.symbol,
        exchange: spec.exchange,
        security_type: spec.security_type,
        currency: spec.currency,
        primary_exchange: None,
    }
}
