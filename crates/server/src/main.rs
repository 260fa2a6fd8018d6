//! MobiMarket API server.
//!
//! Serves the catalog, review, user and order API on port 5000.
//!
//! # Architecture
//!
//! - Axum web framework, JSON in and out
//! - `PostgreSQL` as the authoritative store
//! - In-process `moka` cache in front of the four catalog read views,
//!   invalidated by every catalog and order mutation
//!
//! Migrations are applied out of band with `mm-cli migrate`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::borrow::Cow;

use mobimarket_server::cache::CacheKey;
use mobimarket_server::config::ServerConfig;
use mobimarket_server::state::AppState;
use mobimarket_server::{db, routes};
use sentry::integrations::tracing::{self as sentry_tracing, EventFilter};
use tracing::Level;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "mobimarket_server=info,tower_http=debug";

/// Start error reporting (when a DSN is configured) and the log subscriber.
///
/// The returned guard flushes pending Sentry events when dropped, so it has
/// to live until the server exits.
fn init_telemetry(config: &ServerConfig) -> Option<sentry::ClientInitGuard> {
    let guard = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                environment: config.sentry_environment.clone().map(Cow::Owned),
                sample_rate: config.sentry_sample_rate,
                traces_sample_rate: config.sentry_traces_sample_rate,
                attach_stacktrace: true,
                ..Default::default()
            },
        ))
    });

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let sentry_layer =
        sentry_tracing::layer().event_filter(|metadata: &tracing::Metadata<'_>| {
            match *metadata.level() {
                Level::ERROR | Level::WARN => EventFilter::Event,
                Level::INFO => EventFilter::Breadcrumb,
                _ => EventFilter::Ignore,
            }
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_layer)
        .init();

    tracing::info!(sentry = guard.is_some(), "Telemetry initialized");
    guard
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::from_env()?;
    let _sentry = init_telemetry(&config);

    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    let state = AppState::new(config.clone(), db::postgres_stores(&pool));
    // Startup always begins from an empty latest view.
    state.cache().delete(&CacheKey::Latest).await;

    let app = routes::router(state)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "mobimarket listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            tracing::error!(error = %e, "SIGTERM handler unavailable");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = interrupt => {},
        () = terminate() => {},
    }
    tracing::info!("Shutting down");
}
