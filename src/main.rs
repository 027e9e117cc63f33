mod config;
mod error;
mod handlers;
mod metrics;
mod middleware;
mod models;
mod rate_limit;
mod routes;
mod state;
mod store;

use chrono::TimeDelta;
use clap::Parser; // for cli
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Args;
use crate::rate_limit::{RateLimiter, Scope};
use crate::state::AppState;
use crate::store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "naturedopes_api=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // parse cli arguments
    let args = Args::parse();
    let rate_config = args.rate_limit_config()?;

    let images = match &args.images_file {
        Some(path) => store::load_images(path)?,
        None => Vec::new(),
    };
    tracing::info!("Loaded {} image records", images.len());

    let state = Arc::new(AppState {
        store: Store::new(images, TimeDelta::days(i64::from(args.api_key_ttl_days))),
        rate_limiter: RateLimiter::new(&rate_config),
    });

    let app = routes::router(Arc::clone(&state));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Server running on http://{}", addr);
    tracing::info!(
        "Rate limits: {} per address, {} per API key",
        state.rate_limiter.address_policy(),
        state.rate_limiter.key_policy()
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    state.rate_limiter.stop().await;
    tracing::info!(
        addresses = state.rate_limiter.tracked(Scope::Address),
        keys = state.rate_limiter.tracked(Scope::Key),
        "Server shutdown complete"
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
}
