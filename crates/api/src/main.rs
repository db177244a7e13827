//! Bookline service entry point

use std::sync::Arc;

use anyhow::Context as _;
use bookline_api::{build_router, AppContext};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Local development convenience; absent .env files are not an error
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = match bookline_infra::config::load() {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "no usable configuration source, using defaults");
            bookline_domain::Config::default()
        }
    };

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let ctx = Arc::new(
        AppContext::new_with_config(config)
            .await
            .context("failed to build application context")?,
    );
    ctx.start_workers().await.context("failed to start background workers")?;

    let router = build_router(Arc::clone(&ctx));
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %bind_addr, "bookline listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    ctx.shutdown().await;
    info!("bookline stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bookline=debug"));

    let json_logs = std::env::var("BOOKLINE_LOG_FORMAT").is_ok_and(|v| v == "json");
    if json_logs {
        tracing_subscriber::registry().with(filter).with(fmt::layer().json()).init();
    } else {
        tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
    } else {
        info!("shutdown signal received");
    }
}
