//! # Switchboard Server
//!
//! WebSocket chat relay. Clients join the groups their user belongs to and
//! exchange messages with the other members, across every server process
//! sharing the same backplane.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! switchboard
//!
//! # Run with custom config
//! switchboard --config /path/to/switchboard.toml
//!
//! # Run with environment variables
//! SWITCHBOARD_PORT=8080 SWITCHBOARD_BACKPLANE__KIND=memory switchboard
//! ```

mod auth;
mod config;
mod handlers;
mod metrics;

use anyhow::{Context, Result};
use std::sync::Arc;
use switchboard_core::{Backplane, Hub, MemoryBackplane, StaticResolver};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{BackplaneConfig, BackplaneKind, Config};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchboard=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match config_path_arg() {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    info!("Starting Switchboard on {}:{}", config.host, config.port);

    metrics::init_metrics();

    let backplane = build_backplane(&config.backplane).await?;
    let resolver = Arc::new(StaticResolver::new(config.resolver.groups.clone()));
    let hub = Hub::spawn(config.hub_config(), resolver, backplane);

    handlers::run_server(config, hub).await?;

    Ok(())
}

/// Value of `--config <path>`, if given.
fn config_path_arg() -> Option<String> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next();
        }
    }
    None
}

async fn build_backplane(config: &BackplaneConfig) -> Result<Arc<dyn Backplane>> {
    match config.kind {
        BackplaneKind::Memory => {
            warn!("Using the in-process backplane; messages stay within this process");
            Ok(Arc::new(MemoryBackplane::new()))
        }
        #[cfg(feature = "redis")]
        BackplaneKind::Redis => {
            let backplane = switchboard_core::RedisBackplane::connect(&config.url)
                .await
                .with_context(|| format!("Failed to connect to Redis at {}", config.url))?;
            Ok(Arc::new(backplane))
        }
        #[cfg(not(feature = "redis"))]
        BackplaneKind::Redis => {
            anyhow::bail!("Redis backplane requested but this build has no Redis support")
        }
    }
}
