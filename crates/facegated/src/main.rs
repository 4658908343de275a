use std::sync::Arc;

use anyhow::{Context, Result};
use facegate_core::EuclideanMatcher;
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod dbus_interface;
mod rate_limiter;
mod store;

use auth::Authenticator;
use config::Config;
use dbus_interface::{GateService, BUS_NAME, OBJECT_PATH};
use store::FaceStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facegated starting");

    let config = Config::from_env();
    let store = FaceStore::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open database {}", config.db_path.display()))?;
    tracing::info!(path = %config.db_path.display(), "database opened");

    let auth = Authenticator::new(
        store,
        EuclideanMatcher::new(config.match_threshold),
        config.lockout,
    );
    let service = GateService {
        auth: Arc::new(auth),
        match_threshold: config.match_threshold,
        lockout: config.lockout,
        session_bus: config.session_bus,
    };

    let builder = if config.session_bus {
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register on D-Bus")?;

    tracing::info!(
        bus = if config.session_bus { "session" } else { "system" },
        name = BUS_NAME,
        threshold = config.match_threshold,
        "facegated ready"
    );

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("facegated shutting down");

    Ok(())
}
