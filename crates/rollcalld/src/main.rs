use anyhow::{Context, Result};
use rollcall_core::AttendanceService;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod store;

use config::Config;
use dbus_interface::{AttendanceInterface, BUS_NAME, OBJECT_PATH};
use store::SqliteJournal;

/// Build the service, restoring persisted state when persistence is on.
fn build_service(config: &Config) -> Result<AttendanceService> {
    if !config.persist {
        tracing::warn!("persistence disabled via ROLLCALL_PERSIST=0; state is kept in memory only");
        return Ok(AttendanceService::new(config.settings));
    }

    let journal = SqliteJournal::open(&config.db_path)
        .with_context(|| format!("opening database {}", config.db_path.display()))?;
    let (identities, events) = journal.load().context("loading persisted attendance")?;
    tracing::info!(
        path = %config.db_path.display(),
        identities = identities.len(),
        events = events.len(),
        "database opened"
    );
    AttendanceService::restore(config.settings, identities, events, Box::new(journal))
        .context("restoring attendance state")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::load()?;
    tracing::info!(
        tolerance = config.settings.tolerance,
        match_policy = ?config.settings.match_policy,
        absent_policy = ?config.settings.absent_policy,
        session_bus = config.session_bus,
        "configuration loaded"
    );

    let service = Arc::new(build_service(&config)?);
    let iface = AttendanceInterface::new(service, config.persist);

    let builder = if config.session_bus {
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, iface)?
        .build()
        .await
        .context("registering on D-Bus")?;

    tracing::info!(bus_name = BUS_NAME, path = OBJECT_PATH, "rollcalld ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
