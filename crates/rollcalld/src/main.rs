use anyhow::{Context, Result};
use rollcall_core::engine::{AttendanceEngine, EngineOptions};
use rollcall_core::{EmbeddingStore, JournalLedger, Ledger};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod ledger_http;

use config::Config;
use dbus_interface::{AttendanceService, BUS_NAME, OBJECT_PATH};
use ledger_http::HttpLedger;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::load().context("loading configuration")?;
    tracing::info!(
        data_dir = %config.data_dir.display(),
        store = %config.store_path.display(),
        similarity_threshold = config.similarity_threshold,
        presence_frames = config.presence_frames,
        quality_threshold = config.quality_threshold,
        session_bus = config.session_bus,
        "configuration loaded"
    );

    let store = EmbeddingStore::open(&config.store_path, config.quality_threshold)
        .with_context(|| format!("opening embedding store {}", config.store_path.display()))?;

    let (ledger, ledger_desc): (Arc<dyn Ledger>, String) = match &config.ledger_url {
        Some(url) => {
            let ledger = HttpLedger::new(
                url,
                Duration::from_secs(config.ledger_timeout_secs),
                tokio::runtime::Handle::current(),
            )?;
            tracing::info!(url = %ledger.base_url(), timeout_secs = config.ledger_timeout_secs, "using HTTP ledger");
            let ledger: Arc<dyn Ledger> = Arc::new(ledger);
            (ledger, format!("http {url}"))
        }
        None => {
            tracing::info!(journal = %config.journal_path.display(), "no ledger URL; journaling attendance locally");
            let ledger: Arc<dyn Ledger> = Arc::new(JournalLedger::new(&config.journal_path));
            (ledger, format!("journal {}", config.journal_path.display()))
        }
    };

    let engine = AttendanceEngine::new(
        store,
        ledger,
        EngineOptions {
            settings: config.settings(),
            quality_threshold: config.quality_threshold,
            fallback_policy: config.fallback_policy.clone(),
        },
    )?;
    let service = AttendanceService::new(Arc::new(engine), ledger_desc);

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
        .with_context(|| format!("registering {BUS_NAME} on the D-Bus"))?;

    tracing::info!(bus_name = BUS_NAME, path = OBJECT_PATH, "rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
