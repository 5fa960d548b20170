//! qualifyd — SIP OPTIONS qualify daemon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use qualify_core::config::{LocationConfig, QualifyConfig};
use qualify_services::{MemoryStore, Qualifier, StaticDialplan};

mod sip;

use sip::UdpSignalling;

/// How long inbound probes keep being answered with 503 before the
/// transport stops.
const SHUTDOWN_DRAIN: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = QualifyConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = QualifyConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        QualifyConfig::default()
    });

    let location = LocationConfig::load(&config.location.path).context("failed to load location")?;
    tracing::info!(
        path = %config.location.path.display(),
        endpoints = location.endpoints.len(),
        aors = location.aors.len(),
        contacts = location.contacts.len(),
        "location loaded"
    );

    let store = MemoryStore::from_location(&location);
    let dialplan = Arc::new(StaticDialplan::new(&config.dialplan));
    let signalling = UdpSignalling::bind(&config.sip).await?;

    let qualifier = Qualifier::init(store, signalling.clone(), dialplan, &config.system)
        .context("failed to start qualify service")?;
    qualifier.mark_fully_booted();

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        let qualifier = qualifier.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            drain_then_stop(qualifier, shutdown, SHUTDOWN_DRAIN).await;
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let sip_task = tokio::spawn(
        signalling
            .clone()
            .run(qualifier.clone(), shutdown_tx.subscribe()),
    );

    let api_task = {
        let state = qualify_api::ApiState::new(qualifier.clone());
        let port = config.api.port;
        tokio::spawn(async move {
            if let Err(e) = qualify_api::serve(state, port).await {
                tracing::error!(error = %e, "API server failed");
            }
        })
    };

    let stats_printer = {
        let qualifier = qualifier.clone();
        let signalling = signalling.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                tracing::info!(
                    scheduled = qualifier.scheduler().len(),
                    in_flight = signalling.pending(),
                    gauges = ?qualifier.gauges().snapshot(),
                    "qualify snapshot"
                );
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = sip_task           => tracing::error!("SIP transport exited: {:?}", r),
        r = api_task           => tracing::error!("API server exited: {:?}", r),
        r = stats_printer      => tracing::error!("stats printer exited: {:?}", r),
    }

    qualifier.begin_shutdown();
    qualifier.shutdown();
    Ok(())
}

/// Answer inbound probes with 503 for `drain`, then stop every task.
async fn drain_then_stop(
    qualifier: Arc<Qualifier>,
    shutdown: tokio::sync::broadcast::Sender<()>,
    drain: Duration,
) {
    qualifier.begin_shutdown();
    tokio::time::sleep(drain).await;
    let _ = shutdown.send(());
}
