use anyhow::Result;
use discovery_api::{Document, Record};
use discovery_core::{BridgeStopOutcome, Discovery};
use discovery_static::{StaticBridge, StaticBridgeConfig};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use tracing_subscriber::fmt::init as tracing_init;

mod config;

use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    info!("Starting service-discovery daemon...");

    let config = Config::load()?;
    let discovery = Discovery::new(config.discovery.clone())?;

    if let Some(bus) = discovery.local_bus() {
        let announcements = bus.subscribe(&discovery.options().announce_address);
        tokio::spawn(log_announcements(announcements));
    }

    for entry in config.bridges {
        let bridge = Arc::new(StaticBridge::new(entry.name.clone()));
        let bridge_config = serde_json::to_value(StaticBridgeConfig { records: entry.records })?;
        match discovery.register_bridge(bridge, bridge_config).await {
            Ok(id) => info!("Bridge {} registered as {}", entry.name, id),
            Err(e) => error!("Error starting bridge {}: {}", entry.name, e),
        }
    }

    run(&discovery, tokio::signal::ctrl_c()).await?;

    Ok(())
}

/// Log registry status periodically until `shutdown` resolves, then close
async fn run<F>(discovery: &Discovery, shutdown: F) -> Result<()>
where
    F: Future,
{
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match discovery.get_records(&Document::new()).await {
                    Ok(records) => debug!(
                        "Discovery {} has {} records and {} bindings",
                        discovery.name(),
                        records.len(),
                        discovery.bindings()
                    ),
                    Err(e) => error!("Error listing records: {}", e),
                }
            }
            _ = &mut shutdown => {
                info!("Shutting down service-discovery daemon...");
                break;
            }
        }
    }

    for report in discovery.close().await? {
        match report.outcome {
            BridgeStopOutcome::Stopped => info!("Bridge {}", report),
            _ => warn!("Bridge {}", report),
        }
    }

    Ok(())
}

async fn log_announcements(mut announcements: tokio::sync::broadcast::Receiver<serde_json::Value>) {
    loop {
        match announcements.recv().await {
            Ok(body) => match Record::from_json(body) {
                Ok(record) => info!(
                    "{} {} ({})",
                    record.status,
                    record.name,
                    record.registration.as_deref().unwrap_or("-")
                ),
                Err(e) => warn!("Malformed announcement: {}", e),
            },
            Err(RecvError::Lagged(skipped)) => warn!("Skipped {} announcements", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}
