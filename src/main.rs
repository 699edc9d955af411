use std::sync::Arc;

use tracing::info;

use crewplan::config::Config;
use crewplan::maintenance;
use crewplan::{Engine, MemoryStore, NotifyHub};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    crewplan::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(MemoryStore::open(&config.wal_path())?);
    let hub = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(store.clone(), hub.clone()));

    info!("crewplan started");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  compact_threshold: {}", config.compact_threshold);
    info!("  reminder lead: {} day(s)", config.reminder_lead_days);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    // Outbound mail lives outside this process; log what would be dispatched.
    let mut outbox = hub.subscribe();
    tokio::spawn(async move {
        loop {
            match outbox.recv().await {
                Ok(n) => match serde_json::to_string(&n) {
                    Ok(json) => info!(template = n.template.as_str(), "dispatch {json}"),
                    Err(e) => tracing::error!("unserializable notification: {e}"),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "notification dispatcher lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tokio::spawn(maintenance::run_compactor(
        store.clone(),
        config.compact_threshold,
        config.compact_interval,
    ));
    tokio::spawn(maintenance::run_reminders(
        engine.clone(),
        config.reminder_lead_days,
        config.reminder_interval,
    ));

    // Run until SIGTERM/ctrl-c, then leave the WAL compact for the next start.
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }

    info!("shutdown signal received");
    if let Err(e) = store.compact().await {
        tracing::warn!("final compaction failed: {e}");
    }
    info!("crewplan stopped");
    Ok(())
}
