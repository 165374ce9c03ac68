/**
 * ROBOFLEET KERNEL - Point d'entrée du démon
 *
 * RÔLE : charge la config, construit les composants, démarre la boucle de
 * coordination et le client MQTT de notification, puis attend Ctrl-C.
 */

use anyhow::Result;
use robofleet_kernel::actions::{
    create_mqtt_client, spawn_mqtt_driver, ActionLog, AdjustmentNotifier, JsonDirActionLog,
    MemoryActionLog,
};
use robofleet_kernel::clock::SystemClock;
use robofleet_kernel::config::load_config;
use robofleet_kernel::Coordinator;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("robofleet_kernel=info")),
        )
        .init();

    let cfg = load_config().await;

    let action_log: Arc<dyn ActionLog> = match &cfg.action_log_dir {
        Some(dir) => Arc::new(JsonDirActionLog::new(dir)),
        None => Arc::new(MemoryActionLog::new()),
    };

    let notifier = match &cfg.notify {
        Some(conf) => {
            let (client, eventloop) = create_mqtt_client(conf);
            spawn_mqtt_driver(eventloop);
            tracing::info!(host = %conf.host, port = conf.port, topic = %conf.topic, "adjustment notifications enabled");
            AdjustmentNotifier::new(client, conf.topic.clone(), Duration::from_millis(conf.timeout_ms))
        }
        None => AdjustmentNotifier::disabled(),
    };

    let coordinator = Arc::new(Coordinator::from_config(&cfg, Arc::new(SystemClock), action_log, notifier));
    tracing::info!(
        units = coordinator.fleet().snapshot().len(),
        tick_secs = cfg.tick_interval_secs,
        "kernel ready"
    );

    let handle = coordinator.spawn(Duration::from_secs(cfg.tick_interval_secs.max(1)));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    handle.shutdown().await;
    Ok(())
}
