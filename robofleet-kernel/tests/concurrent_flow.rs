//! Boucle de coordination + opérations entrantes concurrentes

use robofleet_kernel::actions::{AdjustmentNotifier, MemoryActionLog};
use robofleet_kernel::clock::SystemClock;
use robofleet_kernel::config::KernelConfig;
use robofleet_kernel::{Coordinator, Topic};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn coordinator(retention: usize) -> Arc<Coordinator> {
    let cfg = KernelConfig {
        rng_seed: Some(2024),
        alert_retention: retention,
        ..KernelConfig::default()
    };
    Arc::new(Coordinator::from_config(
        &cfg,
        Arc::new(SystemClock),
        Arc::new(MemoryActionLog::new()),
        AdjustmentNotifier::disabled(),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_inbound_operations_keep_alert_ids_ordered() {
    let kernel = coordinator(10_000);
    let mut observer = kernel.subscribe();
    let handle = kernel.spawn(Duration::from_millis(5));

    let mut tasks = Vec::new();
    for i in 0..20 {
        let k = kernel.clone();
        tasks.push(tokio::spawn(async move {
            k.deliver_visitor_authorization(json!({
                "visitor_id": format!("V{i}"),
                "name": format!("Visitor {i}"),
                "destination_floor": (i % 5) + 1,
                "entry_time": "2025-03-01T09:00:00Z",
                "valid_until": "2025-03-01T17:00:00Z"
            }))
            .unwrap();
        }));
        let k = kernel.clone();
        tasks.push(tokio::spawn(async move {
            k.deliver_threshold_alert(json!({
                "sensor_id": format!("OIL_SENSOR_{i}"),
                "violations": ["Temperature: 95°C (> 85°C)"]
            }))
            .unwrap();
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(30)).await;
    handle.shutdown().await;

    let alerts = kernel.ledger().list(usize::MAX);
    let ids: Vec<u64> = alerts.iter().map(|a| a.id).collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(ids.len(), ids.iter().collect::<HashSet<_>>().len());
    // 20 infos visiteurs + 20 critiques + 20 infos d'ajustement, plus d'éventuelles alertes batterie
    assert!(ids.len() >= 60);
    assert_eq!(kernel.visitors().count(), 20);
    assert_eq!(kernel.external_alerts().len(), 20);
    assert!(kernel.health().ticks_completed() >= 1);

    // l'observateur reçoit les new_alert dans l'ordre des ids
    let mut streamed = Vec::new();
    while let Some(ev) = observer.try_recv() {
        if ev.topic == Topic::NewAlert {
            streamed.push(ev.payload["id"].as_u64().unwrap());
        }
    }
    assert_eq!(streamed, ids);
}

#[tokio::test]
async fn test_observer_dropping_mid_stream_does_not_block_loop() {
    let kernel = coordinator(100);
    let dropped = kernel.subscribe();
    let mut kept = kernel.subscribe();
    drop(dropped);

    let handle = kernel.spawn(Duration::from_millis(5));
    tokio::time::sleep(Duration::from_millis(40)).await;
    handle.shutdown().await;

    assert_eq!(kernel.dispatcher().observer_count(), 1);
    let first = kept.try_recv().expect("kept observer receives tick events");
    assert_eq!(first.topic, Topic::RobotStatusUpdate);
}
