/**
 * ACTIONS - Collaborateurs externes déclenchés par la corrélation de seuils
 *
 * - ActionLog : journal des actions synthétiques d'ajustement de température
 *   (mémoire ou un fichier JSON par action).
 * - AdjustmentNotifier : publication MQTT best-effort de chaque ajustement,
 *   bornée par un timeout et lancée en tâche séparée. Un échec est loggé,
 *   jamais remonté : l'alerte de seuil reste enregistrée et diffusée.
 */

use crate::config::NotifyConf;
use crate::error::{KernelError, KernelResult};
use crate::models::TemperatureAdjustment;
use anyhow::Context;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, QoS};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use uuid::Uuid;

pub trait ActionLog: Send + Sync {
    fn record(&self, action: &TemperatureAdjustment) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct MemoryActionLog {
    actions: Mutex<Vec<TemperatureAdjustment>>,
}

impl MemoryActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<TemperatureAdjustment> {
        self.actions.lock().clone()
    }
}

impl ActionLog for MemoryActionLog {
    fn record(&self, action: &TemperatureAdjustment) -> anyhow::Result<()> {
        self.actions.lock().push(action.clone());
        Ok(())
    }
}

/// Un fichier `temp_adjustment_<unix_nanos>_<suffix>.json` par action.
/// L'écriture se fait dans une tâche tokio, jamais sur le thread appelant.
#[derive(Clone)]
pub struct JsonDirActionLog {
    dir: PathBuf,
}

impl JsonDirActionLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub async fn write(&self, action: &TemperatureAdjustment) -> anyhow::Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating action log dir {:?}", self.dir))?;
        let suffix = Uuid::new_v4().simple().to_string();
        let file = self.dir.join(format!(
            "temp_adjustment_{}_{}.json",
            action.timestamp.unix_timestamp_nanos(),
            &suffix[..8]
        ));
        let content = serde_json::to_string_pretty(action)?;
        fs::write(&file, content).await.with_context(|| format!("writing {:?}", file))?;
        Ok(file)
    }
}

impl ActionLog for JsonDirActionLog {
    fn record(&self, action: &TemperatureAdjustment) -> anyhow::Result<()> {
        let handle = tokio::runtime::Handle::try_current().context("no runtime for action log write")?;
        let log = self.clone();
        let action = action.clone();
        handle.spawn(async move {
            match log.write(&action).await {
                Ok(file) => tracing::debug!(robot_id = %action.robot_id, file = ?file, "adjustment action recorded"),
                Err(e) => tracing::warn!(robot_id = %action.robot_id, error = %e, "failed to write adjustment action"),
            }
        });
        Ok(())
    }
}

#[derive(Clone)]
pub struct AdjustmentNotifier {
    client: Option<AsyncClient>,
    topic: String,
    timeout: Duration,
}

impl AdjustmentNotifier {
    pub fn disabled() -> Self {
        Self {
            client: None,
            topic: String::new(),
            timeout: Duration::from_millis(0),
        }
    }

    pub fn new(client: AsyncClient, topic: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Some(client),
            topic: topic.into(),
            timeout,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Publication bornée par `timeout`
    pub async fn send(&self, action: &TemperatureAdjustment) -> KernelResult<()> {
        let Some(client) = &self.client else {
            return Ok(());
        };
        let payload = serde_json::to_vec(action).map_err(|e| KernelError::Notify(e.to_string()))?;

        match tokio::time::timeout(
            self.timeout,
            client.publish(self.topic.clone(), QoS::AtLeastOnce, false, payload),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(KernelError::Notify(e.to_string())),
            Err(_) => Err(KernelError::Notify(format!("timed out after {:?}", self.timeout))),
        }
    }

    /// Fire-and-forget : ne bloque jamais l'appelant
    pub fn notify(&self, action: TemperatureAdjustment) {
        if !self.is_enabled() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(robot_id = %action.robot_id, "no runtime available, adjustment notification skipped");
            return;
        };
        let notifier = self.clone();
        handle.spawn(async move {
            match notifier.send(&action).await {
                Ok(()) => tracing::debug!(robot_id = %action.robot_id, topic = %notifier.topic, "adjustment notified"),
                Err(e) => tracing::warn!(robot_id = %action.robot_id, error = %e, "adjustment notification failed"),
            }
        });
    }
}

pub fn create_mqtt_client(conf: &NotifyConf) -> (AsyncClient, EventLoop) {
    let mut opts = MqttOptions::new(conf.client_id.clone(), conf.host.clone(), conf.port);
    opts.set_keep_alive(Duration::from_secs(15));
    AsyncClient::new(opts, 10)
}

/// Fait tourner la boucle MQTT (connexion, acks) tant que le process vit
pub fn spawn_mqtt_driver(mut eventloop: EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(rumqttc::Incoming::ConnAck(_))) => {
                    tracing::info!("notification broker connected");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = ?e, "notification broker error");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn adjustment() -> TemperatureAdjustment {
        TemperatureAdjustment {
            robot_id: "ROBOT_002".into(),
            action: "temperature_adjustment".into(),
            timestamp: datetime!(2025-03-01 12:00 UTC),
            target_temperature: 75.0,
            sensor_id: "OIL_SENSOR_3".into(),
            status: "adjusting".into(),
        }
    }

    fn conf() -> NotifyConf {
        NotifyConf {
            host: "127.0.0.1".into(),
            port: 1883,
            client_id: "robofleet-test".into(),
            topic: "robofleet/actions/temperature".into(),
            timeout_ms: 50,
        }
    }

    #[test]
    fn test_memory_log_records() {
        let log = MemoryActionLog::new();
        log.record(&adjustment()).unwrap();
        assert_eq!(log.actions(), vec![adjustment()]);
    }

    #[tokio::test]
    async fn test_json_dir_log_writes_one_file_per_action() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonDirActionLog::new(dir.path().join("actions"));
        let first = log.write(&adjustment()).await.unwrap();
        let second = log.write(&adjustment()).await.unwrap();
        assert_ne!(first, second);

        let files: Vec<_> = std::fs::read_dir(dir.path().join("actions")).unwrap().collect();
        assert_eq!(files.len(), 2);
        let back: TemperatureAdjustment =
            serde_json::from_str(&std::fs::read_to_string(first).unwrap()).unwrap();
        assert_eq!(back.target_temperature, 75.0);
    }

    #[tokio::test]
    async fn test_record_writes_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let actions_dir = dir.path().join("actions");
        let log = JsonDirActionLog::new(&actions_dir);
        log.record(&adjustment()).unwrap();

        let mut written = 0;
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            written = std::fs::read_dir(&actions_dir).map(|d| d.count()).unwrap_or(0);
            if written == 1 {
                break;
            }
        }
        assert_eq!(written, 1);
    }

    #[test]
    fn test_record_outside_runtime_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = JsonDirActionLog::new(dir.path());
        assert!(log.record(&adjustment()).is_err());
    }

    #[tokio::test]
    async fn test_disabled_notifier_is_noop() {
        let notifier = AdjustmentNotifier::disabled();
        assert!(!notifier.is_enabled());
        assert_eq!(notifier.send(&adjustment()).await, Ok(()));
    }

    #[tokio::test]
    async fn test_send_fails_when_broker_loop_is_gone() {
        let (client, eventloop) = create_mqtt_client(&conf());
        drop(eventloop);
        let notifier = AdjustmentNotifier::new(client, "t", Duration::from_millis(50));
        assert!(matches!(notifier.send(&adjustment()).await, Err(KernelError::Notify(_))));
    }

    #[tokio::test]
    async fn test_send_is_bounded_by_timeout() {
        let mut opts = MqttOptions::new("robofleet-test", "127.0.0.1", 1883);
        opts.set_keep_alive(Duration::from_secs(15));
        // file de requêtes de capacité 1, boucle jamais pilotée : la 2e publication bloque
        let (client, _eventloop) = AsyncClient::new(opts, 1);
        let notifier = AdjustmentNotifier::new(client, "t", Duration::from_millis(50));

        assert_eq!(notifier.send(&adjustment()).await, Ok(()));
        let second = notifier.send(&adjustment()).await;
        assert!(matches!(second, Err(KernelError::Notify(msg)) if msg.contains("timed out")));
    }
}
