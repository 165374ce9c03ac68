/**
 * EVENT DISPATCHER - Diffusion fan-out vers les observateurs du dashboard
 *
 * Chaque observateur possède son propre canal non borné : `publish` ne bloque
 * jamais l'appelant (tick ou requête entrante) et l'ordre d'émission est
 * conservé par observateur. Pas de buffer de replay : un observateur abonné
 * après un événement ne le reçoit pas.
 */

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    RobotStatusUpdate,
    SensorDataUpdate,
    NewAlert,
    AlertAcknowledged,
    NewVisitor,
    ThresholdAlert,
    TemperatureAdjustment,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::RobotStatusUpdate => "robot_status_update",
            Topic::SensorDataUpdate => "sensor_data_update",
            Topic::NewAlert => "new_alert",
            Topic::AlertAcknowledged => "alert_acknowledged",
            Topic::NewVisitor => "new_visitor",
            Topic::ThresholdAlert => "threshold_alert",
            Topic::TemperatureAdjustment => "temperature_adjustment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub topic: Topic,
    pub payload: Value,
}

/// Handle d'un observateur abonné. Le drop du handle vaut désinscription.
pub struct Subscription {
    id: Uuid,
    rx: mpsc::UnboundedReceiver<Event>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Retourne le prochain événement déjà livré, sans attendre
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

pub struct Dispatcher {
    observers: RwLock<HashMap<Uuid, mpsc::UnboundedSender<Event>>>,
    published: AtomicU64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            observers: RwLock::new(HashMap::new()),
            published: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.write().insert(id, tx);
        tracing::info!(observer_id = %id, "observer subscribed");
        Subscription { id, rx }
    }

    pub fn unsubscribe(&self, id: &Uuid) {
        if self.observers.write().remove(id).is_some() {
            tracing::info!(observer_id = %id, "observer unsubscribed");
        }
    }

    /// Diffuse `payload` sous `topic` à tous les observateurs connectés.
    /// Best-effort : un observateur déconnecté est retiré, jamais une erreur.
    pub fn publish<T: Serialize + ?Sized>(&self, topic: Topic, payload: &T) {
        let payload = match serde_json::to_value(payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(topic = topic.as_str(), error = %e, "failed to serialize event payload");
                return;
            }
        };
        let event = Event { topic, payload };
        self.published.fetch_add(1, Ordering::Relaxed);

        let mut gone = Vec::new();
        {
            let observers = self.observers.read();
            tracing::debug!(topic = topic.as_str(), observers = observers.len(), "publishing event");
            for (id, tx) in observers.iter() {
                if tx.send(event.clone()).is_err() {
                    gone.push(*id);
                }
            }
        }

        if !gone.is_empty() {
            let mut observers = self.observers.write();
            for id in gone {
                observers.remove(&id);
                tracing::debug!(observer_id = %id, "pruned disconnected observer");
            }
        }
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn drain(sub: &mut Subscription) -> Vec<Event> {
        let mut out = Vec::new();
        while let Some(ev) = sub.try_recv() {
            out.push(ev);
        }
        out
    }

    #[test]
    fn test_late_subscriber_gets_no_replay() {
        let dispatcher = Dispatcher::new();
        let mut early = dispatcher.subscribe();
        dispatcher.publish(Topic::NewAlert, &json!({"id": 1}));

        let mut late = dispatcher.subscribe();
        dispatcher.publish(Topic::NewAlert, &json!({"id": 2}));
        dispatcher.publish(Topic::AlertAcknowledged, &json!({"id": 2}));

        let early_ids: Vec<_> = drain(&mut early).iter().map(|e| e.payload["id"].clone()).collect();
        assert_eq!(early_ids, vec![json!(1), json!(2), json!(2)]);

        let late_events = drain(&mut late);
        assert_eq!(late_events.len(), 2);
        assert_eq!(late_events[0].topic, Topic::NewAlert);
        assert_eq!(late_events[0].payload["id"], 2);
        assert_eq!(late_events[1].topic, Topic::AlertAcknowledged);
    }

    #[test]
    fn test_dropped_observer_is_pruned() {
        let dispatcher = Dispatcher::new();
        let mut kept = dispatcher.subscribe();
        let dropped = dispatcher.subscribe();
        assert_eq!(dispatcher.observer_count(), 2);

        drop(dropped);
        dispatcher.publish(Topic::SensorDataUpdate, &json!({}));

        assert_eq!(dispatcher.observer_count(), 1);
        assert_eq!(drain(&mut kept).len(), 1);
    }

    #[test]
    fn test_unsubscribe_and_counters() {
        let dispatcher = Dispatcher::new();
        let sub = dispatcher.subscribe();
        dispatcher.unsubscribe(&sub.id());
        dispatcher.publish(Topic::NewVisitor, &json!({"name": "Ada"}));
        assert_eq!(dispatcher.observer_count(), 0);
        assert_eq!(dispatcher.published_count(), 1);
    }

    #[test]
    fn test_topic_names() {
        assert_eq!(Topic::RobotStatusUpdate.as_str(), "robot_status_update");
        assert_eq!(
            serde_json::to_value(Topic::TemperatureAdjustment).unwrap(),
            json!("temperature_adjustment")
        );
    }

    #[tokio::test]
    async fn test_async_recv_in_emission_order() {
        let dispatcher = Dispatcher::new();
        let mut sub = dispatcher.subscribe();
        for i in 0..5 {
            dispatcher.publish(Topic::NewAlert, &json!({ "id": i }));
        }
        for i in 0..5 {
            let ev = sub.recv().await.unwrap();
            assert_eq!(ev.payload["id"], i);
        }
    }
}
