/**
 * COORDINATION LOOP - Pilote périodique + corrélation des alertes de seuil
 *
 * RÔLE : possède tous les composants (flotte, analytics, journal d'alertes,
 * table des visiteurs, dispatcher) construits explicitement et injectés ici.
 * Expose les opérations entrantes consommées par la couche transport :
 * autorisation visiteur, alerte de seuil, acquittement, vue dashboard.
 *
 * BOUCLE : un tick toutes les `tick_interval_secs` (timer tokio). Un panic
 * dans un tick est capturé et loggé, la boucle continue sur son intervalle.
 * Arrêt via `LoopHandle::shutdown`.
 */

use crate::actions::{ActionLog, AdjustmentNotifier};
use crate::alerts::AlertLedger;
use crate::analytics::AnalyticsAggregator;
use crate::clock::SharedClock;
use crate::config::KernelConfig;
use crate::dispatcher::{Dispatcher, Subscription, Topic};
use crate::error::{KernelError, KernelResult};
use crate::fleet::FleetStore;
use crate::health::{HealthTracker, LoopHealth};
use crate::models::{
    AccessDecision, Alert, Floor, FloorAnalytics, Severity, TelemetryReading, TemperatureAdjustment,
    ThresholdAlert, Unit, VisitorAuthorization,
};
use crate::visitors::{VisitorAuthorizationIn, VisitorTable};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const TEMPERATURE_TRIGGER: &str = "Temperature";
pub const TEMPERATURE_CAPABILITY: &str = "temperature_control";
pub const TARGET_TEMPERATURE: f64 = 75.0;
pub const RECENT_ALERTS: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub robots: Vec<Unit>,
    pub authorized_visitors: usize,
    pub active_alerts: usize,
    pub recent_alerts: Vec<Alert>,
    pub sensor_data: BTreeMap<String, TelemetryReading>,
    pub floor_analytics: BTreeMap<Floor, FloorAnalytics>,
    pub health: LoopHealth,
    pub system_status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
struct AccessCheckIn {
    #[serde(deserialize_with = "crate::visitors::visitor_id_from_any")]
    visitor_id: String,
    current_floor: Floor,
}

pub struct Coordinator {
    clock: SharedClock,
    dispatcher: Arc<Dispatcher>,
    ledger: Arc<AlertLedger>,
    fleet: Arc<FleetStore>,
    analytics: Arc<AnalyticsAggregator>,
    visitors: Arc<VisitorTable>,
    external_alerts: Mutex<VecDeque<ThresholdAlert>>,
    external_retention: usize,
    action_log: Arc<dyn ActionLog>,
    notifier: AdjustmentNotifier,
    health: HealthTracker,
}

impl Coordinator {
    pub fn from_config(
        cfg: &KernelConfig,
        clock: SharedClock,
        action_log: Arc<dyn ActionLog>,
        notifier: AdjustmentNotifier,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new());
        let ledger = Arc::new(AlertLedger::new(cfg.alert_retention, clock.clone(), dispatcher.clone()));

        let now = clock.now();
        let roster = cfg.roster.iter().cloned().map(|spec| spec.into_unit(now)).collect();
        let rng = match cfg.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let fleet = Arc::new(FleetStore::new(
            roster,
            rng,
            clock.clone(),
            ledger.clone(),
            dispatcher.clone(),
        ));
        let analytics = Arc::new(AnalyticsAggregator::new(cfg.history_capacity, cfg.analytics_window));
        let visitors = Arc::new(VisitorTable::new(ledger.clone(), dispatcher.clone()));

        Self {
            clock,
            dispatcher,
            ledger,
            fleet,
            analytics,
            visitors,
            external_alerts: Mutex::new(VecDeque::new()),
            external_retention: cfg.alert_retention.max(1),
            action_log,
            notifier,
            health: HealthTracker::new(),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn ledger(&self) -> &Arc<AlertLedger> {
        &self.ledger
    }

    pub fn fleet(&self) -> &Arc<FleetStore> {
        &self.fleet
    }

    pub fn analytics(&self) -> &Arc<AnalyticsAggregator> {
        &self.analytics
    }

    pub fn visitors(&self) -> &Arc<VisitorTable> {
        &self.visitors
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    pub fn subscribe(&self) -> Subscription {
        self.dispatcher.subscribe()
    }

    /// Un tick : simulation flotte, échantillonnage capteurs, ingestion analytics
    pub fn run_tick(&self) {
        self.fleet.tick();

        for reading in self.fleet.sample_telemetry() {
            self.analytics.ingest(reading);
        }

        let now = self.clock.now();
        self.dispatcher.publish(
            Topic::SensorDataUpdate,
            &serde_json::json!({ "timestamp": now.format(&time::format_description::well_known::Rfc3339).ok() }),
        );
        self.health.record_tick(now);
        tracing::debug!(ticks = self.health.ticks_completed(), "tick completed");
    }

    fn run_tick_guarded(&self) {
        if catch_unwind(AssertUnwindSafe(|| self.run_tick())).is_err() {
            self.health.record_failure();
            tracing::error!(failures = self.health.tick_failures(), "tick failed, loop continues");
        }
    }

    /// Lance la boucle périodique. Premier tick immédiat ; les ticks manqués
    /// sont décalés, jamais rattrapés en rafale.
    pub fn spawn(self: &Arc<Self>, period: Duration) -> LoopHandle {
        let (shutdown, mut rx) = watch::channel(false);
        let coordinator = Arc::clone(self);

        let task = tokio::spawn(async move {
            tracing::info!(period_secs = period.as_secs_f64(), "coordination loop started");
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => coordinator.run_tick_guarded(),
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("coordination loop stopped");
        });

        LoopHandle { shutdown, task }
    }

    /// Corrélation d'une alerte de seuil externe.
    /// Retourne l'action d'ajustement si une a été déclenchée.
    pub fn handle_threshold_alert(&self, alert: ThresholdAlert) -> KernelResult<Option<TemperatureAdjustment>> {
        if alert.sensor_id.trim().is_empty() {
            return Err(KernelError::Validation("sensor_id is empty".into()));
        }
        if alert.violations.is_empty() {
            return Err(KernelError::Validation("violations is empty".into()));
        }

        {
            let mut external = self.external_alerts.lock();
            external.push_back(alert.clone());
            while external.len() > self.external_retention {
                external.pop_front();
            }
        }

        let joined = alert.violations.join(", ");
        self.ledger.append(joined.clone(), Severity::Critical);

        // déclenchement par sous-chaîne, conservé tel quel pour l'intégration capteurs
        let adjustment = if alert.violations.iter().any(|v| v.contains(TEMPERATURE_TRIGGER)) {
            self.trigger_temperature_adjustment(&alert)
        } else {
            None
        };

        tracing::info!(sensor_id = %alert.sensor_id, violations = %joined, "threshold alert received");
        self.dispatcher.publish(Topic::ThresholdAlert, &alert);
        Ok(adjustment)
    }

    fn trigger_temperature_adjustment(&self, alert: &ThresholdAlert) -> Option<TemperatureAdjustment> {
        let Some(unit) = self.fleet.first_with_capability(TEMPERATURE_CAPABILITY) else {
            tracing::debug!(sensor_id = %alert.sensor_id, "no temperature_control unit, adjustment skipped");
            return None;
        };

        let adjustment = TemperatureAdjustment {
            robot_id: unit.id.clone(),
            action: "temperature_adjustment".to_string(),
            timestamp: self.clock.now(),
            target_temperature: TARGET_TEMPERATURE,
            sensor_id: alert.sensor_id.clone(),
            status: "adjusting".to_string(),
        };

        if let Err(e) = self.action_log.record(&adjustment) {
            tracing::warn!(robot_id = %unit.id, error = %e, "failed to record adjustment action");
        }
        self.ledger.append(
            format!("{} adjusting oil container temperature", unit.name),
            Severity::Info,
        );
        self.dispatcher.publish(Topic::TemperatureAdjustment, &adjustment);
        self.notifier.notify(adjustment.clone());
        Some(adjustment)
    }

    pub fn external_alerts(&self) -> Vec<ThresholdAlert> {
        self.external_alerts.lock().iter().cloned().collect()
    }

    // --- opérations entrantes (frontière transport) ---

    pub fn deliver_visitor_authorization(&self, payload: Value) -> KernelResult<VisitorAuthorization> {
        let incoming: VisitorAuthorizationIn = serde_json::from_value(payload)?;
        let auth = incoming.into_authorization()?;
        self.visitors.authorize(auth.clone());
        Ok(auth)
    }

    pub fn deliver_threshold_alert(&self, payload: Value) -> KernelResult<Option<TemperatureAdjustment>> {
        let alert: ThresholdAlert = serde_json::from_value(payload)?;
        self.handle_threshold_alert(alert)
    }

    pub fn acknowledge_alert(&self, id: u64) -> KernelResult<Alert> {
        self.ledger.acknowledge(id)
    }

    pub fn check_visitor_access(&self, payload: Value) -> KernelResult<AccessDecision> {
        let check: AccessCheckIn = serde_json::from_value(payload)?;
        self.visitors.check_access(&check.visitor_id, check.current_floor)
    }

    pub fn query_dashboard(&self) -> DashboardView {
        DashboardView {
            robots: self.fleet.snapshot(),
            authorized_visitors: self.visitors.count(),
            active_alerts: self.ledger.unacknowledged_count(),
            recent_alerts: self.ledger.list(RECENT_ALERTS),
            sensor_data: self.analytics.latest_readings(),
            floor_analytics: self.analytics.compute(self.fleet.assigned_floors()),
            health: self.health.get_health(&self.dispatcher),
            system_status: "operational".to_string(),
            last_updated: self.clock.now(),
        }
    }
}

pub struct LoopHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl LoopHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "coordination loop task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
