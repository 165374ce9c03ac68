use crate::models::{Floor, Unit, UnitStatus};
use serde::{Deserialize, Serialize};
use std::path::Path;
use time::OffsetDateTime;
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    pub tick_interval_secs: u64,
    pub alert_retention: usize,
    pub history_capacity: usize,
    pub analytics_window: usize,
    pub rng_seed: Option<u64>,
    pub roster: Vec<UnitSpec>,
    pub action_log_dir: Option<String>, // ex: "./data/actions"
    pub notify: Option<NotifyConf>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UnitSpec {
    pub id: String,
    pub name: String,
    pub current_floor: Floor,
    pub battery_level: f64,
    pub assigned_floors: Vec<Floor>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl UnitSpec {
    pub fn into_unit(self, now: OffsetDateTime) -> Unit {
        Unit {
            id: self.id,
            name: self.name,
            current_floor: self.current_floor,
            status: UnitStatus::Active,
            battery_level: self.battery_level.clamp(0.0, 100.0),
            last_seen: now,
            assigned_floors: self.assigned_floors,
            capabilities: self.capabilities,
        }
    }
}

/// Cible MQTT des notifications d'ajustement de température
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NotifyConf {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_topic")]
    pub topic: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_client_id() -> String {
    "robofleet-kernel".into()
}

fn default_topic() -> String {
    "robofleet/actions/temperature@v1".into()
}

fn default_timeout_ms() -> u64 {
    2000
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 15,
            alert_retention: crate::alerts::DEFAULT_RETENTION,
            history_capacity: crate::analytics::DEFAULT_HISTORY_CAPACITY,
            analytics_window: crate::analytics::DEFAULT_WINDOW,
            rng_seed: None,
            roster: default_roster(),
            action_log_dir: None,
            notify: None,
        }
    }
}

pub fn default_roster() -> Vec<UnitSpec> {
    vec![
        UnitSpec {
            id: "ROBOT_001".into(),
            name: "Security Patrol Robot".into(),
            current_floor: 1,
            battery_level: 85.0,
            assigned_floors: vec![1, 2, 3],
            capabilities: vec![
                "visitor_tracking".into(),
                "security_patrol".into(),
                "access_control".into(),
            ],
        },
        UnitSpec {
            id: "ROBOT_002".into(),
            name: "Maintenance Robot".into(),
            current_floor: 4,
            battery_level: 92.0,
            assigned_floors: vec![4, 5],
            capabilities: vec![
                "temperature_control".into(),
                "equipment_monitoring".into(),
                "maintenance_alerts".into(),
            ],
        },
    ]
}

pub fn parse_config(txt: &str) -> KernelConfig {
    if txt.trim().is_empty() {
        return KernelConfig::default();
    }
    serde_yaml::from_str(txt).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "invalid config, using defaults");
        KernelConfig::default()
    })
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("ROBOFLEET_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    load_config_from(&path).await
}

pub async fn load_config_from(path: &str) -> KernelConfig {
    if !Path::new(path).exists() {
        tracing::info!(path = %path, "no config file, using defaults");
        return KernelConfig::default();
    }
    match fs::read_to_string(path).await {
        Ok(txt) => parse_config(&txt),
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "unreadable config, using defaults");
            KernelConfig::default()
        }
    }
}
