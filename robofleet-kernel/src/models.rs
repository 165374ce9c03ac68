use serde::{Deserialize, Serialize};
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime};

pub type Floor = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Active,
    Charging,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    pub name: String,
    pub current_floor: Floor,
    pub status: UnitStatus,
    pub battery_level: f64, // pourcentage [0, 100]
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
    pub assigned_floors: Vec<Floor>,
    pub capabilities: Vec<String>,
}

impl Unit {
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    pub unit_id: String,
    pub floor: Floor,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub temperature: f64,
    pub humidity: f64,
    pub light_level: f64,
    pub motion_detected: bool,
    pub air_quality: f64,
    pub noise_level: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
    Security,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub message: String,
    pub severity: Severity,
    pub acknowledged: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitorAuthorization {
    pub visitor_id: String,
    pub name: String,
    pub destination_floor: Floor,
    pub purpose: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub entry_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub valid_until: OffsetDateTime,
}

/// Moyennes par étage sur la fenêtre glissante d'analytics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloorAnalytics {
    pub floor: Floor,
    pub avg_temperature: f64,
    pub avg_humidity: f64,
    pub avg_air_quality: f64,
    pub avg_noise_level: f64,
    pub motion_events: u32,
    pub readings: usize,
    pub status: String,
}

impl FloorAnalytics {
    /// Enregistrement "no_data" pour un étage sans lecture dans la fenêtre
    pub fn empty(floor: Floor) -> Self {
        Self {
            floor,
            avg_temperature: 0.0,
            avg_humidity: 0.0,
            avg_air_quality: 0.0,
            avg_noise_level: 0.0,
            motion_events: 0,
            readings: 0,
            status: "no_data".to_string(),
        }
    }
}

/// Rapport de dépassement de seuils envoyé par le monitoring capteurs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdAlert {
    pub sensor_id: String,
    pub violations: Vec<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub all_parameters: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureAdjustment {
    pub robot_id: String,
    pub action: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub target_temperature: f64,
    pub sensor_id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AccessDecision {
    Authorized,
    Denied { reason: String },
}

impl AccessDecision {
    pub fn is_authorized(&self) -> bool {
        matches!(self, AccessDecision::Authorized)
    }
}

/// Accepte RFC 3339 ou un ISO 8601 sans offset (interprété en UTC).
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(ts);
    }
    PrimitiveDateTime::parse(raw, &Iso8601::DEFAULT)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}
