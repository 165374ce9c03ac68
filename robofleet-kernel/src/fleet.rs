/**
 * FLEET STATE STORE - Registre des unités mobiles et simulation physique
 *
 * RÔLE : Possède les enregistrements `Unit` (créés une fois depuis le roster
 * statique, jamais supprimés) et fait avancer la simulation à chaque tick :
 * décharge batterie, déplacements d'étage, last_seen, alertes batterie faible.
 *
 * CONCURRENCE : un verrou pour le roster, un pour le RNG. Les alertes et la
 * diffusion du roster sont faites après relâchement du verrou du roster.
 */

use crate::alerts::AlertLedger;
use crate::clock::SharedClock;
use crate::dispatcher::{Dispatcher, Topic};
use crate::error::{KernelError, KernelResult};
use crate::models::{Floor, Severity, TelemetryReading, Unit, UnitStatus};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeSet;
use std::sync::Arc;

pub const BATTERY_FLOOR: f64 = 20.0;
pub const LOW_BATTERY_THRESHOLD: f64 = 30.0;
pub const MOVE_PROBABILITY: f64 = 0.3;
pub const MOTION_PROBABILITY: f64 = 0.2;
const DRAIN_MIN: f64 = 0.1;
const DRAIN_MAX: f64 = 0.5;

pub struct FleetStore {
    units: Mutex<Vec<Unit>>,
    rng: Mutex<StdRng>,
    clock: SharedClock,
    ledger: Arc<AlertLedger>,
    dispatcher: Arc<Dispatcher>,
}

impl FleetStore {
    pub fn new(
        roster: Vec<Unit>,
        rng: StdRng,
        clock: SharedClock,
        ledger: Arc<AlertLedger>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            units: Mutex::new(roster),
            rng: Mutex::new(rng),
            clock,
            ledger,
            dispatcher,
        }
    }

    /// Un pas de simulation pour toutes les unités, puis diffusion du roster complet
    pub fn tick(&self) -> Vec<Unit> {
        let now = self.clock.now();
        let mut low_battery = Vec::new();

        let snapshot = {
            let mut units = self.units.lock();
            let mut rng = self.rng.lock();

            for unit in units.iter_mut() {
                let drain = rng.gen_range(DRAIN_MIN..=DRAIN_MAX);
                // sous le plancher (recharge externe partielle) : pas de remontée
                if unit.battery_level > BATTERY_FLOOR {
                    unit.battery_level = (unit.battery_level - drain).max(BATTERY_FLOOR);
                }

                if rng.gen_bool(MOVE_PROBABILITY) {
                    if let Some(floor) = unit.assigned_floors.choose(&mut *rng) {
                        unit.current_floor = *floor;
                    }
                }

                unit.last_seen = now;

                if unit.battery_level < LOW_BATTERY_THRESHOLD {
                    low_battery.push(format!(
                        "Low battery warning for {}: {:.1}%",
                        unit.name, unit.battery_level
                    ));
                }
            }
            units.clone()
        };

        for message in low_battery {
            self.ledger.append(message, Severity::Warning);
        }
        self.dispatcher.publish(Topic::RobotStatusUpdate, &snapshot);
        snapshot
    }

    /// Une lecture capteur par unité, à son étage courant
    pub fn sample_telemetry(&self) -> Vec<TelemetryReading> {
        let now = self.clock.now();
        let units = self.units.lock();
        let mut rng = self.rng.lock();

        units
            .iter()
            .map(|unit| TelemetryReading {
                unit_id: unit.id.clone(),
                floor: unit.current_floor,
                timestamp: now,
                temperature: round1(gaussian(&mut *rng, 22.0, 2.0)),
                humidity: round1(gaussian(&mut *rng, 45.0, 5.0)),
                light_level: round1(rng.gen_range(200.0..800.0)),
                motion_detected: rng.gen_bool(MOTION_PROBABILITY),
                air_quality: round1(rng.gen_range(20.0..80.0)),
                noise_level: round1(rng.gen_range(30.0..70.0)),
            })
            .collect()
    }

    pub fn snapshot(&self) -> Vec<Unit> {
        self.units.lock().clone()
    }

    pub fn get(&self, unit_id: &str) -> Option<Unit> {
        self.units.lock().iter().find(|u| u.id == unit_id).cloned()
    }

    /// Première unité (ordre du roster) possédant la capacité demandée
    pub fn first_with_capability(&self, capability: &str) -> Option<Unit> {
        self.units
            .lock()
            .iter()
            .find(|u| u.has_capability(capability))
            .cloned()
    }

    /// Union des étages assignés sur toute la flotte
    pub fn assigned_floors(&self) -> BTreeSet<Floor> {
        self.units
            .lock()
            .iter()
            .flat_map(|u| u.assigned_floors.iter().copied())
            .collect()
    }

    /// Recharge externe explicite : seul chemin qui fait remonter la batterie
    pub fn recharge(&self, unit_id: &str, percent: f64) -> KernelResult<Unit> {
        let unit = {
            let mut units = self.units.lock();
            let unit = units
                .iter_mut()
                .find(|u| u.id == unit_id)
                .ok_or_else(|| KernelError::UnknownUnit(unit_id.to_string()))?;
            unit.battery_level = percent.clamp(0.0, 100.0);
            unit.status = UnitStatus::Active;
            unit.last_seen = self.clock.now();
            unit.clone()
        };

        tracing::info!(unit_id = %unit.id, battery = unit.battery_level, "unit recharged");
        self.dispatcher.publish(Topic::RobotStatusUpdate, &self.snapshot());
        Ok(unit)
    }
}

fn gaussian<R: Rng + ?Sized>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    Normal::new(mean, std_dev)
        .map(|n| n.sample(rng))
        .unwrap_or(mean)
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
