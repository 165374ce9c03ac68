/**
 * FLOOR ANALYTICS - Agrégation des lectures capteurs par étage
 *
 * Historique borné par unité (1000 lectures max) + dernière lecture connue.
 * `compute()` est recalculé à chaque appel : pour chaque unité, son étage
 * courant est celui de sa dernière lecture, et seules ses `window` lectures
 * les plus récentes faites à cet étage comptent.
 */

use crate::models::{FloorAnalytics, Floor, TelemetryReading};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use time::OffsetDateTime;

pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;
pub const DEFAULT_WINDOW: usize = 50;

#[derive(Default)]
struct AnalyticsInner {
    history: HashMap<String, VecDeque<TelemetryReading>>,
    latest: HashMap<String, TelemetryReading>,
}

#[derive(Default)]
struct FloorAccumulator {
    temperature: f64,
    humidity: f64,
    air_quality: f64,
    noise_level: f64,
    motion_events: u32,
    count: usize,
}

impl FloorAccumulator {
    fn add(&mut self, r: &TelemetryReading) {
        self.temperature += r.temperature;
        self.humidity += r.humidity;
        self.air_quality += r.air_quality;
        self.noise_level += r.noise_level;
        if r.motion_detected {
            self.motion_events += 1;
        }
        self.count += 1;
    }

    fn finish(self, floor: Floor) -> FloorAnalytics {
        if self.count == 0 {
            return FloorAnalytics::empty(floor);
        }
        let n = self.count as f64;
        FloorAnalytics {
            floor,
            avg_temperature: self.temperature / n,
            avg_humidity: self.humidity / n,
            avg_air_quality: self.air_quality / n,
            avg_noise_level: self.noise_level / n,
            motion_events: self.motion_events,
            readings: self.count,
            status: "normal".to_string(),
        }
    }
}

pub struct AnalyticsAggregator {
    inner: Mutex<AnalyticsInner>,
    capacity: usize,
    window: usize,
}

impl AnalyticsAggregator {
    pub fn new(capacity: usize, window: usize) -> Self {
        Self {
            inner: Mutex::new(AnalyticsInner::default()),
            capacity: capacity.max(1),
            window,
        }
    }

    pub fn ingest(&self, reading: TelemetryReading) {
        let mut inner = self.inner.lock();
        inner.latest.insert(reading.unit_id.clone(), reading.clone());

        let history = inner.history.entry(reading.unit_id.clone()).or_default();
        history.push_back(reading);
        if history.len() > self.capacity {
            history.pop_front();
        }
    }

    /// Analytics par étage. Chaque étage de `floors` est présent dans le
    /// résultat (enregistrement "no_data" si aucune lecture), ainsi que tout
    /// étage courant d'une unité qui n'y figurerait pas.
    pub fn compute<I>(&self, floors: I) -> BTreeMap<Floor, FloorAnalytics>
    where
        I: IntoIterator<Item = Floor>,
    {
        let mut acc: BTreeMap<Floor, FloorAccumulator> = floors
            .into_iter()
            .map(|f| (f, FloorAccumulator::default()))
            .collect();

        let inner = self.inner.lock();
        for readings in inner.history.values() {
            let Some(last) = readings.back() else { continue };
            let floor = last.floor;
            let slot = acc.entry(floor).or_default();
            readings
                .iter()
                .rev()
                .take(self.window)
                .filter(|r| r.floor == floor)
                .for_each(|r| slot.add(r));
        }
        drop(inner);

        acc.into_iter().map(|(floor, a)| (floor, a.finish(floor))).collect()
    }

    pub fn latest_readings(&self) -> BTreeMap<String, TelemetryReading> {
        self.inner
            .lock()
            .latest
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Lectures d'une unité plus récentes que `since`, ordre chronologique
    pub fn history(&self, unit_id: &str, since: OffsetDateTime) -> Vec<TelemetryReading> {
        self.inner
            .lock()
            .history
            .get(unit_id)
            .map(|h| h.iter().filter(|r| r.timestamp > since).cloned().collect())
            .unwrap_or_default()
    }

    pub fn history_len(&self, unit_id: &str) -> usize {
        self.inner.lock().history.get(unit_id).map_or(0, VecDeque::len)
    }
}

impl Default for AnalyticsAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, DEFAULT_WINDOW)
    }
}
