/**
 * ALERT LEDGER - Journal d'alertes append/acknowledge à rétention bornée
 *
 * L'attribution d'id et l'ajout se font dans une seule section critique ;
 * la diffusion `new_alert` a lieu sous le même verrou pour que les
 * observateurs reçoivent les alertes dans l'ordre croissant des ids.
 */

use crate::clock::SharedClock;
use crate::dispatcher::{Dispatcher, Topic};
use crate::error::{KernelError, KernelResult};
use crate::models::{Alert, Severity};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;

pub const DEFAULT_RETENTION: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct AlertSummary {
    pub alerts: Vec<Alert>,
    pub total: usize,
    pub unacknowledged: usize,
}

struct LedgerInner {
    last_id: u64,
    entries: VecDeque<Alert>,
}

pub struct AlertLedger {
    inner: Mutex<LedgerInner>,
    retention: usize,
    clock: SharedClock,
    dispatcher: Arc<Dispatcher>,
}

impl AlertLedger {
    pub fn new(retention: usize, clock: SharedClock, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            inner: Mutex::new(LedgerInner {
                last_id: 0,
                entries: VecDeque::with_capacity(retention + 1),
            }),
            retention: retention.max(1),
            clock,
            dispatcher,
        }
    }

    pub fn append(&self, message: impl Into<String>, severity: Severity) -> Alert {
        let mut inner = self.inner.lock();
        inner.last_id += 1;
        let alert = Alert {
            id: inner.last_id,
            timestamp: self.clock.now(),
            message: message.into(),
            severity,
            acknowledged: false,
        };
        inner.entries.push_back(alert.clone());
        while inner.entries.len() > self.retention {
            inner.entries.pop_front();
        }
        self.dispatcher.publish(Topic::NewAlert, &alert);
        drop(inner);

        tracing::debug!(alert_id = alert.id, severity = ?alert.severity, "alert appended");
        alert
    }

    /// Marque l'alerte comme acquittée. Un second acquittement ne rediffuse pas.
    pub fn acknowledge(&self, id: u64) -> KernelResult<Alert> {
        let mut inner = self.inner.lock();
        let alert = inner
            .entries
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(KernelError::NotFound(id))?;

        if alert.acknowledged {
            return Ok(alert.clone());
        }
        alert.acknowledged = true;
        let alert = alert.clone();
        self.dispatcher.publish(Topic::AlertAcknowledged, &alert);
        drop(inner);

        tracing::info!(alert_id = id, "alert acknowledged");
        Ok(alert)
    }

    /// Les `limit` alertes les plus récentes, la plus ancienne en premier
    pub fn list(&self, limit: usize) -> Vec<Alert> {
        let inner = self.inner.lock();
        let skip = inner.entries.len().saturating_sub(limit);
        inner.entries.iter().skip(skip).cloned().collect()
    }

    pub fn summary(&self) -> AlertSummary {
        let inner = self.inner.lock();
        AlertSummary {
            alerts: inner.entries.iter().cloned().collect(),
            total: inner.entries.len(),
            unacknowledged: inner.entries.iter().filter(|a| !a.acknowledged).count(),
        }
    }

    pub fn unacknowledged_count(&self) -> usize {
        self.inner.lock().entries.iter().filter(|a| !a.acknowledged).count()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::collections::HashSet;
    use time::macros::datetime;

    fn ledger(retention: usize) -> (AlertLedger, Arc<Dispatcher>) {
        let dispatcher = Arc::new(Dispatcher::new());
        let clock = Arc::new(ManualClock::new(datetime!(2025-01-01 08:00 UTC)));
        (AlertLedger::new(retention, clock, dispatcher.clone()), dispatcher)
    }

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let (ledger, _) = ledger(DEFAULT_RETENTION);
        let a = ledger.append("first", Severity::Info);
        let b = ledger.append("second", Severity::Warning);
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert!(!b.acknowledged);
        assert_eq!(b.timestamp, datetime!(2025-01-01 08:00 UTC));
    }

    #[test]
    fn test_retention_keeps_last_hundred_in_order() {
        let (ledger, _) = ledger(100);
        for i in 1..=150 {
            ledger.append(format!("alert {i}"), Severity::Info);
        }
        assert_eq!(ledger.len(), 100);

        let all = ledger.list(usize::MAX);
        let ids: Vec<u64> = all.iter().map(|a| a.id).collect();
        assert_eq!(ids, (51..=150).collect::<Vec<_>>());
        assert!(matches!(ledger.acknowledge(50), Err(KernelError::NotFound(50))));

        // ids continue after pruning
        assert_eq!(ledger.append("next", Severity::Info).id, 151);
    }

    #[test]
    fn test_list_returns_most_recent_chronologically() {
        let (ledger, _) = ledger(100);
        for i in 1..=5 {
            ledger.append(format!("alert {i}"), Severity::Info);
        }
        let ids: Vec<u64> = ledger.list(3).iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
        assert_eq!(ledger.list(0).len(), 0);
        assert_eq!(ledger.list(50).len(), 5);
    }

    #[test]
    fn test_acknowledge_unknown_and_idempotent() {
        let (ledger, dispatcher) = ledger(100);
        let alert = ledger.append("battery low", Severity::Warning);
        assert_eq!(ledger.acknowledge(999), Err(KernelError::NotFound(999)));

        let mut sub = dispatcher.subscribe();
        let first = ledger.acknowledge(alert.id).unwrap();
        let second = ledger.acknowledge(alert.id).unwrap();
        assert!(first.acknowledged && second.acknowledged);
        assert_eq!(ledger.unacknowledged_count(), 0);

        let ev = sub.try_recv().unwrap();
        assert_eq!(ev.topic, Topic::AlertAcknowledged);
        assert!(sub.try_recv().is_none(), "duplicate acknowledgment must not rebroadcast");
    }

    #[test]
    fn test_summary_counts() {
        let (ledger, _) = ledger(100);
        let a = ledger.append("a", Severity::Info);
        ledger.append("b", Severity::Critical);
        ledger.acknowledge(a.id).unwrap();
        let summary = ledger.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.unacknowledged, 1);
    }

    #[test]
    fn test_concurrent_appends_yield_unique_increasing_ids() {
        let (ledger, dispatcher) = ledger(10_000);
        let ledger = Arc::new(ledger);
        let mut sub = dispatcher.subscribe();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    (0..200)
                        .map(|i| ledger.append(format!("t{t}-{i}"), Severity::Info).id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            let ids = h.join().unwrap();
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
            for id in ids {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 1600);

        let stored: Vec<u64> = ledger.list(usize::MAX).iter().map(|a| a.id).collect();
        assert_eq!(stored, (1..=1600).collect::<Vec<_>>());

        let mut broadcast = Vec::new();
        while let Some(ev) = sub.try_recv() {
            broadcast.push(ev.payload["id"].as_u64().unwrap());
        }
        assert_eq!(broadcast, stored);
    }
}
