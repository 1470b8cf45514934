// Aggregator - per-site latest readings and the silence clock
use crate::domain::reading::Reading;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct SiteAggregationState {
    units: HashMap<String, Reading>,
    last_update_at: DateTime<Utc>,
}

/// Read-only view of a site still collecting readings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingSite {
    pub site_id: String,
    pub units: Vec<String>,
    pub last_update_at: DateTime<Utc>,
}

/// Owns all in-flight aggregation state. Every method is one short critical
/// section; nothing here performs I/O while the lock is held.
#[derive(Debug, Default)]
pub struct Aggregator {
    sites: Mutex<HashMap<String, SiteAggregationState>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reading stamped with the current processing time.
    pub fn record(&self, reading: Reading) {
        self.record_at(reading, Utc::now());
    }

    /// Replace the unit's reading and restart the site's silence clock at `now`.
    pub fn record_at(&self, reading: Reading, now: DateTime<Utc>) {
        let mut sites = self.lock();
        let state = sites
            .entry(reading.site_id().to_string())
            .or_insert_with(|| SiteAggregationState {
                units: HashMap::new(),
                last_update_at: now,
            });

        state.last_update_at = state.last_update_at.max(now);
        state.units.insert(reading.unit_id().to_string(), reading);
    }

    /// Sites that have been silent for at least `timeout`, sorted by id.
    pub fn due_sites(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<String> {
        let sites = self.lock();
        let mut due: Vec<String> = sites
            .iter()
            .filter(|(_, state)| now - state.last_update_at >= timeout)
            .map(|(site_id, _)| site_id.clone())
            .collect();
        due.sort();
        due
    }

    /// Remove and return everything collected for the site. An empty map
    /// means another caller already flushed it.
    pub fn snapshot_and_clear(&self, site_id: &str) -> HashMap<String, Reading> {
        self.lock()
            .remove(site_id)
            .map(|state| state.units)
            .unwrap_or_default()
    }

    pub fn pending_sites(&self) -> Vec<PendingSite> {
        let sites = self.lock();
        let mut pending: Vec<PendingSite> = sites
            .iter()
            .map(|(site_id, state)| {
                let mut units: Vec<String> = state.units.keys().cloned().collect();
                units.sort();
                PendingSite {
                    site_id: site_id.clone(),
                    units,
                    last_update_at: state.last_update_at,
                }
            })
            .collect();
        pending.sort_by(|a, b| a.site_id.cmp(&b.site_id));
        pending
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SiteAggregationState>> {
        // A panic while holding the lock cannot leave the map half-written:
        // every mutation is a single insert or remove.
        self.sites.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn reading(site: &str, unit: &str, values: Vec<i32>) -> Reading {
        Reading::new(site, unit, values, None).unwrap()
    }

    #[test]
    fn test_record_then_snapshot_returns_exactly_what_was_recorded() {
        let aggregator = Aggregator::new();
        aggregator.record_at(reading("north-field", "u1", vec![1, 2]), fixed_now());
        aggregator.record_at(reading("north-field", "u2", vec![3]), fixed_now());

        let snapshot = aggregator.snapshot_and_clear("north-field");
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["u1"].values(), &[1, 2]);
        assert_eq!(snapshot["u2"].values(), &[3]);

        assert!(aggregator.snapshot_and_clear("north-field").is_empty());
    }

    #[test]
    fn test_later_reading_replaces_earlier_one() {
        let aggregator = Aggregator::new();
        aggregator.record_at(reading("north-field", "u1", vec![1, 1]), fixed_now());
        aggregator.record_at(reading("north-field", "u1", vec![5]), fixed_now());

        let snapshot = aggregator.snapshot_and_clear("north-field");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot["u1"].values(), &[5]);
    }

    #[test]
    fn test_due_sites_respects_timeout_boundary() {
        let aggregator = Aggregator::new();
        let timeout = Duration::seconds(180);
        aggregator.record_at(reading("a", "u1", vec![1]), fixed_now());
        aggregator.record_at(reading("b", "u1", vec![1]), fixed_now() + Duration::seconds(60));

        assert!(aggregator.due_sites(fixed_now() + Duration::seconds(179), timeout).is_empty());
        assert_eq!(
            aggregator.due_sites(fixed_now() + Duration::seconds(180), timeout),
            vec!["a".to_string()]
        );
        assert_eq!(
            aggregator.due_sites(fixed_now() + Duration::seconds(240), timeout),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_new_reading_restarts_the_clock() {
        let aggregator = Aggregator::new();
        let timeout = Duration::seconds(180);
        aggregator.record_at(reading("a", "u1", vec![1]), fixed_now());
        aggregator.record_at(reading("a", "u2", vec![1]), fixed_now() + Duration::seconds(170));

        assert!(aggregator.due_sites(fixed_now() + Duration::seconds(200), timeout).is_empty());
    }

    #[test]
    fn test_record_after_due_lands_in_next_cycle() {
        let aggregator = Aggregator::new();
        let timeout = Duration::seconds(180);
        aggregator.record_at(reading("a", "u1", vec![1]), fixed_now());

        let later = fixed_now() + Duration::seconds(200);
        assert_eq!(aggregator.due_sites(later, timeout), vec!["a".to_string()]);

        // Arrives between the scan and the flush.
        aggregator.record_at(reading("a", "u2", vec![2]), later);
        let first = aggregator.snapshot_and_clear("a");
        assert_eq!(first.len(), 2);

        aggregator.record_at(reading("a", "u1", vec![3]), later + Duration::seconds(1));
        let second = aggregator.snapshot_and_clear("a");
        assert_eq!(second["u1"].values(), &[3]);
    }

    #[test]
    fn test_snapshot_of_unknown_site_is_empty() {
        let aggregator = Aggregator::new();
        assert!(aggregator.snapshot_and_clear("nowhere").is_empty());
    }

    #[test]
    fn test_pending_sites_summary() {
        let aggregator = Aggregator::new();
        aggregator.record_at(reading("b", "u2", vec![1]), fixed_now());
        aggregator.record_at(reading("b", "u1", vec![1]), fixed_now());
        aggregator.record_at(reading("a", "u1", vec![1]), fixed_now());

        let pending = aggregator.pending_sites();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].site_id, "a");
        assert_eq!(pending[1].units, vec!["u1".to_string(), "u2".to_string()]);
    }

    #[test]
    fn test_concurrent_records_never_lose_units() {
        let aggregator = Arc::new(Aggregator::new());
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let aggregator = aggregator.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let unit = format!("u{}", worker * 50 + i);
                        aggregator.record(reading("busy", &unit, vec![i % 60]));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(aggregator.snapshot_and_clear("busy").len(), 400);
    }
}
