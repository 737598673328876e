//! Per-device aggregation over the reading store.
//!
//! The query is match, sort by timestamp descending, group by device,
//! computing the all-time mean, the first value of each group (the most
//! recent reading) and the group size. Backends with their own ordered
//! scans feed [`SnapshotAccumulator`] directly; everything else goes
//! through [`aggregate_readings`].

use std::collections::{HashMap, HashSet};

use crate::domain::{AggregateSnapshot, Reading};

/// Running fold for one device group
///
/// Values must be observed newest first; the first observed value becomes
/// the snapshot's `last`.
#[derive(Debug, Clone, Default)]
pub struct SnapshotAccumulator {
    sum: f64,
    count: u64,
    first: Option<f64>,
}

impl SnapshotAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, value: f64) {
        if self.first.is_none() {
            self.first = Some(value);
        }
        self.sum += value;
        self.count += 1;
    }

    /// `None` when nothing was observed; absent devices produce no snapshot
    pub fn finish(&self) -> Option<AggregateSnapshot> {
        let last = self.first?;
        Some(AggregateSnapshot {
            average: self.sum / self.count as f64,
            last,
            count: self.count,
        })
    }
}

/// Aggregate readings for the given devices
///
/// Devices without readings are absent from the result. Ties on timestamp
/// resolve to whichever tied reading the sort leaves first; callers must
/// not depend on a particular one.
pub fn aggregate_readings<'a, I>(
    readings: I,
    device_ids: &[String],
) -> HashMap<String, AggregateSnapshot>
where
    I: IntoIterator<Item = &'a Reading>,
{
    if device_ids.is_empty() {
        return HashMap::new();
    }

    let wanted: HashSet<&str> = device_ids.iter().map(String::as_str).collect();

    let mut matched: Vec<&Reading> = readings
        .into_iter()
        .filter(|r| wanted.contains(r.device_id.as_str()))
        .collect();

    matched.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));

    let mut groups: HashMap<&str, SnapshotAccumulator> = HashMap::new();
    for reading in matched {
        groups
            .entry(reading.device_id.as_str())
            .or_default()
            .observe(reading.value);
    }

    groups
        .into_iter()
        .filter_map(|(device_id, acc)| acc.finish().map(|s| (device_id.to_string(), s)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(device_id: &str, timestamp_ms: i64, value: f64) -> Reading {
        Reading {
            device_id: device_id.to_string(),
            reading_id: format!("{}-{}", device_id, timestamp_ms),
            timestamp_ms,
            value,
            kind: "real-time-read".to_string(),
        }
    }

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_input_yields_empty_result() {
        let readings = vec![reading("a", 1, 10.0)];
        assert!(aggregate_readings(&readings, &[]).is_empty());
    }

    #[test]
    fn test_devices_without_readings_are_absent() {
        let readings = vec![reading("a", 1, 10.0)];
        let result = aggregate_readings(&readings, &ids(&["b", "c"]));

        assert!(result.is_empty());
    }

    #[test]
    fn test_single_reading_snapshot() {
        let readings = vec![reading("a", 1, 42.5)];
        let result = aggregate_readings(&readings, &ids(&["a"]));

        let snapshot = result.get("a").unwrap();
        assert_eq!(snapshot.average, 42.5);
        assert_eq!(snapshot.last, 42.5);
        assert_eq!(snapshot.count, 1);
    }

    #[test]
    fn test_last_is_most_recent_regardless_of_insertion_order() {
        let readings = vec![
            reading("a", 200, 70.0),
            reading("a", 300, 90.0),
            reading("a", 100, 20.0),
        ];
        let result = aggregate_readings(&readings, &ids(&["a"]));

        let snapshot = result.get("a").unwrap();
        assert_eq!(snapshot.last, 90.0);
        assert_eq!(snapshot.count, 3);
        assert!((snapshot.average - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_filters_to_requested_devices() {
        let readings = vec![
            reading("a", 1, 10.0),
            reading("b", 2, 20.0),
            reading("c", 3, 30.0),
        ];
        let result = aggregate_readings(&readings, &ids(&["a", "c"]));

        assert_eq!(result.len(), 2);
        assert!(result.contains_key("a"));
        assert!(result.contains_key("c"));
        assert!(!result.contains_key("b"));
    }

    #[test]
    fn test_duplicate_ids_do_not_double_count() {
        let readings = vec![reading("a", 1, 10.0), reading("a", 2, 30.0)];
        let result = aggregate_readings(&readings, &ids(&["a", "a"]));

        assert_eq!(result.get("a").unwrap().count, 2);
    }

    #[test]
    fn test_accumulator_without_values() {
        assert!(SnapshotAccumulator::new().finish().is_none());
    }

    #[test]
    fn test_accumulator_takes_first_observed_as_last() {
        let mut acc = SnapshotAccumulator::new();
        acc.observe(90.0);
        acc.observe(30.0);

        let snapshot = acc.finish().unwrap();
        assert_eq!(snapshot.last, 90.0);
        assert_eq!(snapshot.average, 60.0);
        assert_eq!(snapshot.count, 2);
    }

    mod properties {
        use super::*;
        use crate::test_utils::generators;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(200))]

            /// Counts add up to the number of matching readings
            #[test]
            fn prop_counts_match_input(history in generators::readings(60)) {
                let all_ids: Vec<String> = (0..8).map(|n| format!("dev-{}", n)).collect();
                let result = aggregate_readings(&history, &all_ids);

                let total: u64 = result.values().map(|s| s.count).sum();
                prop_assert_eq!(total as usize, history.len());
            }

            /// `last` belongs to a reading with the device's maximum timestamp
            #[test]
            fn prop_last_has_max_timestamp(history in generators::readings(60)) {
                let all_ids: Vec<String> = (0..8).map(|n| format!("dev-{}", n)).collect();
                let result = aggregate_readings(&history, &all_ids);

                for (device_id, snapshot) in &result {
                    let max_ts = history
                        .iter()
                        .filter(|r| &r.device_id == device_id)
                        .map(|r| r.timestamp_ms)
                        .max()
                        .unwrap();
                    let candidates: Vec<f64> = history
                        .iter()
                        .filter(|r| &r.device_id == device_id && r.timestamp_ms == max_ts)
                        .map(|r| r.value)
                        .collect();

                    prop_assert!(candidates.contains(&snapshot.last));
                }
            }

            /// The average lies between the device's minimum and maximum value
            #[test]
            fn prop_average_within_bounds(history in generators::readings(60)) {
                let all_ids: Vec<String> = (0..8).map(|n| format!("dev-{}", n)).collect();
                let result = aggregate_readings(&history, &all_ids);

                for (device_id, snapshot) in &result {
                    let values: Vec<f64> = history
                        .iter()
                        .filter(|r| &r.device_id == device_id)
                        .map(|r| r.value)
                        .collect();
                    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
                    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

                    prop_assert!(snapshot.average >= min - 1e-9);
                    prop_assert!(snapshot.average <= max + 1e-9);
                }
            }
        }
    }
}
