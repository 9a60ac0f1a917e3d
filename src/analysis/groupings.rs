//! Partitioning of flat readings into per-reservoir series.
//!
//! Input rows are already in chronological order (sources query with
//! `ORDER BY record_time ASC`). Grouping never re-sorts: order within each
//! reservoir is arrival order, and reservoirs come out in the order their
//! first row was seen.
//!
//! # Alignment
//! Every accepted row appends exactly one entry to the timestamp sequence and
//! one entry to each measurement sequence of its group, using `None` for a
//! missing value. The i-th timestamp therefore always lines up with the i-th
//! value of every measurement.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::logging::{self, Stage};
use crate::model::{ChartError, MalformedRecord, Measurement, RawRow, ReservoirRecord};

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// What to do with a row that has no reservoir name or no timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Exclude the row from every group and report it in `Grouping::rejected`.
    #[default]
    Skip,
    /// Abort the pass on the first malformed row.
    Reject,
}

// ---------------------------------------------------------------------------
// Grouped output
// ---------------------------------------------------------------------------

/// All readings for one reservoir, as index-aligned sequences.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesGroup {
    pub name: String,
    pub timestamps: Vec<String>,
    pub water_level: Vec<Option<f64>>,
    pub inflow: Vec<Option<f64>>,
    pub outflow: Vec<Option<f64>>,
    pub capacity_level: Vec<Option<f64>>,
}

impl SeriesGroup {
    fn new(name: String) -> Self {
        SeriesGroup {
            name,
            timestamps: Vec::new(),
            water_level: Vec::new(),
            inflow: Vec::new(),
            outflow: Vec::new(),
            capacity_level: Vec::new(),
        }
    }

    fn push(&mut self, record: ReservoirRecord) {
        self.timestamps.push(record.record_time);
        self.water_level.push(record.water_level);
        self.inflow.push(record.inflow);
        self.outflow.push(record.outflow);
        self.capacity_level.push(record.capacity_level);
    }

    /// Number of points (equal for the timestamps and every measurement).
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// The aligned value sequence for one measurement.
    pub fn values(&self, measurement: Measurement) -> &[Option<f64>] {
        match measurement {
            Measurement::WaterLevel => &self.water_level,
            Measurement::Inflow => &self.inflow,
            Measurement::Outflow => &self.outflow,
            Measurement::Storage => &self.capacity_level,
        }
    }

    /// How many points of `measurement` are present (not missing).
    pub fn present_count(&self, measurement: Measurement) -> usize {
        self.values(measurement).iter().filter(|v| v.is_some()).count()
    }

    pub fn last_timestamp(&self) -> Option<&str> {
        self.timestamps.last().map(String::as_str)
    }
}

/// Result of grouping one input sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Grouping {
    /// Groups keyed by reservoir name, in first-seen order.
    pub groups: IndexMap<String, SeriesGroup>,
    /// Rows excluded under `MalformedPolicy::Skip`.
    pub rejected: Vec<MalformedRecord>,
    /// `record_time` of the last accepted row, i.e. the newest reading.
    pub last_record_time: String,
}

impl Grouping {
    pub fn total_points(&self) -> usize {
        self.groups.values().map(SeriesGroup::len).sum()
    }
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Partitions `rows` by reservoir name.
///
/// Returns `ChartError::EmptyResult` when there are no rows, or when every
/// row was rejected. Duplicate (name, record_time) pairs are kept as
/// separate points.
pub fn group_rows<I>(rows: I, policy: MalformedPolicy) -> Result<Grouping, ChartError>
where
    I: IntoIterator<Item = RawRow>,
{
    let mut groups: IndexMap<String, SeriesGroup> = IndexMap::new();
    let mut rejected = Vec::new();
    let mut last_record_time = None;

    for (index, raw) in rows.into_iter().enumerate() {
        let record = match ReservoirRecord::from_raw(raw, index) {
            Ok(record) => record,
            Err(malformed) => match policy {
                MalformedPolicy::Reject => return Err(ChartError::MalformedRecord(malformed)),
                MalformedPolicy::Skip => {
                    logging::warn(Stage::Group, None, &format!("skipping {}", malformed));
                    rejected.push(malformed);
                    continue;
                }
            },
        };

        last_record_time = Some(record.record_time.clone());
        groups
            .entry(record.name.clone())
            .or_insert_with_key(|name| SeriesGroup::new(name.clone()))
            .push(record);
    }

    let last_record_time = match last_record_time {
        Some(t) => t,
        None => return Err(ChartError::EmptyResult),
    };

    for group in groups.values() {
        logging::debug(
            Stage::Group,
            Some(&group.name),
            &format!("{} points, last at {}", group.len(), group.last_timestamp().unwrap_or("-")),
        );
    }

    Ok(Grouping {
        groups,
        rejected,
        last_record_time,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MalformedReason;

    fn row(name: Option<&str>, time: &str, level: Option<f64>, inflow: Option<f64>) -> RawRow {
        RawRow {
            name: name.map(String::from),
            record_time: Some(time.to_string()),
            water_level: level,
            inflow,
            outflow: None,
            capacity_level: None,
        }
    }

    #[test]
    fn test_worked_example_groups_and_aligns() {
        let rows = vec![
            row(Some("A"), "1", Some(10.0), Some(5.0)),
            row(Some("B"), "1", Some(20.0), None),
            row(Some("A"), "2", Some(11.0), Some(6.0)),
        ];
        let grouping = group_rows(rows, MalformedPolicy::Skip).expect("should group");

        let a = &grouping.groups["A"];
        assert_eq!(a.timestamps, vec!["1", "2"]);
        assert_eq!(a.water_level, vec![Some(10.0), Some(11.0)]);
        assert_eq!(a.inflow, vec![Some(5.0), Some(6.0)]);

        let b = &grouping.groups["B"];
        assert_eq!(b.timestamps, vec!["1"]);
        assert_eq!(b.water_level, vec![Some(20.0)]);
        assert_eq!(b.inflow, vec![None], "missing inflow must stay as a gap");
    }

    #[test]
    fn test_group_order_is_first_seen_order() {
        let rows = vec![
            row(Some("官地"), "1", None, None),
            row(Some("二滩"), "1", None, None),
            row(Some("锦屏一级"), "2", None, None),
            row(Some("二滩"), "3", None, None),
            row(Some("官地"), "4", None, None),
        ];
        let grouping = group_rows(rows, MalformedPolicy::Skip).unwrap();
        let keys: Vec<_> = grouping.groups.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["官地", "二滩", "锦屏一级"]);
    }

    #[test]
    fn test_every_sequence_matches_timestamp_length() {
        let rows = vec![
            row(Some("A"), "1", None, Some(1.0)),
            row(Some("A"), "2", Some(2.0), None),
            row(Some("B"), "2", None, None),
            row(Some("A"), "3", None, None),
        ];
        let grouping = group_rows(rows, MalformedPolicy::Skip).unwrap();
        for group in grouping.groups.values() {
            for m in Measurement::ALL {
                assert_eq!(
                    group.values(m).len(),
                    group.timestamps.len(),
                    "{} misaligned for '{}'",
                    m,
                    group.name
                );
            }
        }
        assert_eq!(grouping.total_points(), 4);
    }

    #[test]
    fn test_group_count_equals_distinct_keys() {
        let names = ["x", "y", "x", "z", "y", "x"];
        let rows: Vec<_> = names
            .iter()
            .enumerate()
            .map(|(i, n)| row(Some(n), &i.to_string(), Some(i as f64), None))
            .collect();
        let grouping = group_rows(rows, MalformedPolicy::Skip).unwrap();
        assert_eq!(grouping.groups.len(), 3);
    }

    #[test]
    fn test_duplicate_name_and_time_are_kept() {
        let rows = vec![
            row(Some("A"), "1", Some(10.0), None),
            row(Some("A"), "1", Some(10.5), None),
        ];
        let grouping = group_rows(rows, MalformedPolicy::Skip).unwrap();
        assert_eq!(grouping.groups["A"].timestamps, vec!["1", "1"]);
        assert_eq!(grouping.groups["A"].water_level, vec![Some(10.0), Some(10.5)]);
    }

    #[test]
    fn test_empty_input_is_empty_result() {
        let result = group_rows(Vec::new(), MalformedPolicy::Skip);
        assert!(
            matches!(result, Err(ChartError::EmptyResult)),
            "empty input must not produce an empty success, got {:?}",
            result
        );
    }

    #[test]
    fn test_null_name_is_rejected_and_excluded() {
        let rows = vec![
            row(Some("A"), "1", Some(10.0), None),
            row(None, "2", Some(99.0), None),
            row(Some("A"), "3", Some(11.0), None),
        ];
        let grouping = group_rows(rows, MalformedPolicy::Skip).unwrap();
        assert_eq!(grouping.groups.len(), 1);
        assert_eq!(grouping.groups["A"].water_level, vec![Some(10.0), Some(11.0)]);
        assert_eq!(grouping.rejected.len(), 1);
        assert_eq!(grouping.rejected[0].index, 1);
        assert_eq!(grouping.rejected[0].reason, MalformedReason::MissingName);
    }

    #[test]
    fn test_reject_policy_aborts_on_malformed_row() {
        let rows = vec![row(Some("A"), "1", None, None), row(None, "2", None, None)];
        let result = group_rows(rows, MalformedPolicy::Reject);
        match result {
            Err(ChartError::MalformedRecord(m)) => assert_eq!(m.index, 1),
            other => panic!("expected MalformedRecord, got {:?}", other),
        }
    }

    #[test]
    fn test_all_rows_malformed_is_empty_result() {
        let rows = vec![row(None, "1", None, None), row(Some(""), "2", None, None)];
        assert!(matches!(
            group_rows(rows, MalformedPolicy::Skip),
            Err(ChartError::EmptyResult)
        ));
    }

    #[test]
    fn test_last_record_time_is_last_accepted_row() {
        let rows = vec![
            row(Some("A"), "2025-06-01 08:00:00", None, None),
            row(Some("B"), "2025-06-01 09:00:00", None, None),
            row(None, "2025-06-01 10:00:00", None, None),
        ];
        let grouping = group_rows(rows, MalformedPolicy::Skip).unwrap();
        assert_eq!(grouping.last_record_time, "2025-06-01 09:00:00");
    }

    #[test]
    fn test_present_count_ignores_gaps() {
        let rows = vec![
            row(Some("A"), "1", Some(1.0), None),
            row(Some("A"), "2", None, None),
            row(Some("A"), "3", Some(3.0), None),
        ];
        let grouping = group_rows(rows, MalformedPolicy::Skip).unwrap();
        assert_eq!(grouping.groups["A"].present_count(Measurement::WaterLevel), 2);
        assert_eq!(grouping.groups["A"].present_count(Measurement::Inflow), 0);
    }
}
