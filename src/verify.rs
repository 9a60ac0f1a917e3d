//! Source verification.
//!
//! Checks a reservoir database before it is published: which of the
//! registered reservoirs have readings, how complete each measurement is,
//! how fresh the newest reading is, and which rows are malformed. Unlike a
//! render pass, verification never stops at the first bad row.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

use crate::alert::staleness::{self, FreshnessConfig};
use crate::ingest::RecordSource;
use crate::model::{ChartError, MalformedRecord, Measurement, ReservoirRecord};
use crate::reservoirs::RESERVOIR_REGISTRY;

// ============================================================================
// Verification Results
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub timestamp: String,
    pub source: String,
    pub total_rows: usize,
    pub reservoirs: Vec<ReservoirVerification>,
    /// Names found in the data that are not in the registry.
    pub unregistered: Vec<String>,
    pub malformed: Vec<MalformedRecord>,
    pub summary: VerificationSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationSummary {
    pub registered_total: usize,
    pub working: usize,
    pub partial: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReservoirVerification {
    pub name: String,
    pub status: VerificationStatus,
    pub row_count: usize,
    pub first_record_time: Option<String>,
    pub last_record_time: Option<String>,
    pub stale: bool,
    /// Missing values per measurement column, in column order.
    pub missing_values: IndexMap<Measurement, usize>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum VerificationStatus {
    Success,
    PartialSuccess,
    Failed,
}

impl ReservoirVerification {
    fn empty(name: &str) -> Self {
        ReservoirVerification {
            name: name.to_string(),
            status: VerificationStatus::Failed,
            row_count: 0,
            first_record_time: None,
            last_record_time: None,
            stale: false,
            missing_values: Measurement::ALL.iter().map(|m| (*m, 0)).collect(),
            error_message: None,
        }
    }

    fn add(&mut self, record: &ReservoirRecord) {
        if self.first_record_time.is_none() {
            self.first_record_time = Some(record.record_time.clone());
        }
        self.last_record_time = Some(record.record_time.clone());
        self.row_count += 1;
        for m in Measurement::ALL {
            if record.value(m).is_none() {
                *self.missing_values.entry(m).or_insert(0) += 1;
            }
        }
    }

    /// Sets `status` from what was collected.
    fn conclude(&mut self, freshness: &FreshnessConfig, now: DateTime<Utc>) {
        let Some(last) = self.last_record_time.as_deref() else {
            self.status = VerificationStatus::Failed;
            self.error_message = Some("no readings".to_string());
            return;
        };

        let mut problems = Vec::new();
        match staleness::is_stale_at(last, freshness, now) {
            Ok(true) => {
                self.stale = true;
                problems.push(format!("newest reading {} is stale", last));
            }
            Ok(false) => {}
            Err(e) => {
                self.stale = true;
                problems.push(e);
            }
        }
        for (m, missing) in &self.missing_values {
            if *missing == self.row_count {
                problems.push(format!("{} is never recorded", m));
            }
        }

        if problems.is_empty() {
            self.status = VerificationStatus::Success;
        } else {
            self.status = VerificationStatus::PartialSuccess;
            self.error_message = Some(problems.join("; "));
        }
    }
}

// ============================================================================
// Verification
// ============================================================================

/// Verifies `source` against the reservoir registry at time `now`.
///
/// Only a source that cannot be read at all is an error; an empty table
/// yields a report where every reservoir failed.
pub fn verify_source_at(
    source: &dyn RecordSource,
    freshness: &FreshnessConfig,
    now: DateTime<Utc>,
) -> Result<VerificationReport, ChartError> {
    let rows = match source.load_rows() {
        Ok(rows) => rows,
        Err(ChartError::EmptyResult) => Vec::new(),
        Err(e) => return Err(e),
    };
    let total_rows = rows.len();

    let mut by_name: IndexMap<String, ReservoirVerification> = RESERVOIR_REGISTRY
        .iter()
        .map(|r| (r.name.to_string(), ReservoirVerification::empty(r.name)))
        .collect();
    let registered_total = by_name.len();
    let mut malformed = Vec::new();

    for (index, raw) in rows.into_iter().enumerate() {
        match ReservoirRecord::from_raw(raw, index) {
            Ok(record) => by_name
                .entry(record.name.clone())
                .or_insert_with_key(|name| ReservoirVerification::empty(name))
                .add(&record),
            Err(bad) => malformed.push(bad),
        }
    }

    for entry in by_name.values_mut() {
        entry.conclude(freshness, now);
    }

    let reservoirs: Vec<ReservoirVerification> = by_name.into_values().collect();
    let unregistered = reservoirs[registered_total..]
        .iter()
        .map(|r| r.name.clone())
        .collect();

    let registered = &reservoirs[..registered_total];
    let count = |status: VerificationStatus| registered.iter().filter(|r| r.status == status).count();
    let summary = VerificationSummary {
        registered_total,
        working: count(VerificationStatus::Success),
        partial: count(VerificationStatus::PartialSuccess),
        failed: count(VerificationStatus::Failed),
    };

    Ok(VerificationReport {
        timestamp: now.to_rfc3339(),
        source: source.describe(),
        total_rows,
        reservoirs,
        unregistered,
        malformed,
        summary,
    })
}

pub fn verify_source(
    source: &dyn RecordSource,
    freshness: &FreshnessConfig,
) -> Result<VerificationReport, ChartError> {
    verify_source_at(source, freshness, Utc::now())
}

pub fn print_summary(report: &VerificationReport) {
    println!("\n═══════════════════════════════════════════════════════════");
    println!("VERIFICATION SUMMARY: {}", report.source);
    println!("═══════════════════════════════════════════════════════════");
    println!("Rows: {}  Malformed: {}", report.total_rows, report.malformed.len());
    println!();

    for r in &report.reservoirs {
        let mark = match r.status {
            VerificationStatus::Success => "✓",
            VerificationStatus::PartialSuccess => "⚠",
            VerificationStatus::Failed => "✗",
        };
        print!("{} {:<8} {:>6} rows", mark, r.name, r.row_count);
        if let (Some(first), Some(last)) = (&r.first_record_time, &r.last_record_time) {
            print!("  {} → {}", first, last);
        }
        println!();
        if let Some(msg) = &r.error_message {
            println!("    {}", msg);
        }
    }

    if !report.unregistered.is_empty() {
        println!("\nNot in registry: {}", report.unregistered.join(", "));
    }
    for bad in report.malformed.iter().take(10) {
        println!("  malformed: {}", bad);
    }

    println!();
    println!(
        "Registered reservoirs: {}/{} working ({} partial, {} failed)",
        report.summary.working, report.summary.registered_total, report.summary.partial, report.summary.failed
    );
    println!("═══════════════════════════════════════════════════════════");
}

// ============================================================================
// Tests
// ============================================================================
