/// Core data types for the reservoir chart service.
///
/// This module defines the shared domain model imported by all other modules:
/// the fixed measurement schema, raw and validated row types, and the error
/// taxonomy for a render pass. It contains no I/O.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Measurement schema
// ---------------------------------------------------------------------------

/// Name of the table every reservoir database stores its readings in.
pub const READINGS_TABLE: &str = "reservoir_data";

/// The fixed set of numeric measurements carried by every reading.
///
/// Each variant maps to exactly one column of `reservoir_data`. Series
/// construction iterates this enum instead of reading arbitrary named
/// fields, so a renamed column fails when the source is queried rather
/// than yielding an empty series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measurement {
    /// Reservoir water level, metres above datum.
    WaterLevel,
    /// Inflow, cubic metres per second.
    Inflow,
    /// Outflow, cubic metres per second.
    Outflow,
    /// Storage volume, hundred-million cubic metres.
    #[serde(alias = "capacity_level")]
    Storage,
}

impl Measurement {
    /// All measurements, in column order.
    pub const ALL: [Measurement; 4] = [
        Measurement::WaterLevel,
        Measurement::Inflow,
        Measurement::Outflow,
        Measurement::Storage,
    ];

    /// Column name in `reservoir_data`.
    pub fn column(self) -> &'static str {
        match self {
            Measurement::WaterLevel => "water_level",
            Measurement::Inflow => "inflow",
            Measurement::Outflow => "outflow",
            Measurement::Storage => "capacity_level",
        }
    }

    /// Series label shown in chart legends.
    pub fn label(self) -> &'static str {
        match self {
            Measurement::WaterLevel => "水位",
            Measurement::Inflow => "入库",
            Measurement::Outflow => "出库",
            Measurement::Storage => "蓄量",
        }
    }

    /// Display unit.
    pub fn unit(self) -> &'static str {
        match self {
            Measurement::WaterLevel => "m",
            Measurement::Inflow | Measurement::Outflow => "m³/s",
            Measurement::Storage => "亿m³",
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// One row as read from a source, before validation.
///
/// Every column is optional here because the underlying table is loosely
/// typed; `ReservoirRecord::from_raw` decides which gaps are fatal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub name: Option<String>,
    pub record_time: Option<String>,
    pub water_level: Option<f64>,
    pub inflow: Option<f64>,
    pub outflow: Option<f64>,
    pub capacity_level: Option<f64>,
}

/// A validated reading for one reservoir at one point in time.
///
/// `name` and `record_time` are guaranteed non-blank. Individual
/// measurements may still be missing; that is recoverable and surfaces as
/// a gap in the chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReservoirRecord {
    pub name: String,
    pub record_time: String, // e.g. "2025-06-01 08:00:00", sortable as text
    pub water_level: Option<f64>,
    pub inflow: Option<f64>,
    pub outflow: Option<f64>,
    pub capacity_level: Option<f64>,
}

impl ReservoirRecord {
    /// Validates a raw row. `index` is the row's position in the input and
    /// is only used for error reporting.
    pub fn from_raw(raw: RawRow, index: usize) -> Result<Self, MalformedRecord> {
        let name = match raw.name.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => {
                return Err(MalformedRecord {
                    index,
                    reason: MalformedReason::MissingName,
                    record_time: raw.record_time,
                });
            }
        };
        let record_time = match raw.record_time.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => {
                return Err(MalformedRecord {
                    index,
                    reason: MalformedReason::MissingTimestamp { name },
                    record_time: None,
                });
            }
        };

        Ok(ReservoirRecord {
            name,
            record_time,
            water_level: raw.water_level,
            inflow: raw.inflow,
            outflow: raw.outflow,
            capacity_level: raw.capacity_level,
        })
    }

    /// Reads one measurement off the record.
    pub fn value(&self, measurement: Measurement) -> Option<f64> {
        match measurement {
            Measurement::WaterLevel => self.water_level,
            Measurement::Inflow => self.inflow,
            Measurement::Outflow => self.outflow,
            Measurement::Storage => self.capacity_level,
        }
    }
}

// ---------------------------------------------------------------------------
// Malformed rows
// ---------------------------------------------------------------------------

/// Why a row could not be used as a reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MalformedReason {
    /// The reservoir name was null or blank.
    MissingName,
    /// The timestamp was null or blank.
    MissingTimestamp { name: String },
}

/// A row rejected during validation, kept so callers can report it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedRecord {
    /// Zero-based position in the input sequence.
    pub index: usize,
    pub reason: MalformedReason,
    pub record_time: Option<String>,
}

impl fmt::Display for MalformedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            MalformedReason::MissingName => write!(
                f,
                "row {} has no reservoir name (record_time: {})",
                self.index,
                self.record_time.as_deref().unwrap_or("null")
            ),
            MalformedReason::MissingTimestamp { name } => {
                write!(f, "row {} for '{}' has no record_time", self.index, name)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that end a render pass.
///
/// Every variant is terminal: the pipeline shows one message and renders no
/// partial charts.
#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    /// The source could not be fetched or decoded (missing file, HTTP
    /// failure, not a SQLite database, missing table or column).
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    /// The source was readable but held no usable records.
    #[error("no data: the source contains no reservoir records")]
    EmptyResult,
    /// A row lacked its reservoir name or timestamp.
    #[error("malformed record: {0}")]
    MalformedRecord(MalformedRecord),
    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
    /// Writing output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for ChartError {
    fn from(e: rusqlite::Error) -> Self {
        ChartError::SourceUnavailable(format!("SQLite error: {}", e))
    }
}

impl From<reqwest::Error> for ChartError {
    fn from(e: reqwest::Error) -> Self {
        ChartError::SourceUnavailable(format!("HTTP error: {}", e))
    }
}

impl From<toml::de::Error> for ChartError {
    fn from(e: toml::de::Error) -> Self {
        ChartError::Config(format!("invalid TOML: {}", e))
    }
}

impl From<serde_json::Error> for ChartError {
    fn from(e: serde_json::Error) -> Self {
        ChartError::SourceUnavailable(format!("Parse error: {}", e))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
