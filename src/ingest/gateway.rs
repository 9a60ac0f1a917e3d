/// Provincial water information gateway response parsing
///
/// The public reservoir dashboard answers each station search with a
/// `gateway.do` response whose `data` field is itself a JSON document encoded
/// as a string. The real payload lives at `result.data.list[]` inside that
/// inner document, one entry per matching station.
///
/// Capturing those responses needs a scripted browser session and is done
/// outside this crate; this module turns saved response bodies into rows.
///
/// Inner field names (pinyin abbreviations used by the gateway):
///   zhanming → station name
///   ksw      → water level (m)
///   rkll     → inflow (m³/s)
///   ckll     → outflow (m³/s)
///   xsl      → storage (万m³)

use rusqlite::{params, Connection};
use serde::Deserialize;
use serde_json::Value;

use crate::logging::{self, Stage};
use crate::model::{ChartError, RawRow, READINGS_TABLE};

/// 万m³ per 亿m³.
const STORAGE_UNIT_DIVISOR: f64 = 10_000.0;

// ============================================================================
// Response Structures
// ============================================================================

/// Outer envelope of a gateway response.
#[derive(Debug, Deserialize)]
pub struct GatewayEnvelope {
    pub data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct InnerDocument {
    result: Option<InnerResult>,
}

#[derive(Debug, Deserialize)]
struct InnerResult {
    data: Option<InnerData>,
}

#[derive(Debug, Deserialize)]
struct InnerData {
    #[serde(default)]
    list: Vec<GatewayStation>,
}

/// One station entry. Values arrive as strings ("1199.52", "--") or,
/// occasionally, bare numbers.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GatewayStation {
    #[serde(rename = "zhanming")]
    pub name: Option<String>,
    #[serde(rename = "ksw")]
    pub water_level: Option<Value>,
    #[serde(rename = "rkll")]
    pub inflow: Option<Value>,
    #[serde(rename = "ckll")]
    pub outflow: Option<Value>,
    #[serde(rename = "xsl")]
    pub storage_wan_m3: Option<Value>,
}

// ============================================================================
// Parsing
// ============================================================================

/// Unwraps both JSON layers and returns the station list.
///
/// An envelope without a `data` string is an error. An inner document
/// without a station list yields an empty list.
pub fn parse_gateway_response(body: &str) -> Result<Vec<GatewayStation>, ChartError> {
    let envelope: GatewayEnvelope = serde_json::from_str(body)?;

    let inner_text = match envelope.data {
        Some(Value::String(s)) => s,
        Some(other) => {
            return Err(ChartError::SourceUnavailable(format!(
                "gateway 'data' field is not a string (got {})",
                json_type(&other)
            )));
        }
        None => {
            return Err(ChartError::SourceUnavailable(
                "gateway response has no 'data' field".to_string(),
            ));
        }
    };

    let inner: InnerDocument = serde_json::from_str(&inner_text)?;
    let list = inner
        .result
        .and_then(|r| r.data)
        .map(|d| d.list)
        .unwrap_or_default();

    if list.is_empty() {
        logging::warn(Stage::Source, None, "gateway response contained no station list");
    }
    Ok(list)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parses a gateway value. "--", empty strings and non-numeric text are
/// missing.
fn reading(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || s == "--" {
                return None;
            }
            s.parse().ok()?
        }
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// The first station in `stations` whose name matches `name` exactly.
///
/// Searches are fuzzy on the gateway side ("二滩" also returns "二滩水文站"
/// style entries), so only an exact match is accepted.
pub fn select_station<'a>(stations: &'a [GatewayStation], name: &str) -> Option<&'a GatewayStation> {
    stations.iter().find(|s| s.name.as_deref() == Some(name))
}

impl GatewayStation {
    /// Converts the entry to a row stamped with `record_time`, storage
    /// rescaled from 万m³ to 亿m³.
    pub fn to_raw_row(&self, record_time: &str) -> RawRow {
        RawRow {
            name: self.name.clone(),
            record_time: Some(record_time.to_string()),
            water_level: reading(self.water_level.as_ref()),
            inflow: reading(self.inflow.as_ref()),
            outflow: reading(self.outflow.as_ref()),
            capacity_level: reading(self.storage_wan_m3.as_ref()).map(|v| v / STORAGE_UNIT_DIVISOR),
        }
    }
}

/// Picks one entry per requested reservoir across all captured responses.
/// Names with no exact match are logged and skipped.
pub fn collect_readings(responses: &[Vec<GatewayStation>], names: &[&str], record_time: &str) -> Vec<RawRow> {
    let mut rows = Vec::new();
    for name in names {
        match responses.iter().find_map(|stations| select_station(stations, name)) {
            Some(station) => rows.push(station.to_raw_row(record_time)),
            None => logging::warn(
                Stage::Source,
                Some(name),
                "no exact match in captured gateway responses",
            ),
        }
    }
    rows
}

// ============================================================================
// Import
// ============================================================================

/// Appends rows to `reservoir_data` in one transaction. Rows without a name
/// or timestamp are skipped. Returns the number inserted.
pub fn import_rows(conn: &mut Connection, rows: &[RawRow]) -> Result<usize, ChartError> {
    let tx = conn.transaction()?;
    let mut inserted = 0;
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {} (name, record_time, water_level, inflow, outflow, capacity_level)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            READINGS_TABLE
        ))?;
        for row in rows {
            let (Some(name), Some(time)) = (&row.name, &row.record_time) else {
                logging::warn(Stage::Database, None, "skipping import row without name or time");
                continue;
            };
            stmt.execute(params![
                name,
                time,
                row.water_level,
                row.inflow,
                row.outflow,
                row.capacity_level
            ])?;
            logging::info(
                Stage::Database,
                Some(name),
                &format!(
                    "stored reading (level: {})",
                    row.water_level.map(|v| v.to_string()).unwrap_or_else(|| "--".into())
                ),
            );
            inserted += 1;
        }
    }
    tx.commit()?;
    Ok(inserted)
}

// ============================================================================
// Tests
// ============================================================================
