//! Record sources.
//!
//! A source yields every row of `reservoir_data` in chronological order, or
//! fails with a descriptive error. Two locators are supported:
//!
//! - a local path to a SQLite file;
//! - an `http(s)://` URL, downloaded once per pass into a scratch file and
//!   then read like a local file.
//!
//! Submodules:
//! - `gateway`: parses captured responses from the provincial water
//!   information gateway into rows for import.

pub mod gateway;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

use crate::logging::{self, Stage};
use crate::model::{ChartError, RawRow, READINGS_TABLE};

// ============================================================================
// Source trait
// ============================================================================

/// Anything that can yield the full, time-ordered row sequence.
pub trait RecordSource {
    /// Loads every row. Fails with `SourceUnavailable` when the source
    /// cannot be read and `EmptyResult` when it holds no rows.
    fn load_rows(&self) -> Result<Vec<RawRow>, ChartError>;

    /// Human-readable locator for logs and messages.
    fn describe(&self) -> String;
}

/// Picks a source implementation for a locator string.
pub fn open_source(locator: &str, http_timeout: Duration) -> Box<dyn RecordSource> {
    if locator.starts_with("http://") || locator.starts_with("https://") {
        Box::new(HttpSource::new(locator, http_timeout))
    } else {
        Box::new(SqliteSource::new(locator))
    }
}

// ============================================================================
// SQLite file
// ============================================================================

/// Reads rows from a local SQLite database file, read-only.
#[derive(Debug, Clone)]
pub struct SqliteSource {
    path: PathBuf,
}

impl SqliteSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        SqliteSource {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl RecordSource for SqliteSource {
    fn load_rows(&self) -> Result<Vec<RawRow>, ChartError> {
        if !self.path.is_file() {
            return Err(ChartError::SourceUnavailable(format!(
                "database file not found: {}",
                self.path.display()
            )));
        }

        let conn = Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let rows = read_rows(&conn)?;

        logging::info(
            Stage::Source,
            None,
            &format!("Loaded {} rows from {}", rows.len(), self.path.display()),
        );

        if rows.is_empty() {
            return Err(ChartError::EmptyResult);
        }
        Ok(rows)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// ============================================================================
// Remote file
// ============================================================================

/// Downloads a SQLite database over HTTP, then reads it like a local file.
#[derive(Debug, Clone)]
pub struct HttpSource {
    url: String,
    timeout: Duration,
}

impl HttpSource {
    pub fn new(url: &str, timeout: Duration) -> Self {
        HttpSource {
            url: url.to_string(),
            timeout,
        }
    }

    /// The URL actually requested. A millisecond timestamp parameter keeps
    /// caches and CDNs from serving a stale copy.
    pub fn request_url(&self) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}t={}", self.url, separator, Utc::now().timestamp_millis())
    }

    fn download(&self) -> Result<Vec<u8>, ChartError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;

        let response = client.get(self.request_url()).send()?;
        if !response.status().is_success() {
            return Err(ChartError::SourceUnavailable(format!(
                "HTTP error: {} fetching {}",
                response.status(),
                self.url
            )));
        }

        let bytes = response.bytes()?;
        Ok(bytes.to_vec())
    }
}

impl RecordSource for HttpSource {
    fn load_rows(&self) -> Result<Vec<RawRow>, ChartError> {
        let bytes = self.download()?;
        logging::debug(
            Stage::Source,
            None,
            &format!("Downloaded {} bytes from {}", bytes.len(), self.url),
        );

        // The scratch file must outlive the connection opened on it.
        let mut scratch = tempfile::NamedTempFile::new()?;
        scratch.write_all(&bytes)?;
        scratch.flush()?;

        SqliteSource::new(scratch.path()).load_rows()
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

// ============================================================================
// Row decoding
// ============================================================================

/// Returns whether `reservoir_data` exists in the database.
pub fn table_exists(conn: &Connection) -> Result<bool, rusqlite::Error> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [READINGS_TABLE],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Reads every row of `reservoir_data`, oldest first.
///
/// Columns are named explicitly, so a renamed or missing column fails here
/// with `SourceUnavailable`. Ties on `record_time` keep insertion order.
pub fn read_rows(conn: &Connection) -> Result<Vec<RawRow>, ChartError> {
    if !table_exists(conn)? {
        return Err(ChartError::SourceUnavailable(format!(
            "table '{}' not found",
            READINGS_TABLE
        )));
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT name, record_time, water_level, inflow, outflow, capacity_level
         FROM {} ORDER BY record_time ASC, rowid ASC",
        READINGS_TABLE
    ))?;

    let rows = stmt
        .query_map([], |row| {
            Ok(RawRow {
                name: text_value(row.get_ref(0)?),
                record_time: text_value(row.get_ref(1)?),
                water_level: number_value(row.get_ref(2)?),
                inflow: number_value(row.get_ref(3)?),
                outflow: number_value(row.get_ref(4)?),
                capacity_level: number_value(row.get_ref(5)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Text columns may hold integers when written by loosely-typed tools.
fn text_value(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Blob(_) => None,
    }
}

/// Numeric columns may hold placeholder text such as "--"; anything that is
/// not a finite number is treated as missing.
pub(crate) fn number_value(value: ValueRef<'_>) -> Option<f64> {
    let n = match value {
        ValueRef::Real(f) => f,
        ValueRef::Integer(i) => i as f64,
        ValueRef::Text(bytes) => std::str::from_utf8(bytes).ok()?.trim().parse().ok()?,
        ValueRef::Null | ValueRef::Blob(_) => return None,
    };
    n.is_finite().then_some(n)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE reservoir_data (
                id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, record_time DATETIME NOT NULL,
                water_level REAL, inflow REAL, outflow REAL, capacity_level REAL);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_rows_come_back_in_time_order() {
        let conn = memory_db();
        for (name, time, level) in [
            ("二滩", "2025-06-02 08:00:00", 1196.5),
            ("官地", "2025-06-01 08:00:00", 1329.0),
            ("二滩", "2025-06-01 08:00:00", 1196.2),
        ] {
            conn.execute(
                "INSERT INTO reservoir_data (name, record_time, water_level) VALUES (?1, ?2, ?3)",
                params![name, time, level],
            )
            .unwrap();
        }

        let rows = read_rows(&conn).unwrap();
        let order: Vec<_> = rows
            .iter()
            .map(|r| (r.name.clone().unwrap(), r.water_level.unwrap()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("官地".to_string(), 1329.0),
                ("二滩".to_string(), 1196.2),
                ("二滩".to_string(), 1196.5),
            ],
            "equal timestamps keep insertion order"
        );
    }

    #[test]
    fn test_placeholder_text_in_numeric_column_is_missing() {
        let conn = memory_db();
        conn.execute(
            "INSERT INTO reservoir_data (name, record_time, water_level, inflow, outflow)
             VALUES ('二滩', '2025-06-01 08:00:00', '--', '1540', 1300)",
            [],
        )
        .unwrap();

        let rows = read_rows(&conn).unwrap();
        assert_eq!(rows[0].water_level, None);
        assert_eq!(rows[0].inflow, Some(1540.0));
        assert_eq!(rows[0].outflow, Some(1300.0));
        assert_eq!(rows[0].capacity_level, None);
    }

    #[test]
    fn test_missing_table_is_source_unavailable() {
        let conn = Connection::open_in_memory().unwrap();
        let err = read_rows(&conn).unwrap_err();
        assert!(
            matches!(err, ChartError::SourceUnavailable(ref m) if m.contains("reservoir_data")),
            "got {:?}",
            err
        );
    }

    #[test]
    fn test_renamed_column_is_source_unavailable() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE reservoir_data (name TEXT, record_time TEXT, level REAL,
             inflow REAL, outflow REAL, capacity_level REAL);",
        )
        .unwrap();
        assert!(matches!(read_rows(&conn), Err(ChartError::SourceUnavailable(_))));
    }

    #[test]
    fn test_missing_file_is_source_unavailable() {
        let source = SqliteSource::new("/nonexistent/reservoirs.db");
        let err = source.load_rows().unwrap_err();
        assert!(err.to_string().contains("not found"), "got: {}", err);
    }

    #[test]
    fn test_request_url_adds_cache_buster() {
        let source = HttpSource::new("https://example.org/reservoirs.db", Duration::from_secs(5));
        assert!(source.request_url().starts_with("https://example.org/reservoirs.db?t="));

        let source = HttpSource::new("https://example.org/db?v=2", Duration::from_secs(5));
        assert!(source.request_url().starts_with("https://example.org/db?v=2&t="));
    }

    #[test]
    fn test_open_source_picks_by_scheme() {
        let timeout = Duration::from_secs(5);
        assert_eq!(
            open_source("https://example.org/r.db", timeout).describe(),
            "https://example.org/r.db"
        );
        assert_eq!(open_source("data/r.db", timeout).describe(), "data/r.db");
    }

    #[test]
    fn test_number_value_rejects_non_finite() {
        assert_eq!(number_value(ValueRef::Real(f64::INFINITY)), None);
        assert_eq!(number_value(ValueRef::Text(b" 12.5 ")), Some(12.5));
        assert_eq!(number_value(ValueRef::Text(b"NaN")), None);
    }
}
