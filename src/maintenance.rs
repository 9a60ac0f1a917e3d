//! Database maintenance operations.
//!
//! One-shot repairs applied to a reservoir database between render passes:
//! schema creation, storage unit repair, duplicate removal, and merging in
//! an older database. Each returns counts so the CLI can report what
//! changed.

use std::path::Path;

use rusqlite::Connection;
use serde::Serialize;

use crate::ingest::table_exists;
use crate::logging::{self, Stage};
use crate::model::{ChartError, READINGS_TABLE};

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Creates `reservoir_data` if it does not exist.
pub fn init_schema(conn: &Connection) -> Result<(), ChartError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            record_time DATETIME NOT NULL,
            water_level REAL,
            inflow REAL,
            outflow REAL,
            capacity_level REAL
        );",
        READINGS_TABLE
    ))?;
    Ok(())
}

fn require_table(conn: &Connection) -> Result<(), ChartError> {
    if table_exists(conn)? {
        Ok(())
    } else {
        Err(ChartError::SourceUnavailable(format!(
            "table '{}' not found",
            READINGS_TABLE
        )))
    }
}

fn count_rows(conn: &Connection) -> Result<usize, ChartError> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", READINGS_TABLE), [], |r| {
        r.get(0)
    })?;
    Ok(count as usize)
}

// ---------------------------------------------------------------------------
// Storage unit repair
// ---------------------------------------------------------------------------

/// Multiplies storage values below 1 by 100.
///
/// Some imported rows hold storage in the wrong unit, a hundred times too
/// small. No reservoir in the cascade holds less than 1 亿m³, so any value
/// in (0, 1) is one of those rows. Returns the number of rows changed.
pub fn fix_storage_scale(conn: &Connection) -> Result<usize, ChartError> {
    require_table(conn)?;
    let changed = conn.execute(
        &format!(
            "UPDATE {} SET capacity_level = capacity_level * 100
             WHERE capacity_level < 1 AND capacity_level > 0",
            READINGS_TABLE
        ),
        [],
    )?;
    logging::info(
        Stage::Database,
        None,
        &format!("Storage scale fixed on {} rows", changed),
    );
    Ok(changed)
}

// ---------------------------------------------------------------------------
// Duplicate removal
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DedupReport {
    pub before: usize,
    pub after: usize,
}

impl DedupReport {
    pub fn removed(&self) -> usize {
        self.before - self.after
    }
}

/// Deletes repeated readings, keeping the oldest row of each group.
///
/// Rows are duplicates when name and all four measurements match; the
/// timestamp is ignored, since the importer re-stores unchanged gateway
/// values on every run. NULLs compare equal for this purpose.
pub fn remove_duplicates(conn: &Connection) -> Result<DedupReport, ChartError> {
    require_table(conn)?;
    let before = count_rows(conn)?;

    conn.execute(
        &format!(
            "DELETE FROM {table}
             WHERE rowid NOT IN (
                 SELECT MIN(rowid) FROM {table}
                 GROUP BY name, water_level, inflow, outflow, capacity_level
             )",
            table = READINGS_TABLE
        ),
        [],
    )?;

    let after = count_rows(conn)?;
    let report = DedupReport { before, after };
    logging::info(
        Stage::Database,
        None,
        &format!(
            "Removed {} duplicate rows, {} unique rows remain",
            report.removed(),
            after
        ),
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Appends every reading from the database at `other` to `conn`.
///
/// Ids are not copied; merged rows get fresh ids. Returns the number of rows
/// inserted.
pub fn merge_from(conn: &mut Connection, other: &Path) -> Result<usize, ChartError> {
    if !other.is_file() {
        return Err(ChartError::SourceUnavailable(format!(
            "database file not found: {}",
            other.display()
        )));
    }
    init_schema(conn)?;

    let other_path = other.to_string_lossy().into_owned();
    conn.execute("ATTACH DATABASE ?1 AS old", [&other_path])?;

    let result = (|| -> Result<usize, ChartError> {
        let present: i64 = conn.query_row(
            "SELECT COUNT(*) FROM old.sqlite_master WHERE type = 'table' AND name = ?1",
            [READINGS_TABLE],
            |r| r.get(0),
        )?;
        if present == 0 {
            return Err(ChartError::SourceUnavailable(format!(
                "table '{}' not found in {}",
                READINGS_TABLE,
                other.display()
            )));
        }

        let tx = conn.transaction()?;
        let inserted = tx.execute(
            &format!(
                "INSERT INTO main.{table} (name, record_time, water_level, inflow, outflow, capacity_level)
                 SELECT name, record_time, water_level, inflow, outflow, capacity_level
                 FROM old.{table}",
                table = READINGS_TABLE
            ),
            [],
        )?;
        tx.commit()?;
        Ok(inserted)
    })();

    let detached = conn.execute("DETACH DATABASE old", []);
    let inserted = settle_merge(result, detached, other)?;
    logging::info(
        Stage::Database,
        None,
        &format!("Merged {} rows from {}", inserted, other.display()),
    );
    Ok(inserted)
}

/// A merge error outranks a DETACH error; the latter is then only logged.
fn settle_merge(
    result: Result<usize, ChartError>,
    detached: rusqlite::Result<usize>,
    other: &Path,
) -> Result<usize, ChartError> {
    match (result, detached) {
        (Ok(inserted), Ok(_)) => Ok(inserted),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), Ok(_)) => Err(e),
        (Err(e), Err(detach_err)) => {
            logging::warn(
                Stage::Database,
                None,
                &format!("could not detach {}: {}", other.display(), detach_err),
            );
            Err(e)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
