use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use aegis_core::MatchResult;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row, ToSql};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::StoreError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sigma_matches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    rule_title TEXT NOT NULL,
    rule_level TEXT NOT NULL,
    log_source TEXT NOT NULL,
    detection_details TEXT NOT NULL,
    log_entry TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sigma_matches_timestamp
    ON sigma_matches(timestamp);
"#;

/// Fixed-width UTC form so stored timestamps sort lexicographically.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: String) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|source| StoreError::Timestamp { value, source })
}

/// A persisted match with its row id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMatch {
    pub id: i64,
    #[serde(flatten)]
    pub result: MatchResult,
}

/// Filters for [`MatchStore::list_matches`]. The default lists everything.
#[derive(Debug, Clone, Default)]
pub struct MatchQuery {
    /// Only rows with an id strictly greater than this.
    pub since_id: Option<i64>,
    /// Only rows detected at or after this instant.
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// SQLite-backed match store.
pub struct MatchStore {
    conn: Mutex<Connection>,
}

impl MatchStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let store = Self::from_connection(Connection::open(path)?)?;
        info!(path = %path.display(), "match store opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Persist a batch in one transaction. Either every row is written or,
    /// on error, none is.
    pub fn insert_batch(&self, matches: &[MatchResult]) -> Result<usize, StoreError> {
        if matches.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO sigma_matches
                    (timestamp, rule_title, rule_level, log_source, detection_details, log_entry)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for m in matches {
                stmt.execute(params![
                    format_timestamp(&m.timestamp),
                    m.rule_title,
                    m.rule_level,
                    m.log_source,
                    m.detection_details,
                    m.log_entry,
                ])?;
            }
        }
        // Dropping an uncommitted transaction rolls it back.
        tx.commit()?;

        debug!(rows = matches.len(), "match batch committed");
        Ok(matches.len())
    }

    /// Matches newest-first (by id), filtered by `query`.
    pub fn list_matches(&self, query: &MatchQuery) -> Result<Vec<StoredMatch>, StoreError> {
        let mut sql = String::from(
            "SELECT id, timestamp, rule_title, rule_level, log_source, detection_details, log_entry
             FROM sigma_matches WHERE 1=1",
        );
        let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(id) = query.since_id {
            sql.push_str(" AND id > ?");
            params_vec.push(Box::new(id));
        }
        if let Some(since) = &query.since {
            sql.push_str(" AND timestamp >= ?");
            params_vec.push(Box::new(format_timestamp(since)));
        }
        sql.push_str(" ORDER BY id DESC");
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            params_vec.push(Box::new(i64::try_from(limit).unwrap_or(i64::MAX)));
        }

        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_refs.as_slice())?;

        let mut matches = Vec::new();
        while let Some(row) = rows.next()? {
            match Self::row_to_match(row) {
                Ok(m) => matches.push(m),
                Err(StoreError::Timestamp { value, source }) => {
                    warn!(
                        value = %value,
                        error = %source,
                        "skipping row with unreadable timestamp"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(matches)
    }

    fn row_to_match(row: &Row<'_>) -> Result<StoredMatch, StoreError> {
        let timestamp: String = row.get(1)?;
        Ok(StoredMatch {
            id: row.get(0)?,
            result: MatchResult {
                timestamp: parse_timestamp(timestamp)?,
                rule_title: row.get(2)?,
                rule_level: row.get(3)?,
                log_source: row.get(4)?,
                detection_details: row.get(5)?,
                log_entry: row.get(6)?,
            },
        })
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM sigma_matches", [], |r| r.get(0))?;
        Ok(u64::try_from(total).unwrap_or(0))
    }
}
