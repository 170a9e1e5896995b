use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::activity::{ActivityKind, Interval};
use crate::tracker::IntervalSink;

pub type SharedConn = Arc<Mutex<Connection>>;

pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS intervals (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  kind TEXT NOT NULL,
  identifier TEXT NOT NULL,
  title TEXT,
  description TEXT,
  full_locator TEXT,
  start_time INTEGER NOT NULL,
  end_time INTEGER NOT NULL,
  CHECK (end_time > start_time)
);
CREATE INDEX IF NOT EXISTS idx_intervals_start ON intervals(start_time);

CREATE TABLE IF NOT EXISTS category_overrides (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  kind TEXT NOT NULL,
  identifier TEXT NOT NULL UNIQUE,
  category TEXT NOT NULL,
  productivity INTEGER NOT NULL DEFAULT 0
);
"#,
    )
}

/// A persisted interval with its surrogate key.
#[derive(Clone, Debug)]
pub struct StoredInterval {
    pub id: i64,
    pub interval: Interval,
}

pub(crate) fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

fn interval_from_row(row: &Row<'_>) -> rusqlite::Result<StoredInterval> {
    let kind_s: String = row.get(1)?;
    let kind = ActivityKind::parse(&kind_s).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown activity kind '{kind_s}'").into(),
        )
    })?;
    Ok(StoredInterval {
        id: row.get(0)?,
        interval: Interval {
            kind,
            identifier: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            full_locator: row.get(5)?,
            start_time: millis_to_utc(row.get(6)?),
            end_time: millis_to_utc(row.get(7)?),
        },
    })
}

pub fn insert_interval(conn: &Connection, iv: &Interval) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO intervals (kind, identifier, title, description, full_locator, start_time, end_time) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        (
            iv.kind.as_str(),
            &iv.identifier,
            &iv.title,
            &iv.description,
            &iv.full_locator,
            iv.start_time.timestamp_millis(),
            iv.end_time.timestamp_millis(),
        ),
    )?;
    Ok(conn.last_insert_rowid())
}

/// Newest first.
pub fn list_recent(conn: &Connection, limit: usize) -> rusqlite::Result<Vec<StoredInterval>> {
    let mut stmt = conn.prepare(
        "SELECT id, kind, identifier, title, description, full_locator, start_time, end_time FROM intervals ORDER BY start_time DESC, id DESC LIMIT ?1",
    )?;
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = stmt.query_map([limit], interval_from_row)?;
    rows.collect()
}

/// Start times of all intervals, newest first.
pub fn list_start_times(conn: &Connection) -> rusqlite::Result<Vec<DateTime<Utc>>> {
    let mut stmt = conn.prepare("SELECT start_time FROM intervals ORDER BY start_time DESC")?;
    let rows = stmt.query_map([], |row| row.get::<_, i64>(0).map(millis_to_utc))?;
    rows.collect()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CategoryOverride {
    pub kind: ActivityKind,
    pub identifier: String,
    pub category: String,
    #[serde(default)]
    pub productivity: i64,
}

pub fn upsert_category(conn: &Connection, c: &CategoryOverride) -> rusqlite::Result<()> {
    conn.execute(
        r#"
INSERT INTO category_overrides (kind, identifier, category, productivity)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(identifier) DO UPDATE SET
  kind=excluded.kind,
  category=excluded.category,
  productivity=excluded.productivity
        "#,
        (c.kind.as_str(), &c.identifier, &c.category, c.productivity),
    )?;
    Ok(())
}

pub fn list_categories(conn: &Connection) -> rusqlite::Result<Vec<CategoryOverride>> {
    let mut stmt = conn.prepare(
        "SELECT kind, identifier, category, productivity FROM category_overrides ORDER BY identifier",
    )?;
    let rows = stmt.query_map([], |row| {
        let kind: String = row.get(0)?;
        Ok(CategoryOverride {
            kind: ActivityKind::parse(&kind).unwrap_or(ActivityKind::Process),
            identifier: row.get(1)?,
            category: row.get(2)?,
            productivity: row.get(3)?,
        })
    })?;
    rows.collect()
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct ResetResult {
    pub intervals_deleted: i64,
    pub categories_deleted: i64,
}

/// Deletes every interval and category override in one transaction.
pub fn reset_all(conn: &mut Connection) -> rusqlite::Result<ResetResult> {
    let tx = conn.transaction()?;
    let intervals_deleted = tx.execute("DELETE FROM intervals", [])?;
    let categories_deleted = tx.execute("DELETE FROM category_overrides", [])?;
    // sqlite_sequence may not exist yet on a fresh database.
    let _ = tx.execute(
        "DELETE FROM sqlite_sequence WHERE name IN ('intervals', 'category_overrides')",
        [],
    );
    tx.commit()?;
    Ok(ResetResult {
        intervals_deleted: i64::try_from(intervals_deleted).unwrap_or(i64::MAX),
        categories_deleted: i64::try_from(categories_deleted).unwrap_or(i64::MAX),
    })
}

/// Sink that appends straight into a shared SQLite connection.
#[derive(Clone)]
pub struct SqliteSink(pub SharedConn);

impl IntervalSink for SqliteSink {
    async fn append(&mut self, interval: &Interval) -> anyhow::Result<()> {
        let conn = self.0.lock().await;
        insert_interval(&conn, interval)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn open_memory() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    init_db(&conn).unwrap();
    conn
}
