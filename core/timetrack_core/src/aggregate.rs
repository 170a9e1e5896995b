//! Read-side views over the interval log.
//!
//! Every query takes the timezone that defines "a day". Intervals never
//! cross a local midnight, so filtering on `start_time` alone selects exactly
//! the intervals of a date.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::activity::ActivityKind;
use crate::day::{day_bounds, local_date};
use crate::display::{display_name, fmt_duration, ms_to_seconds};
use crate::store::{self, millis_to_utc, StoredInterval};

pub const DEFAULT_LOG_LIMIT: usize = 100;

#[derive(Clone, Debug, Serialize)]
pub struct DailyStats {
    pub date: String,
    pub interval_count: i64,
    pub distinct_activities: i64,
    pub total_seconds: i64,
    pub total_formatted: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_end: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ActivityRollup {
    pub kind: ActivityKind,
    pub identifier: String,
    pub display_name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub full_locator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub total_duration_seconds: i64,
    pub total_formatted: String,
    pub session_count: i64,
    pub last_seen: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct LogEntry {
    pub id: i64,
    pub kind: ActivityKind,
    pub identifier: String,
    pub display_name: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub full_locator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub start_time: i64,
    pub end_time: i64,
    pub start_time_formatted: String,
    pub end_time_formatted: String,
    pub duration_seconds: i64,
    pub duration_formatted: String,
}

fn local_rfc3339<Tz: TimeZone>(tz: &Tz, t: DateTime<Utc>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    t.with_timezone(tz).to_rfc3339()
}

fn local_hms<Tz: TimeZone>(tz: &Tz, t: DateTime<Utc>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    t.with_timezone(tz).format("%H:%M:%S").to_string()
}

/// Millisecond `[start, end)` covering `date`, or everything when `None`.
fn range_ms<Tz: TimeZone>(tz: &Tz, date: Option<NaiveDate>) -> (i64, i64) {
    match date.and_then(|d| day_bounds(tz, d)) {
        Some((start, end)) => (start.timestamp_millis(), end.timestamp_millis()),
        None if date.is_some() => (0, 0),
        None => (i64::MIN, i64::MAX),
    }
}

pub fn daily_stats<Tz: TimeZone>(
    conn: &Connection,
    tz: &Tz,
    date: NaiveDate,
) -> rusqlite::Result<DailyStats>
where
    Tz::Offset: std::fmt::Display,
{
    let (start, end) = range_ms(tz, Some(date));
    let (count, distinct, total_ms, first, last) = conn.query_row(
        r#"
SELECT COUNT(*), COUNT(DISTINCT identifier), SUM(end_time - start_time), MIN(start_time), MAX(end_time)
FROM intervals
WHERE start_time >= ?1 AND start_time < ?2
        "#,
        (start, end),
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, Option<i64>>(2)?,
                row.get::<_, Option<i64>>(3)?,
                row.get::<_, Option<i64>>(4)?,
            ))
        },
    )?;

    let total_seconds = ms_to_seconds(total_ms.unwrap_or(0));
    Ok(DailyStats {
        date: date.format("%Y-%m-%d").to_string(),
        interval_count: count,
        distinct_activities: distinct,
        total_seconds,
        total_formatted: fmt_duration(total_seconds),
        first_start: first.map(|ms| local_rfc3339(tz, millis_to_utc(ms))),
        last_end: last.map(|ms| local_rfc3339(tz, millis_to_utc(ms))),
    })
}

/// Per-activity totals, longest first. Metadata is taken from the most
/// recently ended interval of each activity.
pub fn aggregated_activities<Tz: TimeZone>(
    conn: &Connection,
    tz: &Tz,
    date: Option<NaiveDate>,
) -> rusqlite::Result<Vec<ActivityRollup>> {
    let (start, end) = range_ms(tz, date);
    // SQLite takes bare columns from the row that produced MAX(end_time).
    let mut stmt = conn.prepare(
        r#"
SELECT i.kind, i.identifier, SUM(i.end_time - i.start_time) AS total_ms, COUNT(*), MAX(i.end_time),
       i.title, i.description, i.full_locator, c.category
FROM intervals i
LEFT JOIN category_overrides c ON c.identifier = i.identifier
WHERE i.start_time >= ?1 AND i.start_time < ?2
GROUP BY i.kind, i.identifier
ORDER BY total_ms DESC, i.identifier ASC
        "#,
    )?;
    let rows = stmt.query_map((start, end), |row| {
        let kind_s: String = row.get(0)?;
        let kind = ActivityKind::parse(&kind_s).unwrap_or(ActivityKind::Process);
        let identifier: String = row.get(1)?;
        let title: Option<String> = row.get(5)?;
        let total_seconds = ms_to_seconds(row.get(2)?);
        Ok(ActivityRollup {
            kind,
            display_name: display_name(kind, &identifier, title.as_deref()),
            identifier,
            title,
            description: row.get(6)?,
            full_locator: row.get(7)?,
            category: row.get(8)?,
            total_duration_seconds: total_seconds,
            total_formatted: fmt_duration(total_seconds),
            session_count: row.get(3)?,
            last_seen: row.get(4)?,
        })
    })?;
    rows.collect()
}

/// Joins abutting pieces of the same activity. Input and output are newest
/// first.
fn coalesce(rows: Vec<StoredInterval>) -> Vec<StoredInterval> {
    let mut out: Vec<StoredInterval> = Vec::with_capacity(rows.len());
    for older in rows {
        if let Some(newer) = out.last_mut() {
            let (n, o) = (&mut newer.interval, &older.interval);
            if n.kind == o.kind && n.identifier == o.identifier && o.end_time == n.start_time {
                n.start_time = o.start_time;
                continue;
            }
        }
        out.push(older);
    }
    out
}

/// The newest `limit` intervals, newest first. With `merge`, abutting
/// tick-sized pieces of the same activity are shown as one entry.
pub fn recent_log<Tz: TimeZone>(
    conn: &Connection,
    tz: &Tz,
    limit: usize,
    merge: bool,
) -> rusqlite::Result<Vec<LogEntry>>
where
    Tz::Offset: std::fmt::Display,
{
    let mut rows = store::list_recent(conn, limit)?;
    if merge {
        rows = coalesce(rows);
    }
    let categories: HashMap<String, String> = store::list_categories(conn)?
        .into_iter()
        .map(|c| (c.identifier, c.category))
        .collect();

    Ok(rows
        .into_iter()
        .map(|StoredInterval { id, interval: iv }| {
            let seconds = ms_to_seconds(iv.duration_ms());
            LogEntry {
                id,
                kind: iv.kind,
                display_name: display_name(iv.kind, &iv.identifier, iv.title.as_deref()),
                category: categories.get(&iv.identifier).cloned(),
                start_time: iv.start_time.timestamp_millis(),
                end_time: iv.end_time.timestamp_millis(),
                start_time_formatted: local_hms(tz, iv.start_time),
                end_time_formatted: local_hms(tz, iv.end_time),
                duration_seconds: seconds,
                duration_formatted: fmt_duration(seconds),
                identifier: iv.identifier,
                title: iv.title,
                description: iv.description,
                full_locator: iv.full_locator,
            }
        })
        .collect())
}

/// Distinct local dates with data, newest first.
pub fn available_dates<Tz: TimeZone>(conn: &Connection, tz: &Tz) -> rusqlite::Result<Vec<String>> {
    let mut dates: Vec<NaiveDate> = Vec::new();
    for start in store::list_start_times(conn)? {
        let d = local_date(tz, start);
        if dates.last() != Some(&d) {
            dates.push(d);
        }
    }
    Ok(dates
        .into_iter()
        .map(|d| d.format("%Y-%m-%d").to_string())
        .collect())
}

pub fn reset(conn: &mut Connection) -> rusqlite::Result<store::ResetResult> {
    store::reset_all(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::Interval;
    use crate::store::{insert_interval, open_memory, upsert_category, CategoryOverride};
    use chrono::FixedOffset;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, h, m, s).unwrap()
    }

    fn put(
        conn: &Connection,
        kind: ActivityKind,
        id: &str,
        title: Option<&str>,
        start: DateTime<Utc>,
        secs: i64,
    ) {
        insert_interval(
            conn,
            &Interval {
                kind,
                identifier: id.to_string(),
                title: title.map(str::to_string),
                description: None,
                full_locator: None,
                start_time: start,
                end_time: start + chrono::Duration::seconds(secs),
            },
        )
        .unwrap();
    }

    fn date(s: &str) -> NaiveDate {
        crate::day::parse_date(s).unwrap()
    }

    #[test]
    fn rollup_sums_sessions() {
        let conn = open_memory();
        put(&conn, ActivityKind::Process, "Code.exe", None, at(9, 0, 0), 10);
        put(&conn, ActivityKind::Process, "Code.exe", None, at(10, 0, 0), 20);
        put(&conn, ActivityKind::WebOrigin, "https://github.com", Some("Old"), at(9, 30, 0), 25);
        put(&conn, ActivityKind::WebOrigin, "https://github.com", Some("Newest"), at(11, 0, 0), 1);

        let rows = aggregated_activities(&conn, &Utc, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].identifier, "Code.exe");
        assert_eq!(rows[0].total_duration_seconds, 30);
        assert_eq!(rows[0].session_count, 2);
        assert_eq!(rows[0].total_formatted, "30s");
        assert_eq!(rows[1].title.as_deref(), Some("Newest"));
        assert_eq!(rows[1].display_name, "Newest");
        assert_eq!(rows[1].last_seen, (at(11, 0, 1)).timestamp_millis());
    }

    #[test]
    fn rollup_respects_date_filter_and_categories() {
        let conn = open_memory();
        put(&conn, ActivityKind::Process, "A", None, at(9, 0, 0), 60);
        put(&conn, ActivityKind::Process, "B", None, at(9, 0, 0) + chrono::Duration::days(1), 60);
        upsert_category(
            &conn,
            &CategoryOverride {
                kind: ActivityKind::Process,
                identifier: "A".to_string(),
                category: "Work".to_string(),
                productivity: 1,
            },
        )
        .unwrap();

        let rows = aggregated_activities(&conn, &Utc, Some(date("2026-05-04"))).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].identifier, "A");
        assert_eq!(rows[0].category.as_deref(), Some("Work"));
    }

    #[test]
    fn empty_day_is_zeroed() {
        let conn = open_memory();
        let stats = daily_stats(&conn, &Utc, date("2026-01-01")).unwrap();
        assert_eq!(stats.interval_count, 0);
        assert_eq!(stats.distinct_activities, 0);
        assert_eq!(stats.total_seconds, 0);
        assert_eq!(stats.total_formatted, "0s");
        assert!(stats.first_start.is_none());
    }

    #[test]
    fn daily_stats_uses_local_day() {
        let conn = open_memory();
        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        // 2026-05-04 23:30 local, and 2026-05-05 00:10 local.
        put(&conn, ActivityKind::Process, "A", None, at(15, 30, 0), 600);
        put(&conn, ActivityKind::Process, "B", None, at(16, 10, 0), 3700);
        put(&conn, ActivityKind::Process, "B", None, at(18, 0, 0), 20);

        let may4 = daily_stats(&conn, &tz, date("2026-05-04")).unwrap();
        assert_eq!(may4.interval_count, 1);
        assert_eq!(may4.total_formatted, "10m 0s");

        let may5 = daily_stats(&conn, &tz, date("2026-05-05")).unwrap();
        assert_eq!(may5.interval_count, 2);
        assert_eq!(may5.distinct_activities, 1);
        assert_eq!(may5.total_seconds, 3720);
        assert_eq!(may5.total_formatted, "1h 2m");
        assert_eq!(may5.first_start.as_deref(), Some("2026-05-05T00:10:00+08:00"));

        assert_eq!(available_dates(&conn, &tz).unwrap(), vec!["2026-05-05", "2026-05-04"]);
        assert_eq!(available_dates(&conn, &Utc).unwrap(), vec!["2026-05-04"]);
    }

    #[test]
    fn log_is_newest_first_with_durations() {
        let conn = open_memory();
        put(&conn, ActivityKind::Process, "A", None, at(9, 0, 0), 5);
        put(&conn, ActivityKind::Process, "B", None, at(9, 0, 5), 125);

        let log = recent_log(&conn, &Utc, DEFAULT_LOG_LIMIT, false).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].identifier, "B");
        assert_eq!(log[0].duration_seconds, 125);
        assert_eq!(log[0].duration_formatted, "2m 5s");
        assert_eq!(log[0].start_time_formatted, "09:00:05");
        assert_eq!(log[1].start_time, at(9, 0, 0).timestamp_millis());
        assert_eq!(log[1].end_time, at(9, 0, 5).timestamp_millis());
    }

    #[test]
    fn merge_joins_abutting_pieces() {
        let conn = open_memory();
        put(&conn, ActivityKind::Process, "A", None, at(9, 0, 0), 2);
        put(&conn, ActivityKind::Process, "A", None, at(9, 0, 2), 2);
        put(&conn, ActivityKind::Process, "B", None, at(9, 0, 4), 2);
        put(&conn, ActivityKind::Process, "A", None, at(9, 0, 10), 2);

        let log = recent_log(&conn, &Utc, DEFAULT_LOG_LIMIT, true).unwrap();
        let shape: Vec<(&str, i64)> = log
            .iter()
            .map(|e| (e.identifier.as_str(), e.duration_seconds))
            .collect();
        assert_eq!(shape, vec![("A", 2), ("B", 2), ("A", 4)]);
    }

    #[test]
    fn reset_empties_every_view() {
        let mut conn = open_memory();
        put(&conn, ActivityKind::Process, "A", None, at(9, 0, 0), 5);
        reset(&mut conn).unwrap();
        assert!(recent_log(&conn, &Utc, DEFAULT_LOG_LIMIT, false).unwrap().is_empty());
        assert!(available_dates(&conn, &Utc).unwrap().is_empty());
        assert!(aggregated_activities(&conn, &Utc, None).unwrap().is_empty());
    }
}
