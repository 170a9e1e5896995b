//! Local calendar-day arithmetic shared by the tracker and the queries.

use chrono::{
    DateTime, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc,
};

const MAX_OFFSET_MINUTES: i32 = 14 * 60;

/// The timezone that defines "a day": the machine's local zone, or a fixed
/// offset supplied by a client.
#[derive(Clone, Copy, Debug)]
pub enum Zone {
    Local,
    Fixed(FixedOffset),
}

impl Zone {
    /// `None` means the local zone. Offsets are clamped to ±14h.
    pub fn from_offset_minutes(minutes: Option<i32>) -> Self {
        minutes
            .map(|m| m.clamp(-MAX_OFFSET_MINUTES, MAX_OFFSET_MINUTES))
            .and_then(|m| FixedOffset::east_opt(m * 60))
            .map_or(Zone::Local, Zone::Fixed)
    }

    pub fn today(&self) -> NaiveDate {
        local_date(self, Utc::now())
    }
}

impl TimeZone for Zone {
    type Offset = FixedOffset;

    fn from_offset(offset: &FixedOffset) -> Self {
        Zone::Fixed(*offset)
    }

    #[allow(deprecated)]
    fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
        match self {
            Zone::Local => Local.offset_from_local_date(local),
            Zone::Fixed(off) => LocalResult::Single(*off),
        }
    }

    fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
        match self {
            Zone::Local => Local.offset_from_local_datetime(local),
            Zone::Fixed(off) => LocalResult::Single(*off),
        }
    }

    #[allow(deprecated)]
    fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
        match self {
            Zone::Local => Local.offset_from_utc_date(utc),
            Zone::Fixed(off) => *off,
        }
    }

    fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
        match self {
            Zone::Local => Local.offset_from_utc_datetime(utc),
            Zone::Fixed(off) => *off,
        }
    }
}

/// First instant of `date` in `tz`.
///
/// Where a DST transition skips midnight the day starts at the first hour
/// that exists.
pub fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<DateTime<Utc>> {
    (0..4).find_map(|hour| {
        let naive = date.and_hms_opt(hour, 0, 0)?;
        tz.from_local_datetime(&naive)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
    })
}

pub fn local_date<Tz: TimeZone>(tz: &Tz, t: DateTime<Utc>) -> NaiveDate {
    t.with_timezone(tz).date_naive()
}

/// `[start, end)` of `date` in `tz`. Not always 24h long.
pub fn day_bounds<Tz: TimeZone>(
    tz: &Tz,
    date: NaiveDate,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let start = local_midnight(tz, date)?;
    let end = local_midnight(tz, date.succ_opt()?)?;
    Some((start, end))
}

/// The local midnight strictly after `t`.
pub fn next_local_midnight<Tz: TimeZone>(tz: &Tz, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let next = local_date(tz, t).succ_opt()?;
    local_midnight(tz, next)
}

/// Strict `YYYY-MM-DD`.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}
