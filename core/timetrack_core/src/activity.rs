use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Process,
    WebOrigin,
}

impl ActivityKind {
    /// Column value stored in `intervals.kind`.
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::Process => "app",
            ActivityKind::WebOrigin => "website",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "app" | "process" => Some(ActivityKind::Process),
            "website" | "web_origin" => Some(ActivityKind::WebOrigin),
            _ => None,
        }
    }
}

/// Whatever held focus during one sample.
///
/// Two activities are "the same" when `kind` and `identifier` match. The
/// metadata fields are carried along for display only and may change from one
/// sample to the next.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Activity {
    pub kind: ActivityKind,
    pub identifier: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub full_locator: Option<String>,
}

impl Activity {
    pub fn process(identifier: impl Into<String>, title: Option<String>) -> Self {
        Activity {
            kind: ActivityKind::Process,
            identifier: identifier.into(),
            title,
            description: None,
            full_locator: None,
        }
    }

    pub fn same_activity(&self, other: &Activity) -> bool {
        self.kind == other.kind && self.identifier == other.identifier
    }
}

/// A closed `[start_time, end_time)` range attributed to one activity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Interval {
    pub kind: ActivityKind,
    pub identifier: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub full_locator: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub end_time: DateTime<Utc>,
}

impl Interval {
    pub fn for_activity(activity: &Activity, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Interval {
            kind: activity.kind,
            identifier: activity.identifier.clone(),
            title: activity.title.clone(),
            description: activity.description.clone(),
            full_locator: activity.full_locator.clone(),
            start_time: start,
            end_time: end,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds()
    }
}
