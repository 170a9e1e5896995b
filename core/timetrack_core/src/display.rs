use crate::activity::ActivityKind;

const WEB_TITLE_MAX_CHARS: usize = 100;
const PROCESS_NAME_MAX_CHARS: usize = 60;

/// `1h 5m`, `4m 12s` or `37s`.
pub fn fmt_duration(seconds: i64) -> String {
    let s = seconds.max(0);
    let (h, m, rs) = (s / 3600, (s % 3600) / 60, s % 60);
    if h > 0 {
        format!("{h}h {m}m")
    } else if m > 0 {
        format!("{m}m {rs}s")
    } else {
        format!("{rs}s")
    }
}

/// Rounds to the nearest whole second.
pub fn ms_to_seconds(ms: i64) -> i64 {
    (ms.max(0) + 500) / 1000
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}

pub fn display_name(kind: ActivityKind, identifier: &str, title: Option<&str>) -> String {
    match kind {
        ActivityKind::WebOrigin => match title.map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) => truncate_chars(t, WEB_TITLE_MAX_CHARS),
            None => identifier.to_string(),
        },
        ActivityKind::Process => truncate_chars(identifier, PROCESS_NAME_MAX_CHARS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_units() {
        assert_eq!(fmt_duration(0), "0s");
        assert_eq!(fmt_duration(59), "59s");
        assert_eq!(fmt_duration(60), "1m 0s");
        assert_eq!(fmt_duration(252), "4m 12s");
        assert_eq!(fmt_duration(3600 + 5 * 60 + 9), "1h 5m");
        assert_eq!(fmt_duration(-3), "0s");
    }

    #[test]
    fn rounds_millis() {
        assert_eq!(ms_to_seconds(1499), 1);
        assert_eq!(ms_to_seconds(1500), 2);
        assert_eq!(ms_to_seconds(30_000), 30);
    }

    #[test]
    fn web_prefers_title() {
        assert_eq!(
            display_name(ActivityKind::WebOrigin, "https://github.com", Some("Pull requests")),
            "Pull requests"
        );
        assert_eq!(
            display_name(ActivityKind::WebOrigin, "https://github.com", Some("  ")),
            "https://github.com"
        );
        let long = "é".repeat(120);
        let shown = display_name(ActivityKind::WebOrigin, "https://x.org", Some(&long));
        assert_eq!(shown.chars().count(), 103);
        assert!(shown.ends_with("..."));
    }

    #[test]
    fn process_names_are_truncated() {
        let id = "a".repeat(61);
        let shown = display_name(ActivityKind::Process, &id, Some("ignored"));
        assert_eq!(shown, format!("{}...", "a".repeat(60)));
        assert_eq!(display_name(ActivityKind::Process, "Code.exe", None), "Code.exe");
    }
}
