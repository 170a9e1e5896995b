use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use serde::Serialize;

use timetrack_core::activity::Interval;
use timetrack_core::tracker::IntervalSink;

#[derive(Serialize)]
struct IntervalPayload<'a> {
    v: i32,
    #[serde(flatten)]
    interval: &'a Interval,
}

/// Strips page/window text and the full URL; the origin stays as identifier.
fn redact(interval: &Interval) -> Interval {
    Interval {
        title: None,
        description: None,
        full_locator: None,
        ..interval.clone()
    }
}

/// Posts each closed interval to the core's `/intervals` endpoint.
pub struct HttpSink {
    client: Client,
    endpoint: String,
    send_title: bool,
}

impl HttpSink {
    pub fn new(core_url: &str, send_title: bool) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("build http client")?;
        Ok(HttpSink {
            client,
            endpoint: format!("{}/intervals", core_url.trim_end_matches('/')),
            send_title,
        })
    }
}

impl IntervalSink for HttpSink {
    async fn append(&mut self, interval: &Interval) -> anyhow::Result<()> {
        let redacted;
        let interval = if self.send_title {
            interval
        } else {
            redacted = redact(interval);
            &redacted
        };

        self.client
            .post(&self.endpoint)
            .json(&IntervalPayload { v: 1, interval })
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?
            .error_for_status()
            .context("core rejected interval")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use timetrack_core::activity::ActivityKind;

    #[test]
    fn payload_matches_ingest_shape() {
        let interval = Interval {
            kind: ActivityKind::WebOrigin,
            identifier: "https://docs.rs".to_string(),
            title: Some("Docs.rs".to_string()),
            description: None,
            full_locator: Some("https://docs.rs/tokio".to_string()),
            start_time: Utc.timestamp_millis_opt(1_000).unwrap(),
            end_time: Utc.timestamp_millis_opt(4_500).unwrap(),
        };
        let payload = IntervalPayload {
            v: 1,
            interval: &interval,
        };
        let v = serde_json::to_value(payload).unwrap();
        assert_eq!(v["v"], 1);
        assert_eq!(v["kind"], "web_origin");
        assert_eq!(v["identifier"], "https://docs.rs");
        assert_eq!(v["start_time"], 1_000);
        assert_eq!(v["end_time"], 4_500);
    }

    #[test]
    fn redaction_keeps_only_the_origin() {
        let interval = Interval {
            kind: ActivityKind::WebOrigin,
            identifier: "https://mail.example.com".to_string(),
            title: Some("Inbox (3)".to_string()),
            description: Some("Mail".to_string()),
            full_locator: Some("https://mail.example.com/u/0/#inbox/abc".to_string()),
            start_time: Utc.timestamp_millis_opt(0).unwrap(),
            end_time: Utc.timestamp_millis_opt(2_000).unwrap(),
        };
        let r = redact(&interval);
        assert_eq!(r.identifier, "https://mail.example.com");
        assert_eq!(r.title, None);
        assert_eq!(r.description, None);
        assert_eq!(r.full_locator, None);
        assert_eq!(r.end_time, interval.end_time);
    }

    #[test]
    fn endpoint_ignores_trailing_slash() {
        let sink = HttpSink::new("http://127.0.0.1:17700/", true).unwrap();
        assert_eq!(sink.endpoint, "http://127.0.0.1:17700/intervals");
    }
}
