use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::activity::{ActivityKind, Interval};
use crate::aggregate::{self, DEFAULT_LOG_LIMIT};
use crate::day::{parse_date, Zone};
use crate::store::{self, CategoryOverride, SharedConn};

const MAX_LOG_LIMIT: usize = 1000;

#[derive(Clone)]
pub struct AppState {
    pub conn: SharedConn,
}

#[derive(Serialize)]
struct OkResponse<T: Serialize> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

#[derive(Serialize)]
struct ErrResponse {
    ok: bool,
    error: &'static str,
    message: String,
}

fn ok<T: Serialize>(data: T) -> Response {
    Json(OkResponse {
        ok: true,
        data: Some(data),
    })
    .into_response()
}

fn fail(status: StatusCode, error: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrResponse {
            ok: false,
            error,
            message: message.into(),
        }),
    )
        .into_response()
}

fn db_error(op: &str, err: rusqlite::Error) -> Response {
    error!("{op} failed: {err}");
    fail(
        StatusCode::INTERNAL_SERVER_ERROR,
        "db_error",
        format!("could not {op}: {err}"),
    )
}

fn invalid_date(raw: &str) -> Response {
    fail(
        StatusCode::BAD_REQUEST,
        "invalid_date",
        format!("'{raw}' is not a YYYY-MM-DD date"),
    )
}

type QueryResult<T> = Result<Query<T>, QueryRejection>;
type JsonBody = Result<Json<Value>, JsonRejection>;

fn query<T>(q: QueryResult<T>) -> Result<T, Response> {
    q.map(|Query(v)| v)
        .map_err(|rej| fail(StatusCode::BAD_REQUEST, "invalid_query", rej.body_text()))
}

fn body_as<T: DeserializeOwned>(body: JsonBody) -> Result<T, Response> {
    let Json(value) =
        body.map_err(|rej| fail(StatusCode::BAD_REQUEST, "invalid_json", rej.body_text()))?;
    serde_json::from_value(value)
        .map_err(|err| fail(StatusCode::BAD_REQUEST, "invalid_json", err.to_string()))
}

fn utc_millis(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health))
        .route("/intervals", post(post_interval).options(options_ok))
        .route("/log", get(get_log))
        .route("/activities", get(get_activities))
        .route("/stats/daily", get(get_daily_stats))
        .route("/dates", get(get_dates))
        .route("/today", get(get_today))
        .route(
            "/categories",
            get(get_categories)
                .post(post_category)
                .options(options_ok),
        )
        .route("/data/reset", post(post_reset).options(options_ok))
        .with_state(state)
        .layer(cors)
}

async fn options_ok() -> impl IntoResponse {
    StatusCode::OK
}

#[derive(Serialize)]
struct HealthInfo {
    service: &'static str,
    version: &'static str,
}

async fn health() -> Response {
    ok(HealthInfo {
        service: "timetrack_core",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Deserialize)]
struct IngestInterval {
    v: i32,
    kind: String,
    identifier: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    full_locator: Option<String>,
    start_time: i64,
    end_time: i64,
}

#[derive(Serialize)]
struct IngestResult {
    id: i64,
}

async fn post_interval(State(state): State<AppState>, body: JsonBody) -> Response {
    let e: IngestInterval = match body_as(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if e.v < 1 {
        return fail(StatusCode::BAD_REQUEST, "invalid_version", "v must be >= 1");
    }
    let Some(kind) = ActivityKind::parse(&e.kind) else {
        return fail(
            StatusCode::BAD_REQUEST,
            "invalid_kind",
            format!("unknown kind '{}'", e.kind),
        );
    };
    if e.identifier.trim().is_empty() {
        return fail(StatusCode::BAD_REQUEST, "invalid_identifier", "identifier is empty");
    }
    if e.end_time <= e.start_time {
        return fail(
            StatusCode::BAD_REQUEST,
            "invalid_range",
            "end_time must be after start_time",
        );
    }
    let (Some(start_time), Some(end_time)) = (utc_millis(e.start_time), utc_millis(e.end_time))
    else {
        return fail(
            StatusCode::BAD_REQUEST,
            "invalid_range",
            "start_time and end_time must be representable epoch milliseconds",
        );
    };

    let interval = Interval {
        kind,
        identifier: e.identifier,
        title: e.title,
        description: e.description,
        full_locator: e.full_locator,
        start_time,
        end_time,
    };

    let conn = state.conn.lock().await;
    match store::insert_interval(&conn, &interval) {
        Ok(id) => ok(IngestResult { id }),
        Err(err) => db_error("store interval", err),
    }
}

fn default_limit() -> usize {
    DEFAULT_LOG_LIMIT
}

#[derive(Deserialize)]
struct LogQuery {
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    merge: bool,
    tz_offset_minutes: Option<i32>,
}

async fn get_log(State(state): State<AppState>, q: QueryResult<LogQuery>) -> Response {
    let q = match query(q) {
        Ok(q) => q,
        Err(resp) => return resp,
    };
    let limit = q.limit.clamp(1, MAX_LOG_LIMIT);
    let zone = Zone::from_offset_minutes(q.tz_offset_minutes);
    let conn = state.conn.lock().await;
    match aggregate::recent_log(&conn, &zone, limit, q.merge) {
        Ok(entries) => ok(entries),
        Err(err) => db_error("read tracking log", err),
    }
}

#[derive(Deserialize)]
struct DateQuery {
    date: Option<String>,
    tz_offset_minutes: Option<i32>,
}

impl DateQuery {
    fn parsed_date(&self) -> Result<Option<NaiveDate>, Response> {
        match self.date.as_deref().filter(|d| !d.trim().is_empty()) {
            Some(raw) => parse_date(raw).map(Some).ok_or_else(|| invalid_date(raw)),
            None => Ok(None),
        }
    }
}

async fn get_activities(State(state): State<AppState>, q: QueryResult<DateQuery>) -> Response {
    let q = match query(q) {
        Ok(q) => q,
        Err(resp) => return resp,
    };
    let date = match q.parsed_date() {
        Ok(d) => d,
        Err(resp) => return resp,
    };
    let zone = Zone::from_offset_minutes(q.tz_offset_minutes);
    let conn = state.conn.lock().await;
    match aggregate::aggregated_activities(&conn, &zone, date) {
        Ok(rows) => ok(rows),
        Err(err) => db_error("aggregate activities", err),
    }
}

async fn get_daily_stats(State(state): State<AppState>, q: QueryResult<DateQuery>) -> Response {
    let q = match query(q) {
        Ok(q) => q,
        Err(resp) => return resp,
    };
    let zone = Zone::from_offset_minutes(q.tz_offset_minutes);
    let date = match q.parsed_date() {
        Ok(d) => d.unwrap_or_else(|| zone.today()),
        Err(resp) => return resp,
    };
    let conn = state.conn.lock().await;
    match aggregate::daily_stats(&conn, &zone, date) {
        Ok(stats) => ok(stats),
        Err(err) => db_error("compute daily stats", err),
    }
}

async fn get_dates(State(state): State<AppState>, q: QueryResult<DateQuery>) -> Response {
    let q = match query(q) {
        Ok(q) => q,
        Err(resp) => return resp,
    };
    let zone = Zone::from_offset_minutes(q.tz_offset_minutes);
    let conn = state.conn.lock().await;
    match aggregate::available_dates(&conn, &zone) {
        Ok(dates) => ok(dates),
        Err(err) => db_error("list dates", err),
    }
}

async fn get_today(q: QueryResult<DateQuery>) -> Response {
    let q = match query(q) {
        Ok(q) => q,
        Err(resp) => return resp,
    };
    let zone = Zone::from_offset_minutes(q.tz_offset_minutes);
    ok(zone.today().format("%Y-%m-%d").to_string())
}

async fn get_categories(State(state): State<AppState>) -> Response {
    let conn = state.conn.lock().await;
    match store::list_categories(&conn) {
        Ok(rows) => ok(rows),
        Err(err) => db_error("list categories", err),
    }
}

async fn post_category(State(state): State<AppState>, body: JsonBody) -> Response {
    let c: CategoryOverride = match body_as(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if c.identifier.trim().is_empty() || c.category.trim().is_empty() {
        return fail(
            StatusCode::BAD_REQUEST,
            "invalid_category",
            "identifier and category are required",
        );
    }
    let conn = state.conn.lock().await;
    match store::upsert_category(&conn, &c) {
        Ok(()) => ok(c),
        Err(err) => db_error("save category", err),
    }
}

async fn post_reset(State(state): State<AppState>) -> Response {
    let mut conn = state.conn.lock().await;
    match aggregate::reset(&mut conn) {
        Ok(result) => ok(result),
        Err(err) => db_error("reset data", err),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::open_memory;
    use axum::http::Uri;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn state() -> AppState {
        AppState {
            conn: Arc::new(Mutex::new(open_memory())),
        }
    }

    async fn body(resp: Response) -> (StatusCode, Value) {
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn ms(h: u32, m: u32, s: u32) -> i64 {
        Utc.with_ymd_and_hms(2026, 5, 4, h, m, s)
            .unwrap()
            .timestamp_millis()
    }

    fn interval_json(id: &str, start: i64, end: i64) -> JsonBody {
        Ok(Json(serde_json::json!({
            "v": 1,
            "kind": "process",
            "identifier": id,
            "title": "window",
            "start_time": start,
            "end_time": end,
        })))
    }

    fn date_query(date: Option<&str>) -> QueryResult<DateQuery> {
        Ok(Query(DateQuery {
            date: date.map(str::to_string),
            tz_offset_minutes: Some(0),
        }))
    }

    fn log_query(tz_offset_minutes: Option<i32>) -> QueryResult<LogQuery> {
        Ok(Query(LogQuery {
            limit: DEFAULT_LOG_LIMIT,
            merge: false,
            tz_offset_minutes,
        }))
    }

    #[tokio::test]
    async fn ingest_then_read_back() {
        let st = state();
        let resp = post_interval(
            State(st.clone()),
            interval_json("Code.exe", ms(9, 0, 0), ms(9, 0, 10)),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let (status, v) = body(get_log(State(st.clone()), log_query(Some(0))).await).await;
        assert_eq!(status, StatusCode::OK);
        let entry = &v["data"][0];
        assert_eq!(entry["identifier"], "Code.exe");
        assert_eq!(entry["kind"], "process");
        assert_eq!(entry["start_time"], ms(9, 0, 0));
        assert_eq!(entry["end_time"], ms(9, 0, 10));
        assert_eq!(entry["duration_formatted"], "10s");
    }

    #[tokio::test]
    async fn rejects_empty_ranges() {
        let resp = post_interval(State(state()), interval_json("A", ms(9, 0, 0), ms(9, 0, 0)));
        let (status, v) = body(resp.await).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(v["ok"], false);
        assert_eq!(v["error"], "invalid_range");
        assert!(v["message"].as_str().is_some());
    }

    #[tokio::test]
    async fn rejects_timestamps_past_the_calendar() {
        let st = state();
        for (start, end) in [(1_000, 9_000_000_000_000_000), (i64::MIN, ms(9, 0, 0))] {
            let (status, v) =
                body(post_interval(State(st.clone()), interval_json("A", start, end)).await).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(v["error"], "invalid_range");
        }

        let (_, v) = body(get_log(State(st), log_query(None)).await).await;
        assert_eq!(v["data"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn malformed_queries_use_the_error_envelope() {
        for uri in ["/log?limit=-1", "/log?tz_offset_minutes=x"] {
            let uri: Uri = uri.parse().unwrap();
            let q = Query::<LogQuery>::try_from_uri(&uri);
            let (status, v) = body(get_log(State(state()), q).await).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(v["ok"], false);
            assert_eq!(v["error"], "invalid_query");
        }

        let uri: Uri = "/stats/daily?tz_offset_minutes=east".parse().unwrap();
        let q = Query::<DateQuery>::try_from_uri(&uri);
        let (status, v) = body(get_daily_stats(State(state()), q).await).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(v["error"], "invalid_query");
    }

    #[tokio::test]
    async fn stats_for_an_empty_day_are_zero() {
        let resp = get_daily_stats(State(state()), date_query(Some("2026-01-01")));
        let (status, v) = body(resp.await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["data"]["interval_count"], 0);
        assert_eq!(v["data"]["total_seconds"], 0);
    }

    #[tokio::test]
    async fn bad_date_is_a_structured_error() {
        let resp = get_activities(State(state()), date_query(Some("05/04/2026")));
        let (status, v) = body(resp.await).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(v["error"], "invalid_date");
    }

    #[tokio::test]
    async fn reset_empties_log_and_dates() {
        let st = state();
        for (s, e) in [(ms(9, 0, 0), ms(9, 0, 10)), (ms(9, 1, 0), ms(9, 1, 20))] {
            post_interval(State(st.clone()), interval_json("A", s, e)).await;
        }

        let (_, v) = body(get_activities(State(st.clone()), date_query(None)).await).await;
        assert_eq!(v["data"][0]["total_duration_seconds"], 30);
        assert_eq!(v["data"][0]["session_count"], 2);

        let (_, v) = body(get_dates(State(st.clone()), date_query(None)).await).await;
        assert_eq!(v["data"], serde_json::json!(["2026-05-04"]));

        let (status, v) = body(post_reset(State(st.clone())).await).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["data"]["intervals_deleted"], 2);

        let (_, v) = body(get_dates(State(st.clone()), date_query(None)).await).await;
        assert_eq!(v["data"], serde_json::json!([]));
        let (_, v) = body(get_log(State(st), log_query(None)).await).await;
        assert_eq!(v["data"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn categories_show_up_in_rollups() {
        let st = state();
        post_interval(
            State(st.clone()),
            interval_json("Slack", ms(9, 0, 0), ms(9, 5, 0)),
        )
        .await;
        let category = serde_json::json!({
            "kind": "process",
            "identifier": "Slack",
            "category": "Communication",
        });
        let resp = post_category(State(st.clone()), Ok(Json(category))).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = get_activities(State(st), date_query(Some("2026-05-04")));
        let (_, v) = body(resp.await).await;
        assert_eq!(v["data"][0]["category"], "Communication");
        assert_eq!(v["data"][0]["total_formatted"], "5m 0s");
    }
}
