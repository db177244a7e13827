//! Shared fixtures for HTTP endpoint tests
//!
//! Each test gets a full application context on a temporary database and
//! a wiremock identity service, then drives the router in-process with
//! `tower::ServiceExt::oneshot`. Background sync stays off unless a test
//! enables it.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use bookline_api::{build_router, AppContext};
use bookline_domain::{
    AvailabilityRule, BookingPolicy, CalendarIntegration, CalendarVendor, Config, SyncHealth,
};
use chrono::{DateTime, Datelike, Duration, DurationRound, NaiveDate, NaiveTime, Utc, Weekday};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub struct TestApp {
    pub ctx: Arc<AppContext>,
    pub router: Router,
    pub identity_server: MockServer,
    _temp_dir: TempDir,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

/// Spawn with a config tweak, e.g. enabling background sync
pub async fn spawn_app_with(tweak: impl FnOnce(&mut Config)) -> TestApp {
    let temp_dir = TempDir::new().expect("temp dir created");
    let identity_server = MockServer::start().await;

    let mut config = Config::default();
    config.database.path =
        temp_dir.path().join("api-test.db").to_string_lossy().into_owned();
    config.identity.introspect_url = format!("{}/introspect", identity_server.uri());
    config.sync.enabled = false;
    tweak(&mut config);

    let ctx = Arc::new(AppContext::new_with_config(config).await.expect("context built"));
    let router = build_router(Arc::clone(&ctx));
    TestApp { ctx, router, identity_server, _temp_dir: temp_dir }
}

impl TestApp {
    /// Register a bearer token with the mock identity service
    pub async fn grant_token(&self, token: &str, subject: &str, role: &str) {
        Mock::given(method("POST"))
            .and(path("/introspect"))
            .and(body_string_contains(format!("token={token}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "active": true,
                "sub": subject,
                "role": role,
            })))
            .mount(&self.identity_server)
            .await;
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(value) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(value.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request built");
        self.router.clone().oneshot(request).await.expect("router answered")
    }

    /// Store a Monday-only schedule: 09:00-18:00, 30-minute slots with a
    /// 10-minute buffer (slots at 09:00, 09:40, 10:20, ...)
    pub async fn seed_monday_schedule(&self, provider_id: Uuid) {
        self.ctx
            .availability
            .set_policy(BookingPolicy { provider_id, ..BookingPolicy::default() })
            .await
            .expect("policy stored");
        self.ctx
            .availability
            .replace_weekly_rules(
                provider_id,
                vec![AvailabilityRule {
                    provider_id,
                    weekday: 0,
                    start_time: hm(9, 0),
                    end_time: hm(18, 0),
                    enabled: true,
                    max_concurrent: 1,
                    buffer_minutes: 10,
                }],
            )
            .await
            .expect("rules stored");
    }

    /// Store an around-the-clock schedule on every weekday so tests can
    /// book relative to "now" (30-minute slots, no buffer)
    pub async fn seed_all_week_schedule(&self, provider_id: Uuid) {
        self.ctx
            .availability
            .set_policy(BookingPolicy { provider_id, ..BookingPolicy::default() })
            .await
            .expect("policy stored");
        let rules = (0..7)
            .map(|weekday| AvailabilityRule {
                provider_id,
                weekday,
                start_time: hm(0, 0),
                end_time: NaiveTime::from_hms_opt(23, 59, 0).expect("valid time"),
                enabled: true,
                max_concurrent: 1,
                buffer_minutes: 0,
            })
            .collect();
        self.ctx
            .availability
            .replace_weekly_rules(provider_id, rules)
            .await
            .expect("rules stored");
    }

    pub async fn seed_integration(&self, integration: &CalendarIntegration) {
        self.ctx.integrations.upsert(integration).await.expect("integration stored");
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body read");
    serde_json::from_slice(&bytes).expect("json body")
}

pub async fn assert_status(response: Response, expected: StatusCode) -> Value {
    let status = response.status();
    let body = body_json(response).await;
    assert_eq!(status, expected, "unexpected status, body: {body}");
    body
}

pub fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("valid time")
}

/// A Monday far enough out that advance-notice rules never interfere
pub fn upcoming_monday() -> NaiveDate {
    let mut date = Utc::now().date_naive() + Duration::days(8);
    while date.weekday() != Weekday::Mon {
        date += Duration::days(1);
    }
    date
}

/// The next half-hour boundary at least `lead` from now, nudged off the
/// end-of-day edge where a 30-minute slot would not fit
pub fn next_slot_boundary_after(lead: Duration) -> DateTime<Utc> {
    let mut start = (Utc::now() + lead)
        .duration_trunc(Duration::minutes(30))
        .expect("truncated to half hour")
        + Duration::minutes(30);
    if start.time() > hm(23, 0) {
        start += Duration::minutes(60);
    }
    start
}

pub fn slot_start(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(date.and_time(hm(hour, minute)), Utc)
}

pub fn healthy_integration(provider_id: Uuid) -> CalendarIntegration {
    CalendarIntegration {
        id: Uuid::now_v7(),
        provider_id,
        vendor: CalendarVendor::Google,
        external_calendar_id: "primary".to_string(),
        access_token: "access-token".to_string(),
        refresh_token: "refresh-token".to_string(),
        token_expires_at: Some(Utc::now() + Duration::hours(1)),
        sync_health: SyncHealth::Ok,
        enabled: true,
        consecutive_failures: 0,
        next_retry_at: None,
        last_synced_at: None,
    }
}

pub fn contact_body() -> Value {
    json!({ "name": "Ada Lovelace", "email": "ada@example.com", "phone": "+49 30 1234" })
}
