//! Microsoft Graph calendar gateway implementation

use std::time::Duration;

use async_trait::async_trait;
use bookline_core::{CalendarEventPayload, CalendarGateway, TokenRefresh};
use bookline_domain::{BooklineError, CalendarIntegration, ExternalBusyBlock, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{truncate_body, vendor_error, OauthCredentials};
use crate::errors::InfraError;

const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";
const MICROSOFT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default offline_access";
const OUTLOOK_TIMEZONE_HEADER: &str = r#"outlook.timezone="UTC""#;
// Filterable MAPI named property carrying the appointment id
const IDEMPOTENCY_PROPERTY_ID: &str =
    "String {9f55f2f0-1a96-4c06-9ed8-2a1f4c0f27a3} Name BooklineAppointmentId";
// calendarView pages followed per fetch before giving up
const MAX_BUSY_PAGES: usize = 8;

/// Microsoft Graph calendar gateway
pub struct MicrosoftGraphGateway {
    client: Client,
    credentials: OauthCredentials,
    request_timeout: Duration,
    api_base: String,
    token_url: String,
}

impl MicrosoftGraphGateway {
    pub fn new(credentials: OauthCredentials, request_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            credentials,
            request_timeout,
            api_base: GRAPH_API_BASE.to_string(),
            token_url: MICROSOFT_TOKEN_URL.to_string(),
        }
    }

    /// Point the gateway at a different API origin (for testing)
    pub fn with_api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = url.into();
        self
    }

    /// Point token refresh at a different endpoint (for testing)
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    fn events_url(&self, calendar_id: &str) -> String {
        if calendar_id.eq_ignore_ascii_case("primary") {
            format!("{}/me/calendar/events", self.api_base)
        } else {
            format!("{}/me/calendars/{}/events", self.api_base, calendar_id)
        }
    }

    fn calendar_view_url(&self, calendar_id: &str) -> String {
        if calendar_id.eq_ignore_ascii_case("primary") {
            format!("{}/me/calendar/calendarView", self.api_base)
        } else {
            format!("{}/me/calendars/{}/calendarView", self.api_base, calendar_id)
        }
    }

    fn event_url(&self, event_id: &str) -> String {
        format!("{}/me/events/{}", self.api_base, event_id)
    }

    /// The event already carrying the idempotency key, if any
    async fn find_event_by_key(
        &self,
        integration: &CalendarIntegration,
        key: &str,
    ) -> Result<Option<String>> {
        let filter = format!(
            "singleValueExtendedProperties/any(ep: ep/id eq '{IDEMPOTENCY_PROPERTY_ID}' \
             and ep/value eq '{key}')"
        );
        let response = self
            .client
            .get(self.events_url(&integration.external_calendar_id))
            .timeout(self.request_timeout)
            .bearer_auth(&integration.access_token)
            .query(&[("$filter", filter.as_str()), ("$select", "id"), ("$top", "1")])
            .send()
            .await
            .map_err(InfraError::from)?;

        if !response.status().is_success() {
            return Err(vendor_error("Microsoft event search", response).await);
        }

        let events: GraphEventsResponse = response.json().await.map_err(InfraError::from)?;
        Ok(events.value.into_iter().next().map(|event| event.id))
    }
}

#[async_trait]
impl CalendarGateway for MicrosoftGraphGateway {
    async fn refresh_token(&self, integration: &CalendarIntegration) -> Result<TokenRefresh> {
        let response = self
            .client
            .post(&self.token_url)
            .timeout(self.request_timeout)
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", integration.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
                ("scope", GRAPH_SCOPE),
            ])
            .send()
            .await
            .map_err(|e| BooklineError::Auth(format!("token refresh request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text =
                response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            return Err(BooklineError::Auth(format!(
                "token refresh failed ({status}): {}",
                truncate_body(&error_text)
            )));
        }

        let token: GraphTokenResponse = response
            .json()
            .await
            .map_err(|e| BooklineError::Auth(format!("malformed token response: {e}")))?;

        Ok(TokenRefresh {
            access_token: token.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(token.expires_in),
        })
    }

    async fn fetch_busy_blocks(
        &self,
        integration: &CalendarIntegration,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ExternalBusyBlock>> {
        let mut blocks = Vec::new();
        let mut next_url: Option<String> = None;
        let mut pages = 0;

        loop {
            let builder = match &next_url {
                Some(url) => self.client.get(url),
                None => self
                    .client
                    .get(self.calendar_view_url(&integration.external_calendar_id))
                    .query(&[
                        ("startDateTime", from.to_rfc3339()),
                        ("endDateTime", to.to_rfc3339()),
                        ("$select", "start,end,showAs,isCancelled".to_string()),
                        ("$top", "100".to_string()),
                    ]),
            };

            let response = builder
                .timeout(self.request_timeout)
                .bearer_auth(&integration.access_token)
                .header("Prefer", OUTLOOK_TIMEZONE_HEADER)
                .send()
                .await
                .map_err(InfraError::from)?;

            if !response.status().is_success() {
                return Err(vendor_error("Microsoft calendarView query", response).await);
            }

            let page: GraphCalendarViewResponse =
                response.json().await.map_err(InfraError::from)?;

            for event in page.value {
                if event.is_cancelled.unwrap_or(false) {
                    continue;
                }
                if matches!(event.show_as.as_deref(), Some("free") | Some("workingElsewhere")) {
                    continue;
                }
                blocks.push(ExternalBusyBlock {
                    integration_id: integration.id,
                    start: parse_graph_time(&event.start)?,
                    end: parse_graph_time(&event.end)?,
                });
            }

            match page.next_link {
                Some(next) if pages < MAX_BUSY_PAGES => {
                    next_url = Some(next);
                    pages += 1;
                }
                _ => break,
            }
        }

        Ok(blocks)
    }

    async fn upsert_event(
        &self,
        integration: &CalendarIntegration,
        payload: &CalendarEventPayload,
    ) -> Result<String> {
        let response = match self.find_event_by_key(integration, &payload.idempotency_key).await? {
            Some(event_id) => {
                // Updates never resend the key; it is immutable on the event
                let body = GraphEventBody::from_payload(payload, false);
                self.client
                    .patch(self.event_url(&event_id))
                    .timeout(self.request_timeout)
                    .bearer_auth(&integration.access_token)
                    .json(&body)
                    .send()
                    .await
                    .map_err(InfraError::from)?
            }
            None => {
                let body = GraphEventBody::from_payload(payload, true);
                self.client
                    .post(self.events_url(&integration.external_calendar_id))
                    .timeout(self.request_timeout)
                    .bearer_auth(&integration.access_token)
                    .json(&body)
                    .send()
                    .await
                    .map_err(InfraError::from)?
            }
        };

        if !response.status().is_success() {
            return Err(vendor_error("Microsoft event upsert", response).await);
        }

        let event: GraphEventResource = response.json().await.map_err(InfraError::from)?;
        Ok(event.id)
    }

    async fn delete_event(
        &self,
        integration: &CalendarIntegration,
        external_event_id: &str,
    ) -> Result<()> {
        let response = self
            .client
            .delete(self.event_url(external_event_id))
            .timeout(self.request_timeout)
            .bearer_auth(&integration.access_token)
            .send()
            .await
            .map_err(InfraError::from)?;

        let status = response.status();
        // 404/410 means the event is already gone, which is the desired state
        if status.is_success() || status.as_u16() == 404 || status.as_u16() == 410 {
            return Ok(());
        }
        Err(vendor_error("Microsoft event delete", response).await)
    }

    async fn event_exists(
        &self,
        integration: &CalendarIntegration,
        external_event_id: &str,
    ) -> Result<bool> {
        let response = self
            .client
            .get(self.event_url(external_event_id))
            .timeout(self.request_timeout)
            .bearer_auth(&integration.access_token)
            .query(&[("$select", "id,isCancelled")])
            .send()
            .await
            .map_err(InfraError::from)?;

        let status = response.status();
        if status.as_u16() == 404 || status.as_u16() == 410 {
            return Ok(false);
        }
        if !status.is_success() {
            return Err(vendor_error("Microsoft event lookup", response).await);
        }

        let event: GraphEventResource = response.json().await.map_err(InfraError::from)?;
        Ok(!event.is_cancelled.unwrap_or(false))
    }
}

// The `Prefer` header pins response times to UTC, so the value parses as a
// zoneless local timestamp
fn parse_graph_time(value: &GraphDateTime) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(&value.date_time, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            BooklineError::Network(format!(
                "Microsoft returned malformed timestamp `{}`: {e}",
                value.date_time
            ))
        })
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphDateTime {
    date_time: String,
    #[serde(default)]
    time_zone: String,
}

#[derive(Debug, Deserialize)]
struct GraphCalendarViewResponse {
    #[serde(default)]
    value: Vec<GraphViewEvent>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphViewEvent {
    start: GraphDateTime,
    end: GraphDateTime,
    show_as: Option<String>,
    is_cancelled: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphEventBody {
    subject: String,
    body: GraphItemBody,
    start: GraphDateTime,
    end: GraphDateTime,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    single_value_extended_properties: Vec<GraphExtendedProperty>,
}

impl GraphEventBody {
    fn from_payload(payload: &CalendarEventPayload, with_key: bool) -> Self {
        let properties = if with_key {
            vec![GraphExtendedProperty {
                id: IDEMPOTENCY_PROPERTY_ID.to_string(),
                value: payload.idempotency_key.clone(),
            }]
        } else {
            Vec::new()
        };

        Self {
            subject: payload.summary.clone(),
            body: GraphItemBody {
                content_type: "text".to_string(),
                content: payload.description.clone(),
            },
            start: GraphDateTime {
                date_time: payload.start.format("%Y-%m-%dT%H:%M:%S").to_string(),
                time_zone: "UTC".to_string(),
            },
            end: GraphDateTime {
                date_time: payload.end.format("%Y-%m-%dT%H:%M:%S").to_string(),
                time_zone: "UTC".to_string(),
            },
            single_value_extended_properties: properties,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphItemBody {
    content_type: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct GraphExtendedProperty {
    id: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct GraphEventsResponse {
    #[serde(default)]
    value: Vec<GraphEventResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphEventResource {
    id: String,
    is_cancelled: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct GraphTokenResponse {
    access_token: String,
    expires_in: i64,
}
