//! Google Calendar gateway implementation

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bookline_core::{CalendarEventPayload, CalendarGateway, TokenRefresh};
use bookline_domain::{BooklineError, CalendarIntegration, ExternalBusyBlock, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{truncate_body, vendor_error, OauthCredentials};
use crate::errors::InfraError;

const GOOGLE_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
// Private extended property carrying the appointment id
const IDEMPOTENCY_PROPERTY: &str = "booklineAppointmentId";

/// Google Calendar gateway
pub struct GoogleCalendarGateway {
    client: Client,
    credentials: OauthCredentials,
    request_timeout: Duration,
    api_base: String,
    token_url: String,
}

impl GoogleCalendarGateway {
    pub fn new(credentials: OauthCredentials, request_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            credentials,
            request_timeout,
            api_base: GOOGLE_API_BASE.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
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
        format!("{}/calendars/{}/events", self.api_base, calendar_id)
    }

    /// The event already carrying the idempotency key, if any
    async fn find_event_by_key(
        &self,
        integration: &CalendarIntegration,
        key: &str,
    ) -> Result<Option<String>> {
        let response = self
            .client
            .get(self.events_url(&integration.external_calendar_id))
            .timeout(self.request_timeout)
            .bearer_auth(&integration.access_token)
            .query(&[
                ("privateExtendedProperty", format!("{IDEMPOTENCY_PROPERTY}={key}")),
                ("showDeleted", "false".to_string()),
                ("maxResults", "1".to_string()),
            ])
            .send()
            .await
            .map_err(InfraError::from)?;

        if !response.status().is_success() {
            return Err(vendor_error("Google event search", response).await);
        }

        let events: GoogleEventsResponse =
            response.json().await.map_err(InfraError::from)?;
        Ok(events.items.into_iter().next().map(|event| event.id))
    }
}

#[async_trait]
impl CalendarGateway for GoogleCalendarGateway {
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

        let token: GoogleTokenResponse = response
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
        let request = GoogleFreeBusyRequest {
            time_min: from.to_rfc3339(),
            time_max: to.to_rfc3339(),
            items: vec![GoogleFreeBusyItem { id: integration.external_calendar_id.clone() }],
        };

        let response = self
            .client
            .post(format!("{}/freeBusy", self.api_base))
            .timeout(self.request_timeout)
            .bearer_auth(&integration.access_token)
            .json(&request)
            .send()
            .await
            .map_err(InfraError::from)?;

        if !response.status().is_success() {
            return Err(vendor_error("Google freeBusy query", response).await);
        }

        let free_busy: GoogleFreeBusyResponse =
            response.json().await.map_err(InfraError::from)?;

        let mut blocks = Vec::new();
        if let Some(calendar) = free_busy.calendars.get(&integration.external_calendar_id) {
            for interval in &calendar.busy {
                blocks.push(ExternalBusyBlock {
                    integration_id: integration.id,
                    start: parse_rfc3339(&interval.start)?,
                    end: parse_rfc3339(&interval.end)?,
                });
            }
        }
        Ok(blocks)
    }

    async fn upsert_event(
        &self,
        integration: &CalendarIntegration,
        payload: &CalendarEventPayload,
    ) -> Result<String> {
        let body = GoogleEventBody::from_payload(payload);

        let response = match self.find_event_by_key(integration, &payload.idempotency_key).await? {
            Some(event_id) => {
                let url = format!(
                    "{}/{}",
                    self.events_url(&integration.external_calendar_id),
                    event_id
                );
                self.client
                    .patch(&url)
                    .timeout(self.request_timeout)
                    .bearer_auth(&integration.access_token)
                    .json(&body)
                    .send()
                    .await
                    .map_err(InfraError::from)?
            }
            None => self
                .client
                .post(self.events_url(&integration.external_calendar_id))
                .timeout(self.request_timeout)
                .bearer_auth(&integration.access_token)
                .json(&body)
                .send()
                .await
                .map_err(InfraError::from)?,
        };

        if !response.status().is_success() {
            return Err(vendor_error("Google event upsert", response).await);
        }

        let event: GoogleEventResource = response.json().await.map_err(InfraError::from)?;
        Ok(event.id)
    }

    async fn delete_event(
        &self,
        integration: &CalendarIntegration,
        external_event_id: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/{}",
            self.events_url(&integration.external_calendar_id),
            external_event_id
        );
        let response = self
            .client
            .delete(&url)
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
        Err(vendor_error("Google event delete", response).await)
    }

    async fn event_exists(
        &self,
        integration: &CalendarIntegration,
        external_event_id: &str,
    ) -> Result<bool> {
        let url = format!(
            "{}/{}",
            self.events_url(&integration.external_calendar_id),
            external_event_id
        );
        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .bearer_auth(&integration.access_token)
            .send()
            .await
            .map_err(InfraError::from)?;

        let status = response.status();
        if status.as_u16() == 404 || status.as_u16() == 410 {
            return Ok(false);
        }
        if !status.is_success() {
            return Err(vendor_error("Google event lookup", response).await);
        }

        let event: GoogleEventResource = response.json().await.map_err(InfraError::from)?;
        Ok(event.status.as_deref() != Some("cancelled"))
    }
}

fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw).map(|dt| dt.to_utc()).map_err(|e| {
        BooklineError::Network(format!("Google returned malformed timestamp `{raw}`: {e}"))
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleFreeBusyRequest {
    time_min: String,
    time_max: String,
    items: Vec<GoogleFreeBusyItem>,
}

#[derive(Debug, Serialize)]
struct GoogleFreeBusyItem {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GoogleFreeBusyResponse {
    #[serde(default)]
    calendars: HashMap<String, GoogleFreeBusyCalendar>,
}

#[derive(Debug, Deserialize)]
struct GoogleFreeBusyCalendar {
    #[serde(default)]
    busy: Vec<GoogleBusyInterval>,
}

#[derive(Debug, Deserialize)]
struct GoogleBusyInterval {
    start: String,
    end: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventBody {
    summary: String,
    description: String,
    start: GoogleEventTime,
    end: GoogleEventTime,
    extended_properties: GoogleExtendedProperties,
}

impl GoogleEventBody {
    fn from_payload(payload: &CalendarEventPayload) -> Self {
        Self {
            summary: payload.summary.clone(),
            description: payload.description.clone(),
            start: GoogleEventTime { date_time: payload.start.to_rfc3339() },
            end: GoogleEventTime { date_time: payload.end.to_rfc3339() },
            extended_properties: GoogleExtendedProperties {
                private: HashMap::from([(
                    IDEMPOTENCY_PROPERTY.to_string(),
                    payload.idempotency_key.clone(),
                )]),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventTime {
    date_time: String,
}

#[derive(Debug, Serialize)]
struct GoogleExtendedProperties {
    private: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct GoogleEventsResponse {
    #[serde(default)]
    items: Vec<GoogleEventResource>,
}

#[derive(Debug, Deserialize)]
struct GoogleEventResource {
    id: String,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    expires_in: i64,
}
