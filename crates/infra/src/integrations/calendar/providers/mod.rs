//! Vendor gateway implementations and factory

pub mod google;
pub mod microsoft;

pub use google::GoogleCalendarGateway;
pub use microsoft::MicrosoftGraphGateway;

use std::sync::Arc;
use std::time::Duration;

use bookline_core::CalendarGateway;
use bookline_domain::{BooklineError, CalendarVendor};

/// OAuth client credentials for one vendor's token endpoint
#[derive(Debug, Clone, Default)]
pub struct OauthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Build the gateway matching an integration's vendor
pub fn create_calendar_gateway(
    vendor: CalendarVendor,
    credentials: OauthCredentials,
    request_timeout: Duration,
) -> Arc<dyn CalendarGateway> {
    match vendor {
        CalendarVendor::Google => {
            Arc::new(GoogleCalendarGateway::new(credentials, request_timeout))
        }
        CalendarVendor::Microsoft => {
            Arc::new(MicrosoftGraphGateway::new(credentials, request_timeout))
        }
    }
}

/// Map a non-success vendor response onto a domain error
pub(crate) async fn vendor_error(context: &str, response: reqwest::Response) -> BooklineError {
    let status = response.status();
    let error_text = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
    let detail = truncate_body(&error_text);

    match status.as_u16() {
        401 | 403 => BooklineError::Auth(format!("{context} rejected ({status}): {detail}")),
        404 | 410 => BooklineError::NotFound(format!("{context} target missing ({status})")),
        400..=499 => BooklineError::InvalidInput(format!("{context} rejected ({status}): {detail}")),
        _ => BooklineError::Network(format!("{context} failed ({status}): {detail}")),
    }
}

// Vendor error bodies can be pages long; keep logs and stored reasons short
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX_CHARS: usize = 200;
    if body.chars().count() <= MAX_CHARS {
        body.to_string()
    } else {
        let truncated: String = body.chars().take(MAX_CHARS).collect();
        format!("{truncated}...")
    }
}
