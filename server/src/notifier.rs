//! Outbound reminder delivery.
//!
//! The daemon treats email delivery as an opaque capability described by the
//! [`Notifier`] trait. The production implementation, [`ResendNotifier`], talks
//! to the Resend transactional email API:
//!
//! - `POST {base_url}/emails` with a bearer API key
//! - A fresh `Idempotency-Key` per dispatch
//! - Request timeout enforced by the underlying `reqwest::Client`
//!
//! # Example
//!
//! ```rust,ignore
//! use timify_server::notifier::{Notifier, Reminder, ResendNotifier};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let notifier = ResendNotifier::new(
//!         "https://api.resend.com",
//!         "re_123",
//!         Duration::from_secs(10),
//!     )?;
//!
//!     let reminder = Reminder::daily("example.com", "me@example.com");
//!     notifier.send(&reminder).await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

/// Default Resend API base URL.
pub const DEFAULT_RESEND_API_URL: &str = "https://api.resend.com";

/// Subject line of the daily reminder.
pub const REMINDER_SUBJECT: &str = "Track Time now!";

/// HTML body of the daily reminder.
pub const REMINDER_HTML: &str =
    "<p>You havent started your time tracking. Do it now by starting Timify on your console!</p>";

/// Header carrying the per-dispatch idempotency key.
const HEADER_IDEMPOTENCY_KEY: &str = "Idempotency-Key";

/// Errors that can occur when delivering a reminder.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The delivery did not complete in time.
    #[error("notification timed out after {0:?}")]
    Timeout(Duration),

    /// The email provider could not be reached.
    #[error("notifier unavailable: {0}")]
    Unavailable(String),

    /// The email provider answered with a non-success status.
    #[error("notification rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The client could not be constructed.
    #[error("notifier configuration error: {0}")]
    Configuration(String),
}

/// A single reminder email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    /// Sender identity, e.g. `Timify Reminder <timify@example.com>`.
    pub from: String,

    /// Recipient addresses.
    pub to: Vec<String>,

    /// Subject line.
    pub subject: String,

    /// HTML body.
    pub html: String,
}

impl Reminder {
    /// Builds the fixed daily reminder for `recipient`, sent from `domain`.
    #[must_use]
    pub fn daily(domain: &str, recipient: &str) -> Self {
        Self {
            from: format!("Timify Reminder <timify@{domain}>"),
            to: vec![recipient.to_string()],
            subject: REMINDER_SUBJECT.to_string(),
            html: REMINDER_HTML.to_string(),
        }
    }
}

/// Capability to deliver a [`Reminder`].
///
/// Implementations must be shareable across tasks; the monitor invokes
/// [`Notifier::send`] from a spawned background task.
pub trait Notifier: Send + Sync + 'static {
    /// Delivers the reminder, resolving once the provider has accepted or
    /// rejected it.
    fn send(&self, reminder: &Reminder) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Response returned by Resend on success.
#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    id: String,
}

/// [`Notifier`] backed by the Resend HTTP API.
#[derive(Debug, Clone)]
pub struct ResendNotifier {
    /// The underlying HTTP client.
    http_client: Client,

    /// API base URL without trailing slash.
    base_url: String,

    /// Resend API key.
    api_key: String,

    /// Per-request timeout, reported in [`NotifyError::Timeout`].
    timeout: Duration,
}

impl ResendNotifier {
    /// Creates a new Resend client.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Configuration`] if the HTTP client cannot be created.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let http_client = Client::builder().timeout(timeout).build().map_err(|e| {
            NotifyError::Configuration(format!("failed to create HTTP client: {e}"))
        })?;

        Ok(Self {
            http_client,
            base_url,
            api_key: api_key.into(),
            timeout,
        })
    }

    /// Returns the configured API base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn deliver(&self, reminder: &Reminder) -> Result<(), NotifyError> {
        let url = format!("{}/emails", self.base_url);
        let idempotency_key = Uuid::new_v4().to_string();

        debug!(
            url = %url,
            recipients = reminder.to.len(),
            idempotency_key = %idempotency_key,
            "Sending reminder email"
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header(HEADER_IDEMPOTENCY_KEY, idempotency_key)
            .json(reminder)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout(self.timeout)
                } else if e.is_connect() {
                    NotifyError::Unavailable(format!("connection failed: {e}"))
                } else {
                    NotifyError::Unavailable(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Resend rejected reminder email");
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        // The id is informational; an unparseable success body is not a failure.
        match response.json::<SendEmailResponse>().await {
            Ok(sent) => debug!(email_id = %sent.id, "Reminder email accepted"),
            Err(e) => debug!(error = %e, "Reminder email accepted without id"),
        }

        Ok(())
    }
}

impl Notifier for ResendNotifier {
    fn send(&self, reminder: &Reminder) -> impl Future<Output = Result<(), NotifyError>> + Send {
        self.deliver(reminder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, body_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_notifier(mock_server: &MockServer) -> ResendNotifier {
        ResendNotifier::new(mock_server.uri(), "re_test_key", Duration::from_secs(2))
            .expect("failed to create test notifier")
    }

    #[test]
    fn daily_reminder_has_fixed_content() {
        let reminder = Reminder::daily("example.com", "me@example.com");

        assert_eq!(reminder.from, "Timify Reminder <timify@example.com>");
        assert_eq!(reminder.to, vec!["me@example.com".to_string()]);
        assert_eq!(reminder.subject, "Track Time now!");
        assert_eq!(reminder.html, REMINDER_HTML);
    }

    #[test]
    fn reminder_serializes_to_resend_shape() {
        let reminder = Reminder::daily("example.com", "me@example.com");
        let json = serde_json::to_value(&reminder).unwrap();

        assert_eq!(json["from"], "Timify Reminder <timify@example.com>");
        assert_eq!(json["to"], serde_json::json!(["me@example.com"]));
        assert_eq!(json["subject"], "Track Time now!");
        assert!(json["html"].as_str().unwrap().starts_with("<p>"));
    }

    #[test]
    fn new_trims_trailing_slashes() {
        let notifier =
            ResendNotifier::new("https://api.resend.com//", "key", Duration::from_secs(1))
                .expect("should create notifier");
        assert_eq!(notifier.base_url(), "https://api.resend.com");
    }

    #[tokio::test]
    async fn send_posts_reminder_with_auth_and_idempotency_key() {
        let mock_server = MockServer::start().await;
        let reminder = Reminder::daily("example.com", "me@example.com");

        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(bearer_token("re_test_key"))
            .and(header_exists("Idempotency-Key"))
            .and(body_json(&reminder))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "email-1" })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let notifier = create_test_notifier(&mock_server);
        let result = notifier.send(&reminder).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn send_accepts_success_without_id() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/emails"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let notifier = create_test_notifier(&mock_server);
        let result = notifier
            .send(&Reminder::daily("example.com", "me@example.com"))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn send_returns_rejected_on_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/emails"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&mock_server)
            .await;

        let notifier = create_test_notifier(&mock_server);
        let result = notifier
            .send(&Reminder::daily("example.com", "me@example.com"))
            .await;

        match result {
            Err(NotifyError::Rejected { status, body }) => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid api key");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn send_returns_timeout_when_provider_is_slow() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/emails"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&mock_server)
            .await;

        let notifier =
            ResendNotifier::new(mock_server.uri(), "re_test_key", Duration::from_millis(100))
                .expect("failed to create notifier");
        let result = notifier
            .send(&Reminder::daily("example.com", "me@example.com"))
            .await;

        assert!(matches!(result, Err(NotifyError::Timeout(_))));
    }

    #[tokio::test]
    async fn send_returns_unavailable_when_unreachable() {
        // Port 1 is reserved and nothing listens there.
        let notifier = ResendNotifier::new("http://127.0.0.1:1", "key", Duration::from_secs(2))
            .expect("failed to create notifier");
        let result = notifier
            .send(&Reminder::daily("example.com", "me@example.com"))
            .await;

        assert!(matches!(result, Err(NotifyError::Unavailable(_))));
    }
}
