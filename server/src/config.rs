//! Server configuration module.
//!
//! Parses configuration from environment variables for the Timify server.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `DOMAIN` | Yes | - | Sender domain for reminder emails |
//! | `RESEND_API_KEY` | Yes | - | Resend API key |
//! | `PERSONAL_EMAIL` | Yes | - | Reminder recipient |
//! | `PORT` | No | 3000 | HTTP server port |
//! | `RESEND_API_URL` | No | `https://api.resend.com` | Resend API base URL |
//! | `TIMIFY_REMINDER_SCHEDULE` | No | `30 9 * * *` | When to check and remind |
//! | `TIMIFY_RESET_SCHEDULE` | No | `59 23 * * *` | When to reset the daily flag |
//! | `TIMIFY_NOTIFY_TIMEOUT_SECS` | No | 10 | Timeout for a reminder delivery |
//! | `TIMIFY_API_TOKEN` | No | - | Bearer token for `POST /tracking-started` |
//!
//! Empty values are treated as unset.

use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::notifier::DEFAULT_RESEND_API_URL;
use crate::schedule::{DailySchedule, ScheduleError};

/// Default HTTP server port.
const DEFAULT_PORT: u16 = 3000;

/// Default check-and-notify schedule (09:30 daily).
const DEFAULT_REMINDER_SCHEDULE: &str = "30 9 * * *";

/// Default reset schedule (23:59 daily).
const DEFAULT_RESET_SCHEDULE: &str = "59 23 * * *";

/// Default reminder delivery timeout in seconds.
const DEFAULT_NOTIFY_TIMEOUT_SECS: u64 = 10;

/// Errors that can occur when parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has invalid format.
    #[error("invalid format for {var}: {message}")]
    InvalidFormat { var: String, message: String },

    /// Port number is invalid.
    #[error("invalid port number: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),

    /// A schedule expression is invalid.
    #[error("invalid schedule in {var}: {source}")]
    InvalidSchedule {
        var: String,
        #[source]
        source: ScheduleError,
    },
}

/// Server configuration parsed from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Domain the reminder is sent from (`timify@{domain}`).
    pub domain: String,

    /// Resend API key.
    pub resend_api_key: String,

    /// Recipient of the reminder.
    pub personal_email: String,

    /// HTTP server port.
    pub port: u16,

    /// Resend API base URL.
    pub resend_api_url: String,

    /// When the daily check runs.
    pub reminder_schedule: DailySchedule,

    /// When the daily flag is reset.
    pub reset_schedule: DailySchedule,

    /// Upper bound on a single reminder delivery.
    pub notify_timeout: Duration,

    /// Optional bearer token guarding `POST /tracking-started`.
    pub api_token: Option<String>,
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `DOMAIN`, `RESEND_API_KEY` or `PERSONAL_EMAIL` is missing
    /// - `PERSONAL_EMAIL` is not an email address
    /// - Port, timeout or schedule values are malformed
    ///
    /// # Example
    ///
    /// ```no_run
    /// use timify_server::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Server will listen on port {}", config.port);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            domain: required_env("DOMAIN")?,
            resend_api_key: required_env("RESEND_API_KEY")?,
            personal_email: required_env("PERSONAL_EMAIL")?,
            port: parse_port()?,
            resend_api_url: optional_env("RESEND_API_URL")
                .unwrap_or_else(|| DEFAULT_RESEND_API_URL.to_string()),
            reminder_schedule: parse_schedule(
                "TIMIFY_REMINDER_SCHEDULE",
                DEFAULT_REMINDER_SCHEDULE,
            )?,
            reset_schedule: parse_schedule("TIMIFY_RESET_SCHEDULE", DEFAULT_RESET_SCHEDULE)?,
            notify_timeout: parse_notify_timeout()?,
            api_token: optional_env("TIMIFY_API_TOKEN"),
        };

        config.validate()?;

        if config.api_token.is_none() {
            warn!(
                "TIMIFY_API_TOKEN is not set - POST /tracking-started accepts \
                 unauthenticated requests"
            );
        }

        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let email = self.personal_email.as_str();
        let valid_email = email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
        if !valid_email {
            return Err(ConfigError::InvalidFormat {
                var: "PERSONAL_EMAIL".to_string(),
                message: format!("expected an email address, got '{email}'"),
            });
        }

        if self.domain.contains('@') || self.domain.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidFormat {
                var: "DOMAIN".to_string(),
                message: format!("expected a bare domain name, got '{}'", self.domain),
            });
        }

        if self.reminder_schedule == self.reset_schedule {
            warn!(
                schedule = %self.reminder_schedule,
                "Reminder and reset share a fire time; their order is unspecified"
            );
        }

        Ok(())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("domain", &self.domain)
            .field("resend_api_key", &"<redacted>")
            .field("personal_email", &self.personal_email)
            .field("port", &self.port)
            .field("resend_api_url", &self.resend_api_url)
            .field("reminder_schedule", &self.reminder_schedule.to_string())
            .field("reset_schedule", &self.reset_schedule.to_string())
            .field("notify_timeout", &self.notify_timeout)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Read an environment variable, treating empty values as unset.
fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    optional_env(name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

/// Parse the PORT environment variable.
///
/// Returns the default port if not set or empty.
fn parse_port() -> Result<u16, ConfigError> {
    if let Err(env::VarError::NotUnicode(_)) = env::var("PORT") {
        return Err(ConfigError::InvalidFormat {
            var: "PORT".to_string(),
            message: "contains invalid unicode".to_string(),
        });
    }

    match optional_env("PORT") {
        Some(port_str) => Ok(port_str.parse()?),
        None => Ok(DEFAULT_PORT),
    }
}

fn parse_schedule(var: &str, default: &str) -> Result<DailySchedule, ConfigError> {
    let expr = optional_env(var).unwrap_or_else(|| default.to_string());
    expr.parse().map_err(|source| ConfigError::InvalidSchedule {
        var: var.to_string(),
        source,
    })
}

fn parse_notify_timeout() -> Result<Duration, ConfigError> {
    const VAR: &str = "TIMIFY_NOTIFY_TIMEOUT_SECS";

    let Some(raw) = optional_env(VAR) else {
        return Ok(Duration::from_secs(DEFAULT_NOTIFY_TIMEOUT_SECS));
    };

    match raw.parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidFormat {
            var: VAR.to_string(),
            message: "timeout must be greater than zero".to_string(),
        }),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(e) => Err(ConfigError::InvalidFormat {
            var: VAR.to_string(),
            message: e.to_string(),
        }),
    }
}
