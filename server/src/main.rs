//! Timify Server - Main entry point.
//!
//! This binary starts the Timify reminder daemon with:
//! - Structured JSON logging
//! - Two daily jobs: reminder check and nightly reset
//! - Graceful shutdown handling (SIGTERM/SIGINT)
//!
//! # Configuration
//!
//! See [`timify_server::config`] for environment variable configuration.
//!
//! # Example
//!
//! ```bash
//! DOMAIN="example.com" \
//! RESEND_API_KEY="re_123" \
//! PERSONAL_EMAIL="me@example.com" \
//! PORT=3000 \
//! cargo run --release --bin timify-server
//! ```

use std::process::ExitCode;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use timify_server::config::Config;
use timify_server::notifier::{Reminder, ResendNotifier};
use timify_server::routes::{create_router, AppState};
use timify_server::schedule::spawn_daily_job;
use timify_server::tracking::ReminderMonitor;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize structured logging
    init_logging();

    // Load configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            eprintln!("Error: {err}");
            eprintln!();
            eprintln!("Required environment variables:");
            eprintln!("  DOMAIN                      - Sender domain for reminder emails");
            eprintln!("  RESEND_API_KEY              - Resend API key");
            eprintln!("  PERSONAL_EMAIL              - Reminder recipient");
            eprintln!();
            eprintln!("Optional environment variables:");
            eprintln!("  PORT                        - HTTP server port (default: 3000)");
            eprintln!("  RESEND_API_URL              - Resend API base URL");
            eprintln!("  TIMIFY_REMINDER_SCHEDULE    - Reminder time (default: '30 9 * * *')");
            eprintln!("  TIMIFY_RESET_SCHEDULE       - Reset time (default: '59 23 * * *')");
            eprintln!("  TIMIFY_NOTIFY_TIMEOUT_SECS  - Email delivery timeout (default: 10)");
            eprintln!("  TIMIFY_API_TOKEN            - Bearer token for POST /tracking-started");
            eprintln!("  RUST_LOG                    - Log level filter (default: info)");
            return ExitCode::from(1);
        }
    };

    // Log startup information
    let auth_mode = if config.api_token.is_some() {
        "token"
    } else {
        "disabled"
    };
    info!(
        port = config.port,
        reminder_schedule = %config.reminder_schedule,
        reset_schedule = %config.reset_schedule,
        auth_mode = auth_mode,
        "Timify server starting"
    );

    let notifier = match ResendNotifier::new(
        config.resend_api_url.clone(),
        config.resend_api_key.clone(),
        config.notify_timeout,
    ) {
        Ok(notifier) => notifier,
        Err(err) => {
            error!(error = %err, "Failed to create notifier");
            return ExitCode::from(1);
        }
    };

    let monitor = ReminderMonitor::new(
        notifier,
        Reminder::daily(&config.domain, &config.personal_email),
    )
    .with_notify_timeout(config.notify_timeout);

    // Spawn the daily jobs
    let reminder_handle = {
        let monitor = monitor.clone();
        spawn_daily_job("reminder", config.reminder_schedule, move || {
            // Delivery runs detached; its outcome is logged by the monitor.
            drop(monitor.check_and_notify());
        })
    };
    let reset_handle = {
        let monitor = monitor.clone();
        spawn_daily_job("reset", config.reset_schedule, move || monitor.reset_cycle())
    };
    info!("Daily jobs scheduled");

    let state = AppState::new(monitor.state().clone(), config.api_token.clone());
    let app = create_router(state);

    // Bind to address
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => {
            info!(
                port = config.port,
                address = %bind_addr,
                "Server listening"
            );
            listener
        }
        Err(err) => {
            error!(
                error = %err,
                address = %bind_addr,
                "Failed to bind to address"
            );
            return ExitCode::from(1);
        }
    };

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    info!("Server ready to accept connections");

    if let Err(err) = server.await {
        error!(error = %err, "Server error");
        return ExitCode::from(1);
    }

    info!("Server shutting down gracefully");

    reminder_handle.abort();
    reset_handle.abort();
    info!("Daily jobs stopped");

    info!("Server shutdown complete");
    ExitCode::SUCCESS
}

/// Initialize structured logging with tracing.
///
/// JSON output, filtered by `RUST_LOG` (default `info`).
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .init();
}

/// Creates a future that resolves when a shutdown signal is received.
///
/// Listens for:
/// - SIGTERM (container orchestrator shutdown)
/// - SIGINT (Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
