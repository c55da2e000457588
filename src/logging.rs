//! # Console Logging
//!
//! Environment-aware console logging using the tracing ecosystem, for
//! services and test binaries that want to see the lifecycle's diagnostics.
//! Library code only emits `tracing` events; installing a subscriber is left
//! to the host, and this is the default one.

use std::io::IsTerminal;
use std::sync::OnceLock;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Install a console subscriber once per process.
///
/// `RUST_LOG` wins when set; otherwise the level follows the environment name.
/// An already-installed global subscriber is left in place.
pub fn init_console_logging() {
    LOGGING_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let use_ansi = IsTerminal::is_terminal(&std::io::stdout());

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(use_ansi)
            .with_filter(filter);

        let subscriber = tracing_subscriber::registry().with(console_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        } else {
            tracing::info!(
                environment = %environment,
                ansi_colors = use_ansi,
                "Console logging initialized"
            );
        }
    });
}

fn get_environment() -> String {
    std::env::var("DEPLOYMENT_ENVIRONMENT")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" | "prod" => "info",
        _ => "debug",
    }
}
