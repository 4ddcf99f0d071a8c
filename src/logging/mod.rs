//! Structured logging for the registration session.
//!
//! Console and optional JSON-file output over `tracing`, with a session
//! correlation id so interleaved solver traffic can be grouped per
//! registration attempt.

pub mod config;

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use uuid::Uuid;

pub use config::LoggingConfig;

thread_local! {
    static SESSION_ID: std::cell::RefCell<Option<Uuid>> = const { std::cell::RefCell::new(None) };
}

/// Initialize the logging system with the provided configuration
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match config.global_level.as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => "info",
        };
        EnvFilter::new(format!(
            "{}={}",
            env!("CARGO_PKG_NAME").replace('-', "_"),
            level
        ))
    });

    let mut layers = Vec::new();

    // Console output layer
    if config.console_output {
        let console_layer = fmt::layer()
            .with_target(true)
            .with_file(config.include_file_location);
        layers.push(console_layer.boxed());
    }

    // File output layer
    if let Some(ref log_dir) = config.log_directory {
        let file_appender = tracing_appender::rolling::daily(log_dir, "registration.log");
        let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .json();
        layers.push(file_layer.boxed());
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .init();

    tracing::info!("Logging system initialized with config: {:?}", config);
    Ok(())
}

/// Set the registration-session id attached to subsequent log records
pub fn set_session_id(id: Uuid) {
    SESSION_ID.with(|session_id| {
        *session_id.borrow_mut() = Some(id);
    });
}

/// Current registration-session id, if one was set
pub fn get_session_id() -> Option<Uuid> {
    SESSION_ID.with(|session_id| *session_id.borrow())
}

/// Generate a fresh session id and set it
pub fn new_session_id() -> Uuid {
    let id = Uuid::new_v4();
    set_session_id(id);
    id
}

pub fn clear_session_id() {
    SESSION_ID.with(|session_id| {
        *session_id.borrow_mut() = None;
    });
}
