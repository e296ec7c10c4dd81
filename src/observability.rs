use crate::config::GeneralConfig;
use crate::errors::ConfigError;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured logging. `RUST_LOG` wins over the configured level.
/// `log` macros are forwarded into the same subscriber.
pub fn init_logging(config: &GeneralConfig) -> Result<(), ConfigError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let (writer, ansi) = if config.log_file.is_empty() {
        (BoxMakeWriter::new(std::io::stdout), true)
    } else {
        let path = PathBuf::from(&config.log_file);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| ConfigError::Write { path, source })?;
        (BoxMakeWriter::new(Mutex::new(file)), false)
    };

    if config.log_format == "json" {
        // JSON structured logging for production
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(true)
                    .with_current_span(false)
                    .with_span_list(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(writer)
                    .with_ansi(ansi)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    }

    info!(
        service = "feedrelay",
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.log_level,
        log_format = %config.log_format,
        "Logging initialized"
    );
    Ok(())
}
