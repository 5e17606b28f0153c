use anyhow::Result;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

const DEFAULT_FILTER: &str = "info,answer_api_server=debug,tower_http=info";

/// Install the global subscriber: stdout always, plus a daily rolling file
/// when `logging.directory` is set. `RUST_LOG` overrides the default filter.
pub fn init_logger(config: &LoggingConfig) -> Result<()> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) => EnvFilter::try_new(directives)?,
        Err(_) => EnvFilter::try_new(DEFAULT_FILTER)?,
    };

    let file_appender = match config.directory.as_deref() {
        Some(dir) if !dir.trim().is_empty() => Some(
            RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("answer-api")
                .filename_suffix("log")
                .build(dir)?,
        ),
        _ => None,
    };

    match config.format.as_str() {
        "json" => {
            let file_layer = file_appender.map(|appender| {
                fmt::layer()
                    .json()
                    .with_writer(appender)
                    .with_target(true)
                    .with_thread_ids(true)
            });

            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stdout)
                        .with_target(true)
                        .with_thread_ids(true),
                )
                .with(file_layer)
                .try_init()?;
        }
        _ => {
            let file_layer = file_appender.map(|appender| {
                fmt::layer()
                    .with_writer(appender)
                    .with_target(true)
                    .with_ansi(false)
            });

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stdout).with_target(true))
                .with(file_layer)
                .try_init()?;
        }
    }

    Ok(())
}
