use std::path::PathBuf;

use thiserror::Error;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::config::Config;

const LOG_FILE_PREFIX: &str = "dice-session-backend";
const MAX_LOG_FILES: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Fallback filter when `RUST_LOG` is unset or invalid.
    pub level: String,
    /// Daily-rotated JSON logs are written here in addition to stdout.
    pub file_dir: Option<PathBuf>,
}

impl From<&Config> for LogConfig {
    fn from(config: &Config) -> Self {
        Self {
            level: config.log_level.clone(),
            file_dir: config
                .enable_file_logs
                .then(|| PathBuf::from(&config.log_dir)),
        }
    }
}

#[derive(Debug, Error)]
pub enum LogInitError {
    #[error("cannot open log directory: {0}")]
    Appender(#[from] InitError),
    #[error("cannot install subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

/// Install the global subscriber. A no-op when one is already installed.
pub fn init_tracing(config: &LogConfig) -> Result<(), LogInitError> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = match &config.file_dir {
        Some(dir) => {
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .filename_suffix("log")
                .max_log_files(MAX_LOG_FILES)
                .build(dir)?;
            Some(fmt::layer().with_writer(appender).with_ansi(false).json())
        }
        None => None,
    };

    Registry::default()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .try_init()?;
    Ok(())
}
