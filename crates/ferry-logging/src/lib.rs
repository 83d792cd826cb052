//! Structured logging for Ferry simulations
//!
//! # Features
//!
//! - **JSONL Output**: Structured JSON lines for post-run analysis (default)
//! - **Node Context Injection**: Spans opened while a node is being driven
//!   carry that node
//! - **File Output**: Single-file or rotating output via tracing-appender
//! - **RUST_LOG**: The environment filter always wins over the configured level
//!
//! # Quick Start
//!
//! ```ignore
//! use ferry_logging::{FerrySubscriberBuilder, LogConfig};
//!
//! // JSONL to console
//! FerrySubscriberBuilder::new().init()?;
//!
//! // Human-readable output while developing
//! FerrySubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init()?;
//! ```
//!
//! # Node Context
//!
//! ```ignore
//! use ferry_logging::NodeContextGuard;
//!
//! let _guard = NodeContextGuard::new(node);
//! policy.tick(&world, &buffer, &connections, &mut scheduler)?;
//! ```

pub mod config;
pub mod context;
pub mod layers;

pub use config::{ConsoleConfig, FileConfig, JsonlConfig, LogConfig, RotationStrategy};
pub use context::{NodeContextData, NodeContextGuard};
pub use layers::{NodeContextExtension, NodeContextLayer};

use std::fs::{self, File};

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LogInitError {
    #[error("Failed to prepare log file: {0}")]
    Io(#[from] std::io::Error),

    #[error("A global subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] tracing_subscriber::util::TryInitError),
}

/// Builder for configuring and installing the Ferry logging subscriber
///
/// By default console output is JSONL. Use [`LogConfig::development`] for
/// human-readable output.
pub struct FerrySubscriberBuilder {
    config: LogConfig,
}

impl FerrySubscriberBuilder {
    /// Create a builder with the default configuration
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    fn file_writer(file_config: &FileConfig) -> Result<(NonBlocking, WorkerGuard), LogInitError> {
        fs::create_dir_all(&file_config.directory)?;
        let rotation = match file_config.rotation {
            RotationStrategy::Never => {
                // Single file, truncated on every run
                let path = file_config
                    .directory
                    .join(format!("{}.log", file_config.prefix));
                return Ok(tracing_appender::non_blocking(File::create(path)?));
            }
            RotationStrategy::Daily => Rotation::DAILY,
            RotationStrategy::Hourly => Rotation::HOURLY,
        };
        let appender =
            RollingFileAppender::new(rotation, &file_config.directory, &file_config.prefix);
        Ok(tracing_appender::non_blocking(appender))
    }

    /// Install the subscriber globally
    ///
    /// The returned guard flushes file output when dropped and must be kept
    /// alive for as long as logging is needed.
    pub fn init(self) -> Result<Option<WorkerGuard>, LogInitError> {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&self.config.default_level));

        let console = &self.config.console;
        let jsonl = &self.config.jsonl;

        let pretty_console = (console.enabled && console.pretty).then(|| {
            tracing_subscriber::fmt::layer()
                .with_ansi(console.ansi)
                .with_target(true)
        });
        let json_console = (console.enabled && !console.pretty)
            .then(|| layers::jsonl_layer(std::io::stdout, jsonl));

        let (file_layer, guard) = match &self.config.file {
            Some(file_config) => {
                let (writer, guard) = Self::file_writer(file_config)?;
                (Some(layers::jsonl_layer(writer, jsonl)), Some(guard))
            }
            None => (None, None),
        };

        Registry::default()
            .with(env_filter)
            .with(NodeContextLayer::new())
            .with(pretty_console)
            .with(json_console)
            .with(file_layer)
            .try_init()?;

        Ok(guard)
    }
}

impl Default for FerrySubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Install logging for development (verbose, pretty console output)
pub fn init_development() -> Result<Option<WorkerGuard>, LogInitError> {
    FerrySubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
}

/// Install logging for tests; a subscriber that is already installed is kept
pub fn init_testing() {
    let _ = FerrySubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .init();
}
