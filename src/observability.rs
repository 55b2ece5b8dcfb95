//! Tracing subscriber setup
//!
//! The engine only emits `tracing` events and spans; installing a subscriber
//! is left to the application. These helpers cover the common setups.
//!
//! ## Example
//!
//! ```rust,ignore
//! use siumai_engine::observability::{init_subscriber, OutputFormat, SubscriberConfig};
//!
//! let config = SubscriberConfig::builder()
//!     .log_level(tracing::Level::DEBUG)
//!     .output_format(OutputFormat::Json)
//!     .build();
//! let _guard = init_subscriber(config)?;
//! ```

use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::error::LlmError;

/// Output format for tracing logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON, one object per event with span context
    Json,
    /// JSON with event fields flattened into the top-level object
    JsonCompact,
}

impl std::str::FromStr for OutputFormat {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "json-compact" | "json_compact" => Ok(Self::JsonCompact),
            other => Err(LlmError::ConfigurationError(format!(
                "Invalid log format: {other}. Valid options: text, json, json-compact"
            ))),
        }
    }
}

/// Configuration for tracing subscriber
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub log_level: tracing::Level,
    pub output_format: OutputFormat,
    /// Write events to stderr
    pub enable_console: bool,
    /// Also write events to this file (never rotated)
    pub log_file: Option<PathBuf>,
    /// Full filter directive, overriding `log_level` (e.g. `siumai_engine=trace,reqwest=debug`)
    pub filter: Option<String>,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            log_level: tracing::Level::INFO,
            output_format: OutputFormat::Text,
            enable_console: true,
            log_file: None,
            filter: None,
        }
    }
}

impl SubscriberConfig {
    pub fn builder() -> SubscriberConfigBuilder {
        SubscriberConfigBuilder::default()
    }

    pub fn debug() -> Self {
        Self {
            log_level: tracing::Level::DEBUG,
            ..Self::default()
        }
    }

    /// JSON to a file only, warnings and above.
    pub fn production(log_file: PathBuf) -> Self {
        Self {
            log_level: tracing::Level::WARN,
            output_format: OutputFormat::Json,
            enable_console: false,
            log_file: Some(log_file),
            filter: None,
        }
    }

    /// The `EnvFilter` directive this config installs.
    pub fn filter_directive(&self) -> String {
        match &self.filter {
            Some(filter) => filter.clone(),
            None => format!("siumai_engine={}", self.log_level.to_string().to_lowercase()),
        }
    }
}

/// Builder for SubscriberConfig
#[derive(Debug, Default)]
pub struct SubscriberConfigBuilder {
    log_level: Option<tracing::Level>,
    output_format: Option<OutputFormat>,
    enable_console: Option<bool>,
    log_file: Option<PathBuf>,
    filter: Option<String>,
}

impl SubscriberConfigBuilder {
    pub fn log_level(mut self, level: tracing::Level) -> Self {
        self.log_level = Some(level);
        self
    }

    /// Set the log level from a string
    pub fn log_level_str(mut self, level: &str) -> Result<Self, LlmError> {
        let level = level.parse::<tracing::Level>().map_err(|_| {
            LlmError::ConfigurationError(format!(
                "Invalid log level: {level}. Valid options: trace, debug, info, warn, error"
            ))
        })?;
        self.log_level = Some(level);
        Ok(self)
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn enable_console(mut self, enable: bool) -> Self {
        self.enable_console = Some(enable);
        self
    }

    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn filter(mut self, directive: impl Into<String>) -> Self {
        self.filter = Some(directive.into());
        self
    }

    pub fn build(self) -> SubscriberConfig {
        SubscriberConfig {
            log_level: self.log_level.unwrap_or(tracing::Level::INFO),
            output_format: self.output_format.unwrap_or_default(),
            enable_console: self.enable_console.unwrap_or(true),
            log_file: self.log_file,
            filter: self.filter,
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

fn format_layer<W>(format: OutputFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true);
    match format {
        OutputFormat::Text => layer.boxed(),
        OutputFormat::Json => layer
            .json()
            .with_thread_ids(true)
            .with_thread_names(true)
            .boxed(),
        OutputFormat::JsonCompact => layer.json().flatten_event(true).boxed(),
    }
}

/// Install a global subscriber.
///
/// Returns the file writer's guard when `log_file` is set; keep it alive for
/// the life of the program or buffered events are lost. An already installed
/// global subscriber is not an error.
pub fn init_subscriber(config: SubscriberConfig) -> Result<Option<WorkerGuard>, LlmError> {
    let filter = EnvFilter::try_new(config.filter_directive()).map_err(|e| {
        LlmError::ConfigurationError(format!("Invalid tracing filter: {e}"))
    })?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if config.enable_console {
        layers.push(format_layer(config.output_format, std::io::stderr, true));
    }

    let mut guard = None;
    if let Some(path) = &config.log_file {
        let file_name = path.file_name().ok_or_else(|| {
            LlmError::ConfigurationError(format!("Invalid log file path: {}", path.display()))
        })?;
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let (writer, worker) =
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
        layers.push(format_layer(config.output_format, writer, false));
        guard = Some(worker);
    }

    match tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
    {
        Ok(()) => Ok(guard),
        // Another subscriber (or logger) got there first.
        Err(_) if tracing::dispatcher::has_been_set() => Ok(None),
        Err(e) => Err(LlmError::ConfigurationError(format!(
            "Failed to initialize tracing: {e}"
        ))),
    }
}

pub fn init_default() -> Result<Option<WorkerGuard>, LlmError> {
    init_subscriber(SubscriberConfig::default())
}

/// Initialize from environment variables
///
/// - `SIUMAI_LOG_LEVEL`: trace, debug, info, warn, error
/// - `SIUMAI_LOG_FORMAT`: text, json, json-compact
/// - `SIUMAI_LOG_FILE`: log file path
/// - `RUST_LOG`: full filter directive, overriding the level
pub fn init_from_env() -> Result<Option<WorkerGuard>, LlmError> {
    let mut builder = SubscriberConfig::builder();
    if let Ok(level) = std::env::var("SIUMAI_LOG_LEVEL") {
        builder = builder.log_level_str(&level)?;
    }
    if let Ok(format) = std::env::var("SIUMAI_LOG_FORMAT") {
        builder = builder.output_format(format.parse()?);
    }
    if let Ok(path) = std::env::var("SIUMAI_LOG_FILE") {
        builder = builder.log_file(path);
    }
    if let Ok(directive) = std::env::var(EnvFilter::DEFAULT_ENV) {
        builder = builder.filter(directive);
    }
    init_subscriber(builder.build())
}
