//! Process-wide tracing setup for metadata-server binaries.

use std::path::PathBuf;

use mds_types::status_code::StatusCode;
use mds_types::{Result, Status};
use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer, Registry};

pub use tracing::{debug, error, info, instrument, trace, warn};

/// How often the log file rolls over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    #[default]
    Hourly,
    Daily,
    Never,
}

impl From<Rotation> for rolling::Rotation {
    fn from(r: Rotation) -> Self {
        match r {
            Rotation::Hourly => rolling::Rotation::HOURLY,
            Rotation::Daily => rolling::Rotation::DAILY,
            Rotation::Never => rolling::Rotation::NEVER,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Filter directive (`info`, `mds_dirstore=debug`, ...). `RUST_LOG` wins if set.
    #[serde(default = "default_level")]
    pub level: String,

    /// Directory for log files. No file logging when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default = "default_prefix")]
    pub file_prefix: String,

    #[serde(default)]
    pub rotation: Rotation,

    #[serde(default)]
    pub json_format: bool,

    #[serde(default = "default_true")]
    pub console_output: bool,
}

fn default_level() -> String {
    "info".into()
}

fn default_prefix() -> String {
    "mds".into()
}

fn default_true() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_level(),
            log_dir: None,
            file_prefix: default_prefix(),
            rotation: Rotation::default(),
            json_format: false,
            console_output: true,
        }
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn format_layer<W>(json: bool, writer: W) -> BoxedLayer
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    if json {
        fmt::layer().json().with_writer(writer).boxed()
    } else {
        fmt::layer().with_writer(writer).boxed()
    }
}

/// Install the global subscriber. Call once at startup.
///
/// The returned guard flushes the non-blocking file writer on drop and must
/// be held for the life of the process.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| {
            Status::with_message(
                StatusCode::INVALID_CONFIG,
                format!("invalid log level {:?}: {}", config.level, e),
            )
        })?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if config.console_output {
        layers.push(format_layer(config.json_format, std::io::stdout));
    }

    let guard = match config.log_dir {
        Some(ref log_dir) => {
            let appender = rolling::RollingFileAppender::builder()
                .rotation(config.rotation.into())
                .filename_prefix(&config.file_prefix)
                .filename_suffix("log")
                .build(log_dir)
                .map_err(|e| {
                    Status::with_message(
                        StatusCode::IO_ERROR,
                        format!("cannot create log appender in {}: {}", log_dir.display(), e),
                    )
                })?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(format_layer(config.json_format, writer));
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| {
            Status::with_message(
                StatusCode::INVALID_CONFIG,
                format!("logging already initialized: {}", e),
            )
        })?;

    Ok(guard)
}
