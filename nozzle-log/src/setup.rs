use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Crates of this workspace which receive the configured log level.
///
/// All other crates log at `INFO` unless overridden through `RUST_LOG`.
const CRATE_NAMES: &[&str] = &[
    "nozzle_config",
    "nozzle_log",
    "nozzle_metadata",
    "nozzle_metrics",
    "nozzle_statsd",
];

/// The minimum level of log messages to emit.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Only errors.
    Error,
    /// Errors and warnings.
    Warn,
    /// Informational messages and above.
    #[default]
    Info,
    /// Debug messages and above.
    Debug,
    /// Everything.
    Trace,
    /// Logging is disabled.
    Off,
}

impl Level {
    /// Returns the equivalent `tracing` level filter.
    pub fn level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
            Self::Off => LevelFilter::OFF,
        }
    }
}

/// Controls the log format.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    #[default]
    Auto,

    /// Pretty printing with colors.
    ///
    /// ```text
    ///  INFO nozzle_metadata::cache: bulk loaded application metadata apps=1204
    /// ```
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2024-12-04T12:10:32.123Z  INFO nozzle_metadata::cache: bulk loaded application metadata apps=1204
    /// ```
    Simplified,

    /// Dump out JSON lines.
    ///
    /// ```text
    /// {"timestamp":"2024-12-04T12:11:08.729716Z","level":"INFO","message":"bulk loaded application metadata","apps":1204,"target":"nozzle_metadata::cache"}
    /// ```
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// The log level for the nozzle crates.
    pub level: Level,

    /// Controls the log output format.
    ///
    /// Defaults to [`LogFormat::Auto`], which detects the best format based on the TTY.
    pub format: LogFormat,
}

/// Builds the filter directives used when `RUST_LOG` is not set.
fn default_directives(level: Level) -> String {
    // Configure INFO as default for all third-party crates.
    let mut directives = vec!["info".to_owned()];

    // Add all internal crates with the configured level.
    let level = level.level_filter();
    for name in CRATE_NAMES {
        directives.push(format!("{name}={level}"));
    }

    directives.join(",")
}

/// Initialize the logging system.
///
/// Calling this more than once has no effect, the first subscriber stays installed.
///
/// # Example
///
/// ```
/// let log_config = nozzle_log::LogConfig {
///     level: nozzle_log::Level::Debug,
///     ..Default::default()
/// };
///
/// nozzle_log::init(&log_config);
/// ```
pub fn init(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config.level)));

    let format_layer: Box<dyn Layer<Registry> + Send + Sync> =
        match (config.format, console::user_attended()) {
            (LogFormat::Auto, true) | (LogFormat::Pretty, _) => fmt::layer()
                .with_target(true)
                .with_ansi(true)
                .compact()
                .without_time()
                .boxed(),
            (LogFormat::Auto, false) | (LogFormat::Simplified, _) => {
                fmt::layer().with_target(true).with_ansi(false).boxed()
            }
            (LogFormat::Json, _) => fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .boxed(),
        };

    tracing_subscriber::registry()
        .with(format_layer)
        .with(filter)
        .try_init()
        .ok();
}
