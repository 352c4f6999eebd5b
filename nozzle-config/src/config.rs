use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Defines the source of a config error
#[derive(Debug, Default)]
enum ConfigErrorSource {
    /// An error occurring independently.
    #[default]
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating in a field override (an env var, or a CLI parameter).
    FieldOverride(String),
}

impl fmt::Display for ConfigErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErrorSource::None => Ok(()),
            ConfigErrorSource::File(file_name) => {
                write!(f, " (file {})", file_name.display())
            }
            ConfigErrorSource::FieldOverride(name) => write!(f, " (field {name})"),
        }
    }
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    source: ConfigErrorSource,
    kind: ConfigErrorKind,
    cause: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ConfigError {
    #[inline]
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            source: ConfigErrorSource::None,
            kind,
            cause: None,
        }
    }

    #[inline]
    fn wrap<E>(inner: E, kind: ConfigErrorKind) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            cause: Some(Box::new(inner)),
            ..Self::new(kind)
        }
    }

    #[inline]
    fn field(field: &'static str) -> Self {
        Self {
            source: ConfigErrorSource::FieldOverride(field.to_owned()),
            ..Self::new(ConfigErrorKind::InvalidValue)
        }
    }

    #[inline]
    fn file(mut self, p: impl AsRef<Path>) -> Self {
        self.source = ConfigErrorSource::File(p.as_ref().to_path_buf());
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.source)
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_ref().map(|cause| cause.as_ref() as &(dyn Error + 'static))
    }
}

/// Indicates config related errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Parsing JSON failed.
    #[error("could not parse json config file")]
    BadJson,
    /// Invalid config value
    #[error("invalid config value")]
    InvalidValue,
}

trait ConfigObject: DeserializeOwned + Serialize {
    /// The basename of the config file.
    fn name() -> &'static str;

    /// The full filename of the config file, including the file extension.
    fn path(base: &Path) -> PathBuf {
        base.join(format!("{}.yml", Self::name()))
    }

    /// Loads the config file from a file within the given directory location.
    fn load(base: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(base);

        let f = fs::File::open(&path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(&path))?;

        serde_yaml::from_reader(io::BufReader::new(f))
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(&path))
    }
}

/// Default prefix prepended to every forwarded metric name.
fn default_metrics_prefix() -> String {
    "cloudfoundry.nozzle.".to_owned()
}

/// Default maximum size of a single payload posted to the metrics backend.
fn default_max_post_bytes() -> u32 {
    5_000_000
}

fn default_statsd_prefix() -> String {
    "nozzle".to_owned()
}

fn default_statsd_sample_rate() -> f64 {
    1.0
}

/// Controls how metric batches are serialized for the metrics backend.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prefix prepended to the name of every forwarded series.
    pub prefix: String,

    /// Target upper bound for the size of a single payload in bytes.
    ///
    /// Batches exceeding this size are split by halving the points of every series. A payload
    /// whose series all hold a single point is sent even if it exceeds the limit.
    pub max_post_bytes: u32,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            prefix: default_metrics_prefix(),
            max_post_bytes: default_max_post_bytes(),
        }
    }
}

/// Controls internal reporting of the nozzle's own metrics to statsd.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StatsdConfig {
    /// Address of the statsd server, internal metrics are disabled if not set.
    pub host: Option<String>,

    /// Prefix prepended to all internal metric names.
    pub prefix: String,

    /// Sample rate between `0.0` and `1.0`.
    pub sample_rate: f64,
}

impl Default for StatsdConfig {
    fn default() -> Self {
        Self {
            host: None,
            prefix: default_statsd_prefix(),
            sample_rate: default_statsd_sample_rate(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct ConfigValues {
    #[serde(default)]
    logging: nozzle_log::LogConfig,
    #[serde(default)]
    metrics: MetricsConfig,
    #[serde(default)]
    statsd: StatsdConfig,
}

impl ConfigObject for ConfigValues {
    fn name() -> &'static str {
        "config"
    }
}

/// Values that can be overridden from the environment or the command line.
///
/// All fields are given as strings and validated by [`Config::apply_override`].
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// Prefix of forwarded metric names.
    pub metrics_prefix: Option<String>,
    /// Maximum payload size in bytes.
    pub max_post_bytes: Option<String>,
    /// Address of the statsd server.
    pub statsd_host: Option<String>,
}

/// Config struct.
#[derive(Default)]
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("path", &self.path)
            .field("values", &self.values)
            .finish()
    }
}

impl Config {
    /// Loads a config from a given config folder.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = std::env::current_dir()
            .map(|x| x.join(path.as_ref()))
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        let config = Config {
            values: ConfigValues::load(&path)?,
            path,
        };

        config.validate()?;
        Ok(config)
    }

    /// Creates a config from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Config, ConfigError> {
        let config = Config {
            values: serde_json::from_value(value)
                .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::BadJson))?,
            path: PathBuf::new(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Override configuration with values coming from other sources (e.g. env variables or
    /// command line parameters).
    pub fn apply_override(
        &mut self,
        overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        if let Some(prefix) = overrides.metrics_prefix {
            self.values.metrics.prefix = prefix;
        }

        if let Some(max_post_bytes) = overrides.max_post_bytes {
            self.values.metrics.max_post_bytes = max_post_bytes
                .parse()
                .map_err(|_| ConfigError::field("max_post_bytes"))?;
        }

        if let Some(host) = overrides.statsd_host {
            self.values.statsd.host = Some(host).filter(|host| !host.is_empty());
        }

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.values.metrics.max_post_bytes == 0 {
            return Err(ConfigError::field("max_post_bytes"));
        }

        let sample_rate = self.values.statsd.sample_rate;
        if !(0.0..=1.0).contains(&sample_rate) {
            return Err(ConfigError::field("statsd.sample_rate"));
        }

        Ok(())
    }

    /// Returns the path of the config folder.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &nozzle_log::LogConfig {
        &self.values.logging
    }

    /// Returns the metrics serialization configuration.
    pub fn metrics(&self) -> &MetricsConfig {
        &self.values.metrics
    }

    /// Returns the prefix prepended to forwarded metric names.
    pub fn metrics_prefix(&self) -> &str {
        &self.values.metrics.prefix
    }

    /// Returns the target maximum payload size in bytes.
    pub fn max_post_bytes(&self) -> u32 {
        self.values.metrics.max_post_bytes
    }

    /// Returns the address of the statsd server, if internal metrics are enabled.
    pub fn statsd_addr(&self) -> Option<&str> {
        self.values.statsd.host.as_deref()
    }

    /// Returns the prefix of internal metrics.
    pub fn statsd_prefix(&self) -> &str {
        &self.values.statsd.prefix
    }

    /// Returns the sample rate of internal metrics.
    pub fn statsd_sample_rate(&self) -> f64 {
        self.values.statsd.sample_rate
    }
}
