use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::rolling::Rotation;

/// Line format of console and file output. The audit-fallback file is always JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Minutely,
    Hourly,
    #[default]
    Daily,
    Never,
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Minutely => Self::MINUTELY,
            LogRotation::Hourly => Self::HOURLY,
            LogRotation::Daily => Self::DAILY,
            LogRotation::Never => Self::NEVER,
        }
    }
}

/// Declarative logger setup, usually a `log` section of the service configuration.
///
/// ```toml
/// [log]
/// name = "filegate"
/// level = "debug"
/// directory = "/var/log/filegate"
/// format = "json"
/// rotation = "hourly"
/// filter = "filegate_gateway=trace,object_store=warn"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerSettings {
    /// Prefix of rolling file names.
    pub name: String,
    /// Default level, overridden per module by `filter` or `RUST_LOG`.
    pub level: String,
    pub console: bool,
    /// Enables file output when set.
    pub directory: Option<PathBuf>,
    pub format: LogFormat,
    pub rotation: LogRotation,
    pub max_files: usize,
    /// Only effective together with `directory`.
    pub audit_fallback: bool,
    pub filter: Option<String>,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            name: "filegate".to_owned(),
            level: "info".to_owned(),
            console: true,
            directory: None,
            format: LogFormat::Compact,
            rotation: LogRotation::Daily,
            max_files: 10,
            audit_fallback: true,
            filter: None,
        }
    }
}
