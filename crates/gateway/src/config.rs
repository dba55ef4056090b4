use crate::error::{GatewayError, GatewayErrorExt};
use crate::repository::{SandboxPolicy, normalize_extension};
use config::{Config, Environment, File};
use filegate_logger::LoggerSettings;
use filegate_storage::CacheSettings;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Top-level gateway settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Passed to [`filegate_logger::Logger::from_settings`] by the embedding service.
    pub log: LoggerSettings,
    /// Applied to backends when the registry wraps them in a caching decorator.
    pub cache: CacheSettings,
    pub sandbox: SandboxDefaults,
}

/// Policy applied to users without a stored [`SandboxPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxDefaults {
    pub read_only: bool,
    pub max_path_length: usize,
    pub allow_dotfiles: bool,
    pub blocked_extensions: Vec<String>,
}

impl Default for SandboxDefaults {
    fn default() -> Self {
        Self {
            read_only: false,
            max_path_length: 1024,
            allow_dotfiles: true,
            blocked_extensions: Vec::new(),
        }
    }
}

impl SandboxDefaults {
    #[must_use]
    pub fn policy_for(&self, user: &str) -> SandboxPolicy {
        SandboxPolicy {
            user_id: user.to_owned(),
            read_only: self.read_only,
            max_path_length: self.max_path_length,
            allow_dotfiles: self.allow_dotfiles,
            blocked_extensions: self.blocked_extensions.iter().map(|e| normalize_extension(e)).collect(),
        }
    }
}

/// Loads settings from a file plus `FILEGATE__` environment overrides.
///
/// An explicit `path` must exist. Without one, a `filegate.{toml,yaml,json,..}` file in the
/// working directory is used if present. Nested keys use double underscores, e.g.
/// `FILEGATE__CACHE__CONTENT_TTL=120`; `FILEGATE__SANDBOX__BLOCKED_EXTENSIONS=exe,bat`
/// is split on commas.
///
/// # Example
/// ```rust
/// use filegate_gateway::config::{GatewayConfig, load_config};
///
/// let cfg: GatewayConfig = load_config(None::<&str>).unwrap_or_default();
/// assert_eq!(cfg.sandbox.max_path_length, 1024);
/// ```
pub fn load_config<T>(path: Option<impl AsRef<Path>>) -> Result<T, GatewayError>
where
    T: DeserializeOwned,
{
    let file = match &path {
        Some(p) => File::from(p.as_ref()).required(true),
        None => File::with_name("filegate").required(false),
    };

    let builder = Config::builder().add_source(file).add_source(
        Environment::with_prefix("FILEGATE")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("sandbox.blocked_extensions"),
    );

    match &path {
        Some(p) => info!("Loading config from {}", p.as_ref().display()),
        None => info!("Loading config from defaults and environment"),
    }

    let config = builder
        .build()
        .context("Failed to build config")?
        .try_deserialize::<T>()
        .context("Failed to deserialize config")?;

    Ok(config)
}
