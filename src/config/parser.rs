//! Loading configuration from YAML files and environment variables.
//!
//! Precedence, lowest first: file values, then `CLOUDHOLD_*` variables
//! (which may come from a `.env` file).

use crate::error::{CloudholdError, ConfigError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::spec::CloudholdConfig;

/// Overrides `context.endpoint`.
pub const ENV_ENDPOINT: &str = "CLOUDHOLD_ENDPOINT";

/// Overrides `context.subscription_id`.
pub const ENV_SUBSCRIPTION_ID: &str = "CLOUDHOLD_SUBSCRIPTION_ID";

/// Overrides `context.api_version`.
pub const ENV_API_VERSION: &str = "CLOUDHOLD_API_VERSION";

/// Configuration parser.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving `.env`.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the directory the `.env` file is looked up in.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<CloudholdConfig> {
        let path = path.as_ref();
        debug!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(CloudholdError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            CloudholdError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<CloudholdConfig> {
        let config: CloudholdConfig = serde_yaml::from_str(content).map_err(|e| {
            CloudholdError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location: source.map(|p| p.display().to_string()),
            })
        })?;

        debug!("Parsed configuration for endpoint: {}", config.context.endpoint);
        Ok(config)
    }

    /// Loads a file and applies `CLOUDHOLD_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<CloudholdConfig> {
        let mut config = self.load_file(path)?;
        Self::apply_env_overrides(&mut config, |name| std::env::var(name).ok());
        Ok(config)
    }

    /// Applies overrides read through `lookup`.
    pub fn apply_env_overrides(
        config: &mut CloudholdConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) {
        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            debug!("Overriding context.endpoint from environment");
            config.context.endpoint = endpoint;
        }

        if let Some(subscription) = lookup(ENV_SUBSCRIPTION_ID) {
            debug!("Overriding context.subscription_id from environment");
            config.context.subscription_id = subscription;
        }

        if let Some(version) = lookup(ENV_API_VERSION) {
            debug!("Overriding context.api_version from environment");
            config.context.api_version = version;
        }
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                CloudholdError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }

    /// Reads the bearer token from the configured variable.
    ///
    /// # Errors
    ///
    /// Returns `MissingEnvVar` if the variable is unset or empty.
    pub fn token(config: &CloudholdConfig) -> Result<String> {
        let name = &config.context.token_env;
        std::env::var(name)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| CloudholdError::Config(ConfigError::MissingEnvVar { name: name.clone() }))
    }
}

/// Configuration file names searched for, in order.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["cloudhold.yaml", "cloudhold.yml", ".cloudhold.yaml"];

/// Finds the configuration file in `start_dir` or its ancestors, falling back
/// to the per-user config directory.
///
/// # Errors
///
/// Returns an error if no configuration file is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                debug!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    if let Some(user_config) = user_config_file().filter(|p| p.exists()) {
        debug!("Using user configuration: {}", user_config.display());
        return Ok(user_config);
    }

    Err(CloudholdError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}

/// Per-user configuration path, e.g. `~/.config/cloudhold/config.yaml`.
#[must_use]
pub fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("cloudhold").join("config.yaml"))
}
