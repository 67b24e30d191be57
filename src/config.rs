//! Configuration management for kycscan using the prefer crate.
//!
//! Resolution order: built-in defaults, then the config file (discovered by
//! prefer or given with `--config`), then environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::evaluation::MatchPolicy;
use crate::extract::SchemaCatalog;
use crate::models::{FieldSchema, SchemaError};

/// Default OpenAI-compatible endpoint (Fireworks).
pub const DEFAULT_ENDPOINT: &str = "https://api.fireworks.ai/inference/v1";
/// Default vision model.
pub const DEFAULT_MODEL: &str = "accounts/fireworks/models/phi-3-vision-128k-instruct";
/// Environment variable holding the API key unless configured otherwise.
pub const DEFAULT_API_KEY_ENV: &str = "FIREWORKS_API_KEY";
/// Upload size limit (5 MiB).
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
/// Default web server bind address.
pub const DEFAULT_BIND: &str = "127.0.0.1:3030";

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid endpoint URL '{0}': {1}")]
    InvalidEndpoint(String, String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the OpenAI-compatible API.
    pub endpoint: String,
    /// Vision model identifier.
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// API key, if one was found.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Maximum accepted upload size in bytes.
    pub max_image_bytes: usize,
    /// Maximum tokens in the model reply.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Trial count used when none is given.
    pub default_trials: usize,
    /// Pause between consecutive trials in milliseconds.
    pub trial_delay_ms: u64,
    /// Value comparison rule for evaluation.
    pub match_policy: MatchPolicy,
    /// Web server bind address.
    pub bind: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            api_key: None,
            request_timeout: 120,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            max_tokens: 1024,
            temperature: 0.1,
            default_trials: 10,
            trial_delay_ms: 0,
            match_policy: MatchPolicy::default(),
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

impl Settings {
    /// Apply `KYC_ENDPOINT`, `KYC_MODEL` and the API key variable.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = std::env::var("KYC_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.endpoint = endpoint;
            }
        }
        if let Ok(model) = std::env::var("KYC_MODEL") {
            if !model.trim().is_empty() {
                self.model = model;
            }
        }
        self.api_key = std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
    }

    /// Check values that would otherwise fail late.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.endpoint)
            .map_err(|e| ConfigError::InvalidEndpoint(self.endpoint.clone(), e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEndpoint(
                self.endpoint.clone(),
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        if self.request_timeout == 0 {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout",
                message: "must be at least 1 second".to_string(),
            });
        }
        if self.max_image_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_image_bytes",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.default_trials == 0 {
            return Err(ConfigError::InvalidValue {
                key: "default_trials",
                message: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::InvalidValue {
                key: "temperature",
                message: format!("{} is outside 0.0-2.0", self.temperature),
            });
        }
        Ok(())
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Environment variable to read the API key from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_image_bytes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_trials: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_policy: Option<MatchPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    /// Custom extraction schemas, added to (or replacing) the built-ins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schemas: Vec<FieldSchema>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Falls back to defaults when no file is found or it cannot be parsed.
    pub async fn load() -> Self {
        match prefer::load("kycscan").await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("Ignoring config file: {}", e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports TOML, YAML and JSON based on file extension (JSON otherwise).
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let mut config = Self::parse(&contents, path)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_err = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        match ext {
            "toml" => toml::from_str(contents).map_err(|e| parse_err(e.to_string())),
            "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| parse_err(e.to_string())),
            _ => serde_json::from_str(contents).map_err(|e| parse_err(e.to_string())),
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref endpoint) = self.endpoint {
            settings.endpoint = endpoint.clone();
        }
        if let Some(ref model) = self.model {
            settings.model = model.clone();
        }
        if let Some(ref env) = self.api_key_env {
            settings.api_key_env = env.clone();
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(max) = self.max_image_bytes {
            settings.max_image_bytes = max;
        }
        if let Some(max_tokens) = self.max_tokens {
            settings.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            settings.temperature = temperature;
        }
        if let Some(trials) = self.default_trials {
            settings.default_trials = trials;
        }
        if let Some(delay) = self.trial_delay_ms {
            settings.trial_delay_ms = delay;
        }
        if let Some(policy) = self.match_policy {
            settings.match_policy = policy;
        }
        if let Some(ref bind) = self.bind {
            settings.bind = bind.clone();
        }
    }

    /// Build the schema catalog from built-ins plus this file's schemas.
    pub fn schema_catalog(&self) -> Result<SchemaCatalog, SchemaError> {
        SchemaCatalog::with_custom(self.schemas.clone())
    }
}

/// Load the config file (explicit path or discovered) and resolve settings.
pub async fn load_settings(config_path: Option<&Path>) -> Result<(Settings, Config), ConfigError> {
    let config = match config_path {
        Some(path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };

    if let Some(ref path) = config.source_path {
        tracing::info!("Loaded config from {}", path.display());
    }

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings);
    settings.apply_env_overrides();
    settings.validate()?;

    Ok((settings, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.max_image_bytes, 5 * 1024 * 1024);
        assert_eq!(settings.api_key_env, "FIREWORKS_API_KEY");
        assert!(settings.api_key.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let settings = Settings {
            endpoint: "not a url".to_string(),
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidEndpoint(..))));

        let settings = Settings {
            endpoint: "ftp://example.com".to_string(),
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidEndpoint(..))));

        let settings = Settings {
            default_trials: 0,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidValue { key: "default_trials", .. })
        ));
    }

    #[tokio::test]
    async fn test_load_toml_and_apply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kycscan.toml");
        std::fs::write(
            &path,
            r#"
model = "accounts/fireworks/models/llama-v3p2-11b-vision-instruct"
request_timeout = 30
default_trials = 25
match_policy = "exact"

[[schemas]]
name = "visa"
fields = [{ name = "VISA_NO", description = "visa number", example = "X123" }]
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.source_path.as_deref(), Some(path.as_path()));

        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings);
        assert_eq!(settings.model, "accounts/fireworks/models/llama-v3p2-11b-vision-instruct");
        assert_eq!(settings.request_timeout, 30);
        assert_eq!(settings.default_trials, 25);
        assert_eq!(settings.match_policy, MatchPolicy::Exact);
        assert_eq!(settings.endpoint, DEFAULT_ENDPOINT);

        let catalog = config.schema_catalog().unwrap();
        assert_eq!(catalog.get("visa").unwrap().fields[0].name, "VISA_NO");
    }

    #[tokio::test]
    async fn test_load_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("kycscan.yaml");
        std::fs::write(&yaml, "trial_delay_ms: 250\nbind: \"0.0.0.0:8080\"\n").unwrap();
        let config = Config::load_from_path(&yaml).await.unwrap();
        assert_eq!(config.trial_delay_ms, Some(250));
        assert_eq!(config.bind.as_deref(), Some("0.0.0.0:8080"));

        let json = dir.path().join("kycscan.json");
        std::fs::write(&json, r#"{"max_image_bytes": 1024}"#).unwrap();
        let config = Config::load_from_path(&json).await.unwrap();
        assert_eq!(config.max_image_bytes, Some(1024));
    }

    #[tokio::test]
    async fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            Config::load_from_path(&missing).await,
            Err(ConfigError::Read { .. })
        ));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "model = [unterminated").unwrap();
        assert!(matches!(
            Config::load_from_path(&broken).await,
            Err(ConfigError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_settings_with_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kycscan.toml");
        std::fs::write(&path, "api_key_env = \"KYCSCAN_TEST_KEY_UNSET\"\n").unwrap();

        let (settings, config) = load_settings(Some(&path)).await.unwrap();
        assert_eq!(settings.api_key_env, "KYCSCAN_TEST_KEY_UNSET");
        assert!(settings.api_key.is_none());
        assert!(config.schemas.is_empty());
    }
}
