//! Client configuration.
//!
//! Resolution order, lowest priority first: built-in defaults, TOML file,
//! environment variables. Front-ends apply their own flags on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, StreamError};

/// Configuration file name.
pub const CONFIG_FILE: &str = "config.toml";

/// Environment variable for an explicit config file path.
pub const CONFIG_ENV: &str = "CAREERPATH_CONFIG";

/// Environment variable overriding the API base URL.
pub const API_URL_ENV: &str = "CAREERPATH_API_URL";

/// Environment variable overriding the model selector.
pub const MODEL_ENV: &str = "CAREERPATH_MODEL";

/// Default server URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Model selector used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini";

/// Model selectors the server is known to accept. Others are passed through.
pub const KNOWN_MODELS: &[&str] = &["gemini", "custom_mistral"];

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server base URL, without a trailing path.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Default model selector sent with each request.
    #[serde(default = "default_model")]
    pub model: String,

    /// TCP connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Whole-request timeout in seconds, body streaming included.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum silence between two body chunks, in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Send at most this many prior messages as history.
    #[serde(default)]
    pub history_limit: Option<usize>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    300 // 5 minutes
}

fn default_read_timeout() -> u64 {
    60
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            read_timeout_secs: default_read_timeout(),
            history_limit: None,
        }
    }
}

impl ClientConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            StreamError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Default location of the configuration file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("careerpath").join(CONFIG_FILE))
    }

    /// Resolve configuration from file and environment.
    ///
    /// `explicit` wins over `CAREERPATH_CONFIG`, which wins over the default
    /// path. Only an explicitly named file is required to exist.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        let named = explicit
            .map(Path::to_path_buf)
            .or_else(|| {
                std::env::var(CONFIG_ENV)
                    .ok()
                    .filter(|v| !v.is_empty())
                    .map(PathBuf::from)
            });

        let mut config = match named {
            Some(path) => Self::load(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::load(path)?,
                None => Self::default(),
            },
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.is_empty() {
                debug!(url = %url, "Using {API_URL_ENV}");
                self.base_url = url;
            }
        }
        if let Ok(model) = std::env::var(MODEL_ENV) {
            if !model.is_empty() {
                self.model = model;
            }
        }
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(StreamError::config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.model.trim().is_empty() {
            return Err(StreamError::config("model must not be empty"));
        }
        if self.connect_timeout_secs == 0
            || self.request_timeout_secs == 0
            || self.read_timeout_secs == 0
        {
            return Err(StreamError::config("timeouts must be greater than zero"));
        }
        if !KNOWN_MODELS.contains(&self.model.as_str()) {
            debug!(model = %self.model, "Unknown model selector, passing through");
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Absolute URL of an endpoint path.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}
