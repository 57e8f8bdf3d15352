//! Configuration types for chatturn

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ChatTurnError, Result};
use crate::llm::ModelParams;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatTurnConfig {
    /// Turn processor configuration
    #[serde(default)]
    pub processor: ProcessorConfig,

    /// LLM provider configuration
    #[serde(default)]
    pub llm: LLMProviderConfig,
}

/// Turn processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// System message prepended to every request. `None` sends no system message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,

    /// Inactivity after which history is discarded before the next turn
    #[serde(with = "humantime_serde", default = "default_idle_timeout")]
    pub idle_timeout: Duration,
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            system_message: None,
            idle_timeout: default_idle_timeout(),
        }
    }
}

impl ProcessorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_message(mut self, content: impl Into<String>) -> Self {
        self.system_message = Some(content.into());
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the idle timeout from fractional seconds.
    ///
    /// # Errors
    ///
    /// Returns an error for negative, zero, non-finite or overflowing values.
    pub fn with_idle_timeout_secs(self, secs: f64) -> Result<Self> {
        let timeout = Duration::try_from_secs_f64(secs).map_err(|e| {
            ChatTurnError::Configuration(format!("Invalid idle timeout {}: {}", secs, e))
        })?;
        let config = self.with_idle_timeout(timeout);
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the idle timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout.is_zero() {
            return Err(ChatTurnError::Configuration(
                "idle_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMProviderConfig {
    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// API key (if unset, `OPENAI_API_KEY` is used)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL for OpenAI-compatible endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Temperature for generation (0.0-2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

impl Default for LLMProviderConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            base_url: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

impl LLMProviderConfig {
    /// Generation parameters forwarded with every request
    pub fn params(&self) -> ModelParams {
        ModelParams {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stop_sequences: Vec::new(),
        }
    }

    fn validate(&self) -> Result<()> {
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ChatTurnError::Configuration(format!(
                    "temperature must be within 0.0-2.0, got {}",
                    temperature
                )));
            }
        }
        Ok(())
    }
}

impl ChatTurnConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Loads in this order:
    /// 1. Default configuration
    /// 2. `chatturn.toml` in the working directory
    /// 3. The file named by `CHATTURN_CONFIG_PATH`, if set
    /// 4. `CHATTURN_`-prefixed environment variables, nested with `__`
    ///    (e.g. `CHATTURN_PROCESSOR__IDLE_TIMEOUT=90s`)
    ///
    /// # Errors
    ///
    /// Returns an error if `CHATTURN_CONFIG_PATH` names a file that cannot be
    /// read, a configuration source is invalid or the result fails validation.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os("CHATTURN_CONFIG_PATH").map(PathBuf::from);
        Self::load_with(path.as_deref())
    }

    /// Load configuration like [`load`](Self::load), reading `path` in place
    /// of `CHATTURN_CONFIG_PATH`. Environment variables still take precedence
    /// over the file.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` cannot be read, a configuration source is
    /// invalid or the result fails validation.
    pub fn load_with(path: Option<&Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Env, Format, Serialized, Toml},
        };

        let mut figment = Figment::from(Serialized::defaults(ChatTurnConfig::default()))
            .merge(Toml::file("chatturn.toml"));

        if let Some(path) = path {
            figment = figment.merge(Toml::string(&read_config_file(path)?));
        }

        let config: ChatTurnConfig = figment
            .merge(Env::prefixed("CHATTURN_").ignore(&["CONFIG_PATH"]).split("__"))
            .extract()
            .map_err(|e| {
                ChatTurnError::Configuration(format!("Failed to load configuration: {}", e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, ignoring the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        use figment::{
            Figment,
            providers::{Format, Serialized, Toml},
        };

        let path = path.as_ref();
        let config: ChatTurnConfig = Figment::from(Serialized::defaults(ChatTurnConfig::default()))
            .merge(Toml::string(&read_config_file(path)?))
            .extract()
            .map_err(|e| {
                ChatTurnError::Configuration(format!(
                    "Failed to load configuration file {}: {}",
                    path.display(),
                    e
                ))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<()> {
        self.processor.validate()?;
        self.llm.validate()
    }
}

fn read_config_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        ChatTurnError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })
}
