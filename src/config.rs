use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

use crate::models::ExamConfiguration;

/// Main configuration structure for the overlay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    /// Text-only model, used when nothing is attached
    pub model_fast: String,
    /// Vision-capable model, used whenever images are attached
    pub model_vision: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Drop answers that resolve after the transcript was cleared
    pub discard_stale_answers: bool,
    /// Starting point of the configuration draft
    pub draft: ExamConfiguration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            discard_stale_answers: true,
            draft: ExamConfiguration::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub max_attachments: usize,
    /// Upper bound on the summed size of all staged data URLs
    pub max_total_bytes: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_attachments: 8,
            max_total_bytes: 20 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub account: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment variable overrides
    /// ALWAYS returns a valid config - never fails
    pub fn load() -> Self {
        let env_paths = ["../.env", ".env"];

        let mut env_loaded = false;
        for path in &env_paths {
            if dotenvy::from_path(path).is_ok() {
                tracing::info!("Loaded .env from: {}", path);
                env_loaded = true;
                break;
            }
        }

        if !env_loaded {
            tracing::debug!("No .env file found - continuing with env vars only");
        }

        let config_path =
            env::var("READY_CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());

        Self::load_with(&config_path, |key| env::var(key).ok())
    }

    /// Read `config_path` if it exists, then apply overrides from `lookup`.
    pub fn load_with(config_path: &str, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = if Path::new(config_path).exists() {
            match fs::read_to_string(config_path) {
                Ok(contents) => Self::from_yaml(&contents).unwrap_or_else(|e| {
                    tracing::error!(
                        "Failed to parse config file {}: {} - using defaults",
                        config_path,
                        e
                    );
                    Self::default()
                }),
                Err(e) => {
                    tracing::error!(
                        "Failed to read config file {}: {} - using defaults",
                        config_path,
                        e
                    );
                    Self::default()
                }
            }
        } else {
            tracing::debug!("Config file not found at {} - using defaults", config_path);
            Self::default()
        };

        config.apply_overrides(lookup);

        // Validate configuration - log warnings but don't fail
        if let Err(e) = config.validate() {
            tracing::warn!("Config validation warnings: {} - continuing anyway", e);
        }

        config
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str::<Config>(contents)
    }

    /// Apply environment variable overrides
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Gemini overrides
        if let Some(api_key) = lookup("GEMINI_API_KEY").or_else(|| lookup("API_KEY")) {
            self.gemini.api_key = api_key;
        }
        if let Some(base_url) = lookup("GEMINI_BASE_URL") {
            self.gemini.base_url = base_url;
        }
        if let Some(model) = lookup("GEMINI_MODEL_FAST") {
            self.gemini.model_fast = model;
        }
        if let Some(model) = lookup("GEMINI_MODEL_VISION") {
            self.gemini.model_vision = model;
        }

        // Session overrides
        if let Some(discard) = lookup("READY_DISCARD_STALE_ANSWERS") {
            if let Ok(value) = discard.parse() {
                self.session.discard_stale_answers = value;
            }
        }

        // Capture overrides
        if let Some(max) = lookup("READY_MAX_ATTACHMENTS") {
            if let Ok(value) = max.parse() {
                self.capture.max_attachments = value;
            }
        }
        if let Some(max) = lookup("READY_MAX_ATTACHMENT_BYTES") {
            if let Ok(value) = max.parse() {
                self.capture.max_total_bytes = value;
            }
        }

        // Identity overrides
        if let Some(account) = lookup("READY_ACCOUNT") {
            self.identity.account = Some(account);
        }
        if let Some(password) = lookup("READY_PASSWORD") {
            self.identity.password = Some(password);
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.gemini.api_key.is_empty() {
            return Err("GEMINI_API_KEY environment variable must be set".into());
        }
        if self.gemini.model_fast.is_empty() || self.gemini.model_vision.is_empty() {
            return Err("Both gemini.model_fast and gemini.model_vision must be set".into());
        }
        if self.capture.max_attachments == 0 {
            return Err("capture.max_attachments cannot be 0".into());
        }
        if self.capture.max_total_bytes == 0 {
            return Err("capture.max_total_bytes cannot be 0".into());
        }
        if let Err(e) = self.session.draft.validate() {
            return Err(format!("session.draft: {e}").into());
        }
        if self.identity.account.is_none() {
            return Err("READY_ACCOUNT is not set - sign-in will always fail".into());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini: GeminiConfig {
                api_key: String::new(),
                base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                model_fast: "gemini-3-flash-preview".to_string(),
                model_vision: "gemini-3-pro-preview".to_string(),
            },
            session: SessionConfig::default(),
            capture: CaptureConfig::default(),
            identity: IdentityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
