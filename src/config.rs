//! # Configuration Management
//!
//! This module loads application configuration from multiple sources:
//! - Default values (built into the code)
//! - TOML configuration file (config.toml)
//! - Environment variables (with APP_ prefix)
//! - A few well-known variables used by deployment scripts (HOST, PORT,
//!   OLLAMA_BASE_URL, OLLAMA_MODEL, STT_MODEL, STT_DEVICE)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: the defaults are serialized into the loader and the merged
//!   result is deserialized back into typed structs
//! - **Layered sources**: each `add_source` call overrides the ones before it
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Deployment variables (`OLLAMA_MODEL=qwen2.5:7b`, ...)
//! 2. Environment variables (`APP_LLM__BASE_URL`, `APP_MODELS__WHISPER_MODEL`, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use crate::feedback::ScoringMode;
use crate::transcription::SttModel;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Each section maps to one `[section]` table in config.toml and one
/// `APP_<SECTION>__<KEY>` environment variable family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub stt: SttConfig,
    pub llm: LlmConfig,
    pub audio: AudioConfig,
    pub cors: CorsConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (containers)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Models selected at startup. Both can be changed at runtime through
/// `POST /models/change`; this only sets the initial choice.
///
/// ## Fields:
/// - `whisper_model`: one of `tiny.en`, `base.en`, `small.en`, `medium.en`,
///   `large-v2`, `large-v3`
/// - `llm_model`: any model tag installed in Ollama (e.g. `llama3.2:3b`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub whisper_model: String,
    pub llm_model: String,
}

/// Speech-to-text settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    /// `cuda`, `metal`, `cpu` or `auto`. GPUs fall back to CPU when missing.
    pub device: String,

    /// Language token for multilingual checkpoints. Ignored by `.en` models.
    pub language: String,
}

/// Language-model service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub scoring_mode: ScoringMode,

    /// Upper bound on a single generation request.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub ffmpeg_path: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
            },
            models: ModelsConfig {
                whisper_model: "base.en".to_string(),
                llm_model: "llama3.2:3b".to_string(),
            },
            stt: SttConfig {
                device: "cuda".to_string(),
                language: "en".to_string(),
            },
            llm: LlmConfig {
                base_url: "http://127.0.0.1:11434".to_string(),
                scoring_mode: ScoringMode::WithBreakdown,
                request_timeout_secs: 120,
            },
            audio: AudioConfig {
                ffmpeg_path: "ffmpeg".to_string(),
                max_upload_bytes: 50 * 1024 * 1024,
            },
            cors: CorsConfig {
                allowed_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                ],
            },
        }
    }
}

/// Deployment variables and the config keys they override.
const DEPLOYMENT_OVERRIDES: [(&str, &str); 6] = [
    ("HOST", "server.host"),
    ("PORT", "server.port"),
    ("OLLAMA_BASE_URL", "llm.base_url"),
    ("OLLAMA_MODEL", "models.llm_model"),
    ("STT_MODEL", "models.whisper_model"),
    ("STT_DEVICE", "stt.device"),
];

impl AppConfig {
    /// Load configuration from every source in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=9000`: Override server port
    /// - `APP_LLM__SCORING_MODE=simple`: Use the single-score prompt
    /// - `OLLAMA_BASE_URL=http://ollama:11434`: Point at another Ollama host
    pub fn load() -> Result<Self> {
        Self::load_with(|key| env::var(key).ok())
    }

    /// Same as [`AppConfig::load`], reading deployment variables through `lookup`.
    fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            // APP_LLM__BASE_URL becomes llm.base_url
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        for (variable, key) in DEPLOYMENT_OVERRIDES {
            if let Some(value) = lookup(variable) {
                settings = settings.set_override(key, value)?;
            }
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - Both model names are set and the Whisper model is a known checkpoint
    /// - The LLM base URL is an http(s) URL
    /// - Timeout and upload limit are non-zero
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("Server port cannot be 0"));
        }

        if self.models.llm_model.trim().is_empty() {
            return Err(anyhow!("LLM model name cannot be empty"));
        }

        if self.models.whisper_model.trim().is_empty() {
            return Err(anyhow!("Whisper model name cannot be empty"));
        }
        self.whisper_model()?;

        if !(self.llm.base_url.starts_with("http://") || self.llm.base_url.starts_with("https://")) {
            return Err(anyhow!("LLM base URL must start with http:// or https://, got {}", self.llm.base_url));
        }

        if self.llm.request_timeout_secs == 0 {
            return Err(anyhow!("LLM request timeout must be greater than 0"));
        }

        if self.audio.max_upload_bytes == 0 {
            return Err(anyhow!("Maximum upload size must be greater than 0"));
        }

        Ok(())
    }

    /// The configured Whisper checkpoint.
    pub fn whisper_model(&self) -> Result<SttModel> {
        self.models.whisper_model.parse()
    }
}
