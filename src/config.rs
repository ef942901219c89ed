use std::path::Path;

use ::config::{Config as ConfigLoader, Environment, File, FileFormat};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Prefix for environment overrides, e.g. `RXLATE__SYSTEM_CONFIG__PORT=9000`.
const ENV_PREFIX: &str = "RXLATE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub system_config: SystemConfig,
    pub llm_config: LLMConfig,
    pub fallback_config: FallbackConfig,
    pub upload_config: UploadConfig,
    pub session_config: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub host: String,
    pub port: u16,
    /// Frontend origins allowed by CORS. Empty means permissive.
    pub cors_origins: Vec<String>,
    pub max_upload_bytes: usize,
    /// Upper bound on distinct languages per `/upload` request.
    pub max_languages: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec![
                "https://hack-it-rx-front-end.vercel.app".to_string(),
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            max_upload_bytes: 20 * 1024 * 1024,
            max_languages: 10,
        }
    }
}

/// Settings for the hosted vision/translation model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    /// One of `openai_llm`, `openai_compatible_llm`, `gemini_llm`, `mock_llm`.
    pub llm_provider: String,
    /// Provider default when unset.
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    /// Translation units in flight at once per request.
    pub max_concurrent_requests: usize,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            llm_provider: "openai_llm".to_string(),
            model: None,
            base_url: None,
            api_key: None,
            max_tokens: 500,
            request_timeout_secs: 60,
            max_concurrent_requests: 4,
        }
    }
}

impl LLMConfig {
    /// API key from config, else from the provider's conventional env var.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.resolve_api_key_from(|name| std::env::var(name).ok())
    }

    pub fn resolve_api_key_from<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let configured = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && !key.starts_with("${"));
        if let Some(key) = configured {
            return Some(key.to_string());
        }

        let env_name = match self.llm_provider.as_str() {
            "gemini_llm" => "GEMINI_API_KEY",
            "mock_llm" => return None,
            _ => "OPENAI_API_KEY",
        };
        lookup(env_name)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub enabled: bool,
    /// Path or name of the `tesseract` binary.
    pub command: String,
    pub timeout_secs: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: "tesseract".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Directory served by `GET /image/{filename}`.
    pub dir: String,
    /// Keep a copy of every uploaded image in `dir`.
    pub persist: bool,
    /// Age after which persisted uploads are pruned. Zero keeps them forever.
    pub retention_hours: u64,
    pub prune_interval_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: "uploads".to_string(),
            persist: false,
            retention_hours: 24,
            prune_interval_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Optional YAML/JSON file of `session_id -> [medicine records]`.
    pub seed_file: Option<String>,
}

impl Config {
    /// Load configuration from an optional YAML or JSON file, then apply
    /// `RXLATE__*` environment overrides. A missing file yields defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigLoader::builder();

        if let Some(path) = path {
            if Path::new(path).exists() {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("cannot read config file {}", path))?;
                let content = substitute_env_vars(&content)?;
                builder = builder.add_source(File::from_str(&content, file_format(path)));
                debug!("Loaded config file {}", path);
            } else {
                debug!("Config file {} not found, using defaults", path);
            }
        }

        let loaded = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("system_config.cors_origins"),
            )
            .build()
            .context("cannot assemble configuration")?;

        loaded
            .try_deserialize()
            .context("invalid configuration")
    }
}

fn file_format(path: &str) -> FileFormat {
    let lower = path.to_lowercase();
    if lower.ends_with(".json") {
        FileFormat::Json
    } else if lower.ends_with(".toml") {
        FileFormat::Toml
    } else {
        FileFormat::Yaml
    }
}

/// Replace `${VAR_NAME}` with the environment value. Unset variables are left as-is.
pub fn substitute_env_vars(content: &str) -> Result<String> {
    substitute_env_vars_with(content, |name| std::env::var(name).ok())
}

fn substitute_env_vars_with<F>(content: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let pattern = Regex::new(r"\$\{(\w+)\}")?;
    let replaced = pattern.replace_all(content, |caps: &regex::Captures| {
        lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    });
    Ok(replaced.into_owned())
}
