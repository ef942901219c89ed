use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::gemini_llm::GeminiLLM;
use super::interface::VisionLLMInterface;
use super::mock_llm::MockLLM;
use super::openai_compatible_llm::OpenAICompatibleLLM;
use crate::config::LLMConfig;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_MODEL: &str = "gpt-4o-mini";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Factory for the extraction/translation client.
pub struct VisionLLMFactory;

impl VisionLLMFactory {
    /// Create the client once at startup.
    ///
    /// Without a credential the mock client is returned, so the rest of the
    /// service runs end to end with placeholder text.
    pub fn create_llm(llm_config: &LLMConfig) -> Result<Arc<dyn VisionLLMInterface>> {
        Self::create_llm_with_key(llm_config, llm_config.resolve_api_key())
    }

    pub fn create_llm_with_key(
        llm_config: &LLMConfig,
        api_key: Option<String>,
    ) -> Result<Arc<dyn VisionLLMInterface>> {
        let provider = llm_config.llm_provider.as_str();
        info!("Initializing vision LLM: {}", provider);

        if provider == "mock_llm" {
            return Ok(Arc::new(MockLLM::new()));
        }

        let Some(api_key) = api_key else {
            warn!(
                "No API key configured for {}, running in mocked mode",
                provider
            );
            return Ok(Arc::new(MockLLM::new()));
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(llm_config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        match provider {
            "openai_llm" | "openai_compatible_llm" => Ok(Arc::new(OpenAICompatibleLLM::new(
                client,
                llm_config
                    .model
                    .clone()
                    .unwrap_or_else(|| OPENAI_MODEL.to_string()),
                llm_config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
                api_key,
                llm_config.max_tokens,
            ))),
            "gemini_llm" => Ok(Arc::new(GeminiLLM::new(
                client,
                llm_config
                    .model
                    .clone()
                    .unwrap_or_else(|| GEMINI_MODEL.to_string()),
                llm_config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
                api_key,
                llm_config.max_tokens,
            ))),
            _ => Err(anyhow::anyhow!("Unsupported LLM provider: {}", provider)),
        }
    }
}
