use async_trait::async_trait;
use base64::{prelude::BASE64_STANDARD, Engine as _};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::interface::{
    translation_system_prompt, VisionLLMInterface, EXTRACTION_SYSTEM_PROMPT,
    EXTRACTION_USER_PROMPT,
};
use crate::error::UpstreamError;

const PROVIDER: &str = "openai";

/// Longest error body kept in an `UpstreamError::Status`.
const MAX_ERROR_BODY: usize = 500;

/// OpenAI chat-completions client. Works with any endpoint that speaks the
/// same `/chat/completions` protocol and accepts `image_url` content parts.
pub struct OpenAICompatibleLLM {
    client: Client,
    model: String,
    base_url: String,
    api_key: String,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAICompatibleLLM {
    pub fn new(
        client: Client,
        model: String,
        base_url: String,
        api_key: String,
        max_tokens: u32,
    ) -> Self {
        info!(
            "Initialized OpenAICompatibleLLM: model={}, base_url={}",
            model, base_url
        );
        Self {
            client,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            max_tokens,
        }
    }

    async fn chat(&self, messages: serde_json::Value) -> Result<String, UpstreamError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
        });

        let request = self.client.post(&url).bearer_auth(&self.api_key).json(&body);
        let response: ChatCompletionResponse = send_json(PROVIDER, request).await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(UpstreamError::EmptyResponse { provider: PROVIDER })?;
        debug!("{} returned {} chars", PROVIDER, text.len());
        Ok(text)
    }
}

#[async_trait]
impl VisionLLMInterface for OpenAICompatibleLLM {
    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    async fn extract_text(
        &self,
        image_bytes: &[u8],
        mime_type: &str,
    ) -> Result<String, UpstreamError> {
        let messages = json!([
            {"role": "system", "content": EXTRACTION_SYSTEM_PROMPT},
            {"role": "user", "content": [
                {"type": "text", "text": EXTRACTION_USER_PROMPT},
                {"type": "image_url", "image_url": {"url": data_url(mime_type, image_bytes)}}
            ]}
        ]);
        self.chat(messages).await
    }

    async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, UpstreamError> {
        let messages = json!([
            {"role": "system", "content": translation_system_prompt(target_language)},
            {"role": "user", "content": text}
        ]);
        self.chat(messages).await
    }
}

/// Convert binary data to a `data:` URL.
pub fn data_url(mime_type: &str, data: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, BASE64_STANDARD.encode(data))
}

/// Send a request and decode a JSON body, mapping non-2xx statuses to
/// `UpstreamError::Status`.
pub(super) async fn send_json<T: DeserializeOwned>(
    provider: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<T, UpstreamError> {
    let response = request
        .send()
        .await
        .map_err(|source| UpstreamError::Request { provider, source })?;

    let status = response.status();
    if !status.is_success() {
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        return Err(UpstreamError::Status {
            provider,
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|source| UpstreamError::Request { provider, source })
}
