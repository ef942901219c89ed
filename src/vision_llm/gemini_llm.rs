use async_trait::async_trait;
use base64::{prelude::BASE64_STANDARD, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::interface::{
    translation_system_prompt, VisionLLMInterface, EXTRACTION_SYSTEM_PROMPT,
    EXTRACTION_USER_PROMPT,
};
use super::openai_compatible_llm::send_json;
use crate::error::UpstreamError;

const PROVIDER: &str = "gemini";

/// Google Gemini `generateContent` client.
pub struct GeminiLLM {
    client: Client,
    model: String,
    base_url: String,
    api_key: String,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiLLM {
    pub fn new(
        client: Client,
        model: String,
        base_url: String,
        api_key: String,
        max_tokens: u32,
    ) -> Self {
        info!("Initialized GeminiLLM: model={}, base_url={}", model, base_url);
        Self {
            client,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            max_tokens,
        }
    }

    async fn generate(
        &self,
        system: &str,
        parts: serde_json::Value,
    ) -> Result<String, UpstreamError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = json!({
            "systemInstruction": {"parts": [{"text": system}]},
            "contents": [{"role": "user", "parts": parts}],
            "generationConfig": {"maxOutputTokens": self.max_tokens},
        });

        let request = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body);
        let response: GenerateContentResponse = send_json(PROVIDER, request).await?;

        // Gemini may split one answer across several parts.
        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        let text = text.trim();
        if text.is_empty() {
            return Err(UpstreamError::EmptyResponse { provider: PROVIDER });
        }
        debug!("{} returned {} chars", PROVIDER, text.len());
        Ok(text.to_string())
    }
}

#[async_trait]
impl VisionLLMInterface for GeminiLLM {
    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    async fn extract_text(
        &self,
        image_bytes: &[u8],
        mime_type: &str,
    ) -> Result<String, UpstreamError> {
        let parts = json!([
            {"text": EXTRACTION_USER_PROMPT},
            {"inline_data": {"mime_type": mime_type, "data": BASE64_STANDARD.encode(image_bytes)}}
        ]);
        self.generate(EXTRACTION_SYSTEM_PROMPT, parts).await
    }

    async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, UpstreamError> {
        let parts = json!([{"text": text}]);
        self.generate(&translation_system_prompt(target_language), parts)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path, http::HeaderMap, http::StatusCode, routing::post, Json, Router,
    };
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<(String, Option<String>, Value)>>>;

    async fn fake_gemini(status: StatusCode, reply: Value) -> (String, Seen) {
        let seen: Seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let app = Router::new().route(
            "/v1beta/models/:call",
            post(
                move |Path(call): Path<String>, headers: HeaderMap, Json(body): Json<Value>| {
                    let recorder = recorder.clone();
                    let reply = reply.clone();
                    async move {
                        let key = headers
                            .get("x-goog-api-key")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        recorder.lock().unwrap().push((call, key, body));
                        (status, Json(reply))
                    }
                },
            ),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), seen)
    }

    fn llm(base_url: String) -> GeminiLLM {
        GeminiLLM::new(
            Client::new(),
            "gemini-1.5-flash".to_string(),
            base_url,
            "gm-test".to_string(),
            500,
        )
    }

    #[tokio::test]
    async fn translate_joins_parts_and_sends_key() {
        let reply = json!({"candidates": [{"content": {"parts": [
            {"text": "Ambil 1 tablet "},
            {"text": "sehari\n"}
        ]}}]});
        let (base_url, seen) = fake_gemini(StatusCode::OK, reply).await;

        let text = llm(base_url)
            .translate_text("Take 1 tablet daily", "Malay")
            .await
            .unwrap();
        assert_eq!(text, "Ambil 1 tablet sehari");

        let seen = seen.lock().unwrap();
        let (call, key, body) = &seen[0];
        assert_eq!(call, "gemini-1.5-flash:generateContent");
        assert_eq!(key.as_deref(), Some("gm-test"));
        assert_eq!(
            body["systemInstruction"]["parts"][0]["text"],
            "Translate the following prescription into Malay."
        );
        assert_eq!(body["contents"][0]["parts"][0]["text"], "Take 1 tablet daily");
    }

    #[tokio::test]
    async fn extract_sends_inline_image() {
        let reply = json!({"candidates": [{"content": {"parts": [{"text": "Metformin"}]}}]});
        let (base_url, seen) = fake_gemini(StatusCode::OK, reply).await;

        let text = llm(base_url).extract_text(b"png", "image/png").await.unwrap();
        assert_eq!(text, "Metformin");

        let seen = seen.lock().unwrap();
        let inline = &seen[0].2["contents"][0]["parts"][1]["inline_data"];
        assert_eq!(inline["mime_type"], "image/png");
        assert_eq!(inline["data"], BASE64_STANDARD.encode(b"png"));
    }

    #[tokio::test]
    async fn no_candidates_is_empty_response() {
        let (base_url, _) = fake_gemini(StatusCode::OK, json!({"candidates": []})).await;
        let err = llm(base_url).translate_text("x", "Tamil").await.unwrap_err();
        assert!(matches!(err, UpstreamError::EmptyResponse { provider: "gemini" }));
    }

    #[tokio::test]
    async fn forbidden_is_status_error() {
        let (base_url, _) =
            fake_gemini(StatusCode::FORBIDDEN, json!({"error": "bad key"})).await;
        let err = llm(base_url).extract_text(b"x", "image/jpeg").await.unwrap_err();
        assert!(matches!(err, UpstreamError::Status { status: 403, .. }));
    }
}
