use async_trait::async_trait;

use super::interface::VisionLLMInterface;
use crate::error::UpstreamError;

/// Placeholder returned by `extract_text` in mocked mode.
pub const MOCKED_OCR_RESULT: &str = "MOCKED_OCR_RESULT: Take 1 tablet daily after meals.";

/// Stand-in used when no provider credential is configured. Output is
/// deterministic and always carries a `MOCKED_` marker.
#[derive(Debug, Default, Clone)]
pub struct MockLLM;

impl MockLLM {
    pub fn new() -> Self {
        Self
    }
}

pub fn mocked_translation(text: &str, target_language: &str) -> String {
    format!("[MOCKED_TRANSLATION to {}]: {}", target_language, text)
}

#[async_trait]
impl VisionLLMInterface for MockLLM {
    fn provider_name(&self) -> &'static str {
        "mock"
    }

    fn is_mocked(&self) -> bool {
        true
    }

    async fn extract_text(
        &self,
        _image_bytes: &[u8],
        _mime_type: &str,
    ) -> Result<String, UpstreamError> {
        Ok(MOCKED_OCR_RESULT.to_string())
    }

    async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, UpstreamError> {
        Ok(mocked_translation(text, target_language))
    }
}
