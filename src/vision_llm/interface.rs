use async_trait::async_trait;

use crate::error::UpstreamError;

/// System instruction for reading a prescription photo.
pub const EXTRACTION_SYSTEM_PROMPT: &str = "You are a medical prescription reader.";

/// User instruction sent alongside the image.
pub const EXTRACTION_USER_PROMPT: &str =
    "Extract the medication instructions from this prescription:";

/// System instruction for translating extracted text.
pub fn translation_system_prompt(target_language: &str) -> String {
    format!(
        "Translate the following prescription into {}.",
        target_language
    )
}

/// Interface for the hosted vision-language model.
///
/// Implementations must not assume idempotence: the same image or text may
/// come back worded differently on every call.
#[async_trait]
pub trait VisionLLMInterface: Send + Sync {
    /// Short provider name used in logs and errors.
    fn provider_name(&self) -> &'static str;

    /// Whether this client returns placeholder values instead of calling out.
    fn is_mocked(&self) -> bool {
        false
    }

    /// Read the prescription text out of an image. Result is whitespace-trimmed.
    async fn extract_text(&self, image_bytes: &[u8], mime_type: &str)
        -> Result<String, UpstreamError>;

    /// Translate `text` into `target_language` (a free-form name like "Tamil").
    async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<String, UpstreamError>;
}
