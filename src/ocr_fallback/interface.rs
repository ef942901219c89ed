use std::path::Path;

use async_trait::async_trait;

use crate::error::ExtractionError;

/// Local, offline text recognition used when the hosted model fails.
#[async_trait]
pub trait FallbackOCRInterface: Send + Sync {
    fn engine_name(&self) -> &'static str;

    /// Return whatever text is found in the image at `image_path`.
    /// Implementations never fall back further.
    async fn extract(&self, image_path: &Path) -> Result<String, ExtractionError>;
}
