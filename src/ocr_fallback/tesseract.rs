//! Fallback OCR via the `tesseract` CLI.

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::interface::FallbackOCRInterface;
use crate::config::FallbackConfig;
use crate::error::ExtractionError;

/// Wraps `tesseract <image> stdout`.
pub struct TesseractOCR {
    command: String,
    timeout: Duration,
}

impl TesseractOCR {
    pub fn new(command: String, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    pub fn from_config(fallback_config: &FallbackConfig) -> Self {
        Self::new(
            fallback_config.command.clone(),
            Duration::from_secs(fallback_config.timeout_secs),
        )
    }

    fn check_for_command_failure(&self, output: &Output) -> Result<(), ExtractionError> {
        if output.status.success() {
            return Ok(());
        }
        Err(ExtractionError::CommandFailed {
            command: self.command.clone(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[async_trait]
impl FallbackOCRInterface for TesseractOCR {
    fn engine_name(&self) -> &'static str {
        "tesseract"
    }

    #[instrument(level = "debug", skip(self))]
    async fn extract(&self, image_path: &Path) -> Result<String, ExtractionError> {
        let run = Command::new(&self.command)
            .arg(image_path)
            .arg("stdout")
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| ExtractionError::TimedOut {
                command: self.command.clone(),
                secs: self.timeout.as_secs(),
            })?
            .map_err(|source| ExtractionError::Spawn {
                command: self.command.clone(),
                source,
            })?;
        self.check_for_command_failure(&output)?;

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        debug!("tesseract recognized {} chars", text.len());
        Ok(text)
    }
}
