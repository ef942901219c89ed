//! Upload -> OCR -> translate orchestration.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tempfile::NamedTempFile;
use tracing::{info, instrument, warn};

use crate::error::{ApiError, ExtractionError};
use crate::languages::LanguageList;
use crate::ocr_fallback::FallbackOCRInterface;
use crate::types::{
    Extraction, ExtractionSource, LanguageMap, MedicineRecord, MedicineTranslation,
    TranslationBatch,
};
use crate::vision_llm::VisionLLMInterface;

/// An uploaded prescription photo.
#[derive(Debug, Clone)]
pub struct PrescriptionImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// File extension without the dot, used for scratch and persisted files.
    pub extension: String,
}

impl PrescriptionImage {
    /// Derive MIME type and extension from the client-declared content type,
    /// then the file name, defaulting to JPEG.
    pub fn new(bytes: Vec<u8>, content_type: Option<&str>, file_name: Option<&str>) -> Self {
        let declared = content_type
            .filter(|mime| mime.starts_with("image/"))
            .map(str::to_string);
        let guessed = file_name
            .and_then(|name| mime_guess::from_path(name).first())
            .filter(|mime| mime.type_() == mime_guess::mime::IMAGE)
            .map(|mime| mime.essence_str().to_string());
        let mime_type = declared
            .or(guessed)
            .unwrap_or_else(|| "image/jpeg".to_string());

        let extension = mime_guess::get_mime_extensions_str(&mime_type)
            .and_then(|extensions| {
                // prefer the common spelling for JPEG
                if extensions.contains(&"jpg") {
                    Some("jpg")
                } else {
                    extensions.first().copied()
                }
            })
            .unwrap_or("jpg")
            .to_string();

        Self {
            bytes,
            mime_type,
            extension,
        }
    }
}

/// Default cap on translation units in flight at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Runs extraction with fallback and fans translations out per language.
pub struct PrescriptionService {
    llm: Arc<dyn VisionLLMInterface>,
    fallback: Option<Arc<dyn FallbackOCRInterface>>,
    max_concurrency: usize,
}

impl PrescriptionService {
    pub fn new(
        llm: Arc<dyn VisionLLMInterface>,
        fallback: Option<Arc<dyn FallbackOCRInterface>>,
    ) -> Self {
        Self {
            llm,
            fallback,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Limit how many translation units run at once. A medicine unit issues
    /// two provider calls (name and dosage).
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn is_mocked(&self) -> bool {
        self.llm.is_mocked()
    }

    pub fn fallback_enabled(&self) -> bool {
        self.fallback.is_some()
    }

    /// Extract prescription text: hosted model first, local OCR on failure.
    ///
    /// The image lives in a scratch file for the duration of the call and is
    /// removed when this returns.
    #[instrument(skip_all, fields(bytes = image.bytes.len(), mime = %image.mime_type))]
    pub async fn extract(&self, image: &PrescriptionImage) -> Result<Extraction, ApiError> {
        let scratch = write_scratch_file(image).await?;

        match self.llm.extract_text(&image.bytes, &image.mime_type).await {
            Ok(text) => {
                info!("{} extracted {} chars", self.llm.provider_name(), text.len());
                Ok(Extraction {
                    text,
                    source: ExtractionSource::Remote,
                })
            }
            Err(err) => {
                let Some(fallback) = &self.fallback else {
                    return Err(err.into());
                };
                warn!(
                    error = %err,
                    "remote extraction failed, using {} fallback",
                    fallback.engine_name()
                );
                let text = fallback.extract(scratch.path()).await?;
                Ok(Extraction {
                    text,
                    source: ExtractionSource::Fallback,
                })
            }
        }
    }

    /// Translate `text` into every language, at most `max_concurrency` at a
    /// time. Results keep request order.
    ///
    /// A failing language keeps its slot with an empty string and its reason
    /// goes into `errors`; the other languages are unaffected.
    pub async fn translate_all(&self, text: &str, languages: &LanguageList) -> TranslationBatch {
        let results: Vec<_> = stream::iter(languages.iter().map(|language| async move {
            (language, self.llm.translate_text(text, language).await)
        }))
        .boxed()
        .buffered(self.max_concurrency)
        .collect()
        .await;

        let mut batch = TranslationBatch::default();
        for (language, result) in results {
            match result {
                Ok(translated) => batch.translations.insert(language, translated),
                Err(err) => {
                    warn!(language, error = %err, "translation failed");
                    batch.translations.insert(language, String::new());
                    batch.errors.insert(language, err.to_string());
                }
            }
        }
        batch
    }

    /// Attach `translations` for every requested language to each record,
    /// replacing any earlier ones.
    ///
    /// Work is split into one unit per (record, language) and at most
    /// `max_concurrency` units run at once.
    pub async fn translate_medicines(
        &self,
        mut records: Vec<MedicineRecord>,
        languages: &LanguageList,
    ) -> Vec<MedicineRecord> {
        let units: Vec<(usize, &str, String, String)> = records
            .iter()
            .enumerate()
            .flat_map(|(index, record)| {
                languages.iter().map(move |language| {
                    (
                        index,
                        language,
                        record.medicine_name.clone(),
                        record.dosage.clone(),
                    )
                })
            })
            .collect();

        let results: Vec<_> = stream::iter(units.into_iter().map(
            |(index, language, name, dosage)| async move {
                let (name, dosage) = futures::join!(
                    self.llm.translate_text(&name, language),
                    self.llm.translate_text(&dosage, language)
                );
                (index, language, name, dosage)
            },
        ))
        .boxed()
        .buffered(self.max_concurrency)
        .collect()
        .await;

        let mut translations: Vec<LanguageMap<MedicineTranslation>> =
            records.iter().map(|_| LanguageMap::new()).collect();
        let mut errors: Vec<LanguageMap<String>> =
            records.iter().map(|_| LanguageMap::new()).collect();

        for (index, language, name, dosage) in results {
            let mut failures = Vec::new();
            let medicine_name = name.unwrap_or_else(|err| {
                failures.push(format!("medicine_name: {}", err));
                String::new()
            });
            let dosage = dosage.unwrap_or_else(|err| {
                failures.push(format!("dosage: {}", err));
                String::new()
            });
            if !failures.is_empty() {
                warn!(
                    language,
                    medicine = %records[index].medicine_name,
                    "medicine translation failed"
                );
                errors[index].insert(language, failures.join("; "));
            }
            translations[index].insert(
                language,
                MedicineTranslation {
                    medicine_name,
                    dosage,
                },
            );
        }

        for ((record, translations), errors) in records.iter_mut().zip(translations).zip(errors) {
            record.translations = Some(translations);
            record.translation_errors = (!errors.is_empty()).then_some(errors);
        }
        records
    }
}

async fn write_scratch_file(image: &PrescriptionImage) -> Result<NamedTempFile, ExtractionError> {
    let scratch = tempfile::Builder::new()
        .prefix("rx-upload-")
        .suffix(&format!(".{}", image.extension))
        .tempfile()?;
    tokio::fs::write(scratch.path(), &image.bytes).await?;
    Ok(scratch)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use crate::vision_llm::mock_llm::{mocked_translation, MOCKED_OCR_RESULT};
    use crate::vision_llm::mock_llm::MockLLM;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Hosted model whose extraction always fails and whose translation fails
    /// for the listed languages.
    pub struct FailingLLM {
        pub failing_languages: Vec<String>,
        pub extract_calls: AtomicUsize,
    }

    impl FailingLLM {
        pub fn new(failing_languages: &[&str]) -> Self {
            Self {
                failing_languages: failing_languages.iter().map(|s| s.to_string()).collect(),
                extract_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VisionLLMInterface for FailingLLM {
        fn provider_name(&self) -> &'static str {
            "failing"
        }

        async fn extract_text(&self, _: &[u8], _: &str) -> Result<String, UpstreamError> {
            self.extract_calls.fetch_add(1, Ordering::SeqCst);
            Err(UpstreamError::Status {
                provider: "failing",
                status: 401,
                body: "invalid api key".to_string(),
            })
        }

        async fn translate_text(&self, text: &str, language: &str) -> Result<String, UpstreamError> {
            if self.failing_languages.iter().any(|l| l == language) {
                Err(UpstreamError::EmptyResponse { provider: "failing" })
            } else {
                Ok(mocked_translation(text, language))
            }
        }
    }

    /// Fallback OCR that records the path it was given and checks the file.
    /// Built with `failing()` it reports a tesseract error instead.
    pub struct StubFallback {
        pub text: Option<String>,
        pub seen: Mutex<Option<(PathBuf, Vec<u8>)>>,
        pub calls: AtomicUsize,
    }

    impl StubFallback {
        pub fn new(text: &str) -> Self {
            Self {
                text: Some(text.to_string()),
                seen: Mutex::new(None),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failing() -> Self {
            Self {
                text: None,
                seen: Mutex::new(None),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FallbackOCRInterface for StubFallback {
        fn engine_name(&self) -> &'static str {
            "stub"
        }

        async fn extract(&self, image_path: &Path) -> Result<String, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let bytes = std::fs::read(image_path)?;
            *self.seen.lock().unwrap() = Some((image_path.to_path_buf(), bytes));
            self.text.clone().ok_or_else(|| ExtractionError::CommandFailed {
                command: "tesseract".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "Error in pixReadStream".to_string(),
            })
        }
    }

    /// Model that answers every translation after `delay` and records how
    /// many translations were in flight at the same time.
    pub struct PacedLLM {
        pub delay: Duration,
        in_flight: AtomicUsize,
        pub peak: AtomicUsize,
    }

    impl PacedLLM {
        pub fn new(delay: Duration) -> Self {
            Self {
                delay,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VisionLLMInterface for PacedLLM {
        fn provider_name(&self) -> &'static str {
            "paced"
        }

        async fn extract_text(&self, _: &[u8], _: &str) -> Result<String, UpstreamError> {
            Ok(MOCKED_OCR_RESULT.to_string())
        }

        async fn translate_text(&self, text: &str, language: &str) -> Result<String, UpstreamError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(mocked_translation(text, language))
        }
    }

    fn languages(names: &[&str]) -> LanguageList {
        LanguageList::new(names.iter().map(|s| s.to_string()), 10).unwrap()
    }

    fn jpeg(bytes: &[u8]) -> PrescriptionImage {
        PrescriptionImage::new(bytes.to_vec(), Some("image/jpeg"), Some("rx.jpg"))
    }

    #[test]
    fn image_type_prefers_declared_then_filename() {
        let png = PrescriptionImage::new(vec![1], Some("image/png"), Some("x.jpg"));
        assert_eq!((png.mime_type.as_str(), png.extension.as_str()), ("image/png", "png"));

        let from_name = PrescriptionImage::new(vec![1], Some("application/octet-stream"), Some("x.png"));
        assert_eq!(from_name.mime_type, "image/png");

        let unknown = PrescriptionImage::new(vec![1], None, None);
        assert_eq!((unknown.mime_type.as_str(), unknown.extension.as_str()), ("image/jpeg", "jpg"));
    }

    #[tokio::test]
    async fn mocked_extraction_is_remote() {
        let service = PrescriptionService::new(Arc::new(MockLLM::new()), None);
        let extraction = service.extract(&jpeg(b"img")).await.unwrap();
        assert_eq!(extraction.text, MOCKED_OCR_RESULT);
        assert_eq!(extraction.source, ExtractionSource::Remote);
    }

    #[tokio::test]
    async fn failed_extraction_uses_fallback_on_scratch_file() {
        let fallback = Arc::new(StubFallback::new("Take 2 capsules at night\n"));
        let llm = Arc::new(FailingLLM::new(&[]));
        let service = PrescriptionService::new(llm.clone(), Some(fallback.clone()));

        let extraction = service.extract(&jpeg(b"photo-bytes")).await.unwrap();
        assert_eq!(extraction.text, "Take 2 capsules at night\n");
        assert_eq!(extraction.source, ExtractionSource::Fallback);
        assert_eq!(llm.extract_calls.load(Ordering::SeqCst), 1);

        let (path, bytes) = fallback.seen.lock().unwrap().clone().unwrap();
        assert_eq!(bytes, b"photo-bytes");
        assert_eq!(path.extension().unwrap(), "jpg");
        // scratch file is gone once the call returns
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn failing_fallback_is_fatal_after_one_attempt() {
        let fallback = Arc::new(StubFallback::failing());
        let llm = Arc::new(FailingLLM::new(&[]));
        let service = PrescriptionService::new(llm.clone(), Some(fallback.clone()));

        let err = service.extract(&jpeg(b"blurry")).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Extraction(ExtractionError::CommandFailed { .. })
        ));
        assert_eq!(llm.extract_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_extraction_without_fallback_is_upstream_error() {
        let service = PrescriptionService::new(Arc::new(FailingLLM::new(&[])), None);
        let err = service.extract(&jpeg(b"x")).await.unwrap_err();
        assert!(matches!(err, ApiError::Upstream(_)));
    }

    #[tokio::test]
    async fn translations_have_one_entry_per_language_in_order() {
        let service = PrescriptionService::new(Arc::new(MockLLM::new()), None);
        let batch = service
            .translate_all("hello", &languages(&["Tamil", "French", "Malay"]))
            .await;

        let keys: Vec<&str> = batch.translations.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["Tamil", "French", "Malay"]);
        assert_eq!(
            batch.translations.get("French").unwrap(),
            "[MOCKED_TRANSLATION to French]: hello"
        );
        assert!(batch.errors.is_empty());
    }

    #[tokio::test]
    async fn one_failing_language_degrades_alone() {
        let service = PrescriptionService::new(Arc::new(FailingLLM::new(&["Tamil"])), None);
        let batch = service
            .translate_all("hello", &languages(&["Spanish", "Tamil"]))
            .await;

        assert_eq!(batch.translations.len(), 2);
        assert_eq!(batch.translations.get("Tamil").unwrap(), "");
        assert!(batch.errors.get("Tamil").unwrap().contains("no text"));
        assert!(batch.errors.get("Spanish").is_none());
        assert_eq!(
            batch.translations.get("Spanish").unwrap(),
            "[MOCKED_TRANSLATION to Spanish]: hello"
        );
    }

    #[tokio::test]
    async fn medicines_get_both_fields_translated() {
        let service = PrescriptionService::new(Arc::new(FailingLLM::new(&["Tamil"])), None);
        let records = vec![MedicineRecord::new("Amoxicillin", "500mg")];

        let out = service
            .translate_medicines(records, &languages(&["French", "Tamil"]))
            .await;
        let translations = out[0].translations.as_ref().unwrap();
        assert_eq!(
            translations.get("French").unwrap(),
            &MedicineTranslation {
                medicine_name: "[MOCKED_TRANSLATION to French]: Amoxicillin".into(),
                dosage: "[MOCKED_TRANSLATION to French]: 500mg".into(),
            }
        );
        assert_eq!(translations.get("Tamil").unwrap().dosage, "");
        let errors = out[0].translation_errors.as_ref().unwrap();
        assert!(errors.get("Tamil").unwrap().starts_with("medicine_name:"));
        assert!(errors.get("French").is_none());
    }

    #[tokio::test]
    async fn medicine_translation_respects_concurrency_cap() {
        let llm = Arc::new(PacedLLM::new(Duration::from_millis(20)));
        let service = PrescriptionService::new(llm.clone(), None).with_max_concurrency(2);
        let records: Vec<_> = (0..5)
            .map(|i| MedicineRecord::new(format!("med-{i}"), "1 tablet"))
            .collect();

        let out = service
            .translate_medicines(records, &languages(&["French", "Tamil"]))
            .await;

        assert_eq!(out.len(), 5);
        for (i, record) in out.iter().enumerate() {
            let translations = record.translations.as_ref().unwrap();
            let keys: Vec<&str> = translations.iter().map(|(k, _)| k).collect();
            assert_eq!(keys, ["French", "Tamil"]);
            assert_eq!(
                translations.get("Tamil").unwrap().medicine_name,
                format!("[MOCKED_TRANSLATION to Tamil]: med-{i}")
            );
        }
        // two units in flight, each translating name and dosage together
        let peak = llm.peak.load(Ordering::SeqCst);
        assert!((2..=4).contains(&peak), "peak {peak}");
    }

    #[tokio::test]
    async fn language_translation_respects_concurrency_cap() {
        let llm = Arc::new(PacedLLM::new(Duration::from_millis(20)));
        let service = PrescriptionService::new(llm.clone(), None).with_max_concurrency(1);

        let batch = service
            .translate_all("hello", &languages(&["Tamil", "French", "Malay"]))
            .await;

        let keys: Vec<&str> = batch.translations.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["Tamil", "French", "Malay"]);
        assert_eq!(llm.peak.load(Ordering::SeqCst), 1);
    }
}
