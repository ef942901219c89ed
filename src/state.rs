use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::ocr_fallback::{FallbackOCRInterface, TesseractOCR};
use crate::prescription::PrescriptionService;
use crate::session::{load_seed_file, InMemorySessionStore, SessionStore};
use crate::uploads::UploadStore;
use crate::vision_llm::VisionLLMFactory;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub prescriptions: Arc<PrescriptionService>,
    pub sessions: Arc<dyn SessionStore>,
    pub uploads: Arc<UploadStore>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let llm = VisionLLMFactory::create_llm(&config.llm_config)?;

        let fallback: Option<Arc<dyn FallbackOCRInterface>> = if config.fallback_config.enabled {
            info!("Fallback OCR: {}", config.fallback_config.command);
            Some(Arc::new(TesseractOCR::from_config(&config.fallback_config)))
        } else {
            info!("Fallback OCR disabled");
            None
        };

        let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        if let Some(seed_file) = &config.session_config.seed_file {
            load_seed_file(seed_file, sessions.as_ref()).await?;
        }

        let uploads = Arc::new(UploadStore::from_config(&config.upload_config));

        let prescriptions = PrescriptionService::new(llm, fallback)
            .with_max_concurrency(config.llm_config.max_concurrent_requests);

        Ok(Self::from_parts(
            config,
            prescriptions,
            sessions,
            uploads,
        ))
    }

    pub fn from_parts(
        config: Config,
        prescriptions: PrescriptionService,
        sessions: Arc<dyn SessionStore>,
        uploads: Arc<UploadStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            prescriptions: Arc::new(prescriptions),
            sessions,
            uploads,
        }
    }
}
