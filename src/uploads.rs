//! Persisted prescription images served by `GET /image/{filename}`.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::UploadConfig;
use crate::error::ApiError;
use crate::prescription::PrescriptionImage;

/// Bytes and MIME type of a stored image.
#[derive(Debug)]
pub struct StoredImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Flat directory of uploaded images addressed by generated filename.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    persist: bool,
    /// `None` keeps files forever.
    retention: Option<Duration>,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, persist: bool, retention: Option<Duration>) -> Self {
        Self {
            dir: dir.into(),
            persist,
            retention,
        }
    }

    pub fn from_config(upload_config: &UploadConfig) -> Self {
        let retention = (upload_config.retention_hours > 0)
            .then(|| Duration::from_secs(upload_config.retention_hours * 3600));
        Self::new(&upload_config.dir, upload_config.persist, retention)
    }

    /// Whether uploads are copied into the directory at all.
    pub fn persists(&self) -> bool {
        self.persist
    }

    /// Store `image` under a fresh name and return that name.
    pub async fn save(&self, image: &PrescriptionImage) -> io::Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let filename = format!(
            "{}-{}.{}",
            chrono::Utc::now().format("%Y%m%d%H%M%S"),
            uuid::Uuid::new_v4().simple(),
            image.extension
        );
        tokio::fs::write(self.dir.join(&filename), &image.bytes).await?;
        debug!("Stored upload {} ({} bytes)", filename, image.bytes.len());
        Ok(filename)
    }

    /// Read a stored image. Names that could escape the directory are
    /// treated as unknown.
    pub async fn read(&self, filename: &str) -> Result<StoredImage, ApiError> {
        let not_found = || ApiError::NotFound(format!("Image not found: {}", filename));
        if !is_plain_filename(filename) {
            return Err(not_found());
        }

        let path = self.dir.join(filename);
        let bytes = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => tokio::fs::read(&path)
                .await
                .map_err(|e| ApiError::Internal(format!("cannot read {}: {}", path.display(), e)))?,
            Ok(_) => return Err(not_found()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => {
                return Err(ApiError::Internal(format!(
                    "cannot stat {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let mime_type = mime_guess::from_path(&path)
            .first()
            .filter(|mime| mime.type_() == mime_guess::mime::IMAGE)
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_else(|| "image/jpeg".to_string());
        Ok(StoredImage { bytes, mime_type })
    }

    /// Delete files older than the retention period. Returns how many went.
    pub async fn prune_expired(&self) -> io::Result<usize> {
        let Some(retention) = self.retention else {
            return Ok(0);
        };
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let age = meta
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age > retention {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Prune on a fixed interval in the background. No task is started when
    /// nothing is persisted or retention is unlimited.
    pub fn spawn_pruner(self: Arc<Self>, every: Duration) -> Option<JoinHandle<()>> {
        if !self.persist || self.retention.is_none() {
            return None;
        }
        info!(
            "Pruning {} every {}s",
            self.dir.display(),
            every.as_secs()
        );
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                match self.prune_expired().await {
                    Ok(0) => {}
                    Ok(removed) => info!("Pruned {} expired uploads", removed),
                    Err(e) => warn!("Upload pruning failed: {}", e),
                }
            }
        }))
    }
}

fn is_plain_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.starts_with('.')
        && !filename.contains(['/', '\\'])
        && !filename.contains("..")
}
