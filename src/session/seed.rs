use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::info;

use super::store::SessionStore;
use crate::types::MedicineRecord;

/// Load `session_id -> [medicine records]` from a YAML or JSON file into the
/// store. Returns the number of sessions loaded.
pub async fn load_seed_file(path: &str, store: &dyn SessionStore) -> Result<usize> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read session seed file {}", path))?;
    // YAML is a superset of JSON, so one parser covers both.
    let sessions: HashMap<String, Vec<MedicineRecord>> = serde_yaml::from_str(&content)
        .with_context(|| format!("invalid session seed file {}", path))?;

    let count = sessions.len();
    for (session_id, medicines) in sessions {
        store.put(&session_id, medicines).await;
    }
    info!("Seeded {} sessions from {}", count, path);
    Ok(count)
}
