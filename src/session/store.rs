use async_trait::async_trait;
use dashmap::DashMap;

use crate::types::MedicineRecord;

/// Storage for session medicine lists. Endpoints only see this trait, so a
/// persistent backend can replace the in-memory one.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Option<Vec<MedicineRecord>>;

    async fn put(&self, session_id: &str, medicines: Vec<MedicineRecord>);

    /// Write `updated` only if the session still holds the medicines in
    /// `snapshot` (ignoring translations). Returns whether it was written.
    async fn replace_if_unchanged(
        &self,
        session_id: &str,
        snapshot: &[MedicineRecord],
        updated: Vec<MedicineRecord>,
    ) -> bool;

    /// Returns whether the session existed.
    async fn delete(&self, session_id: &str) -> bool;

    async fn len(&self) -> usize;
}

/// Process-local store. Contents are lost on restart and never expire.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, Vec<MedicineRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Option<Vec<MedicineRecord>> {
        self.sessions.get(session_id).map(|e| e.value().clone())
    }

    async fn put(&self, session_id: &str, medicines: Vec<MedicineRecord>) {
        self.sessions.insert(session_id.to_string(), medicines);
    }

    async fn replace_if_unchanged(
        &self,
        session_id: &str,
        snapshot: &[MedicineRecord],
        updated: Vec<MedicineRecord>,
    ) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(mut entry) if same_medicines(entry.value(), snapshot) => {
                *entry.value_mut() = updated;
                true
            }
            _ => false,
        }
    }

    async fn delete(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    async fn len(&self) -> usize {
        self.sessions.len()
    }
}

/// Same medicines in the same order. Translations are not compared.
fn same_medicines(current: &[MedicineRecord], snapshot: &[MedicineRecord]) -> bool {
    current.len() == snapshot.len()
        && current.iter().zip(snapshot).all(|(a, b)| {
            a.medicine_name == b.medicine_name && a.dosage == b.dosage && a.extra == b.extra
        })
}
