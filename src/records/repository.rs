/// Persistence port for diagnostic records
///
/// Implementations: in-memory, SQLite
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::filter::RecordFilter;
use super::model::RecordRow;
use crate::error::{PipelineError, Result};

#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// Insert the row, or replace the row with the same id
    ///
    /// An id already owned by another user is refused with `OwnerMismatch`
    async fn upsert(&self, user_id: &str, row: RecordRow) -> Result<()>;

    /// Rows owned by `user_id` that satisfy `filter`, in no particular order
    async fn select(&self, user_id: &str, filter: &RecordFilter) -> Result<Vec<RecordRow>>;

    /// One row by id, if owned by `user_id`
    async fn find(&self, user_id: &str, id: &str) -> Result<Option<RecordRow>>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Process-local repository
///
/// `set_available(false)` makes every call fail with `StorageUnavailable`,
/// which stands in for an unreachable remote store.
#[derive(Clone)]
pub struct MemoryRepository {
    rows: Arc<Mutex<HashMap<String, HashMap<String, RecordRow>>>>,
    available: Arc<AtomicBool>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self {
            rows: Arc::default(),
            available: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of rows stored for `user_id`
    pub fn len(&self, user_id: &str) -> usize {
        self.rows
            .lock()
            .map(|rows| rows.get(user_id).map_or(0, HashMap::len))
            .unwrap_or(0)
    }

    fn rows(&self) -> Result<MutexGuard<'_, HashMap<String, HashMap<String, RecordRow>>>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(PipelineError::StorageUnavailable(
                "record store is offline".to_string(),
            ));
        }
        self.rows
            .lock()
            .map_err(|_| {
                PipelineError::StorageUnavailable("record store lock poisoned".to_string())
            })
    }
}

#[async_trait]
impl RecordRepository for MemoryRepository {
    async fn upsert(&self, user_id: &str, row: RecordRow) -> Result<()> {
        let mut rows = self.rows()?;
        let foreign = rows
            .iter()
            .any(|(owner, owned)| owner != user_id && owned.contains_key(&row.id));
        if foreign {
            return Err(PipelineError::OwnerMismatch { record_id: row.id });
        }
        rows.entry(user_id.to_string())
            .or_default()
            .insert(row.id.clone(), row);
        Ok(())
    }

    async fn select(&self, user_id: &str, filter: &RecordFilter) -> Result<Vec<RecordRow>> {
        Ok(self
            .rows()?
            .get(user_id)
            .map(|rows| rows.values().filter(|row| filter.matches_row(row)).cloned().collect())
            .unwrap_or_default())
    }

    async fn find(&self, user_id: &str, id: &str) -> Result<Option<RecordRow>> {
        Ok(self
            .rows()?
            .get(user_id)
            .and_then(|rows| rows.get(id))
            .cloned())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::model::fixtures::result_at;
    use crate::records::model::Modality;
    use chrono::Utc;

    #[tokio::test]
    async fn test_upsert_refuses_foreign_id() -> Result<()> {
        let repo = MemoryRepository::new();
        let result = result_at("alice", Modality::Voice, "Migraine", 80.0, Utc::now());
        repo.upsert("alice", RecordRow::from(&result)).await?;

        let mut forged = RecordRow::from(&result);
        forged.user_id = "bob".to_string();
        let err = repo.upsert("bob", forged).await.unwrap_err();

        assert!(matches!(err, PipelineError::OwnerMismatch { .. }));
        assert_eq!(repo.len("alice"), 1);
        assert_eq!(repo.len("bob"), 0);

        // The owner can still overwrite its own row
        repo.upsert("alice", RecordRow::from(&result)).await?;
        assert_eq!(repo.len("alice"), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_offline_repository_fails_every_call() {
        let repo = MemoryRepository::new();
        repo.set_available(false);

        let err = repo.select("u1", &RecordFilter::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::StorageUnavailable(_)));
        assert!(repo.find("u1", "missing").await.is_err());
    }
}
