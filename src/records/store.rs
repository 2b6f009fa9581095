use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::filter::RecordFilter;
use super::memory_or_sqlite;
use super::model::{DiagnosticResult, RecordRow, UserId};
use super::repository::RecordRepository;
use crate::config::StorageConfig;
use crate::error::{PipelineError, Result};

/// Per-user history of completed analyses
///
/// Cheap to clone; clones share the repository.
#[derive(Clone)]
pub struct ResultStore {
    repository: Arc<dyn RecordRepository>,
}

impl ResultStore {
    pub fn new(repository: Arc<dyn RecordRepository>) -> Self {
        Self { repository }
    }

    /// Build the repository named in the storage configuration
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        Ok(Self::new(memory_or_sqlite(config)?))
    }

    /// Insert or replace by `result.id`
    pub async fn save(&self, user_id: &UserId, result: &DiagnosticResult) -> Result<()> {
        if result.user_id() != user_id {
            return Err(PipelineError::OwnerMismatch {
                record_id: result.id().to_string(),
            });
        }

        self.repository
            .upsert(user_id.as_str(), RecordRow::from(result))
            .await
            .map_err(|e| {
                warn!("Failed to save record {} to {}: {}", result.id(), self.repository.name(), e);
                e
            })?;

        info!("Saved {} record {} for {}", result.modality(), result.id(), user_id);
        Ok(())
    }

    /// Matching records, newest first
    pub async fn query(
        &self,
        user_id: &UserId,
        filter: &RecordFilter,
    ) -> Result<Vec<DiagnosticResult>> {
        let rows = self
            .repository
            .select(user_id.as_str(), filter)
            .await
            .map_err(|e| {
                warn!("Failed to query {}: {}", self.repository.name(), e);
                e
            })?;

        let mut records = rows
            .into_iter()
            .map(DiagnosticResult::try_from)
            .collect::<Result<Vec<_>>>()?;
        records.retain(|record| filter.matches(record));
        records.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });

        debug!("Query for {} returned {} records", user_id, records.len());
        Ok(records)
    }

    pub async fn get(&self, user_id: &UserId, id: Uuid) -> Result<Option<DiagnosticResult>> {
        self.repository
            .find(user_id.as_str(), &id.to_string())
            .await?
            .map(DiagnosticResult::try_from)
            .transpose()
    }
}
