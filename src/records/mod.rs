//! Diagnostic result records and their persistence
//!
//! - `model`: the immutable `DiagnosticResult` and its flat `RecordRow` form
//! - `filter`: history search options
//! - `repository`: persistence port plus the in-memory adapter
//! - `sqlite`: SQLite adapter
//! - `store`: `ResultStore`, the per-user history used by the pipeline

mod filter;
mod model;
mod repository;
mod sqlite;
mod store;

use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;

pub use filter::{ModalityFilter, RecordFilter};
pub(crate) use model::Assessment;
pub use model::{Confidence, DiagnosticResult, Findings, Modality, RecordRow, Urgency, UserId};
pub use repository::{MemoryRepository, RecordRepository};
pub use sqlite::SqliteRepository;
pub use store::ResultStore;

#[cfg(test)]
pub(crate) use model::fixtures;

fn memory_or_sqlite(config: &StorageConfig) -> Result<Arc<dyn RecordRepository>> {
    Ok(match config.backend {
        StorageBackend::Memory => Arc::new(MemoryRepository::new()),
        StorageBackend::Sqlite => Arc::new(SqliteRepository::open(config.resolved_path())?),
    })
}
