/// SQLite record repository
///
/// Lists are stored as JSON text, timestamps as RFC 3339 text.
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

use super::filter::{ModalityFilter, RecordFilter};
use super::model::{Modality, RecordRow};
use super::repository::RecordRepository;
use crate::error::{PipelineError, Result};

const SCHEMA: &str = include_str!("../../migrations/001_records.sql");

const COLUMNS: &str = "id, user_id, type, confidence_score, diagnosis, details, recommendations, \
                       urgency, symptoms, transcription, created_at";

pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open (or create) the database at `db_path` and ensure the schema exists
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!("Opening record database: {}", db_path.display());
        Self::with_connection(Connection::open(db_path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PipelineError::StorageUnavailable("database lock poisoned".to_string()))
    }
}

fn modality_from_sql(value: &str) -> rusqlite::Result<Modality> {
    match value {
        "image" => Ok(Modality::Image),
        "voice" => Ok(Modality::Voice),
        other => Err(rusqlite::Error::InvalidColumnType(
            2,
            other.to_string(),
            rusqlite::types::Type::Text,
        )),
    }
}

fn json_column<T: serde::de::DeserializeOwned>(index: usize, text: &str) -> rusqlite::Result<T> {
    serde_json::from_str(text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RecordRow> {
    let modality: String = row.get(2)?;
    let recommendations: String = row.get(6)?;
    let symptoms: Option<String> = row.get(8)?;

    Ok(RecordRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        modality: modality_from_sql(&modality)?,
        confidence_score: row.get(3)?,
        diagnosis: row.get(4)?,
        details: row.get(5)?,
        recommendations: json_column(6, &recommendations)?,
        urgency: row.get(7)?,
        symptoms: symptoms.map(|text| json_column(8, &text)).transpose()?,
        transcription: row.get(9)?,
        created_at: row.get(10)?,
    })
}

#[async_trait]
impl RecordRepository for SqliteRepository {
    async fn upsert(&self, user_id: &str, row: RecordRow) -> Result<()> {
        let recommendations = serde_json::to_string(&row.recommendations)?;
        let symptoms = row.symptoms.as_ref().map(serde_json::to_string).transpose()?;

        let conn = self.conn()?;
        // A conflicting id owned by someone else leaves the row alone and changes nothing
        let changed = conn.execute(
            "INSERT INTO diagnostic_records (id, user_id, type, confidence_score, diagnosis,
                 details, recommendations, urgency, symptoms, transcription, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                 type = excluded.type,
                 confidence_score = excluded.confidence_score, diagnosis = excluded.diagnosis,
                 details = excluded.details, recommendations = excluded.recommendations,
                 urgency = excluded.urgency, symptoms = excluded.symptoms,
                 transcription = excluded.transcription, created_at = excluded.created_at
             WHERE diagnostic_records.user_id = excluded.user_id",
            params![
                row.id,
                user_id,
                row.modality.label(),
                row.confidence_score,
                row.diagnosis,
                row.details,
                recommendations,
                row.urgency,
                symptoms,
                row.transcription,
                row.created_at,
            ],
        )?;
        if changed == 0 {
            return Err(PipelineError::OwnerMismatch { record_id: row.id });
        }
        Ok(())
    }

    async fn select(&self, user_id: &str, filter: &RecordFilter) -> Result<Vec<RecordRow>> {
        let modality = match filter.modality {
            ModalityFilter::All => None,
            ModalityFilter::Image => Some(Modality::Image.label()),
            ModalityFilter::Voice => Some(Modality::Voice.label()),
        };

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM diagnostic_records
             WHERE user_id = ?1
               AND (?2 IS NULL OR type = ?2)
               AND (?3 IS NULL OR confidence_score >= ?3)
             ORDER BY created_at DESC",
            COLUMNS
        ))?;
        let rows = stmt.query_map(params![user_id, modality, filter.min_confidence], read_row)?;

        // Text matching stays in Rust so case folding is Unicode-aware
        let mut records = Vec::new();
        for row in rows {
            let row = row?;
            if filter.matches_row(&row) {
                records.push(row);
            }
        }
        Ok(records)
    }

    async fn find(&self, user_id: &str, id: &str) -> Result<Option<RecordRow>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM diagnostic_records WHERE user_id = ?1 AND id = ?2",
                    COLUMNS
                ),
                params![user_id, id],
                read_row,
            )
            .optional()?;
        Ok(row)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
