use sqlx::SqlitePool;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::flat_file::{FlatFileError, FlatFileStore};
use crate::db::health_data::insert_health_payload;
use crate::models::health_data::{HealthPayload, RecordCounts};
use crate::services::payload_anonymizer::anonymize_payload;
use crate::utils::anonymizer::Anonymizer;

#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("failed to persist payload to the relational store")]
    Relational(#[source] sqlx::Error),

    /// The relational rows are already committed when this is returned.
    #[error("payload stored in the relational store but the flat-file export failed")]
    FlatFile(#[source] FlatFileError),
}

#[derive(Debug, Clone)]
pub struct IngestionReceipt {
    pub anonymous_user_id: String,
    pub relational: RecordCounts,
    pub flat_file: RecordCounts,
}

/// Runs anonymize → relational → flat-file for each upload.
///
/// Both sinks sit behind one lock shared by every request, so at most one
/// payload is being persisted at any time.
#[derive(Debug)]
pub struct IngestionService {
    anonymizer: Anonymizer,
    pool: SqlitePool,
    flat_files: FlatFileStore,
    storage_lock: Mutex<()>,
}

impl IngestionService {
    pub fn new(anonymizer: Anonymizer, pool: SqlitePool, flat_files: FlatFileStore) -> Self {
        Self {
            anonymizer,
            pool,
            flat_files,
            storage_lock: Mutex::new(()),
        }
    }

    pub fn anonymizer(&self) -> &Anonymizer {
        &self.anonymizer
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn flat_files(&self) -> &FlatFileStore {
        &self.flat_files
    }

    #[tracing::instrument(
        name = "Ingest payload",
        skip(self, payload),
        fields(ingestion_id = %Uuid::new_v4(), anonymous_user_id = tracing::field::Empty)
    )]
    pub async fn handle_upload(&self, payload: HealthPayload) -> Result<IngestionReceipt, IngestionError> {
        let anonymized = anonymize_payload(&self.anonymizer, &payload);
        drop(payload);
        let anonymous_user_id = anonymized.anonymous_user_id().to_string();
        tracing::Span::current().record("anonymous_user_id", anonymous_user_id.as_str());

        tracing::info!(
            heart_rate = anonymized.heart_rate_records.len(),
            sleep_sessions = anonymized.sleep_sessions.len(),
            calories = anonymized.calorie_records.len(),
            oxygen = anonymized.oxygen_saturation_records.len(),
            accelerometer = anonymized.accelerometer_readings.len(),
            gyroscope = anonymized.gyroscope_readings.len(),
            "Payload anonymized"
        );

        let _guard = self.storage_lock.lock().await;

        let relational = match insert_health_payload(&self.pool, &anonymized).await {
            Ok(counts) => counts,
            Err(e) => {
                tracing::error!("❌ Relational write rolled back: {:?}", e);
                return Err(IngestionError::Relational(e));
            }
        };

        let flat_file = match self.flat_files.append_payload(&anonymized).await {
            Ok(counts) => counts,
            Err(e) => {
                tracing::error!(
                    "❌ Flat-file export failed after relational commit, sinks now differ: {:?}",
                    e
                );
                return Err(IngestionError::FlatFile(e));
            }
        };

        tracing::info!("✅ Payload persisted to both sinks");
        Ok(IngestionReceipt {
            anonymous_user_id,
            relational,
            flat_file,
        })
    }
}
