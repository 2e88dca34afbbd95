pub mod ingestion_service;
pub mod payload_anonymizer;

pub use ingestion_service::{IngestionError, IngestionReceipt, IngestionService};
