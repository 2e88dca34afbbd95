use actix_web::{web, HttpResponse};
use serde_json::{json, Value};

use crate::models::health_data::UploadResponse;
use crate::models::validation::{parse_payload, validate_payload};
use crate::services::ingestion_service::{IngestionError, IngestionService};

#[tracing::instrument(
    name = "Upload detailed health data",
    skip(body, ingestion),
    fields(request_timestamp = tracing::field::Empty)
)]
pub async fn upload_health_data(
    body: web::Json<Value>,
    ingestion: web::Data<IngestionService>,
) -> HttpResponse {
    let payload = match parse_payload(&body) {
        Ok(payload) => payload,
        Err(errors) => {
            tracing::warn!("Rejected upload body: {}", errors);
            return errors.into_response();
        }
    };
    drop(body);
    tracing::Span::current().record("request_timestamp", payload.timestamp);

    if let Err(errors) = validate_payload(&payload) {
        tracing::warn!("Rejected upload: {}", errors);
        return errors.into_response();
    }

    match ingestion.handle_upload(payload).await {
        Ok(receipt) => {
            tracing::info!(
                "Upload stored: relational [{}] flat-file [{}]",
                receipt.relational,
                receipt.flat_file
            );
            HttpResponse::Ok().json(UploadResponse {
                status: "success".to_string(),
                message: "Data received and stored successfully (anonymized).".to_string(),
                anonymous_user_id: receipt.anonymous_user_id,
            })
        }
        Err(e) => internal_error(&e),
    }
}

/// Storage failures reach the client as the error category only; the source
/// chain stays in the logs.
fn internal_error(e: &IngestionError) -> HttpResponse {
    tracing::error!("Failed to process upload: {}", e);
    HttpResponse::InternalServerError().json(json!({
        "detail": format!("Internal error: {}", e)
    }))
}
