use actix_web::{post, web, HttpResponse};

use crate::handlers::health_data::upload_health_data::upload_health_data;
use crate::services::ingestion_service::IngestionService;

#[post("/data/detailed")]
pub async fn upload_detailed(
    body: web::Json<serde_json::Value>,
    ingestion: web::Data<IngestionService>,
) -> HttpResponse {
    upload_health_data(body, ingestion).await
}
