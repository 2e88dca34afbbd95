use actix_web::HttpResponse;
use serde_json::json;

pub async fn service_info() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "Health monitoring API is operational",
        "privacy": "User ids are anonymized before storage"
    }))
}
