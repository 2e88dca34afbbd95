use actix_web::{get, web, HttpResponse};

use crate::handlers::privacy::anonymization_preview::preview_anonymization;
use crate::utils::anonymizer::Anonymizer;

#[get("/test/{user_id}")]
pub async fn anonymization_test(
    user_id: web::Path<String>,
    anonymizer: web::Data<Anonymizer>,
) -> HttpResponse {
    preview_anonymization(user_id, anonymizer).await
}
