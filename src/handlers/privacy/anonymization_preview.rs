use actix_web::{web, HttpResponse};

use crate::models::health_data::AnonymizationPreview;
use crate::utils::anonymizer::Anonymizer;

/// Shows which pseudonym an id maps to. Debugging aid, only routed when
/// `privacy.expose_test_endpoint` is enabled.
#[tracing::instrument(name = "Preview anonymization", skip(user_id, anonymizer))]
pub async fn preview_anonymization(
    user_id: web::Path<String>,
    anonymizer: web::Data<Anonymizer>,
) -> HttpResponse {
    let original = user_id.into_inner();
    let anonymous = anonymizer.anonymize(&original);

    HttpResponse::Ok().json(AnonymizationPreview {
        original,
        anonymous,
        note: "The original id is never written to storage".to_string(),
    })
}
