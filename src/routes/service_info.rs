use actix_web::{get, Responder};

use crate::handlers::service_info::service_info;

#[get("/")]
pub async fn root() -> impl Responder {
    service_info().await
}
