use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;
use tracing_actix_web::TracingLogger;

pub mod config;
pub mod db;
mod handlers;
pub mod models;
mod routes;
pub mod services;
pub mod telemetry;
pub mod utils;

use crate::models::validation::json_error_handler;
use crate::services::ingestion_service::IngestionService;
use crate::utils::anonymizer::Anonymizer;

pub use crate::routes::RouteOptions;

pub fn run(
    listener: TcpListener,
    ingestion: IngestionService,
    max_payload_bytes: usize,
    options: RouteOptions,
) -> Result<Server, std::io::Error> {
    // Wrap using web::Data, which boils down to an Arc smart pointer
    let anonymizer = web::Data::new(ingestion.anonymizer().clone());
    let ingestion = web::Data::new(ingestion);

    let server = HttpServer::new(move || {
        let json_config = web::JsonConfig::default()
            .limit(max_payload_bytes)
            .error_handler(json_error_handler);

        App::new()
            .wrap(TracingLogger::default())
            .app_data(json_config)
            .app_data(ingestion.clone())
            .app_data::<web::Data<Anonymizer>>(anonymizer.clone())
            .configure(|cfg| routes::init_routes(cfg, options))
    })
    .listen(listener)?
    .run();

    Ok(server)
}
