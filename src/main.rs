use std::net::TcpListener;

use vitals_ingest::config::settings::get_config;
use vitals_ingest::db::flat_file::FlatFileStore;
use vitals_ingest::db::health_data::connect_database;
use vitals_ingest::services::IngestionService;
use vitals_ingest::telemetry::{get_subscriber, init_subscriber};
use vitals_ingest::utils::anonymizer::Anonymizer;
use vitals_ingest::{run, RouteOptions};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = match get_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Refusing to start: {}", e);
            std::process::exit(1);
        }
    };

    let subscriber = get_subscriber(
        "vitals-ingest".into(),
        config.application.log_level.clone(),
        std::io::stdout,
    );
    init_subscriber(subscriber);

    let anonymizer = match Anonymizer::new(&config.privacy.secret_key) {
        Ok(anonymizer) => anonymizer,
        Err(e) => {
            tracing::error!("❌ Invalid anonymization key: {}", e);
            std::process::exit(1);
        }
    };

    let pool = match connect_database(&config.database).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("❌ Failed to open relational store {}: {}", config.database.path.display(), e);
            std::process::exit(1);
        }
    };

    let flat_files = FlatFileStore::new(config.storage.flat_file_dir.clone());
    tracing::info!("Flat-file export directory: {}", flat_files.dir().display());

    let options = RouteOptions {
        expose_privacy_test: config.privacy.expose_test_endpoint,
    };
    if options.expose_privacy_test {
        tracing::warn!("Anonymization test endpoint is enabled: GET /v1/privacy/test/{{userId}}");
    }

    let address = format!("{}:{}", config.application.host, config.application.port);
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Listening on {}", address);

    run(
        listener,
        IngestionService::new(anonymizer, pool, flat_files),
        config.application.max_payload_bytes,
        options,
    )?
    .await
}
