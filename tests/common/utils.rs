#![allow(dead_code)]

use once_cell::sync::Lazy;
use reqwest::Client;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::net::TcpListener;
use std::path::PathBuf;
use uuid::Uuid;

use vitals_ingest::config::settings::{get_config, DatabaseSettings};
use vitals_ingest::db::flat_file::FlatFileStore;
use vitals_ingest::db::health_data::connect_database;
use vitals_ingest::services::IngestionService;
use vitals_ingest::telemetry::{get_subscriber, init_subscriber};
use vitals_ingest::utils::anonymizer::Anonymizer;
use vitals_ingest::{run, RouteOptions};

// Ensure that the `tracing` stack is only initialised once using `once_cell`
static TRACING: Lazy<()> = Lazy::new(|| {
    let default_filter_level = "info".to_string();
    let subscriber_name = "test".to_string();

    if std::env::var("TEST_LOG").is_ok() {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::stdout);
        init_subscriber(subscriber);
    } else {
        let subscriber = get_subscriber(subscriber_name, default_filter_level, std::io::sink);
        init_subscriber(subscriber);
    }
});

pub struct TestApp {
    pub address: String,
    pub db_pool: SqlitePool,
    pub csv_dir: PathBuf,
    pub anonymizer: Anonymizer,
}

impl TestApp {
    pub fn csv_path(&self, stem: &str) -> PathBuf {
        self.csv_dir.join(format!("{}.csv", stem))
    }

    pub fn read_csv(&self, stem: &str) -> String {
        std::fs::read_to_string(self.csv_path(stem)).expect("Failed to read csv file")
    }

    pub async fn upload(&self, body: &Value) -> reqwest::Response {
        Client::new()
            .post(&format!("{}/v1/data/detailed", &self.address))
            .json(body)
            .send()
            .await
            .expect("Failed to execute upload request.")
    }

    pub async fn count_rows(&self, table: &str) -> i64 {
        count_rows(&self.db_pool, table).await
    }
}

/// Fresh SQLite file and CSV directory under the system temp dir.
pub fn temp_storage() -> (DatabaseSettings, PathBuf) {
    let root = std::env::temp_dir().join(format!("vitals-ingest-test-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&root).expect("Failed to create temp dir");
    let database = DatabaseSettings {
        path: root.join("health_data.db"),
        max_connections: 4,
    };
    (database, root.join("csv_data"))
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with_options(RouteOptions {
        expose_privacy_test: true,
    })
    .await
}

pub async fn spawn_app_with_options(options: RouteOptions) -> TestApp {
    // The first time `initialize` is invoked the code in `TRACING` is executed.
    // All other invocations will instead skip execution.
    Lazy::force(&TRACING);

    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    // Get port assigned by the OS
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    let mut configuration = get_config().expect("Failed to read configuration.");
    let (database, csv_dir) = temp_storage();
    configuration.database = database;
    configuration.storage.flat_file_dir = csv_dir.clone();

    let db_pool = connect_database(&configuration.database)
        .await
        .expect("Failed to open SQLite database.");
    let anonymizer = Anonymizer::new(&configuration.privacy.secret_key)
        .expect("Failed to build anonymizer.");
    let ingestion = IngestionService::new(
        anonymizer.clone(),
        db_pool.clone(),
        FlatFileStore::new(csv_dir.clone()),
    );

    let server = run(
        listener,
        ingestion,
        configuration.application.max_payload_bytes,
        options,
    )
    .expect("Failed to bind address");
    // Launch the server as a background task
    let _ = tokio::spawn(server);

    TestApp {
        address,
        db_pool,
        csv_dir,
        anonymizer,
    }
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .expect("Failed to count rows.")
}

/// Payload with only the fields the wire format requires.
pub fn minimal_payload(user_id: &str, timestamp: i64) -> Value {
    json!({
        "userId": user_id,
        "timestamp": timestamp,
        "heartRateRecords": [],
        "steps": {"date": "2024-05-01", "hourlyCounts": {}},
        "sleepSessions": [],
        "calorieRecords": [],
        "oxygenSaturationRecords": [],
        "accelerometerReadings": [],
        "gyroscopeReadings": []
    })
}

pub fn heart_rate_payload(user_id: &str, timestamp: i64, bpm: i64) -> Value {
    let mut payload = minimal_payload(user_id, 1_700_000_000);
    payload["heartRateRecords"] = json!([{
        "timestamp": timestamp,
        "healthConnectId": format!("hr-{}", timestamp),
        "bpm": bpm,
        "userId": user_id
    }]);
    payload
}

/// One record of every kind, including the raw ring streams.
pub fn full_payload(user_id: &str) -> Value {
    json!({
        "userId": user_id,
        "timestamp": 1_700_000_000,
        "heartRateRecords": [
            {"timestamp": 100, "healthConnectId": "hr-100", "bpm": 70, "userId": user_id},
            {"timestamp": 160, "healthConnectId": "hr-160", "bpm": 74, "zoneOffset": "+01:00", "userId": user_id}
        ],
        "steps": {"date": "2024-05-01", "hourlyCounts": {"7": 120, "8": 900}},
        "sleepSessions": [{
            "sessionSummary": {
                "healthConnectId": "sleep-1",
                "startTime": "2024-04-30T22:00:00Z",
                "endTime": "2024-05-01T06:00:00Z",
                "durationMinutes": 480,
                "remSleepDurationMinutes": 90,
                "userId": user_id
            },
            "stages": [
                {"id": 1, "sessionId": "sleep-1", "type": 4, "startTime": "2024-04-30T22:00:00Z", "endTime": "2024-05-01T01:00:00Z"},
                {"id": 2, "sessionId": "sleep-1", "type": 6, "startTime": "2024-05-01T01:00:00Z", "endTime": "2024-05-01T06:00:00Z"}
            ]
        }],
        "calorieRecords": [{
            "healthConnectId": "cal-1",
            "startTime": "2024-05-01T08:00:00Z",
            "endTime": "2024-05-01T09:00:00Z",
            "kilocalorias": 88.5,
            "tipo": "active",
            "userId": user_id
        }],
        "oxygenSaturationRecords": [
            {"timestamp": 200, "healthConnectId": "ox-200", "spo2": 97.5, "userId": user_id}
        ],
        "accelerometerReadings": [{"timestamp": 1, "x": 0.1, "y": 0.2, "z": 9.8}],
        "gyroscopeReadings": [{"timestamp": 1, "x": 0.01, "y": 0.02, "z": 0.03}],
        "rawSpO2Readings": [{"timestamp": 1, "raw": 51234, "a": 1, "b": 2, "c": 3}],
        "rawPpgReadings": [{"timestamp": 1, "raw": 40000, "max": 41000, "min": 39000, "diff": 2000}],
        "ringAccelerometerReadings": [{"timestamp": 1, "x": 1.0, "y": 2.0, "z": 3.0}]
    })
}
