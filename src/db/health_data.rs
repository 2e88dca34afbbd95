use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{SqliteConnection, SqlitePool};

use crate::config::settings::DatabaseSettings;
use crate::models::health_data::{AnonymizedPayload, MotionReading, RecordCounts, RecordKind};

/// Opens the SQLite file (creating it if needed) and applies the embedded migrations.
pub async fn connect_database(settings: &DatabaseSettings) -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .connect_with(settings.connect_options())
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Relational store ready at {}", settings.path.display());

    Ok(pool)
}

/// Writes every record of the payload in one transaction.
///
/// Keyed kinds use `INSERT OR IGNORE` so the first write wins; sensor streams
/// without a natural key are inserted unconditionally. On any error the
/// transaction is dropped uncommitted, which rolls back every row of this payload.
/// The returned counts only include rows that were actually inserted.
#[tracing::instrument(
    name = "Insert payload into relational store",
    skip(pool, payload),
    fields(anonymous_user_id = %payload.anonymous_user_id())
)]
pub async fn insert_health_payload(
    pool: &SqlitePool,
    payload: &AnonymizedPayload,
) -> Result<RecordCounts, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut counts = RecordCounts::default();
    let user_id = payload.anonymous_user_id();
    let request_timestamp = payload.timestamp;

    for record in &payload.heart_rate_records {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO heart_rate (userId, requestTimestamp, timestamp, bpm)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(request_timestamp)
        .bind(record.timestamp)
        .bind(record.bpm)
        .execute(&mut *tx)
        .await?;
        counts.add(RecordKind::HeartRate, result.rows_affected());
    }

    let inserted = insert_motion_readings(
        &mut tx,
        RecordKind::Accelerometer,
        user_id,
        request_timestamp,
        &payload.accelerometer_readings,
    )
    .await?;
    counts.add(RecordKind::Accelerometer, inserted);

    let inserted = insert_motion_readings(
        &mut tx,
        RecordKind::Gyroscope,
        user_id,
        request_timestamp,
        &payload.gyroscope_readings,
    )
    .await?;
    counts.add(RecordKind::Gyroscope, inserted);

    for (hour, count) in &payload.steps.hourly_counts {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO steps (userId, requestTimestamp, date, hour, count)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(request_timestamp)
        .bind(&payload.steps.date)
        .bind(*hour)
        .bind(*count)
        .execute(&mut *tx)
        .await?;
        counts.add(RecordKind::Steps, result.rows_affected());
    }

    for session in &payload.sleep_sessions {
        let summary = &session.session_summary;
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO sleep_sessions (
                userId, requestTimestamp, sessionId, startTime, endTime, durationMinutes
            )
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(request_timestamp)
        .bind(&summary.health_connect_id)
        .bind(&summary.start_time)
        .bind(summary.end_time.as_deref())
        .bind(summary.duration_minutes)
        .execute(&mut *tx)
        .await?;
        counts.add(RecordKind::SleepSessions, result.rows_affected());

        // Stages always link to the enclosing summary's session id
        for stage in &session.stages {
            let result = sqlx::query(
                r#"
                INSERT INTO sleep_stages (sessionId, type, startTime, endTime)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&summary.health_connect_id)
            .bind(stage.stage_type)
            .bind(&stage.start_time)
            .bind(&stage.end_time)
            .execute(&mut *tx)
            .await?;
            counts.add(RecordKind::SleepStages, result.rows_affected());
        }
    }

    for record in &payload.calorie_records {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO calories (
                userId, requestTimestamp, healthConnectId, startTime, endTime, kilocalorias, tipo
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(request_timestamp)
        .bind(&record.health_connect_id)
        .bind(&record.start_time)
        .bind(&record.end_time)
        .bind(record.kilocalories)
        .bind(&record.kind)
        .execute(&mut *tx)
        .await?;
        counts.add(RecordKind::Calories, result.rows_affected());
    }

    for record in &payload.oxygen_saturation_records {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO oxygen_saturation (userId, requestTimestamp, timestamp, spo2)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(request_timestamp)
        .bind(record.timestamp)
        .bind(record.spo2)
        .execute(&mut *tx)
        .await?;
        counts.add(RecordKind::OxygenSaturation, result.rows_affected());
    }

    for reading in &payload.raw_spo2_readings {
        let result = sqlx::query(
            r#"
            INSERT INTO raw_spo2 (userId, requestTimestamp, timestamp, raw, a, b, c)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(request_timestamp)
        .bind(reading.timestamp)
        .bind(reading.raw)
        .bind(reading.a)
        .bind(reading.b)
        .bind(reading.c)
        .execute(&mut *tx)
        .await?;
        counts.add(RecordKind::RawSpO2, result.rows_affected());
    }

    for reading in &payload.raw_ppg_readings {
        let result = sqlx::query(
            r#"
            INSERT INTO raw_ppg (userId, requestTimestamp, timestamp, raw, max, min, diff)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(request_timestamp)
        .bind(reading.timestamp)
        .bind(reading.raw)
        .bind(reading.max)
        .bind(reading.min)
        .bind(reading.diff)
        .execute(&mut *tx)
        .await?;
        counts.add(RecordKind::RawPpg, result.rows_affected());
    }

    let inserted = insert_motion_readings(
        &mut tx,
        RecordKind::RingAccelerometer,
        user_id,
        request_timestamp,
        &payload.ring_accelerometer_readings,
    )
    .await?;
    counts.add(RecordKind::RingAccelerometer, inserted);

    tx.commit().await?;
    tracing::info!("Relational store committed: {}", counts);

    Ok(counts)
}

/// Unconditional insert into one of the three-axis tables.
async fn insert_motion_readings(
    conn: &mut SqliteConnection,
    kind: RecordKind,
    user_id: &str,
    request_timestamp: i64,
    readings: &[MotionReading],
) -> Result<u64, sqlx::Error> {
    let statement = format!(
        "INSERT INTO {} (userId, requestTimestamp, timestamp, x, y, z) VALUES (?, ?, ?, ?, ?, ?)",
        kind.as_str()
    );
    let mut inserted = 0;
    for reading in readings {
        let result = sqlx::query(&statement)
            .bind(user_id)
            .bind(request_timestamp)
            .bind(reading.timestamp)
            .bind(reading.x)
            .bind(reading.y)
            .bind(reading.z)
            .execute(&mut *conn)
            .await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}
