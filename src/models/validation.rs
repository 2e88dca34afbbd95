//! Request checking for uploads, in two passes.
//!
//! `parse_payload` turns the JSON body into a [`HealthPayload`] and reports
//! every missing key and malformed record with its full field path.
//! `validate_payload` then applies the value rules serde cannot express:
//! non-empty ids, positive heart rate, SpO2 within 0..=100, step dates and
//! hours, non-negative durations and calories. Stages are stored under their
//! enclosing sleep summary, so a stage whose `sessionId` differs from the
//! summary's `healthConnectId` is rejected, and one such stage fails the whole
//! upload.

use std::fmt;

use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{HttpRequest, HttpResponse};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use serde_path_to_error::Segment;

use crate::models::health_data::{
    CalorieRecord, HealthPayload, HeartRateRecord, HourlySteps, MotionReading,
    OxygenSaturationRecord, RawPpgReading, RawSpO2Reading, SleepSession, SleepStage, SleepSummary,
};

const FIELD_SEPARATOR: &str = " -> ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorKind {
    JsonInvalid,
    Missing,
    TypeError,
    ValueError,
    ContentType,
    PayloadTooLarge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: FieldErrorKind,
}

impl FieldError {
    fn new(path: &[&str], message: impl Into<String>, kind: FieldErrorKind) -> Self {
        Self {
            field: path.join(FIELD_SEPARATOR),
            message: message.into(),
            kind,
        }
    }

    fn at(path: &[String], message: impl Into<String>, kind: FieldErrorKind) -> Self {
        Self {
            field: path.join(FIELD_SEPARATOR),
            message: message.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.0.iter().map(|e| e.field.as_str()).collect();
        write!(f, "{} invalid field(s): {}", self.0.len(), fields.join(", "))
    }
}

impl std::error::Error for ValidationErrors {}

#[derive(Debug, Serialize)]
pub struct ValidationErrorResponse {
    pub detail: String,
    pub errors: Vec<FieldError>,
}

impl From<ValidationErrors> for ValidationErrorResponse {
    fn from(errors: ValidationErrors) -> Self {
        Self {
            detail: "Validation Error".to_string(),
            errors: errors.0,
        }
    }
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_response(self) -> HttpResponse {
        HttpResponse::UnprocessableEntity().json(ValidationErrorResponse::from(self))
    }

    fn push(&mut self, path: &[&str], message: impl Into<String>) {
        self.0.push(FieldError::new(path, message, FieldErrorKind::ValueError));
    }
}

/// Maps body extraction failures to the same 422 shape as semantic validation.
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let error = match &err {
        JsonPayloadError::Deserialize(e) => {
            FieldError::new(&["body"], e.to_string(), FieldErrorKind::JsonInvalid)
        }
        JsonPayloadError::ContentType => FieldError::new(
            &["body"],
            "Content type must be application/json",
            FieldErrorKind::ContentType,
        ),
        JsonPayloadError::Overflow { .. } | JsonPayloadError::OverflowKnownLength { .. } => {
            FieldError::new(&["body"], err.to_string(), FieldErrorKind::PayloadTooLarge)
        }
        other => FieldError::new(&["body"], other.to_string(), FieldErrorKind::JsonInvalid),
    };
    tracing::warn!("Rejected upload body: {}", error.message);

    let response = ValidationErrors(vec![error]).into_response();
    InternalError::from_response(err, response).into()
}

/// Record types checked one element at a time, with the keys that have no default.
trait WireRecord: DeserializeOwned {
    const REQUIRED: &'static [&'static str];
}

impl WireRecord for HeartRateRecord {
    const REQUIRED: &'static [&'static str] = &["timestamp", "healthConnectId", "bpm", "userId"];
}

impl WireRecord for SleepSummary {
    const REQUIRED: &'static [&'static str] = &["healthConnectId", "startTime", "userId"];
}

impl WireRecord for SleepStage {
    const REQUIRED: &'static [&'static str] = &["id", "sessionId", "type", "startTime", "endTime"];
}

impl WireRecord for CalorieRecord {
    const REQUIRED: &'static [&'static str] =
        &["healthConnectId", "startTime", "endTime", "kilocalorias", "tipo", "userId"];
}

impl WireRecord for OxygenSaturationRecord {
    const REQUIRED: &'static [&'static str] = &["timestamp", "healthConnectId", "spo2", "userId"];
}

impl WireRecord for MotionReading {
    const REQUIRED: &'static [&'static str] = &["timestamp", "x", "y", "z"];
}

impl WireRecord for RawSpO2Reading {
    const REQUIRED: &'static [&'static str] = &["timestamp", "raw", "a", "b", "c"];
}

impl WireRecord for RawPpgReading {
    const REQUIRED: &'static [&'static str] = &["timestamp", "raw", "max", "min", "diff"];
}

const PAYLOAD_REQUIRED: &[&str] = &["userId", "timestamp"];
const SESSION_REQUIRED: &[&str] = &["sessionSummary"];

/// Deserializes the upload body.
///
/// serde stops at the first problem, so on failure the body is walked again
/// record by record and every missing key and malformed record is reported.
pub fn parse_payload(body: &Value) -> Result<HealthPayload, ValidationErrors> {
    let first = match serde_path_to_error::deserialize::<_, HealthPayload>(body) {
        Ok(payload) => return Ok(payload),
        Err(e) => e,
    };

    let mut errors = ValidationErrors::default();
    check_payload_shape(body, &mut errors);
    if errors.is_empty() {
        errors.0.push(path_error(&["body".to_string()], &first));
    }
    Err(errors)
}

fn check_payload_shape(body: &Value, errors: &mut ValidationErrors) {
    let root = vec!["body".to_string()];
    let Some(object) = body.as_object() else {
        errors.0.push(FieldError::at(&root, "Input should be a valid object", FieldErrorKind::TypeError));
        return;
    };

    check_missing(object, PAYLOAD_REQUIRED, &root, errors);
    check_field::<String>(object, "userId", &root, errors);
    check_field::<i64>(object, "timestamp", &root, errors);
    check_list::<HeartRateRecord>(object, "heartRateRecords", &root, errors);
    check_field::<HourlySteps>(object, "steps", &root, errors);
    check_sessions(object, &root, errors);
    check_list::<CalorieRecord>(object, "calorieRecords", &root, errors);
    check_list::<OxygenSaturationRecord>(object, "oxygenSaturationRecords", &root, errors);
    check_list::<MotionReading>(object, "accelerometerReadings", &root, errors);
    check_list::<MotionReading>(object, "gyroscopeReadings", &root, errors);
    check_list::<RawSpO2Reading>(object, "rawSpO2Readings", &root, errors);
    check_list::<RawPpgReading>(object, "rawPpgReadings", &root, errors);
    check_list::<MotionReading>(object, "ringAccelerometerReadings", &root, errors);
}

fn check_sessions(object: &Map<String, Value>, path: &[String], errors: &mut ValidationErrors) {
    let Some(value) = object.get("sleepSessions") else {
        return;
    };
    let path = child(path, "sleepSessions");
    let Some(sessions) = value.as_array() else {
        check_value::<Vec<SleepSession>>(value, &path, errors);
        return;
    };

    for (i, session) in sessions.iter().enumerate() {
        let session_path = child(&path, &i.to_string());
        let Some(fields) = session.as_object() else {
            check_value::<SleepSession>(session, &session_path, errors);
            continue;
        };
        check_missing(fields, SESSION_REQUIRED, &session_path, errors);
        if let Some(summary) = fields.get("sessionSummary") {
            check_record::<SleepSummary>(summary, &child(&session_path, "sessionSummary"), errors);
        }
        check_list::<SleepStage>(fields, "stages", &session_path, errors);
    }
}

fn check_list<T: WireRecord>(
    object: &Map<String, Value>,
    key: &str,
    path: &[String],
    errors: &mut ValidationErrors,
) {
    let Some(value) = object.get(key) else {
        return;
    };
    let path = child(path, key);
    let Some(items) = value.as_array() else {
        check_value::<Vec<T>>(value, &path, errors);
        return;
    };
    for (i, item) in items.iter().enumerate() {
        check_record::<T>(item, &child(&path, &i.to_string()), errors);
    }
}

/// Missing keys are all listed; type errors only once the record is complete.
fn check_record<T: WireRecord>(value: &Value, path: &[String], errors: &mut ValidationErrors) {
    if let Some(object) = value.as_object() {
        let before = errors.0.len();
        check_missing(object, T::REQUIRED, path, errors);
        if errors.0.len() > before {
            return;
        }
    }
    check_value::<T>(value, path, errors);
}

fn check_missing(
    object: &Map<String, Value>,
    required: &[&str],
    path: &[String],
    errors: &mut ValidationErrors,
) {
    for key in required {
        if !object.contains_key(*key) {
            errors
                .0
                .push(FieldError::at(&child(path, key), "Field required", FieldErrorKind::Missing));
        }
    }
}

fn check_field<T: DeserializeOwned>(
    object: &Map<String, Value>,
    key: &str,
    path: &[String],
    errors: &mut ValidationErrors,
) {
    if let Some(value) = object.get(key) {
        check_value::<T>(value, &child(path, key), errors);
    }
}

fn check_value<T: DeserializeOwned>(value: &Value, path: &[String], errors: &mut ValidationErrors) {
    if let Err(e) = serde_path_to_error::deserialize::<_, T>(value) {
        errors.0.push(path_error(path, &e));
    }
}

fn path_error(path: &[String], error: &serde_path_to_error::Error<serde_json::Error>) -> FieldError {
    let mut field = path.to_vec();
    field.extend(error.path().iter().map(|segment| match segment {
        Segment::Seq { index } => index.to_string(),
        other => other.to_string(),
    }));

    let message = error.inner().to_string();
    let kind = match missing_field_name(&message) {
        Some(name) => {
            field.push(name.to_string());
            FieldErrorKind::Missing
        }
        None => FieldErrorKind::TypeError,
    };
    FieldError::at(&field, message, kind)
}

fn missing_field_name(message: &str) -> Option<&str> {
    message.strip_prefix("missing field `")?.split('`').next()
}

fn child(path: &[String], key: &str) -> Vec<String> {
    let mut path = path.to_vec();
    path.push(key.to_string());
    path
}

/// Checks the rules serde cannot express. Every failing field is reported.
pub fn validate_payload(payload: &HealthPayload) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    if payload.user_id.trim().is_empty() {
        errors.push(&["body", "userId"], "userId must not be empty");
    }
    if payload.timestamp < 0 {
        errors.push(&["body", "timestamp"], "timestamp must not be negative");
    }

    for (i, record) in payload.heart_rate_records.iter().enumerate() {
        let idx = i.to_string();
        if record.bpm <= 0 {
            errors.push(&["body", "heartRateRecords", idx.as_str(), "bpm"], "bpm must be greater than 0");
        }
        if record.health_connect_id.trim().is_empty() {
            errors.push(
                &["body", "heartRateRecords", idx.as_str(), "healthConnectId"],
                "healthConnectId must not be empty",
            );
        }
    }

    if !payload.steps.hourly_counts.is_empty()
        && NaiveDate::parse_from_str(&payload.steps.date, "%Y-%m-%d").is_err()
    {
        errors.push(&["body", "steps", "date"], "date must be formatted as YYYY-MM-DD");
    }
    for (hour, count) in &payload.steps.hourly_counts {
        let key = hour.to_string();
        if !(0..=23).contains(hour) {
            errors.push(&["body", "steps", "hourlyCounts", key.as_str()], "hour must be between 0 and 23");
        }
        if *count < 0 {
            errors.push(&["body", "steps", "hourlyCounts", key.as_str()], "step count must not be negative");
        }
    }

    for (i, session) in payload.sleep_sessions.iter().enumerate() {
        let idx = i.to_string();
        let summary = &session.session_summary;
        if summary.health_connect_id.trim().is_empty() {
            errors.push(
                &["body", "sleepSessions", idx.as_str(), "sessionSummary", "healthConnectId"],
                "healthConnectId must not be empty",
            );
        }
        if matches!(summary.duration_minutes, Some(d) if d < 0) {
            errors.push(
                &["body", "sleepSessions", idx.as_str(), "sessionSummary", "durationMinutes"],
                "durationMinutes must not be negative",
            );
        }
        for (j, stage) in session.stages.iter().enumerate() {
            if stage.session_id != summary.health_connect_id {
                let stage_idx = j.to_string();
                errors.push(
                    &["body", "sleepSessions", idx.as_str(), "stages", stage_idx.as_str(), "sessionId"],
                    format!(
                        "sessionId must match the session summary ({})",
                        summary.health_connect_id
                    ),
                );
            }
        }
    }

    for (i, record) in payload.calorie_records.iter().enumerate() {
        if record.kilocalories < 0.0 {
            let idx = i.to_string();
            errors.push(
                &["body", "calorieRecords", idx.as_str(), "kilocalorias"],
                "kilocalorias must not be negative",
            );
        }
    }

    for (i, record) in payload.oxygen_saturation_records.iter().enumerate() {
        let idx = i.to_string();
        if !(0.0..=100.0).contains(&record.spo2) {
            errors.push(
                &["body", "oxygenSaturationRecords", idx.as_str(), "spo2"],
                "spo2 must be between 0 and 100",
            );
        }
        if record.health_connect_id.trim().is_empty() {
            errors.push(
                &["body", "oxygenSaturationRecords", idx.as_str(), "healthConnectId"],
                "healthConnectId must not be empty",
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
