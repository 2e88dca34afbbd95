use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

/// One client submission: a batch of heterogeneous sensor and health records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthPayload {
    pub user_id: String,
    pub timestamp: i64,
    #[serde(default)]
    pub heart_rate_records: Vec<HeartRateRecord>,
    #[serde(default)]
    pub steps: HourlySteps,
    #[serde(default)]
    pub sleep_sessions: Vec<SleepSession>,
    #[serde(default)]
    pub calorie_records: Vec<CalorieRecord>,
    #[serde(default)]
    pub oxygen_saturation_records: Vec<OxygenSaturationRecord>,
    #[serde(default)]
    pub accelerometer_readings: Vec<MotionReading>,
    #[serde(default)]
    pub gyroscope_readings: Vec<MotionReading>,
    #[serde(default, rename = "rawSpO2Readings")]
    pub raw_spo2_readings: Vec<RawSpO2Reading>,
    #[serde(default)]
    pub raw_ppg_readings: Vec<RawPpgReading>,
    #[serde(default)]
    pub ring_accelerometer_readings: Vec<MotionReading>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartRateRecord {
    pub timestamp: i64,
    pub health_connect_id: String,
    pub bpm: i64,
    #[serde(default)]
    pub zone_offset: Option<String>,
    pub user_id: String,
}

/// Step counts for a single day, keyed by hour of day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlySteps {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub hourly_counts: BTreeMap<i64, i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepSession {
    pub session_summary: SleepSummary,
    #[serde(default)]
    pub stages: Vec<SleepStage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepSummary {
    pub health_connect_id: String,
    pub start_time: String,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub rem_sleep_duration_minutes: Option<i64>,
    #[serde(default)]
    pub deep_sleep_duration_minutes: Option<i64>,
    #[serde(default)]
    pub light_sleep_duration_minutes: Option<i64>,
    #[serde(default)]
    pub awake_duration_minutes: Option<i64>,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepStage {
    pub id: i64,
    pub session_id: String,
    #[serde(rename = "type")]
    pub stage_type: i64,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalorieRecord {
    pub health_connect_id: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(rename = "kilocalorias")]
    pub kilocalories: f64,
    #[serde(rename = "tipo")]
    pub kind: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OxygenSaturationRecord {
    pub timestamp: i64,
    pub health_connect_id: String,
    pub spo2: f64,
    #[serde(default)]
    pub zone_offset: Option<String>,
    pub user_id: String,
}

/// Three-axis motion sample, shared by the phone accelerometer and gyroscope
/// streams and the ring accelerometer stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionReading {
    pub timestamp: i64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSpO2Reading {
    pub timestamp: i64,
    pub raw: i64,
    pub a: i64,
    pub b: i64,
    pub c: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPpgReading {
    pub timestamp: i64,
    pub raw: i64,
    pub max: i64,
    pub min: i64,
    pub diff: i64,
}

/// A payload whose identifiers have all been replaced by the anonymized id.
///
/// Only `services::payload_anonymizer` can build one, which is what lets the
/// sinks take it as proof that the original identifier is gone.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AnonymizedPayload(HealthPayload);

impl AnonymizedPayload {
    pub(crate) fn new(payload: HealthPayload) -> Self {
        Self(payload)
    }

    pub fn anonymous_user_id(&self) -> &str {
        &self.0.user_id
    }
}

impl Deref for AnonymizedPayload {
    type Target = HealthPayload;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Every kind of record that ends up in a table and a flat file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    HeartRate,
    Accelerometer,
    Gyroscope,
    Steps,
    SleepSessions,
    SleepStages,
    Calories,
    OxygenSaturation,
    RawSpO2,
    RawPpg,
    RingAccelerometer,
}

impl RecordKind {
    pub const ALL: [RecordKind; 11] = [
        RecordKind::HeartRate,
        RecordKind::Accelerometer,
        RecordKind::Gyroscope,
        RecordKind::Steps,
        RecordKind::SleepSessions,
        RecordKind::SleepStages,
        RecordKind::Calories,
        RecordKind::OxygenSaturation,
        RecordKind::RawSpO2,
        RecordKind::RawPpg,
        RecordKind::RingAccelerometer,
    ];

    /// Table name, also used as the flat file stem.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::HeartRate => "heart_rate",
            RecordKind::Accelerometer => "accelerometer",
            RecordKind::Gyroscope => "gyroscope",
            RecordKind::Steps => "steps",
            RecordKind::SleepSessions => "sleep_sessions",
            RecordKind::SleepStages => "sleep_stages",
            RecordKind::Calories => "calories",
            RecordKind::OxygenSaturation => "oxygen_saturation",
            RecordKind::RawSpO2 => "raw_spo2",
            RecordKind::RawPpg => "raw_ppg",
            RecordKind::RingAccelerometer => "ring_accelerometer",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.csv", self.as_str())
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl HealthPayload {
    /// Number of records of `kind` carried by this payload.
    pub fn record_count(&self, kind: RecordKind) -> usize {
        match kind {
            RecordKind::HeartRate => self.heart_rate_records.len(),
            RecordKind::Accelerometer => self.accelerometer_readings.len(),
            RecordKind::Gyroscope => self.gyroscope_readings.len(),
            RecordKind::Steps => self.steps.hourly_counts.len(),
            RecordKind::SleepSessions => self.sleep_sessions.len(),
            RecordKind::SleepStages => self.sleep_sessions.iter().map(|s| s.stages.len()).sum(),
            RecordKind::Calories => self.calorie_records.len(),
            RecordKind::OxygenSaturation => self.oxygen_saturation_records.len(),
            RecordKind::RawSpO2 => self.raw_spo2_readings.len(),
            RecordKind::RawPpg => self.raw_ppg_readings.len(),
            RecordKind::RingAccelerometer => self.ring_accelerometer_readings.len(),
        }
    }
}

/// Per-kind row counts reported by a sink.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordCounts(BTreeMap<&'static str, u64>);

impl RecordCounts {
    pub fn add(&mut self, kind: RecordKind, rows: u64) {
        *self.0.entry(kind.as_str()).or_insert(0) += rows;
    }

    pub fn get(&self, kind: RecordKind) -> u64 {
        self.0.get(kind.as_str()).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }
}

impl fmt::Display for RecordCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(kind, rows)| format!("{}={}", kind, rows))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub status: String,
    pub message: String,
    pub anonymous_user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnonymizationPreview {
    pub original: String,
    pub anonymous: String,
    pub note: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_format_with_missing_optional_collections() {
        let body = serde_json::json!({
            "userId": "device-42",
            "timestamp": 1700000000,
            "heartRateRecords": [
                {"timestamp": 100, "healthConnectId": "hr-1", "bpm": 70, "userId": "device-42"}
            ],
            "steps": {"date": "2024-05-01", "hourlyCounts": {"7": 120, "8": 900}},
            "calorieRecords": [{
                "healthConnectId": "cal-1", "startTime": "a", "endTime": "b",
                "kilocalorias": 12.5, "tipo": "active", "userId": "device-42"
            }],
            "rawSpO2Readings": [{"timestamp": 1, "raw": 2, "a": 3, "b": 4, "c": 5}]
        });

        let payload: HealthPayload = serde_json::from_value(body).unwrap();

        assert_eq!(payload.heart_rate_records[0].zone_offset, None);
        assert_eq!(payload.steps.hourly_counts.get(&8), Some(&900));
        assert_eq!(payload.calorie_records[0].kilocalories, 12.5);
        assert_eq!(payload.calorie_records[0].kind, "active");
        assert!(payload.sleep_sessions.is_empty());
        assert_eq!(payload.record_count(RecordKind::RawSpO2), 1);
        assert_eq!(payload.record_count(RecordKind::Steps), 2);
    }

    #[test]
    fn serializes_back_to_wire_names() {
        let stage = SleepStage {
            id: 1,
            session_id: "s-1".to_string(),
            stage_type: 4,
            start_time: "a".to_string(),
            end_time: "b".to_string(),
        };
        let value = serde_json::to_value(&stage).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["id", "sessionId", "type", "startTime", "endTime"]);
    }

    #[test]
    fn record_counts_accumulate_per_kind() {
        let mut counts = RecordCounts::default();
        counts.add(RecordKind::HeartRate, 2);
        counts.add(RecordKind::HeartRate, 1);
        counts.add(RecordKind::Steps, 4);

        assert_eq!(counts.get(RecordKind::HeartRate), 3);
        assert_eq!(counts.get(RecordKind::Calories), 0);
        assert_eq!(counts.total(), 7);
        assert_eq!(counts.to_string(), "heart_rate=3 steps=4");
    }
}
