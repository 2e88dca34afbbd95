use crate::models::health_data::{AnonymizedPayload, HealthPayload};
use crate::utils::anonymizer::Anonymizer;

/// Returns a copy of `payload` with the submitter id replaced everywhere it
/// appears: the root and every record type that carries its own `userId`.
pub fn anonymize_payload(anonymizer: &Anonymizer, payload: &HealthPayload) -> AnonymizedPayload {
    let anonymous_user_id = anonymizer.anonymize(&payload.user_id);
    let mut anonymized = payload.clone();

    anonymized.user_id = anonymous_user_id.clone();
    for record in &mut anonymized.heart_rate_records {
        record.user_id = anonymous_user_id.clone();
    }
    for session in &mut anonymized.sleep_sessions {
        session.session_summary.user_id = anonymous_user_id.clone();
    }
    for record in &mut anonymized.calorie_records {
        record.user_id = anonymous_user_id.clone();
    }
    for record in &mut anonymized.oxygen_saturation_records {
        record.user_id = anonymous_user_id.clone();
    }

    AnonymizedPayload::new(anonymized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    const ORIGINAL_ID: &str = "original-user-7f3a9c";

    fn anonymizer() -> Anonymizer {
        Anonymizer::new(&SecretString::new("test-secret-key-for-testing".into())).unwrap()
    }

    fn full_payload() -> HealthPayload {
        serde_json::from_value(serde_json::json!({
            "userId": ORIGINAL_ID,
            "timestamp": 1700000000,
            "heartRateRecords": [
                {"timestamp": 100, "healthConnectId": "hr-1", "bpm": 70, "userId": ORIGINAL_ID},
                {"timestamp": 160, "healthConnectId": "hr-2", "bpm": 72, "zoneOffset": "+01:00", "userId": ORIGINAL_ID}
            ],
            "steps": {"date": "2024-05-01", "hourlyCounts": {"9": 1200}},
            "sleepSessions": [{
                "sessionSummary": {
                    "healthConnectId": "sleep-1", "startTime": "2024-04-30T22:00:00Z",
                    "endTime": "2024-05-01T06:00:00Z", "durationMinutes": 480, "userId": ORIGINAL_ID
                },
                "stages": [
                    {"id": 1, "sessionId": "sleep-1", "type": 4, "startTime": "a", "endTime": "b"}
                ]
            }],
            "calorieRecords": [{
                "healthConnectId": "cal-1", "startTime": "a", "endTime": "b",
                "kilocalorias": 88.0, "tipo": "active", "userId": ORIGINAL_ID
            }],
            "oxygenSaturationRecords": [
                {"timestamp": 200, "healthConnectId": "ox-1", "spo2": 97.5, "userId": ORIGINAL_ID}
            ],
            "accelerometerReadings": [{"timestamp": 1, "x": 0.1, "y": 0.2, "z": 9.8}],
            "gyroscopeReadings": [{"timestamp": 1, "x": 0.0, "y": 0.0, "z": 0.1}],
            "rawSpO2Readings": [{"timestamp": 1, "raw": 2, "a": 3, "b": 4, "c": 5}],
            "rawPpgReadings": [{"timestamp": 1, "raw": 2, "max": 3, "min": 1, "diff": 2}],
            "ringAccelerometerReadings": [{"timestamp": 1, "x": 1.0, "y": 2.0, "z": 3.0}]
        }))
        .unwrap()
    }

    #[test]
    fn original_id_does_not_survive_anywhere() {
        let payload = full_payload();
        let anonymized = anonymize_payload(&anonymizer(), &payload);

        let rendered = serde_json::to_string(&anonymized).unwrap();
        assert!(!rendered.contains(ORIGINAL_ID));
    }

    #[test]
    fn every_identifier_gets_the_same_pseudonym() {
        let anonymizer = anonymizer();
        let expected = anonymizer.anonymize(ORIGINAL_ID);
        let anonymized = anonymize_payload(&anonymizer, &full_payload());

        assert_eq!(anonymized.anonymous_user_id(), expected);
        assert!(anonymized.heart_rate_records.iter().all(|r| r.user_id == expected));
        assert!(anonymized
            .sleep_sessions
            .iter()
            .all(|s| s.session_summary.user_id == expected));
        assert!(anonymized.calorie_records.iter().all(|r| r.user_id == expected));
        assert!(anonymized
            .oxygen_saturation_records
            .iter()
            .all(|r| r.user_id == expected));
    }

    #[test]
    fn non_identifier_fields_are_copied_and_input_is_untouched() {
        let payload = full_payload();
        let before = payload.clone();
        let anonymized = anonymize_payload(&anonymizer(), &payload);

        assert_eq!(payload, before);

        let mut restored = (*anonymized).clone();
        restored.user_id = payload.user_id.clone();
        for r in &mut restored.heart_rate_records {
            r.user_id = payload.user_id.clone();
        }
        for s in &mut restored.sleep_sessions {
            s.session_summary.user_id = payload.user_id.clone();
        }
        for r in &mut restored.calorie_records {
            r.user_id = payload.user_id.clone();
        }
        for r in &mut restored.oxygen_saturation_records {
            r.user_id = payload.user_id.clone();
        }
        assert_eq!(restored, payload);
    }

    #[test]
    fn empty_collections_are_fine() {
        let payload: HealthPayload = serde_json::from_value(serde_json::json!({
            "userId": ORIGINAL_ID,
            "timestamp": 1
        }))
        .unwrap();

        let anonymized = anonymize_payload(&anonymizer(), &payload);

        assert!(anonymized.anonymous_user_id().starts_with("anon_"));
        assert!(anonymized.heart_rate_records.is_empty());
        assert!(anonymized.steps.hourly_counts.is_empty());
    }
}
