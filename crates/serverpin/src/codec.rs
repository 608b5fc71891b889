//! Text encoding of pin records in the secure store.
//!
//! Current format, one value per hostname key:
//!
//! ```text
//! {"v":1,"pin":"<base64>","backups":["<base64>",...],
//!  "firstSeen":<epoch_ms>,"lastValidated":<epoch_ms>,"expiresAt":<epoch_ms>}
//! ```
//!
//! Older clients stored the bare base64 pin string. Decoding tries the
//! structured form first and only then falls back to the legacy form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::PIN_HEADER_PREFIX;
use crate::error::Error;
use crate::types::pinning::PinRecord;

pub const RECORD_FORMAT_VERSION: u32 = 1;

/// Result of decoding a stored value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    StructuredRecord(PinRecord),
    LegacyPin(String),
    Malformed,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    v: u32,
    pin: String,
    #[serde(default)]
    backups: Vec<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    first_seen: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    last_validated: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    expires_at: DateTime<Utc>,
}

/// Serialize a record. The hostname lives in the store key, not the value.
pub fn encode(record: &PinRecord) -> Result<String, Error> {
    let stored = StoredRecord {
        v: RECORD_FORMAT_VERSION,
        pin: record.primary_pin.clone(),
        backups: record.backup_pins.iter().cloned().collect(),
        first_seen: record.first_seen_at,
        last_validated: record.last_validated_at,
        expires_at: record.expires_at,
    };
    Ok(serde_json::to_string(&stored)?)
}

/// Decode a stored value for `hostname`.
pub fn decode(hostname: &str, raw: &str) -> ParseOutcome {
    match serde_json::from_str::<StoredRecord>(raw) {
        Ok(stored) => structured(hostname, stored),
        Err(_) => legacy(raw),
    }
}

fn structured(hostname: &str, stored: StoredRecord) -> ParseOutcome {
    if stored.v != RECORD_FORMAT_VERSION
        || stored.pin.is_empty()
        || stored.expires_at < stored.last_validated
    {
        return ParseOutcome::Malformed;
    }
    let mut record = PinRecord::new(
        hostname,
        &stored.pin,
        stored.backups,
        stored.first_seen,
        stored.expires_at,
    );
    record.last_validated_at = stored.last_validated;
    ParseOutcome::StructuredRecord(record)
}

fn legacy(raw: &str) -> ParseOutcome {
    let value = raw.trim();
    let value = value.strip_prefix(PIN_HEADER_PREFIX).unwrap_or(value);
    let is_base64_text = value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'-' | b'_' | b'='));
    if value.is_empty() || !is_base64_text {
        return ParseOutcome::Malformed;
    }
    ParseOutcome::LegacyPin(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample(backups: &[&str]) -> PinRecord {
        let now = Utc.timestamp_millis_opt(1_768_435_200_123).unwrap();
        let mut record = PinRecord::new(
            "media.example.com",
            "cHJpbWFyeQ==",
            backups.iter().map(|s| s.to_string()),
            now - Duration::days(3),
            now + Duration::days(90),
        );
        record.last_validated_at = now;
        record
    }

    #[test]
    fn test_encode_layout() {
        let json = encode(&sample(&["YmFja3Vw"])).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["v"], 1);
        assert_eq!(value["pin"], "cHJpbWFyeQ==");
        assert_eq!(value["backups"][0], "YmFja3Vw");
        assert_eq!(value["lastValidated"], 1_768_435_200_123i64);
        assert!(value.get("hostname").is_none());
    }

    #[test]
    fn test_structured_roundtrip() {
        for backups in [&[][..], &["YQ=="][..], &["YQ==", "Yg==", "Yw=="][..]] {
            let record = sample(backups);
            let json = encode(&record).unwrap();
            assert_eq!(
                decode("media.example.com", &json),
                ParseOutcome::StructuredRecord(record)
            );
        }
    }

    #[test]
    fn test_backups_containing_primary_are_cleaned() {
        let json = r#"{"v":1,"pin":"A","backups":["A","B"],"firstSeen":0,"lastValidated":0,"expiresAt":1}"#;
        match decode("h", json) {
            ParseOutcome::StructuredRecord(record) => {
                assert_eq!(record.backup_pins.len(), 1);
                assert!(record.backup_pins.contains("B"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_legacy_pins() {
        assert_eq!(
            decode("h", "abc123"),
            ParseOutcome::LegacyPin("abc123".to_string())
        );
        assert_eq!(
            decode("h", "sha256/AAAA+/=="),
            ParseOutcome::LegacyPin("AAAA+/==".to_string())
        );
        // Valid JSON, but not a record: still a legacy pin.
        assert_eq!(
            decode("h", "12345"),
            ParseOutcome::LegacyPin("12345".to_string())
        );
    }

    #[test]
    fn test_malformed_values() {
        for raw in [
            "",
            "   ",
            "{\"v\":1,\"pin\":",
            r#"{"v":2,"pin":"A","firstSeen":0,"lastValidated":0,"expiresAt":0}"#,
            r#"{"v":1,"pin":"","firstSeen":0,"lastValidated":0,"expiresAt":0}"#,
            r#"{"v":1,"pin":"A","firstSeen":0,"lastValidated":5000,"expiresAt":4999}"#,
            "\"quoted\"",
            "two words",
        ] {
            assert_eq!(decode("h", raw), ParseOutcome::Malformed, "{raw:?}");
        }
    }
}
