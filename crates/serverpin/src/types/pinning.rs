use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted trust decision for one hostname.
///
/// Records are only ever replaced as a whole; the constructors keep
/// `backup_pins` free of `primary_pin`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PinRecord {
    pub hostname: String,
    pub primary_pin: String,
    pub backup_pins: BTreeSet<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_validated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PinRecord {
    /// A freshly trusted record: first seen, validated and expiring relative to `now`.
    ///
    /// `hostname` is stored as given; `PinStore::put` rejects it unless it is
    /// already normalized.
    pub fn new(
        hostname: &str,
        primary_pin: &str,
        backup_pins: impl IntoIterator<Item = String>,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            hostname: hostname.to_string(),
            primary_pin: primary_pin.to_string(),
            backup_pins: without_pin(backup_pins, primary_pin),
            first_seen_at: now,
            last_validated_at: now,
            expires_at,
        }
    }

    /// True if `pin` is the primary or one of the backups.
    pub fn accepts(&self, pin: &str) -> bool {
        self.primary_pin == pin || self.backup_pins.contains(pin)
    }

    /// Primary pin first, then backups in sorted order.
    pub fn all_pins(&self) -> Vec<&str> {
        std::iter::once(self.primary_pin.as_str())
            .chain(self.backup_pins.iter().map(String::as_str))
            .collect()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Successor record after a successful validation against `new_primary`.
    ///
    /// Backups become `old backups + observed + old primary`, minus the new
    /// primary. `first_seen_at` is carried over.
    pub fn validated(
        &self,
        new_primary: &str,
        observed_pins: &BTreeSet<String>,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let merged = self
            .backup_pins
            .iter()
            .chain(observed_pins.iter())
            .chain(std::iter::once(&self.primary_pin))
            .cloned();
        Self {
            hostname: self.hostname.clone(),
            primary_pin: new_primary.to_string(),
            backup_pins: without_pin(merged, new_primary),
            first_seen_at: self.first_seen_at,
            last_validated_at: now,
            expires_at,
        }
    }
}

fn without_pin(pins: impl IntoIterator<Item = String>, excluded: &str) -> BTreeSet<String> {
    pins.into_iter()
        .filter(|p| !p.is_empty() && p != excluded)
        .collect()
}

/// In-memory, short-lived permission to connect despite a pin mismatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporaryPinOverride {
    pub hostname: String,
    pub accepted_pins: BTreeSet<String>,
    pub expires_at: DateTime<Utc>,
}

impl TemporaryPinOverride {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn matches_any(&self, observed_pins: &BTreeSet<String>) -> bool {
        !self.accepted_pins.is_disjoint(observed_pins)
    }
}
