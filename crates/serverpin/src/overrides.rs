use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Duration;

use crate::clock::Clock;
use crate::types::pinning::TemporaryPinOverride;

/// Short-lived, in-memory "proceed anyway" grants.
///
/// An override lets a connection through despite a pin mismatch. It never
/// changes a persisted record. Expired overrides are swept on every lookup.
pub struct TemporaryTrustRegistry {
    overrides: Mutex<HashMap<String, TemporaryPinOverride>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl TemporaryTrustRegistry {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            overrides: Mutex::new(HashMap::new()),
            clock,
            ttl,
        }
    }

    /// Install or replace the override for `hostname`. Empty pin sets are ignored.
    pub fn allow(&self, hostname: &str, pins: impl IntoIterator<Item = String>) {
        let accepted_pins: BTreeSet<String> = pins.into_iter().filter(|p| !p.is_empty()).collect();
        if accepted_pins.is_empty() {
            tracing::warn!(hostname = %hostname, "Ignoring temporary override with no pins");
            return;
        }
        let expires_at = self.clock.now() + self.ttl;
        self.lock().insert(
            hostname.to_string(),
            TemporaryPinOverride {
                hostname: hostname.to_string(),
                accepted_pins,
                expires_at,
            },
        );
        tracing::info!(hostname = %hostname, %expires_at, "Temporary override installed");
    }

    /// True if an unexpired override for `hostname` accepts any observed pin.
    pub fn is_trusted(&self, hostname: &str, observed_pins: &BTreeSet<String>) -> bool {
        let now = self.clock.now();
        let mut overrides = self.lock();
        overrides.retain(|_, o| !o.is_expired(now));
        overrides
            .get(hostname)
            .is_some_and(|o| o.matches_any(observed_pins))
    }

    pub fn clear(&self, hostname: &str) {
        self.lock().remove(hostname);
    }

    pub fn clear_all(&self) {
        self.lock().clear();
    }

    /// Number of overrides currently held, expired or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TemporaryPinOverride>> {
        self.overrides.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
