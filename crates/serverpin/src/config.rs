use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Default pin validity: 90 days.
pub const DEFAULT_VALIDITY_WINDOW_SECS: i64 = 90 * 24 * 60 * 60;
/// Default lifetime of a temporary override: 15 minutes.
pub const DEFAULT_OVERRIDE_TTL_SECS: i64 = 15 * 60;
/// Key prefix for pin records in the secure store.
pub const DEFAULT_KEY_PREFIX: &str = "cert_pin_";

/// Configuration for the trust validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// How long a pin stays valid after its last successful validation (default: 90 days)
    pub validity_window_secs: i64,
    /// Lifetime of a one-shot "proceed anyway" override (default: 15 minutes)
    pub override_ttl_secs: i64,
    /// Store key prefix; the normalized hostname is appended
    pub key_prefix: String,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            validity_window_secs: DEFAULT_VALIDITY_WINDOW_SECS,
            override_ttl_secs: DEFAULT_OVERRIDE_TTL_SECS,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl TrustConfig {
    pub fn validity_window(&self) -> Duration {
        Duration::seconds(self.validity_window_secs.max(0))
    }

    pub fn override_ttl(&self) -> Duration {
        Duration::seconds(self.override_ttl_secs.max(0))
    }
}
