use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::certificate::{Certificate, CertificateDetails};
use crate::clock::{Clock, SystemClock};
use crate::config::TrustConfig;
use crate::crypto;
use crate::error::Error;
use crate::hostname::normalize_hostname;
use crate::overrides::TemporaryTrustRegistry;
use crate::pinning::PinStore;
use crate::store::SecureStore;
use crate::types::pinning::PinRecord;

/// Why a connection was allowed. Rejections are returned as [`Error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrustDecision {
    /// No record for this host. The caller decides whether to `trust_now`.
    FirstUse,
    /// The primary pin matched; expiry was extended.
    Matched,
    /// A backup pin matched and was promoted to primary.
    Rotated {
        previous_primary: String,
        new_primary: String,
    },
    /// No pin matched but a temporary override accepted the chain.
    /// The caller should `clear_temporary` once the connection is done.
    TemporarilyAllowed,
}

/// Decides whether a host's certificate chain is trusted and keeps the
/// pin records current.
pub struct TrustValidator {
    pins: PinStore,
    overrides: TemporaryTrustRegistry,
    clock: Arc<dyn Clock>,
    config: TrustConfig,
}

impl TrustValidator {
    pub fn new(store: Arc<dyn SecureStore>, config: TrustConfig) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), config)
    }

    pub fn with_clock(
        store: Arc<dyn SecureStore>,
        clock: Arc<dyn Clock>,
        config: TrustConfig,
    ) -> Self {
        Self {
            pins: PinStore::new(store, clock.clone(), config.clone()),
            overrides: TemporaryTrustRegistry::new(clock.clone(), config.override_ttl()),
            clock,
            config,
        }
    }

    /// Check `chain` for `hostname`.
    ///
    /// Non-X.509 entries are skipped. A malformed X.509 entry fails the whole
    /// call with [`Error::UnsupportedCertificateType`].
    pub fn validate(&self, hostname: &str, chain: &[Certificate]) -> Result<TrustDecision, Error> {
        let host = normalize_hostname(hostname)?;

        // Step 1: no record means first use
        let record = match self.pins.get(&host)? {
            Some(r) => r,
            None => {
                tracing::debug!(hostname = %host, "No pin record, trust on first use");
                return Ok(TrustDecision::FirstUse);
            }
        };

        // Step 2: pin every X.509 certificate in the chain
        let observed = observed_pins(chain)?;

        // Step 3: match against primary and backups
        let matched: Vec<&String> = observed.iter().filter(|p| record.accepts(p)).collect();
        if matched.is_empty() {
            if self.overrides.is_trusted(&host, &observed) {
                tracing::debug!(hostname = %host, "Pin mismatch accepted by temporary override");
                return Ok(TrustDecision::TemporarilyAllowed);
            }
            tracing::warn!(hostname = %host, observed = ?observed, "Certificate pin mismatch");
            return Err(Error::PinMismatch {
                hostname: host,
                record: Box::new(record),
                attempted_pins: observed.iter().cloned().collect(),
                certificate: leaf_details(chain),
            });
        }

        // Step 4: expiry
        let now = self.clock.now();
        if record.is_expired(now) {
            tracing::warn!(hostname = %host, expires_at = %record.expires_at, "Certificate pin expired");
            return Err(Error::PinExpired {
                hostname: host,
                record: Box::new(record),
                attempted_pins: observed.iter().cloned().collect(),
                certificate: leaf_details(chain),
            });
        }

        // Step 5: refresh, or promote whichever backup matched
        let expires_at = now + self.config.validity_window();
        if matched.iter().any(|p| **p == record.primary_pin) {
            let next = record.validated(&record.primary_pin, &observed, now, expires_at);
            self.save(&next)?;
            tracing::debug!(hostname = %host, "Pin refreshed");
            Ok(TrustDecision::Matched)
        } else {
            let new_primary = matched[0].clone();
            let next = record.validated(&new_primary, &observed, now, expires_at);
            self.save(&next)?;
            tracing::info!(
                hostname = %host,
                previous = %record.primary_pin,
                current = %new_primary,
                "Backup pin promoted to primary"
            );
            Ok(TrustDecision::Rotated {
                previous_primary: record.primary_pin,
                new_primary,
            })
        }
    }

    /// Persist trust in `certificate` for `hostname`, replacing any record.
    pub fn trust_now(
        &self,
        hostname: &str,
        certificate: &Certificate,
        backup_candidates: &[Certificate],
    ) -> Result<PinRecord, Error> {
        let host = normalize_hostname(hostname)?;
        let primary = crypto::fingerprint(certificate)?;
        let backups = observed_pins(backup_candidates)?;
        let now = self.clock.now();
        let record = PinRecord::new(
            &host,
            &primary,
            backups,
            now,
            now + self.config.validity_window(),
        );
        self.save(&record)?;
        tracing::info!(hostname = %host, pin = %primary, "Trust granted");
        Ok(record)
    }

    /// Merge extra backup pins into an existing record ahead of a planned
    /// key rotation. Returns `None` if the host has no record.
    pub fn add_backup_pins(
        &self,
        hostname: &str,
        pins: &[String],
    ) -> Result<Option<PinRecord>, Error> {
        let host = normalize_hostname(hostname)?;
        let Some(record) = self.pins.get(&host)? else {
            return Ok(None);
        };
        let mut next = record.clone();
        next.backup_pins.extend(
            pins.iter()
                .filter_map(|p| crypto::parse_pin_header(p))
                .filter(|p| *p != record.primary_pin),
        );
        if next != record {
            self.save(&next)?;
            tracing::info!(hostname = %host, backups = next.backup_pins.len(), "Backup pins added");
        }
        Ok(Some(next))
    }

    /// Forget the host entirely.
    pub fn revoke(&self, hostname: &str) -> Result<(), Error> {
        let host = normalize_hostname(hostname)?;
        self.pins.remove(&host)?;
        self.overrides.clear(&host);
        tracing::info!(hostname = %host, "Trust revoked");
        Ok(())
    }

    pub fn list_trusted(&self) -> Result<Vec<PinRecord>, Error> {
        self.pins.list()
    }

    /// Remove every pin record and temporary override.
    pub fn reset_all(&self) -> Result<(), Error> {
        self.pins.clear()?;
        self.overrides.clear_all();
        Ok(())
    }

    /// Let one reconnect through with any of `pins` despite a mismatch.
    pub fn allow_temporarily(&self, hostname: &str, pins: &[String]) -> Result<(), Error> {
        let host = normalize_hostname(hostname)?;
        self.overrides.allow(&host, pins.iter().cloned());
        Ok(())
    }

    pub fn clear_temporary(&self, hostname: &str) -> Result<(), Error> {
        let host = normalize_hostname(hostname)?;
        self.overrides.clear(&host);
        Ok(())
    }

    /// Details of the first X.509 certificate in `chain`, for a trust prompt.
    pub fn certificate_details(&self, chain: &[Certificate]) -> Result<CertificateDetails, Error> {
        let leaf = chain
            .iter()
            .find(|c| c.is_x509())
            .ok_or_else(|| Error::UnsupportedCertificateType("no X.509 certificate".to_string()))?;
        CertificateDetails::from_certificate(leaf)
    }

    pub fn pin_store(&self) -> &PinStore {
        &self.pins
    }

    fn save(&self, record: &PinRecord) -> Result<(), Error> {
        self.pins.put(record).map_err(|e| {
            tracing::error!(hostname = %record.hostname, error = %e, "Failed to save pin record");
            e
        })
    }
}

fn observed_pins(chain: &[Certificate]) -> Result<BTreeSet<String>, Error> {
    chain
        .iter()
        .filter(|c| c.is_x509())
        .map(crypto::fingerprint)
        .collect()
}

fn leaf_details(chain: &[Certificate]) -> Option<Box<CertificateDetails>> {
    chain
        .iter()
        .find(|c| c.is_x509())
        .and_then(|c| CertificateDetails::from_certificate(c).ok())
        .map(Box::new)
}
