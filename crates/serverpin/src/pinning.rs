use std::sync::Arc;

use crate::clock::Clock;
use crate::codec::{self, ParseOutcome};
use crate::config::TrustConfig;
use crate::error::Error;
use crate::hostname::normalize_hostname;
use crate::store::SecureStore;
use crate::types::pinning::PinRecord;

/// Pin records keyed by hostname, persisted through a [`SecureStore`].
///
/// Malformed stored values read as "no record". Store I/O errors are
/// returned as-is.
pub struct PinStore {
    store: Arc<dyn SecureStore>,
    clock: Arc<dyn Clock>,
    config: TrustConfig,
}

impl PinStore {
    pub fn new(store: Arc<dyn SecureStore>, clock: Arc<dyn Clock>, config: TrustConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Look up the record for `hostname`, migrating a legacy value in place.
    pub fn get(&self, hostname: &str) -> Result<Option<PinRecord>, Error> {
        let host = normalize_hostname(hostname)?;
        let key = self.key_for(&host);
        match self.store.get_string(&key)? {
            Some(raw) => self.decode_entry(&host, &key, &raw),
            None => Ok(None),
        }
    }

    /// Write `record`, replacing any previous record for its hostname.
    ///
    /// The record's hostname must already be in normalized form, so that
    /// reading it back yields an identical record.
    pub fn put(&self, record: &PinRecord) -> Result<(), Error> {
        let host = normalize_hostname(&record.hostname)?;
        if host != record.hostname {
            return Err(Error::InvalidHostname(record.hostname.clone()));
        }
        let value = codec::encode(record)?;
        self.store.put_string(&self.key_for(&host), &value)
    }

    pub fn remove(&self, hostname: &str) -> Result<(), Error> {
        let host = normalize_hostname(hostname)?;
        self.store.remove_key(&self.key_for(&host))
    }

    /// All stored records, sorted by hostname. Legacy entries are migrated.
    pub fn list(&self) -> Result<Vec<PinRecord>, Error> {
        let entries = self
            .store
            .list_entries_with_prefix(&self.config.key_prefix)?;
        let mut records = Vec::with_capacity(entries.len());
        for (key, raw) in entries {
            let Some(host) = key.strip_prefix(&self.config.key_prefix) else {
                continue;
            };
            // Keys not in normalized form are unreachable through `get`.
            if normalize_hostname(host).ok().as_deref() != Some(host) {
                tracing::warn!(key = %key, "Skipping pin record with non-canonical key");
                continue;
            }
            if let Some(record) = self.decode_entry(host, &key, &raw)? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        Ok(records)
    }

    pub fn clear(&self) -> Result<(), Error> {
        let entries = self
            .store
            .list_entries_with_prefix(&self.config.key_prefix)?;
        for key in entries.keys() {
            self.store.remove_key(key)?;
        }
        tracing::info!(count = entries.len(), "Cleared all pin records");
        Ok(())
    }

    fn key_for(&self, host: &str) -> String {
        format!("{}{}", self.config.key_prefix, host)
    }

    fn decode_entry(&self, host: &str, key: &str, raw: &str) -> Result<Option<PinRecord>, Error> {
        match codec::decode(host, raw) {
            ParseOutcome::StructuredRecord(record) => Ok(Some(record)),
            ParseOutcome::LegacyPin(pin) => {
                let now = self.clock.now();
                let record = PinRecord::new(
                    host,
                    &pin,
                    Vec::new(),
                    now,
                    now + self.config.validity_window(),
                );
                self.store.put_string(key, &codec::encode(&record)?)?;
                tracing::info!(hostname = %host, "Migrated legacy pin record");
                Ok(Some(record))
            }
            ParseOutcome::Malformed => {
                tracing::warn!(hostname = %host, "Ignoring malformed pin record");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn setup() -> (Arc<MemoryStore>, Arc<ManualClock>, PinStore) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap(),
        ));
        let pins = PinStore::new(store.clone(), clock.clone(), TrustConfig::default());
        (store, clock, pins)
    }

    fn make_record(host: &str, primary: &str, backups: &[&str], clock: &ManualClock) -> PinRecord {
        let now = clock.now();
        PinRecord::new(
            host,
            primary,
            backups.iter().map(|s| s.to_string()),
            now,
            now + Duration::days(90),
        )
    }

    #[test]
    fn test_put_get_roundtrip() {
        let (_, clock, pins) = setup();
        for backups in [&[][..], &["B"][..], &["B", "C"][..]] {
            let record = make_record("media.example.com", "A", backups, &clock);
            pins.put(&record).unwrap();
            assert_eq!(pins.get("media.example.com").unwrap(), Some(record));
        }
    }

    #[test]
    fn test_get_missing() {
        let (_, _, pins) = setup();
        assert_eq!(pins.get("nowhere.example.com").unwrap(), None);
    }

    #[test]
    fn test_hostname_is_normalized() {
        let (store, clock, pins) = setup();
        let record = make_record("media.example.com", "A", &["B"], &clock);
        pins.put(&record).unwrap();
        assert!(store
            .get_string("cert_pin_media.example.com")
            .unwrap()
            .is_some());
        assert_eq!(pins.get("MEDIA.example.com:8920").unwrap(), Some(record));
    }

    #[test]
    fn test_put_rejects_non_canonical_hostname() {
        let (store, clock, pins) = setup();
        let record = make_record("Media.Example.com", "A", &[], &clock);
        assert!(matches!(
            pins.put(&record),
            Err(Error::InvalidHostname(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_list_skips_non_canonical_keys() {
        let (store, clock, pins) = setup();
        store
            .put_string("cert_pin_Media.Example.com", "bGVnYWN5")
            .unwrap();
        pins.put(&make_record("a.example.com", "A", &[], &clock))
            .unwrap();

        let records = pins.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].hostname, "a.example.com");
        // Not migrated in place.
        assert_eq!(
            store
                .get_string("cert_pin_Media.Example.com")
                .unwrap()
                .as_deref(),
            Some("bGVnYWN5")
        );
    }

    #[test]
    fn test_legacy_migration() {
        let (store, clock, pins) = setup();
        store.put_string("cert_pin_host", "abc123").unwrap();

        let record = pins.get("host").unwrap().unwrap();
        assert_eq!(record.primary_pin, "abc123");
        assert!(record.backup_pins.is_empty());
        assert_eq!(record.first_seen_at, clock.now());
        assert_eq!(record.last_validated_at, clock.now());
        assert_eq!(record.expires_at, clock.now() + Duration::days(90));

        let raw = store.get_string("cert_pin_host").unwrap().unwrap();
        assert!(raw.starts_with('{'));
        assert!(raw.contains("\"pin\":\"abc123\""));

        // Second read sees the structured form and does not re-migrate.
        clock.advance(Duration::days(1));
        let again = pins.get("host").unwrap().unwrap();
        assert_eq!(again, record);
    }

    #[test]
    fn test_malformed_is_absent() {
        let (store, _, pins) = setup();
        store
            .put_string("cert_pin_broken.example.com", "{\"v\":1,\"pin\":")
            .unwrap();
        assert_eq!(pins.get("broken.example.com").unwrap(), None);
        assert!(pins.list().unwrap().is_empty());
        // Left untouched for inspection.
        assert!(store
            .get_string("cert_pin_broken.example.com")
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_list_sorted_and_migrates() {
        let (store, clock, pins) = setup();
        pins.put(&make_record("zeta.example.com", "Z", &[], &clock))
            .unwrap();
        pins.put(&make_record("alpha.example.com", "A", &["B"], &clock))
            .unwrap();
        store.put_string("cert_pin_legacy.example.com", "bGVnYWN5").unwrap();
        store.put_string("unrelated", "value").unwrap();

        let records = pins.list().unwrap();
        let hosts: Vec<&str> = records.iter().map(|r| r.hostname.as_str()).collect();
        assert_eq!(
            hosts,
            vec!["alpha.example.com", "legacy.example.com", "zeta.example.com"]
        );
        let raw = store
            .get_string("cert_pin_legacy.example.com")
            .unwrap()
            .unwrap();
        assert!(raw.starts_with('{'));
    }

    #[test]
    fn test_remove_and_clear_idempotent() {
        let (store, clock, pins) = setup();
        pins.remove("absent.example.com").unwrap();

        pins.put(&make_record("a.example.com", "A", &[], &clock))
            .unwrap();
        pins.put(&make_record("b.example.com", "B", &[], &clock))
            .unwrap();
        store.put_string("other_setting", "keep").unwrap();

        pins.remove("a.example.com").unwrap();
        pins.remove("a.example.com").unwrap();
        assert_eq!(pins.get("a.example.com").unwrap(), None);

        pins.clear().unwrap();
        pins.clear().unwrap();
        assert!(pins.list().unwrap().is_empty());
        assert_eq!(store.len(), 1);
    }

    struct FailingStore {
        reads: AtomicUsize,
    }

    impl SecureStore for FailingStore {
        fn get_string(&self, _key: &str) -> Result<Option<String>, Error> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Err(Error::Storage("keystore locked".to_string()))
        }
        fn put_string(&self, _key: &str, _value: &str) -> Result<(), Error> {
            Err(Error::Storage("keystore locked".to_string()))
        }
        fn remove_key(&self, _key: &str) -> Result<(), Error> {
            Err(Error::Storage("keystore locked".to_string()))
        }
        fn list_entries_with_prefix(&self, _prefix: &str) -> Result<HashMap<String, String>, Error> {
            Err(Error::Storage("keystore locked".to_string()))
        }
    }

    #[test]
    fn test_storage_failures_propagate() {
        let store = Arc::new(FailingStore {
            reads: AtomicUsize::new(0),
        });
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let pins = PinStore::new(store.clone(), clock.clone(), TrustConfig::default());

        assert!(matches!(pins.get("a.example.com"), Err(Error::Storage(_))));
        assert!(matches!(pins.remove("a.example.com"), Err(Error::Storage(_))));
        assert!(matches!(pins.list(), Err(Error::Storage(_))));
        assert!(matches!(pins.clear(), Err(Error::Storage(_))));
        let record = make_record("a.example.com", "A", &[], &clock);
        assert!(matches!(pins.put(&record), Err(Error::Storage(_))));
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
    }
}
