use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::{debug, error, info, warn};

use super::clock::{Clock, SystemClock};
use super::error::{ConsentError, Result};
use super::record::{Category, ConsentChoice, ConsentRecord};
use super::storage::{BrowserStorage, ConsentStorage, MemoryStorage};
use crate::config::ConsentConfig;

/// Called with the new record after a save, or `None` once consent is cleared.
pub type ConsentListener = Rc<dyn Fn(Option<&ConsentRecord>)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Owns the visitor's consent record.
///
/// Every read goes back to storage and re-validates version and expiry, so a
/// record can never outlive its schema or its expiry period while the page is
/// open. Anything that cannot be proven valid reads as "no consent".
pub struct ConsentStore {
    config: ConsentConfig,
    storage: Box<dyn ConsentStorage>,
    clock: Box<dyn Clock>,
    current: RefCell<Option<ConsentRecord>>,
    listeners: RefCell<Vec<(ListenerId, ConsentListener)>>,
    next_listener: Cell<u64>,
}

impl ConsentStore {
    pub fn new(
        config: ConsentConfig,
        storage: impl ConsentStorage + 'static,
        clock: impl Clock + 'static,
    ) -> Self {
        Self {
            config,
            storage: Box::new(storage),
            clock: Box::new(clock),
            current: RefCell::new(None),
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(0),
        }
    }

    /// Store backed by `localStorage`, falling back to memory (consent then
    /// only lasts for this page view) when the browser refuses storage.
    pub fn for_browser(config: ConsentConfig) -> Self {
        match BrowserStorage::local() {
            Ok(storage) => Self::new(config, storage, SystemClock),
            Err(e) => {
                warn!("{} - consent will not persist across page loads", e);
                Self::new(config, MemoryStorage::new(), SystemClock)
            }
        }
    }

    pub fn config(&self) -> &ConsentConfig {
        &self.config
    }

    /// Read and validate the stored record, reporting why it was rejected.
    ///
    /// A version mismatch also deletes the stored value so stale data is never
    /// partially reused. Expired records are left in place.
    pub fn try_load(&self) -> Result<ConsentRecord> {
        let key = &self.config.storage_key;
        let raw = self.storage.get_item(key)?.ok_or(ConsentError::NotFound)?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;

        let found = value.get("version").and_then(|v| v.as_str());
        if found != Some(self.config.version.as_str()) {
            let found = found.map(str::to_string);
            if let Err(e) = self.storage.remove_item(key) {
                warn!("Failed to remove outdated consent record: {}", e);
            }
            return Err(ConsentError::VersionMismatch {
                found,
                expected: self.config.version.clone(),
            });
        }

        let record: ConsentRecord = serde_json::from_value(value)?;
        if !record.essential {
            return Err(ConsentError::MalformedRecord(
                "essential flag must be true".to_string(),
            ));
        }
        let expires_at = record.expires_at(self.config.expiry()?).ok_or_else(|| {
            ConsentError::MalformedRecord(format!(
                "timestamp {} is out of range",
                record.issued_at
            ))
        })?;
        if self.clock.now() >= expires_at {
            return Err(ConsentError::Expired { issued_at: record.issued_at });
        }
        Ok(record)
    }

    /// The validated record, or `None` when consent must be collected.
    pub fn load(&self) -> Option<ConsentRecord> {
        let loaded = match self.try_load() {
            Ok(record) => Some(record),
            Err(ConsentError::NotFound) => None,
            Err(e @ ConsentError::VersionMismatch { .. }) => {
                info!("{} - cleared old consent", e);
                None
            }
            Err(e) => {
                warn!("Failed to load cookie preferences: {}", e);
                None
            }
        };
        *self.current.borrow_mut() = loaded.clone();
        loaded
    }

    /// Persist a fresh record built from `choice`, replacing any previous one.
    ///
    /// On failure nothing changes in memory and no listener is notified.
    pub fn save(&self, choice: ConsentChoice) -> Result<ConsentRecord> {
        let record = ConsentRecord::new(self.config.version.clone(), self.clock.now(), choice);
        let json = serde_json::to_string(&record)
            .map_err(|e| ConsentError::Serialize(e.to_string()))?;

        if let Err(e) = self.storage.set_item(&self.config.storage_key, &json) {
            error!("Failed to save cookie preferences: {}", e);
            return Err(e);
        }

        *self.current.borrow_mut() = Some(record.clone());
        info!(
            "Saved cookie preferences (analytics: {}, marketing: {})",
            record.analytics, record.marketing
        );
        self.notify(Some(&record));
        Ok(record)
    }

    pub fn has_consent(&self) -> bool {
        self.load().is_some()
    }

    pub fn is_allowed(&self, category: Category) -> bool {
        self.load().map_or(false, |record| record.allows(category))
    }

    /// Unknown category names are never allowed.
    pub fn is_allowed_name(&self, category: &str) -> bool {
        match category.parse::<Category>() {
            Ok(category) => self.is_allowed(category),
            Err(e) => {
                debug!("{}", e);
                false
            }
        }
    }

    /// Last record seen by `load` or `save`, without touching storage.
    pub fn current(&self) -> Option<ConsentRecord> {
        self.current.borrow().clone()
    }

    /// Forget the stored decision so the banner shows again. Listeners are
    /// told consent is gone so gated integrations shut down.
    pub fn clear(&self) -> Result<()> {
        self.storage.remove_item(&self.config.storage_key)?;
        *self.current.borrow_mut() = None;
        info!("Cleared cookie consent");
        self.notify(None);
        Ok(())
    }

    /// Register a callback run after every successful `save` and `clear`.
    pub fn subscribe(&self, listener: impl Fn(Option<&ConsentRecord>) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, Rc::new(listener)));
        id
    }

    /// Returns false if `id` was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    fn notify(&self, record: Option<&ConsentRecord>) {
        // Snapshot so listeners can (un)subscribe while being notified
        let listeners: Vec<ConsentListener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in listeners {
            listener(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::clock::FixedClock;
    use chrono::{Duration, TimeZone, Utc};

    const KEY: &str = "prism-cookie-consent";

    fn store_with(storage: &Rc<MemoryStorage>) -> (ConsentStore, Rc<FixedClock>) {
        let clock = Rc::new(FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()));
        let store = ConsentStore::new(ConsentConfig::default(), Rc::clone(storage), Rc::clone(&clock));
        (store, clock)
    }

    #[test]
    fn save_then_load_returns_same_flags() {
        let storage = Rc::new(MemoryStorage::new());
        let (store, _) = store_with(&storage);

        for (analytics, marketing) in [(true, true), (true, false), (false, true), (false, false)] {
            store.save(ConsentChoice::custom(analytics, marketing)).unwrap();
            let record = store.load().unwrap();
            assert!(record.essential);
            assert_eq!(record.analytics, analytics);
            assert_eq!(record.marketing, marketing);
        }
    }

    #[test]
    fn malformed_json_reads_as_absent_and_is_kept() {
        let storage = Rc::new(MemoryStorage::with_item(KEY, "{not json"));
        let (store, _) = store_with(&storage);

        assert!(matches!(store.try_load(), Err(ConsentError::MalformedRecord(_))));
        assert!(store.load().is_none());
        assert!(storage.contains(KEY));
    }

    #[test]
    fn missing_version_counts_as_mismatch() {
        let storage = Rc::new(MemoryStorage::with_item(
            KEY,
            r#"{"timestamp":"2025-06-01T09:00:00Z","essential":true,"analytics":true,"marketing":true}"#,
        ));
        let (store, _) = store_with(&storage);

        assert_eq!(
            store.try_load(),
            Err(ConsentError::VersionMismatch { found: None, expected: "3.0.0".to_string() })
        );
        assert!(!storage.contains(KEY));
    }

    #[test]
    fn tampered_essential_flag_reads_as_absent() {
        let storage = Rc::new(MemoryStorage::with_item(
            KEY,
            r#"{"version":"3.0.0","timestamp":"2025-06-01T09:00:00Z","essential":false,"analytics":true,"marketing":true}"#,
        ));
        let (store, _) = store_with(&storage);

        assert!(store.load().is_none());
        assert!(!store.is_allowed(Category::Analytics));
    }

    #[test]
    fn expired_record_is_ignored_but_not_deleted() {
        let storage = Rc::new(MemoryStorage::new());
        let (store, clock) = store_with(&storage);
        store.save(ConsentChoice::accept_all()).unwrap();

        clock.advance(Duration::days(365));
        assert!(matches!(store.try_load(), Err(ConsentError::Expired { .. })));
        assert!(!store.has_consent());
        assert!(storage.contains(KEY));
    }

    #[test]
    fn read_failure_is_fail_closed() {
        let storage = Rc::new(MemoryStorage::new());
        let (store, _) = store_with(&storage);
        store.save(ConsentChoice::accept_all()).unwrap();

        storage.set_fail_reads(true);
        assert!(!store.has_consent());
        assert!(!store.is_allowed(Category::Essential));
        assert!(store.current().is_none());
    }

    #[test]
    fn failed_save_keeps_previous_view_and_skips_listeners() {
        let storage = Rc::new(MemoryStorage::new());
        let (store, _) = store_with(&storage);
        let previous = store.save(ConsentChoice::reject_all()).unwrap();

        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        store.subscribe(move |_| counter.set(counter.get() + 1));

        storage.set_fail_writes(true);
        let err = store.save(ConsentChoice::accept_all()).unwrap_err();
        assert!(matches!(err, ConsentError::StorageUnavailable(_)));
        assert_eq!(store.current(), Some(previous));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn listeners_receive_saved_record_until_unsubscribed() {
        let storage = Rc::new(MemoryStorage::new());
        let (store, _) = store_with(&storage);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let id = store.subscribe(move |record| sink.borrow_mut().push(record.cloned()));

        let saved = store.save(ConsentChoice::custom(true, false)).unwrap();
        assert_eq!(*seen.borrow(), vec![Some(saved)]);

        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));
        store.save(ConsentChoice::accept_all()).unwrap();
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn listener_may_unsubscribe_itself_during_notification() {
        let store = Rc::new(ConsentStore::new(
            ConsentConfig::default(),
            MemoryStorage::new(),
            FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()),
        ));
        let own_id: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));

        let weak = Rc::downgrade(&store);
        let slot = Rc::clone(&own_id);
        let id = store.subscribe(move |_| {
            if let (Some(store), Some(id)) = (weak.upgrade(), slot.get()) {
                store.unsubscribe(id);
            }
        });
        own_id.set(Some(id));

        store.save(ConsentChoice::accept_all()).unwrap();
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn clear_removes_record_and_view() {
        let storage = Rc::new(MemoryStorage::new());
        let (store, _) = store_with(&storage);
        store.save(ConsentChoice::accept_all()).unwrap();

        store.clear().unwrap();
        assert!(store.current().is_none());
        assert!(!storage.contains(KEY));
        assert!(!store.has_consent());
    }

    #[test]
    fn clear_tells_listeners_consent_is_gone() {
        let storage = Rc::new(MemoryStorage::new());
        let (store, _) = store_with(&storage);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        store.subscribe(move |record| sink.borrow_mut().push(record.is_some()));

        store.save(ConsentChoice::accept_all()).unwrap();
        store.clear().unwrap();
        assert_eq!(*seen.borrow(), vec![true, false]);
    }

    /// Timestamps near chrono's upper bound overflow when the expiry is added.
    #[test]
    fn far_future_timestamp_reads_as_absent() {
        let storage = Rc::new(MemoryStorage::with_item(
            KEY,
            r#"{"version":"3.0.0","timestamp":"+262142-12-31T00:00:00Z","essential":true,"analytics":true,"marketing":true}"#,
        ));
        let (store, _) = store_with(&storage);

        assert!(matches!(store.try_load(), Err(ConsentError::MalformedRecord(_))));
        assert!(store.load().is_none());
        assert!(!store.has_consent());
        assert!(!store.is_allowed(Category::Analytics));
    }

    #[test]
    fn out_of_range_expiry_config_reads_as_absent() {
        let config = ConsentConfig { expiry_days: i64::MAX, ..ConsentConfig::default() };
        let store = ConsentStore::new(
            config,
            MemoryStorage::new(),
            FixedClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()),
        );
        store.save(ConsentChoice::accept_all()).unwrap();

        assert!(matches!(store.try_load(), Err(ConsentError::InvalidConfig(_))));
        assert!(!store.has_consent());
    }

    #[test]
    fn unknown_category_names_are_denied() {
        let storage = Rc::new(MemoryStorage::new());
        let (store, _) = store_with(&storage);
        store.save(ConsentChoice::accept_all()).unwrap();

        assert!(store.is_allowed_name("analytics"));
        assert!(!store.is_allowed_name("preferences"));
        assert!(!store.is_allowed_name(""));
    }
}
