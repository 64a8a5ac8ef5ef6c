use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use wasm_bindgen::JsValue;
use web_sys::{window, Storage};

use super::error::{ConsentError, Result};

/// Synchronous string key/value backend for the consent record.
pub trait ConsentStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
}

impl<T: ConsentStorage + ?Sized> ConsentStorage for Rc<T> {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        (**self).remove_item(key)
    }
}

fn js_error(e: JsValue) -> ConsentError {
    ConsentError::StorageUnavailable(e.as_string().unwrap_or_else(|| format!("{:?}", e)))
}

/// `window.localStorage`.
pub struct BrowserStorage {
    storage: Storage,
}

impl BrowserStorage {
    pub fn local() -> Result<Self> {
        let window = window()
            .ok_or_else(|| ConsentError::StorageUnavailable("no window object".to_string()))?;
        // Throws when storage is disabled (e.g. Safari private mode, blocked cookies)
        let storage = window
            .local_storage()
            .map_err(js_error)?
            .ok_or_else(|| ConsentError::StorageUnavailable("localStorage is not available".to_string()))?;
        Ok(Self { storage })
    }
}

impl ConsentStorage for BrowserStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.storage.get_item(key).map_err(js_error)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        // QuotaExceededError surfaces here
        self.storage.set_item(key, value).map_err(js_error)
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        self.storage.remove_item(key).map_err(js_error)
    }
}

/// In-process backend used by tests and as a fallback when localStorage is blocked.
#[derive(Default)]
pub struct MemoryStorage {
    items: RefCell<HashMap<String, String>>,
    fail_reads: Cell<bool>,
    fail_writes: Cell<bool>,
    mutations: Cell<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(key: &str, value: &str) -> Self {
        let storage = Self::default();
        storage.items.borrow_mut().insert(key.to_string(), value.to_string());
        storage
    }

    /// Make every subsequent read fail, as a sandboxed iframe would.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.set(fail);
    }

    /// Make every subsequent write fail, as a full quota would.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.borrow().contains_key(key)
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.items.borrow().get(key).cloned()
    }

    /// Number of successful `set_item`/`remove_item` calls so far.
    pub fn mutations(&self) -> usize {
        self.mutations.get()
    }
}

impl ConsentStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        if self.fail_reads.get() {
            return Err(ConsentError::StorageUnavailable("read refused".to_string()));
        }
        Ok(self.items.borrow().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.get() {
            return Err(ConsentError::StorageUnavailable("quota exceeded".to_string()));
        }
        self.items.borrow_mut().insert(key.to_string(), value.to_string());
        self.mutations.set(self.mutations.get() + 1);
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        if self.fail_writes.get() {
            return Err(ConsentError::StorageUnavailable("remove refused".to_string()));
        }
        self.items.borrow_mut().remove(key);
        self.mutations.set(self.mutations.get() + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_set_get_remove() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get_item("k").unwrap(), None);

        storage.set_item("k", "v").unwrap();
        assert_eq!(storage.get_item("k").unwrap(), Some("v".to_string()));

        storage.remove_item("k").unwrap();
        assert!(!storage.contains("k"));
        assert_eq!(storage.mutations(), 2);
    }

    #[test]
    fn failing_writes_leave_items_untouched() {
        let storage = MemoryStorage::with_item("k", "old");
        storage.set_fail_writes(true);

        let err = storage.set_item("k", "new").unwrap_err();
        assert!(matches!(err, ConsentError::StorageUnavailable(_)));
        assert_eq!(storage.raw("k"), Some("old".to_string()));
        assert_eq!(storage.mutations(), 0);
    }

    #[test]
    fn failing_reads_report_storage_unavailable() {
        let storage = MemoryStorage::with_item("k", "v");
        storage.set_fail_reads(true);
        assert!(matches!(
            storage.get_item("k"),
            Err(ConsentError::StorageUnavailable(_))
        ));
    }

    #[test]
    fn rc_wrapper_shares_the_same_items() {
        let shared = Rc::new(MemoryStorage::new());
        let handle: Box<dyn ConsentStorage> = Box::new(Rc::clone(&shared));
        handle.set_item("k", "v").unwrap();
        assert_eq!(shared.raw("k"), Some("v".to_string()));
    }
}
