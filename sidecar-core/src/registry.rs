/*!
Process-wide registry of value cells.

Extensions register their cells at start-up and keep them for the lifetime of
the process. Entries are never removed; only the values inside change. The
registry is passed to the engine explicitly so tests can build isolated ones.
*/

use crate::cell::{ErasedCell, SavedValue, StoredValue, ValueCell};
use crate::record::FINGERPRINT_KEY;
use crate::{Result, SidecarError};
use parking_lot::RwLock;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Both views of one registered cell
///
/// `typed` is the same allocation as `erased`, kept as `Any` so that typed
/// lookups can recover the concrete `ValueCell<T>`.
#[derive(Clone)]
struct RegistryEntry {
    erased: Arc<dyn ErasedCell>,
    typed: Arc<dyn Any + Send + Sync>,
}

/// Mapping from key to value cell
#[derive(Default)]
pub struct ValueRegistry {
    cells: RwLock<BTreeMap<String, RegistryEntry>>,
}

impl ValueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new cell whose value starts at `default_value`
    ///
    /// # Errors
    /// * `SidecarError::DuplicateKey` - If the key is already registered or is
    ///   the key reserved for the base save fingerprint. The existing
    ///   registration is left untouched.
    pub fn register<T: StoredValue>(
        &self,
        key: impl Into<String>,
        default_value: T,
        persistent: bool,
    ) -> Result<SavedValue<T>> {
        let key = key.into();
        if key == FINGERPRINT_KEY {
            return Err(SidecarError::DuplicateKey { key });
        }

        let mut cells = self.cells.write();
        if cells.contains_key(&key) {
            return Err(SidecarError::DuplicateKey { key });
        }

        let cell = Arc::new(ValueCell::new(key.clone(), default_value, persistent));
        cells.insert(
            key.clone(),
            RegistryEntry {
                erased: cell.clone(),
                typed: cell.clone(),
            },
        );
        tracing::debug!(key = %key, persistent, "Registered saved value");

        Ok(SavedValue::from_cell(cell))
    }

    /// Typed lookup
    ///
    /// Returns `None` when the key is unregistered or was registered with a
    /// different type.
    pub fn get_cell<T: StoredValue>(&self, key: &str) -> Option<SavedValue<T>> {
        let typed = self.cells.read().get(key)?.typed.clone();
        typed.downcast::<ValueCell<T>>().ok().map(SavedValue::from_cell)
    }

    /// The current value for `key`, or `T::default()` when there is no matching cell
    pub fn get_value<T: StoredValue + Default>(&self, key: &str) -> T {
        self.get_cell::<T>(key)
            .map(|cell| cell.get())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cells.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.cells.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.read().is_empty()
    }

    /// Registered keys in sorted order
    pub fn keys(&self) -> Vec<String> {
        self.cells.read().keys().cloned().collect()
    }

    /// Type-erased cells, cloned out so callers do not hold the registry lock
    pub(crate) fn erased_cells(&self) -> Vec<Arc<dyn ErasedCell>> {
        self.cells
            .read()
            .values()
            .map(|entry| entry.erased.clone())
            .collect()
    }

    pub(crate) fn erased(&self, key: &str) -> Option<Arc<dyn ErasedCell>> {
        self.cells.read().get(key).map(|entry| entry.erased.clone())
    }
}

impl std::fmt::Debug for ValueRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = ValueRegistry::new();
        let gold = registry.register("gold", 0u32, false).unwrap();
        gold.set(42);

        let again = registry.get_cell::<u32>("gold").unwrap();
        assert_eq!(again.get(), 42);
        assert_eq!(registry.get_value::<u32>("gold"), 42);
        assert!(registry.contains("gold"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let registry = ValueRegistry::new();
        let first = registry.register("gold", 5u32, true).unwrap();

        let err = registry.register("gold", 9u32, false).unwrap_err();
        assert!(matches!(err, SidecarError::DuplicateKey { ref key } if key == "gold"));

        // Different type, same key: still a duplicate
        assert!(registry.register("gold", "x".to_string(), false).is_err());

        let current = registry.get_cell::<u32>("gold").unwrap();
        assert_eq!(*current.default_value(), 5);
        assert!(current.is_persistent());
        first.set(6);
        assert_eq!(current.get(), 6);
    }

    #[test]
    fn test_reserved_key_is_rejected() {
        let registry = ValueRegistry::new();
        let err = registry
            .register(FINGERPRINT_KEY, String::new(), true)
            .unwrap_err();
        assert!(matches!(err, SidecarError::DuplicateKey { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_missing_or_mistyped_lookup_is_none() {
        let registry = ValueRegistry::new();
        registry.register("gold", 3u32, false).unwrap();

        assert!(registry.get_cell::<u32>("silver").is_none());
        assert!(registry.get_cell::<String>("gold").is_none());
        assert!(registry.get_cell::<i64>("gold").is_none());
    }

    #[test]
    fn test_get_value_defaults_when_absent() {
        let registry = ValueRegistry::new();
        registry.register("label", "shop".to_string(), false).unwrap();

        assert_eq!(registry.get_value::<u32>("gold"), 0);
        assert_eq!(registry.get_value::<u32>("label"), 0);
        assert_eq!(registry.get_value::<String>("label"), "shop");
        assert_eq!(registry.get_value::<Vec<u8>>("missing"), Vec::<u8>::new());
    }

    #[test]
    fn test_keys_are_sorted() {
        let registry = ValueRegistry::new();
        registry.register("b", 1u8, false).unwrap();
        registry.register("a", 1u8, false).unwrap();
        registry.register("c", 1u8, false).unwrap();

        assert_eq!(registry.keys(), vec!["a", "b", "c"]);
        assert_eq!(registry.erased_cells().len(), 3);
        assert_eq!(registry.erased("a").unwrap().type_name(), "u8");
    }

    #[test]
    fn test_concurrent_registration_has_one_winner() {
        let registry = Arc::new(ValueRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.register("shared", i as u32, false).is_ok())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(registry.len(), 1);
    }
}
