/*!
Typed value cells.

A cell is one named storage location owned by an extension. Extensions hold a
[`SavedValue<T>`] handle; the registry and the persistence engine only see the
type-erased [`ErasedCell`] view of the same cell.
*/

use crate::{Result, SidecarError};
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::any::{type_name, Any};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Bound for every type that can live in a cell
///
/// The store is heterogeneous JSON, so values must round-trip through serde and
/// compare against their default to decide whether they are worth writing.
pub trait StoredValue: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static {}

impl<T> StoredValue for T where T: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static {}

/// Shared state behind a [`SavedValue`] handle
pub struct ValueCell<T> {
    key: String,
    default_value: T,
    value: RwLock<T>,
    persistent: AtomicBool,
}

impl<T: StoredValue> ValueCell<T> {
    pub(crate) fn new(key: String, default_value: T, persistent: bool) -> Self {
        Self {
            key,
            value: RwLock::new(default_value.clone()),
            default_value,
            persistent: AtomicBool::new(persistent),
        }
    }
}

/// Handle to a registered cell
///
/// Cloning the handle is cheap and every clone observes the same value.
///
/// # Example
/// ```rust
/// use sidecar_core::ValueRegistry;
///
/// let registry = ValueRegistry::new();
/// let gold = registry.register("gold", 0u32, false)?;
/// gold.set(42);
/// assert_eq!(registry.get_value::<u32>("gold"), 42);
/// # Ok::<(), sidecar_core::SidecarError>(())
/// ```
pub struct SavedValue<T> {
    cell: Arc<ValueCell<T>>,
}

impl<T> Clone for SavedValue<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: StoredValue> SavedValue<T> {
    pub(crate) fn from_cell(cell: Arc<ValueCell<T>>) -> Self {
        Self { cell }
    }

    /// The key this value was registered under
    pub fn key(&self) -> &str {
        &self.cell.key
    }

    /// A clone of the current value
    pub fn get(&self) -> T {
        self.cell.value.read().clone()
    }

    /// Read the current value without cloning it
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.cell.value.read())
    }

    /// Replace the current value
    pub fn set(&self, value: T) {
        *self.cell.value.write() = value;
    }

    /// Mutate the current value in place
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.cell.value.write());
    }

    /// Put the default back; the next save retracts the key from the store
    pub fn reset(&self) {
        self.set(self.cell.default_value.clone());
    }

    /// The value the cell was registered with
    pub fn default_value(&self) -> &T {
        &self.cell.default_value
    }

    /// Whether the current value equals the registered default
    pub fn is_default(&self) -> bool {
        *self.cell.value.read() == self.cell.default_value
    }

    pub fn is_persistent(&self) -> bool {
        self.cell.persistent.load(Ordering::Acquire)
    }

    /// Change whether the entry outlives its registration on a later load
    pub fn set_persistent(&self, persistent: bool) {
        self.cell.persistent.store(persistent, Ordering::Release);
    }

    /// Name of the value type, as used in type mismatch reports
    pub fn value_type(&self) -> &'static str {
        type_name::<T>()
    }
}

impl<T: StoredValue + fmt::Debug> fmt::Debug for SavedValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SavedValue")
            .field("key", &self.cell.key)
            .field("value", &*self.cell.value.read())
            .field("persistent", &self.is_persistent())
            .finish()
    }
}

/// Type-erased view of a cell used by the registry and the engine
///
/// Decoding is split from committing so a load can stage every entry, write the
/// pruned store back, and only then touch the cells.
pub(crate) trait ErasedCell: Send + Sync {
    fn key(&self) -> &str;

    fn type_name(&self) -> &'static str;

    fn is_persistent(&self) -> bool;

    fn is_default(&self) -> bool;

    /// Serialize the current value
    fn to_json(&self) -> Result<serde_json::Value>;

    /// Deserialize a stored value into this cell's type without assigning it
    fn decode(&self, value: &serde_json::Value) -> Result<Box<dyn Any + Send>>;

    /// Assign a value previously produced by [`ErasedCell::decode`]
    fn commit(&self, staged: Box<dyn Any + Send>);
}

impl<T: StoredValue> ErasedCell for ValueCell<T> {
    fn key(&self) -> &str {
        &self.key
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn is_persistent(&self) -> bool {
        self.persistent.load(Ordering::Acquire)
    }

    fn is_default(&self) -> bool {
        *self.value.read() == self.default_value
    }

    fn to_json(&self) -> Result<serde_json::Value> {
        serde_json::to_value(&*self.value.read()).map_err(SidecarError::Json)
    }

    fn decode(&self, value: &serde_json::Value) -> Result<Box<dyn Any + Send>> {
        let typed = T::deserialize(value).map_err(|e| SidecarError::TypeMismatch {
            key: self.key.clone(),
            expected: type_name::<T>(),
            reason: e.to_string(),
        })?;
        Ok(Box::new(typed))
    }

    fn commit(&self, staged: Box<dyn Any + Send>) {
        match staged.downcast::<T>() {
            Ok(value) => *self.value.write() = *value,
            Err(_) => tracing::error!(
                key = %self.key,
                expected = type_name::<T>(),
                "Staged value has the wrong type; cell left unchanged"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
    struct Upgrades {
        shelves: u8,
        names: Vec<String>,
    }

    fn handle<T: StoredValue>(key: &str, default: T, persistent: bool) -> SavedValue<T> {
        SavedValue::from_cell(Arc::new(ValueCell::new(key.to_string(), default, persistent)))
    }

    #[test]
    fn test_new_cell_starts_at_default() {
        let gold = handle("gold", 10u32, false);
        assert_eq!(gold.get(), 10);
        assert!(gold.is_default());
        assert_eq!(gold.key(), "gold");
        assert_eq!(gold.value_type(), "u32");
    }

    #[test]
    fn test_set_update_reset() {
        let gold = handle("gold", 0i64, false);
        gold.set(5);
        gold.update(|v| *v += 1);
        assert_eq!(gold.get(), 6);
        assert!(!gold.is_default());

        gold.reset();
        assert_eq!(gold.get(), 0);
        assert!(gold.is_default());
        assert_eq!(*gold.default_value(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let a = handle("names", Vec::<String>::new(), true);
        let b = a.clone();
        a.update(|v| v.push("north".to_string()));
        assert_eq!(b.with(|v| v.len()), 1);

        b.set_persistent(false);
        assert!(!a.is_persistent());
    }

    #[test]
    fn test_erased_roundtrip_through_json() {
        let cell = ValueCell::new("upgrades".to_string(), Upgrades::default(), false);
        let erased: &dyn ErasedCell = &cell;

        let staged = erased
            .decode(&json!({"shelves": 3, "names": ["a", "b"]}))
            .unwrap();
        assert!(erased.is_default());

        erased.commit(staged);
        assert!(!erased.is_default());
        assert_eq!(
            erased.to_json().unwrap(),
            json!({"shelves": 3, "names": ["a", "b"]})
        );
    }

    #[test]
    fn test_decode_type_mismatch() {
        let cell = ValueCell::new("gold".to_string(), 0u32, false);
        let erased: &dyn ErasedCell = &cell;

        let err = erased.decode(&json!("forty-two")).unwrap_err();
        match err {
            SidecarError::TypeMismatch { key, expected, .. } => {
                assert_eq!(key, "gold");
                assert_eq!(expected, "u32");
            }
            other => panic!("Expected TypeMismatch, got {other:?}"),
        }
        assert!(erased.is_default());
    }

    #[test]
    fn test_commit_ignores_foreign_type() {
        let cell = ValueCell::new("gold".to_string(), 7u32, false);
        let erased: &dyn ErasedCell = &cell;

        erased.commit(Box::new("not a number".to_string()));
        assert_eq!(erased.to_json().unwrap(), json!(7));
    }
}
