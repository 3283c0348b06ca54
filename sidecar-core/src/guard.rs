/*!
Mutual exclusion around the custom store file.

Every save, load and backup copy holds the lock for the store path it touches.
Locks are process-wide and keyed by path, so two engines pointed at the same
file still exclude each other. There is no fairness guarantee.
*/

use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Live locks by normalized store path; entries no `StoreLock` refers to are
/// dropped on the next lookup
static STORE_LOCKS: Lazy<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Process-wide lock for one store file
///
/// # Example
/// ```rust
/// use sidecar_core::guard::StoreLock;
///
/// let store = StoreLock::for_path("/tmp/StoreModdedFile.sidecar");
/// let _held = store.lock();
/// // read-modify-write the store file here
/// ```
#[derive(Clone)]
pub struct StoreLock {
    path: PathBuf,
    mutex: Arc<Mutex<()>>,
}

impl StoreLock {
    /// Look up (or create) the lock for `path`
    pub fn for_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let key = lock_key(&path);
        let mut locks = STORE_LOCKS.lock();
        locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        let mutex = locks.entry(key).or_default().clone();
        Self { path, mutex }
    }

    /// Block until the store is free
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.mutex.lock()
    }

    /// Take the store only if nobody holds it
    pub fn try_lock(&self) -> Option<MutexGuard<'_, ()>> {
        self.mutex.try_lock()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for StoreLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreLock")
            .field("path", &self.path)
            .field("locked", &self.mutex.is_locked())
            .finish()
    }
}

/// Absolute, lexically normalized form of `path`
///
/// The key must not depend on which directories exist yet: the first save may
/// create the store's parent directory. Symlinks are not resolved.
fn lock_key(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut key = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !key.pop() {
                    key.push(component);
                }
            }
            other => key.push(other),
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageAdapter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_same_path_is_exclusive() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("exclusive.sidecar");
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let path = path.clone();
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                std::thread::spawn(move || {
                    let store = StoreLock::for_path(&path);
                    let _held = store.lock();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_equivalent_paths_share_a_lock() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::create_dir(temp_dir.path().join("sub")).unwrap();

        let direct = StoreLock::for_path(temp_dir.path().join("store.sidecar"));
        let dotted = StoreLock::for_path(temp_dir.path().join("sub/../store.sidecar"));

        let _held = direct.lock();
        assert!(dotted.try_lock().is_none());
    }

    #[test]
    fn test_different_paths_do_not_block() {
        let temp_dir = TempDir::new().unwrap();
        let a = StoreLock::for_path(temp_dir.path().join("a.sidecar"));
        let b = StoreLock::for_path(temp_dir.path().join("b.sidecar"));

        let _held_a = a.lock();
        assert!(b.try_lock().is_some());
    }

    #[test]
    fn test_missing_parent_does_not_split_the_lock() {
        // Relative path whose directory appears only after the first lookup
        let temp_dir = TempDir::new_in(".").unwrap();
        let path = temp_dir.path().join("slot1/store.sidecar");
        assert!(path.is_relative());

        let before = StoreLock::for_path(&path);
        let _held = before.lock();
        crate::storage::LocalFileStorage::new()
            .save(b"store", &path)
            .unwrap();

        let after = StoreLock::for_path(&path);
        assert!(after.try_lock().is_none());

        let dotted = StoreLock::for_path(temp_dir.path().join("slot1/../slot1/./store.sidecar"));
        assert!(dotted.try_lock().is_none());
    }

    #[test]
    fn test_unused_locks_are_pruned() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pruned.sidecar");

        drop(StoreLock::for_path(&path));
        let _other = StoreLock::for_path(temp_dir.path().join("other.sidecar"));
        assert!(!STORE_LOCKS.lock().contains_key(&lock_key(&path)));
    }

    #[test]
    fn test_lock_released_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        let store = StoreLock::for_path(temp_dir.path().join("reuse.sidecar"));

        drop(store.lock());
        assert!(store.try_lock().is_some());
    }
}
