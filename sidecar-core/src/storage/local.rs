/*!
Local filesystem storage adapter implementation.
*/

use super::StorageAdapter;
use crate::{Result, SidecarError};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Local filesystem storage adapter
///
/// Writes go to a temporary file in the destination directory which is then
/// renamed over the target, so readers never observe a half-written store.
/// Missing parent directories are created.
///
/// # Example
/// ```rust
/// use sidecar_core::storage::{LocalFileStorage, StorageAdapter};
///
/// let dir = tempfile::tempdir()?;
/// let storage = LocalFileStorage::new();
/// let path = dir.path().join("saves/StoreModdedFile.sidecar");
/// storage.save(b"obfuscated bytes", &path)?;
/// assert_eq!(storage.load(&path)?, b"obfuscated bytes");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct LocalFileStorage;

impl LocalFileStorage {
    pub fn new() -> Self {
        Self
    }

    /// Ensure the parent directory exists, creating it if necessary
    fn ensure_parent_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    SidecarError::storage(format!(
                        "Failed to create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        Ok(())
    }
}

impl StorageAdapter for LocalFileStorage {
    fn save(&self, data: &[u8], path: &Path) -> Result<()> {
        self.ensure_parent_dir(path)?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = NamedTempFile::new_in(dir).map_err(|e| {
            SidecarError::storage(format!(
                "Failed to create temporary file in {}: {}",
                dir.display(),
                e
            ))
        })?;

        temp.write_all(data)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| {
                SidecarError::storage(format!(
                    "Failed to write store to {}: {}",
                    path.display(),
                    e
                ))
            })?;

        temp.persist(path).map_err(|e| {
            SidecarError::storage(format!(
                "Failed to replace store {}: {}",
                path.display(),
                e.error
            ))
        })?;

        Ok(())
    }

    fn load(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| {
            SidecarError::storage(format!(
                "Failed to read store from {}: {}",
                path.display(),
                e
            ))
        })
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn delete(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SidecarError::storage(format!(
                "Failed to delete store {}: {}",
                path.display(),
                e
            ))),
        }
    }
}
