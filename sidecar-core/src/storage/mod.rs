/*!
Storage adapters for the custom store file.

The engine only needs whole-file operations: read everything, replace
everything, check, delete and copy. Keeping them behind a trait lets the engine
logic stay independent of where the bytes end up.
*/

pub mod local;

use crate::Result;
use std::path::Path;

/// Whole-file storage abstraction
pub trait StorageAdapter: Send + Sync {
    /// Replace the file at `path` with `data`
    ///
    /// Implementations must not leave a partially written file behind: either
    /// the old contents or the new contents are visible afterwards.
    fn save(&self, data: &[u8], path: &Path) -> Result<()>;

    /// Read the whole file at `path`
    fn load(&self, path: &Path) -> Result<Vec<u8>>;

    /// Check if a file exists at `path`
    fn exists(&self, path: &Path) -> bool;

    /// Delete the file at `path`; deleting a missing file is not an error
    fn delete(&self, path: &Path) -> Result<()>;

    /// Copy `from` over `to`, replacing any existing file
    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let data = self.load(from)?;
        self.save(&data, to)
    }
}

pub use local::LocalFileStorage;
