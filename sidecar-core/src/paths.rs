/*!
Save file path helpers.

The custom store lives next to the base save under a derived name, and day
backups of either file carry a `Day<n>` marker before the extension:

```text
<dir>/StoreFile1.es3            base save
<dir>/StoreModdedFile1.sidecar  custom store
<dir>/StoreModdedFile1Day4.sidecar  custom store backup for day 4
```
*/

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

static BACKUP_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Day\d+").expect("Backup suffix pattern must compile"));

/// How a base save path maps to its custom store path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathRules {
    /// Substring of the base file name that identifies a base save
    pub base_marker: String,
    /// Replacement for `base_marker` in the custom store file name
    pub custom_marker: String,
    /// Extension of base save files, without the dot
    pub base_extension: String,
    /// Extension of custom store files, without the dot
    pub custom_extension: String,
}

impl Default for PathRules {
    fn default() -> Self {
        Self {
            base_marker: "StoreFile".to_string(),
            custom_marker: "StoreModdedFile".to_string(),
            base_extension: "es3".to_string(),
            custom_extension: "sidecar".to_string(),
        }
    }
}

impl PathRules {
    /// Custom store path paired with `base_path`
    pub fn to_custom_path(&self, base_path: &Path) -> PathBuf {
        let Some(file_name) = base_path.file_name().and_then(|n| n.to_str()) else {
            return base_path.with_extension(&self.custom_extension);
        };

        let renamed = if self.base_marker.is_empty() {
            file_name.to_string()
        } else {
            file_name.replace(&self.base_marker, &self.custom_marker)
        };
        let mut custom = base_path.with_file_name(renamed);

        let base_ext_matches = custom
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == self.base_extension);
        if base_ext_matches || custom.extension().is_none() {
            custom.set_extension(&self.custom_extension);
        }
        custom
    }

    /// Backup path for `path` on the given day: `Day<day>` goes before the extension
    pub fn to_backup_path(&self, path: &Path, day: impl std::fmt::Display) -> PathBuf {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = match path.extension() {
            Some(ext) => format!("{stem}Day{day}.{}", ext.to_string_lossy()),
            None => format!("{stem}Day{day}"),
        };
        path.with_file_name(file_name)
    }

    /// Strip every `Day<digits>` marker from the file name
    pub fn remove_backup_suffix(&self, path: &Path) -> PathBuf {
        match path.file_name().and_then(|n| n.to_str()) {
            Some(file_name) => {
                path.with_file_name(BACKUP_SUFFIX.replace_all(file_name, "").into_owned())
            }
            None => path.to_path_buf(),
        }
    }
}

/// Supplies the base save path and its custom store path
pub trait PathResolver: Send + Sync {
    /// The base save currently loaded by the host
    fn base_save_path(&self) -> PathBuf;

    /// The custom store paired with [`PathResolver::base_save_path`]
    fn custom_save_path(&self) -> PathBuf;

    /// Rules used to derive the custom path, when the resolver derives it
    fn path_rules(&self) -> Option<&PathRules> {
        None
    }
}

/// A fixed pair of paths
#[derive(Debug, Clone)]
pub struct FixedPaths {
    base: PathBuf,
    custom: PathBuf,
    rules: Option<PathRules>,
}

impl FixedPaths {
    pub fn new(base: impl Into<PathBuf>, custom: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            custom: custom.into(),
            rules: None,
        }
    }

    /// Derive the custom path from the base path with `rules`
    pub fn derived(base: impl Into<PathBuf>, rules: &PathRules) -> Self {
        let base = base.into();
        let custom = rules.to_custom_path(&base);
        Self {
            base,
            custom,
            rules: Some(rules.clone()),
        }
    }
}

impl PathResolver for FixedPaths {
    fn base_save_path(&self) -> PathBuf {
        self.base.clone()
    }

    fn custom_save_path(&self) -> PathBuf {
        self.custom.clone()
    }

    fn path_rules(&self) -> Option<&PathRules> {
        self.rules.as_ref()
    }
}

/// Save directory plus the slot file name the host currently has loaded
///
/// The host calls [`SlotPaths::select`] whenever the player switches save slots.
#[derive(Debug)]
pub struct SlotPaths {
    save_dir: PathBuf,
    current_file: RwLock<String>,
    rules: PathRules,
}

impl SlotPaths {
    pub fn new(save_dir: impl Into<PathBuf>, current_file: impl Into<String>, rules: PathRules) -> Self {
        Self {
            save_dir: save_dir.into(),
            current_file: RwLock::new(current_file.into()),
            rules,
        }
    }

    pub fn select(&self, file_name: impl Into<String>) {
        *self.current_file.write() = file_name.into();
    }

    pub fn current_file(&self) -> String {
        self.current_file.read().clone()
    }

    /// Full path of a file in the save directory
    pub fn save_path(&self, file_name: &str) -> PathBuf {
        self.save_dir.join(file_name)
    }

    pub fn rules(&self) -> &PathRules {
        &self.rules
    }
}

impl PathResolver for SlotPaths {
    fn base_save_path(&self) -> PathBuf {
        self.save_path(&self.current_file.read())
    }

    fn custom_save_path(&self) -> PathBuf {
        self.rules.to_custom_path(&self.base_save_path())
    }

    fn path_rules(&self) -> Option<&PathRules> {
        Some(&self.rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_custom_path() {
        let rules = PathRules::default();
        assert_eq!(
            rules.to_custom_path(Path::new("/saves/StoreFile3.es3")),
            PathBuf::from("/saves/StoreModdedFile3.sidecar")
        );
    }

    #[test]
    fn test_to_custom_path_only_touches_file_name() {
        let rules = PathRules::default();
        assert_eq!(
            rules.to_custom_path(Path::new("/StoreFile/StoreFile.es3")),
            PathBuf::from("/StoreFile/StoreModdedFile.sidecar")
        );
        // Unknown extensions are kept so the pair stays distinguishable
        assert_eq!(
            rules.to_custom_path(Path::new("/saves/StoreFile.bak")),
            PathBuf::from("/saves/StoreModdedFile.bak")
        );
    }

    #[test]
    fn test_backup_path_roundtrip() {
        let rules = PathRules::default();
        let custom = PathBuf::from("/saves/StoreModdedFile1.sidecar");

        let backup = rules.to_backup_path(&custom, 12);
        assert_eq!(backup, PathBuf::from("/saves/StoreModdedFile1Day12.sidecar"));
        assert_eq!(rules.remove_backup_suffix(&backup), custom);
    }

    #[test]
    fn test_backup_path_without_extension() {
        let rules = PathRules::default();
        assert_eq!(
            rules.to_backup_path(Path::new("/saves/store"), "7"),
            PathBuf::from("/saves/storeDay7")
        );
    }

    #[test]
    fn test_remove_backup_suffix_leaves_plain_paths() {
        let rules = PathRules::default();
        let plain = PathBuf::from("/saves/Daylight/StoreFile.es3");
        assert_eq!(rules.remove_backup_suffix(&plain), plain);
    }

    #[test]
    fn test_slot_paths_follow_selection() {
        let slots = SlotPaths::new("/saves", "StoreFile1.es3", PathRules::default());
        assert_eq!(slots.base_save_path(), PathBuf::from("/saves/StoreFile1.es3"));
        assert_eq!(
            slots.custom_save_path(),
            PathBuf::from("/saves/StoreModdedFile1.sidecar")
        );

        slots.select("StoreFile2.es3");
        assert_eq!(slots.current_file(), "StoreFile2.es3");
        assert_eq!(
            slots.custom_save_path(),
            PathBuf::from("/saves/StoreModdedFile2.sidecar")
        );
    }

    #[test]
    fn test_fixed_paths_derived() {
        let paths = FixedPaths::derived("/saves/StoreFile.es3", &PathRules::default());
        assert_eq!(
            paths.custom_save_path(),
            PathBuf::from("/saves/StoreModdedFile.sidecar")
        );
        assert_eq!(paths.path_rules(), Some(&PathRules::default()));

        let explicit = FixedPaths::new("/saves/a.es3", "/saves/b.sidecar");
        assert!(explicit.path_rules().is_none());
    }
}
