/*!
Persistence engine that orchestrates save and load of the custom store.

This module contains the merge logic between the in-memory registry and the
on-disk record, the base save fingerprint check, and the locking that keeps
saves and loads of one store file from overlapping.
*/

use crate::cell::ErasedCell;
use crate::codec::{Obfuscator, StoreCodec, XorObfuscator};
use crate::config::{EngineConfig, MalformedStorePolicy};
use crate::events::SaveEvents;
use crate::fingerprint::{FingerprintValidator, SaveDecryptor};
use crate::guard::StoreLock;
use crate::paths::{PathResolver, PathRules};
use crate::record::{StoreEntry, StoreRecord};
use crate::registry::ValueRegistry;
use crate::storage::{LocalFileStorage, StorageAdapter};
use crate::{Result, SidecarError};
use std::any::Any;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[cfg(feature = "metrics")]
use crate::observability::{MetricsTimer, SidecarMetrics};

/// Summary of a completed save
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SaveReport {
    /// Fingerprint of the base save the store was written against
    pub fingerprint: String,
    /// Keys written with their current value
    pub written: Vec<String>,
    /// Keys removed because their cell was back at its default
    pub retracted: Vec<String>,
    /// Keys on disk that no registered cell claims, kept untouched
    pub retained: Vec<String>,
    /// Keys whose value failed to serialize; their previous entry is kept
    pub skipped: Vec<String>,
}

/// Summary of a load that reconciled the store into the registry
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadReport {
    /// Keys whose stored value was assigned to their cell
    pub applied: Vec<String>,
    /// Unclaimed, non-persistent keys dropped from the store
    pub pruned: Vec<String>,
    /// Unclaimed, persistent keys kept in the store
    pub retained: Vec<String>,
    /// Keys whose stored value did not fit the registered type
    pub type_mismatches: Vec<String>,
}

/// Why a load threw the store file away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// The store was written against a different base save
    Stale,
    /// The store file did not decode
    Malformed,
    /// The base save could not be fingerprinted, so the store cannot be trusted
    BaseSaveUnavailable,
}

/// Result of [`PersistenceEngine::load`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No store file existed
    Fresh,
    /// The store file was deleted without touching any cell
    Discarded(DiscardReason),
    /// The store matched the base save and was reconciled into the registry
    Reconciled(LoadReport),
}

impl LoadOutcome {
    pub fn report(&self) -> Option<&LoadReport> {
        match self {
            LoadOutcome::Reconciled(report) => Some(report),
            _ => None,
        }
    }

    pub fn is_discarded(&self) -> bool {
        matches!(self, LoadOutcome::Discarded(_))
    }
}

/// Main engine for saving and loading the custom store
///
/// The engine is `Sync`; share it behind an `Arc` and call [`save`](Self::save)
/// and [`load`](Self::load) from whichever thread the host uses. Both take the
/// process-wide lock for the custom store path, so at most one of them touches
/// the file at a time.
///
/// # Example
/// ```rust
/// use sidecar_core::{create_default_engine, FixedPaths, LoadOutcome, ValueRegistry};
/// use std::sync::Arc;
///
/// let dir = tempfile::tempdir()?;
/// let base = dir.path().join("StoreFile.es3");
/// std::fs::write(&base, b"host save")?;
///
/// let registry = Arc::new(ValueRegistry::new());
/// let gold = registry.register("gold", 0u32, false)?;
/// let engine = create_default_engine(
///     Arc::clone(&registry),
///     Arc::new(FixedPaths::new(&base, dir.path().join("StoreModdedFile.sidecar"))),
/// );
///
/// gold.set(42);
/// engine.save()?;
///
/// gold.set(0);
/// assert!(matches!(engine.load()?, LoadOutcome::Reconciled(_)));
/// assert_eq!(gold.get(), 42);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct PersistenceEngine<S, O>
where
    S: StorageAdapter,
    O: Obfuscator,
{
    registry: Arc<ValueRegistry>,
    storage: S,
    codec: StoreCodec<O>,
    validator: FingerprintValidator,
    paths: Arc<dyn PathResolver>,
    rules: PathRules,
    events: Arc<SaveEvents>,
    malformed_policy: MalformedStorePolicy,
}

impl<S, O> PersistenceEngine<S, O>
where
    S: StorageAdapter,
    O: Obfuscator,
{
    /// Create a new engine
    ///
    /// # Arguments
    /// * `registry` - The cells to persist
    /// * `storage` - Adapter used for every store file access
    /// * `obfuscator` - Transform applied to the encoded store
    /// * `validator` - Fingerprints the base save
    /// * `paths` - Supplies the base save and custom store paths
    pub fn new(
        registry: Arc<ValueRegistry>,
        storage: S,
        obfuscator: O,
        validator: FingerprintValidator,
        paths: Arc<dyn PathResolver>,
    ) -> Self {
        Self {
            registry,
            storage,
            codec: StoreCodec::new(obfuscator),
            validator,
            paths,
            rules: PathRules::default(),
            events: Arc::new(SaveEvents::new()),
            malformed_policy: MalformedStorePolicy::default(),
        }
    }

    /// Share an existing set of lifecycle events
    pub fn with_events(mut self, events: Arc<SaveEvents>) -> Self {
        self.events = events;
        self
    }

    pub fn with_malformed_policy(mut self, policy: MalformedStorePolicy) -> Self {
        self.malformed_policy = policy;
        self
    }

    /// Path rules for day backups when the resolver does not carry its own
    pub fn with_path_rules(mut self, rules: PathRules) -> Self {
        self.rules = rules;
        self
    }

    /// The resolver's rules, so backups are named like the live store
    fn path_rules(&self) -> &PathRules {
        self.paths.path_rules().unwrap_or(&self.rules)
    }

    pub fn registry(&self) -> &Arc<ValueRegistry> {
        &self.registry
    }

    pub fn events(&self) -> &Arc<SaveEvents> {
        &self.events
    }

    /// Custom store path for the base save currently loaded
    pub fn store_path(&self) -> PathBuf {
        self.paths.custom_save_path()
    }

    /// Write every registered value to the custom store
    ///
    /// This method:
    /// 1. Fires the `saving` event (callback failures are logged, not fatal)
    /// 2. Fingerprints the current base save
    /// 3. Reads the existing store, or starts from an empty record
    /// 4. Retracts keys whose cell is at its default and upserts the rest
    /// 5. Leaves unclaimed entries untouched
    /// 6. Atomically replaces the store file
    ///
    /// # Errors
    /// * `SidecarError::BaseSaveUnavailable` - The base save cannot be fingerprinted;
    ///   the store file is not modified
    /// * `SidecarError::MalformedStore` - The existing store does not decode; it is
    ///   not overwritten
    /// * `SidecarError::Storage` - Reading or writing the store failed
    pub fn save(&self) -> Result<SaveReport> {
        #[cfg(feature = "metrics")]
        let timer = MetricsTimer::start_save();

        let result = self.save_locked();
        if let Err(e) = &result {
            error!(error = %e, "Saving custom values failed");
        }

        #[cfg(feature = "metrics")]
        timer.finish_result(&result);
        result
    }

    fn save_locked(&self) -> Result<SaveReport> {
        let failed_callbacks = self.events.saving.invoke();
        if failed_callbacks > 0 {
            warn!(failed_callbacks, "Continuing save after failed saving callbacks");
        }

        let start = Instant::now();
        let base_path = self.paths.base_save_path();
        let store_path = self.paths.custom_save_path();
        let store_lock = StoreLock::for_path(&store_path);
        let _held = store_lock.lock();

        let fingerprint = self.validator.fingerprint_of(&base_path)?;

        let mut record = if self.storage.exists(&store_path) {
            let bytes = self.storage.load(&store_path)?;
            self.codec.decode(&bytes)?
        } else {
            StoreRecord::new()
        };
        record.set_fingerprint(fingerprint.clone());

        let mut report = SaveReport {
            fingerprint,
            ..SaveReport::default()
        };

        for cell in self.registry.erased_cells() {
            let key = cell.key();
            if cell.is_default() {
                if record.remove(key).is_some() {
                    report.retracted.push(key.to_string());
                }
                continue;
            }

            match cell.to_json() {
                Ok(value) => {
                    record.upsert(key, StoreEntry::new(cell.is_persistent(), value));
                    report.written.push(key.to_string());
                }
                Err(e) => {
                    error!(key = %key, error = %e, "Failed to serialize saved value; keeping previous entry");
                    report.skipped.push(key.to_string());
                }
            }
        }

        report.retained = record
            .values()
            .filter(|(key, _)| !self.registry.contains(key))
            .map(|(key, _)| key.to_string())
            .collect();

        let bytes = self.codec.encode(&record)?;
        self.storage.save(&bytes, &store_path)?;

        #[cfg(feature = "metrics")]
        SidecarMetrics::global().record_store_size(bytes.len());

        info!(
            path = %store_path.display(),
            written = report.written.len(),
            retracted = report.retracted.len(),
            retained = report.retained.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Saved custom values"
        );
        Ok(report)
    }

    /// Read the custom store back into the registry
    ///
    /// This method:
    /// 1. Returns [`LoadOutcome::Fresh`] if there is no store file
    /// 2. Decodes the store; a corrupt file is handled per the malformed policy
    /// 3. Deletes the store if its fingerprint does not match the base save
    /// 4. Stages stored values for registered keys and prunes unclaimed,
    ///    non-persistent entries
    /// 5. Rewrites the pruned store, then assigns the staged values
    /// 6. Fires the `loaded` event
    ///
    /// A value that does not fit its cell's type is logged and skipped; the
    /// entry stays in the store and the rest of the load proceeds.
    ///
    /// # Errors
    /// * `SidecarError::MalformedStore` - Only with [`MalformedStorePolicy::Fail`]
    /// * `SidecarError::Storage` - Reading, rewriting or deleting the store failed;
    ///   no cell has been modified
    pub fn load(&self) -> Result<LoadOutcome> {
        #[cfg(feature = "metrics")]
        let timer = MetricsTimer::start_load();

        let result = self.load_locked();
        match &result {
            Ok(outcome) => {
                #[cfg(feature = "metrics")]
                if let LoadOutcome::Discarded(DiscardReason::Stale) = outcome {
                    SidecarMetrics::global().record_stale_discard();
                }
                debug!(?outcome, "Load finished");
                let failed_callbacks = self.events.loaded.invoke();
                if failed_callbacks > 0 {
                    warn!(failed_callbacks, "Some loaded callbacks failed");
                }
            }
            Err(e) => error!(error = %e, "Loading custom values failed"),
        }

        #[cfg(feature = "metrics")]
        timer.finish_result(&result);
        result
    }

    fn load_locked(&self) -> Result<LoadOutcome> {
        let start = Instant::now();
        let base_path = self.paths.base_save_path();
        let store_path = self.paths.custom_save_path();
        let store_lock = StoreLock::for_path(&store_path);
        let _held = store_lock.lock();

        if !self.storage.exists(&store_path) {
            debug!(path = %store_path.display(), "No custom store; nothing to load");
            return Ok(LoadOutcome::Fresh);
        }

        let bytes = self.storage.load(&store_path)?;
        let mut record = match self.codec.decode(&bytes) {
            Ok(record) => record,
            Err(e) => match self.malformed_policy {
                MalformedStorePolicy::Fail => return Err(e),
                MalformedStorePolicy::Discard => {
                    warn!(path = %store_path.display(), error = %e, "Deleting malformed custom store");
                    self.storage.delete(&store_path)?;
                    return Ok(LoadOutcome::Discarded(DiscardReason::Malformed));
                }
            },
        };

        if let Some(reason) = self.check_fingerprint(&record, &base_path) {
            warn!(
                path = %store_path.display(),
                ?reason,
                "Custom store does not belong to the loaded base save; deleting it"
            );
            self.storage.delete(&store_path)?;
            return Ok(LoadOutcome::Discarded(reason));
        }

        let mut report = LoadReport::default();
        let mut staged: Vec<(Arc<dyn ErasedCell>, Box<dyn Any + Send>)> = Vec::new();

        for (key, entry) in record.values() {
            match self.registry.erased(key) {
                Some(cell) => match cell.decode(&entry.value) {
                    Ok(value) => {
                        staged.push((cell, value));
                        report.applied.push(key.to_string());
                    }
                    Err(e) => {
                        warn!(
                            key = %key,
                            expected = cell.type_name(),
                            error = %e,
                            "Stored value does not fit its cell; skipping"
                        );
                        report.type_mismatches.push(key.to_string());
                    }
                },
                None if entry.persistent => report.retained.push(key.to_string()),
                None => report.pruned.push(key.to_string()),
            }
        }

        record.retain_values(|key, _| !report.pruned.iter().any(|pruned| pruned == key));
        let bytes = self.codec.encode(&record)?;
        self.storage.save(&bytes, &store_path)?;

        for (cell, value) in staged {
            cell.commit(value);
        }

        #[cfg(feature = "metrics")]
        SidecarMetrics::global().record_type_mismatches(report.type_mismatches.len());

        info!(
            path = %store_path.display(),
            applied = report.applied.len(),
            pruned = report.pruned.len(),
            retained = report.retained.len(),
            type_mismatches = report.type_mismatches.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Loaded custom values"
        );
        Ok(LoadOutcome::Reconciled(report))
    }

    /// `None` when the record belongs to the base save at `base_path`
    fn check_fingerprint(&self, record: &StoreRecord, base_path: &Path) -> Option<DiscardReason> {
        let Some(stored) = record.fingerprint() else {
            return Some(DiscardReason::Stale);
        };
        match self.validator.verify(stored, base_path) {
            Ok(true) => None,
            Ok(false) => Some(DiscardReason::Stale),
            Err(e) => {
                warn!(error = %e, "Cannot fingerprint base save; treating store as stale");
                Some(DiscardReason::BaseSaveUnavailable)
            }
        }
    }

    /// Copy the current custom store to its day backup path
    ///
    /// Returns the backup path, or `None` when there is no store to back up.
    pub fn backup_store(&self, day: impl Display) -> Result<Option<PathBuf>> {
        let store_path = self.paths.custom_save_path();
        let store_lock = StoreLock::for_path(&store_path);
        let _held = store_lock.lock();

        if !self.storage.exists(&store_path) {
            return Ok(None);
        }
        let backup_path = self.path_rules().to_backup_path(&store_path, day);
        self.storage.copy(&store_path, &backup_path)?;
        info!(from = %store_path.display(), to = %backup_path.display(), "Backed up custom store");
        Ok(Some(backup_path))
    }

    /// Restore the custom store paired with a base save backup
    ///
    /// Call this when the host is about to copy `base_backup_path` over its
    /// live base save. The matching custom backup, if any, replaces the live
    /// custom store. Returns whether a backup was found.
    pub fn restore_store_backup(&self, base_backup_path: &Path) -> Result<bool> {
        let rules = self.path_rules();
        let backup_path = rules.to_custom_path(base_backup_path);
        let target = rules.remove_backup_suffix(&backup_path);
        if backup_path == target {
            return Err(SidecarError::validation(format!(
                "{} is not a day backup path",
                base_backup_path.display()
            )));
        }

        let store_lock = StoreLock::for_path(&target);
        let _held = store_lock.lock();

        if !self.storage.exists(&backup_path) {
            debug!(path = %backup_path.display(), "No custom store backup to restore");
            return Ok(false);
        }
        self.storage.copy(&backup_path, &target)?;
        info!(from = %backup_path.display(), to = %target.display(), "Restored custom store backup");
        Ok(true)
    }
}

#[cfg(feature = "async-rt")]
impl<S, O> PersistenceEngine<S, O>
where
    S: StorageAdapter + 'static,
    O: Obfuscator + Send + Sync + 'static,
{
    /// Run [`save`](Self::save) on the blocking thread pool
    pub fn spawn_save(self: Arc<Self>) -> tokio::task::JoinHandle<Result<SaveReport>> {
        tokio::task::spawn_blocking(move || self.save())
    }

    /// Run [`load`](Self::load) on the blocking thread pool
    pub fn spawn_load(self: Arc<Self>) -> tokio::task::JoinHandle<Result<LoadOutcome>> {
        tokio::task::spawn_blocking(move || self.load())
    }
}

/// Convenience function to create an engine with default components
///
/// Creates an engine with:
/// - Local file storage with atomic replace
/// - XOR obfuscation with the default key
/// - Base saves fingerprinted as plaintext
pub fn create_default_engine(
    registry: Arc<ValueRegistry>,
    paths: Arc<dyn PathResolver>,
) -> PersistenceEngine<LocalFileStorage, XorObfuscator> {
    PersistenceEngine::new(
        registry,
        LocalFileStorage::new(),
        XorObfuscator::default(),
        FingerprintValidator::default(),
        paths,
    )
}

/// Create an engine from configuration and the host's base save decryptor
///
/// # Errors
/// * `SidecarError::Validation` - If the configuration is invalid
pub fn create_engine_from_config<D>(
    config: &EngineConfig,
    registry: Arc<ValueRegistry>,
    paths: Arc<dyn PathResolver>,
    decryptor: D,
) -> Result<PersistenceEngine<LocalFileStorage, XorObfuscator>>
where
    D: SaveDecryptor + 'static,
{
    config.validate()?;
    Ok(PersistenceEngine::new(
        registry,
        LocalFileStorage::new(),
        XorObfuscator::new(&config.obfuscation_key),
        FingerprintValidator::new(decryptor),
        paths,
    )
    .with_malformed_policy(config.malformed_policy)
    .with_path_rules(config.paths.clone()))
}
