/*!
# Sidecar Core Engine

Overlay store that keeps extension data next to a host-owned save file.

The host writes its own save file and knows nothing about extensions. This
crate lets extensions register typed values, writes the non-default ones to a
separate obfuscated store file beside the host save, and reads them back when
the host loads. Each store remembers a fingerprint of the base save it was
written against, so a store left over from another save is thrown away instead
of leaking its values into the wrong game.

- Typed value cells with a per-key default and persistence flag
- XOR-obfuscated JSON store with atomic file replacement
- SHA-256 fingerprint of the decrypted base save
- Process-wide lock per store path
- Day backups of the store that follow the host's own backups

## Usage

```rust
use sidecar_core::{create_default_engine, FixedPaths, LoadOutcome, ValueRegistry};
use std::sync::Arc;

let dir = tempfile::tempdir()?;
let base = dir.path().join("StoreFile.es3");
std::fs::write(&base, b"host save")?;

let registry = Arc::new(ValueRegistry::new());
let reputation = registry.register("my.mod.reputation", 0i64, false)?;

let engine = create_default_engine(
    Arc::clone(&registry),
    Arc::new(FixedPaths::new(&base, dir.path().join("StoreModdedFile.sidecar"))),
);

reputation.set(12);
engine.save()?;

// A new session registers the same key and loads it back
let next = Arc::new(ValueRegistry::new());
let restored = next.register("my.mod.reputation", 0i64, false)?;
let engine = create_default_engine(
    Arc::clone(&next),
    Arc::new(FixedPaths::new(&base, dir.path().join("StoreModdedFile.sidecar"))),
);
assert!(matches!(engine.load()?, LoadOutcome::Reconciled(_)));
assert_eq!(restored.get(), 12);
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/

pub mod cell;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod guard;
pub mod observability;
pub mod paths;
pub mod record;
pub mod registry;
pub mod storage;

#[cfg(test)]
mod error_tests;

pub use cell::{SavedValue, StoredValue};
pub use codec::{NoObfuscation, Obfuscator, StoreCodec, XorObfuscator, DEFAULT_OBFUSCATION_KEY};
pub use config::{EngineConfig, MalformedStorePolicy};
pub use engine::{
    create_default_engine, create_engine_from_config, DiscardReason, LoadOutcome, LoadReport,
    PersistenceEngine, SaveReport,
};
pub use error::{BoxError, Result, SidecarError};
pub use events::{Event, SaveEvents};
pub use fingerprint::{FingerprintValidator, PlaintextDecryptor, SaveDecryptor};
pub use guard::StoreLock;
pub use paths::{FixedPaths, PathResolver, PathRules, SlotPaths};
pub use record::{StoreEntry, StoreRecord, FINGERPRINT_KEY};
pub use registry::ValueRegistry;
pub use storage::{LocalFileStorage, StorageAdapter};
