/*!
# Tabkeep Core

A bounded registry of open tabs with eviction, cancellable lifecycle hooks
and durable snapshot synchronization.

- [`TabRegistry`] holds a capacity-limited, ordered set of tabs and a single
  active pointer. When full, an [`EvictionStrategy`] picks the tab to drop.
- [`LifecycleHooks`] can veto creation, removal and activation, or replace
  a tab before it is inserted.
- [`PersistenceAdapter`] writes versioned, expiring JSON snapshots to any
  [`KeyValueStore`]; [`MemoryStore`] and [`FileStore`] are provided.
- [`Synchronizer`] restores an empty registry on start-up and writes every
  change back, coalescing bursts into one write.

## Usage

```rust
use std::sync::Arc;
use tabkeep_core::{
    MemoryStore, NewTab, PersistenceAdapter, PersistenceConfig, RegistryConfig, SyncOptions,
    Synchronizer, TabRegistry,
};

# #[tokio::main(flavor = "current_thread")]
# async fn main() -> tabkeep_core::Result<()> {
let registry = Arc::new(TabRegistry::new(RegistryConfig::default().with_max_tabs(3))?);
let adapter = Arc::new(PersistenceAdapter::new(MemoryStore::new(), PersistenceConfig::default())?);
let sync = Synchronizer::start(registry.clone(), adapter.clone(), SyncOptions::default()).await;

let home = registry.add_tab(NewTab::new("Home", "/home"), true).await.unwrap();
assert_eq!(registry.active_id(), Some(home.id));

sync.flush();
assert_eq!(adapter.load_state().unwrap().tabs.len(), 1);
# Ok(())
# }
```
*/

pub mod clock;
pub mod config;
pub mod error;
pub mod observability;
pub mod persistence;
pub mod registry;
pub mod store;
pub mod sync;
pub mod tab;


pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{PersistenceConfig, RegistryConfig, TabkeepConfig};
pub use error::{
    Result, SyncError, SyncErrorKind, TabkeepError, ValidationError, ValidationErrorKind,
};
pub use persistence::{PersistenceAdapter, Snapshot, StorageInfo, TabFilter};
pub use registry::hooks::{
    CreateDecision, HookDecision, HookError, HookResult, HookStage, LifecycleHooks,
};
pub use registry::strategy::{EvictionStrategy, RemovalStrategy};
pub use registry::{CleanupHandle, TabEvent, TabRegistry, TabRegistryBuilder, TabState};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use sync::{create_synchronizer, SyncHandle, SyncOptions, Synchronizer};
pub use tab::{Fields, NewTab, Tab, TabPatch, TabStatus};
