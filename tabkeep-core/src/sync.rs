/*!
Registry ↔ storage synchronization.

A [`Synchronizer`] hydrates an empty registry from the persisted snapshot
once, then watches the registry and writes the latest state back. Writes
are coalesced: a burst of mutations produces one write of the final state.
*/

use crate::persistence::PersistenceAdapter;
use crate::registry::{TabRegistry, TabState};
use crate::store::KeyValueStore;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Synchronizer tuning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// How long to wait after a change before writing.
    ///
    /// Zero coalesces to the end of the current scheduler turn.
    pub write_delay: Duration,
}

impl SyncOptions {
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }
}

/// Entry point for wiring a registry to a persistence adapter.
pub struct Synchronizer;

impl Synchronizer {
    /// Hydrate `registry` if it is empty, then start write-back.
    ///
    /// Write-back only runs when the adapter's config has `auto_sync` set;
    /// [`SyncHandle::flush`] works either way. Must be called inside a
    /// Tokio runtime.
    pub async fn start<S>(
        registry: Arc<TabRegistry>,
        adapter: Arc<PersistenceAdapter<S>>,
        options: SyncOptions,
    ) -> SyncHandle<S>
    where
        S: KeyValueStore + 'static,
    {
        // Subscribe first: a mutation that commits while hydration waits on
        // the registry must still be written back.
        let mut updates = adapter.config().auto_sync.then(|| registry.subscribe());
        let hydrated = Self::hydrate(&registry, &adapter, updates.as_mut()).await;

        let task = match updates {
            Some(updates) => {
                let writer = Arc::clone(&adapter);
                Some(tokio::spawn(write_back(
                    updates,
                    writer,
                    options.write_delay,
                )))
            }
            None => {
                debug!("Auto-sync disabled, write-back not started");
                None
            }
        };

        SyncHandle {
            registry,
            adapter,
            task,
            hydrated,
        }
    }

    async fn hydrate<S: KeyValueStore>(
        registry: &TabRegistry,
        adapter: &PersistenceAdapter<S>,
        updates: Option<&mut watch::Receiver<TabState>>,
    ) -> bool {
        if !registry.is_empty() {
            debug!("Registry already has tabs, not loading snapshot");
            return false;
        }
        match adapter.load_state() {
            Some(state) if !state.is_empty() => {
                let count = state.len();
                let applied = registry.hydrate_observed(state, updates).await;
                if applied {
                    info!(count, key = %adapter.key(), "Restored tabs from snapshot");
                }
                applied
            }
            _ => false,
        }
    }
}

/// Shorthand for [`Synchronizer::start`].
pub async fn create_synchronizer<S>(
    registry: Arc<TabRegistry>,
    adapter: Arc<PersistenceAdapter<S>>,
    options: SyncOptions,
) -> SyncHandle<S>
where
    S: KeyValueStore + 'static,
{
    Synchronizer::start(registry, adapter, options).await
}

async fn write_back<S: KeyValueStore>(
    mut updates: watch::Receiver<TabState>,
    adapter: Arc<PersistenceAdapter<S>>,
    delay: Duration,
) {
    while updates.changed().await.is_ok() {
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }
        let state = updates.borrow_and_update().clone();
        adapter.save_state(&state.tabs, state.active_id.as_deref());
    }
    debug!("Registry closed, write-back finished");
}

/// Running synchronizer. Dropping it stops write-back.
pub struct SyncHandle<S: KeyValueStore + 'static> {
    registry: Arc<TabRegistry>,
    adapter: Arc<PersistenceAdapter<S>>,
    task: Option<JoinHandle<()>>,
    hydrated: bool,
}

impl<S: KeyValueStore + 'static> SyncHandle<S> {
    /// Whether start-up restored tabs from storage.
    pub fn hydrated(&self) -> bool {
        self.hydrated
    }

    /// Whether write-back is still running.
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Write the current registry state now.
    pub fn flush(&self) -> bool {
        let state = self.registry.snapshot();
        self.adapter
            .save_state(&state.tabs, state.active_id.as_deref())
    }

    pub fn registry(&self) -> &Arc<TabRegistry> {
        &self.registry
    }

    pub fn adapter(&self) -> &Arc<PersistenceAdapter<S>> {
        &self.adapter
    }

    /// Stop write-back and drop any pending write.
    pub fn dispose(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Synchronizer disposed");
        }
    }
}

impl<S: KeyValueStore + 'static> Drop for SyncHandle<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<S: KeyValueStore + 'static> fmt::Debug for SyncHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncHandle")
            .field("active", &self.is_active())
            .field("hydrated", &self.hydrated)
            .finish()
    }
}
