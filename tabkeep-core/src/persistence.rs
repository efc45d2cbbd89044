/*!
Snapshot persistence.

[`PersistenceAdapter`] turns registry state into a versioned, timestamped
JSON snapshot and back, on top of any [`KeyValueStore`]. Nothing in here
propagates an error to the caller: failures are recorded as [`SyncError`]s
and reported through `false`/`None` plus [`PersistenceAdapter::storage_info`].
*/

use crate::clock::{Clock, SystemClock};
use crate::config::PersistenceConfig;
use crate::error::{push_bounded, SyncError, SyncErrorKind};
use crate::observability::{record_event, MetricEvent};
use crate::registry::TabState;
use crate::store::KeyValueStore;
use crate::tab::Tab;
use crate::{Result, TabkeepError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// Predicate deciding whether a tab may be persisted.
pub type TabFilter = Arc<dyn Fn(&Tab) -> bool + Send + Sync>;

/// The persisted form of the registry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub entries: Vec<Tab>,
    pub active_id: Option<String>,
    /// Unix epoch milliseconds of the save
    pub timestamp: i64,
    pub version: String,
}

/// Diagnostic view of what is currently stored.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub key: String,
    /// Version this adapter writes
    pub version: String,
    /// Version found in the store, if a snapshot could be parsed
    pub stored_version: Option<String>,
    pub has_valid_data: bool,
    pub is_expired: bool,
    pub entry_count: usize,
    /// Size of the stored value in bytes
    pub size_bytes: usize,
    pub saved_at: Option<DateTime<Utc>>,
    pub error_count: usize,
}

/// A snapshot parsed from raw JSON, before expiry and filtering.
struct ParsedSnapshot {
    entries: Vec<Tab>,
    /// Reasons for every entry that was dropped while parsing
    skipped: Vec<String>,
    active_id: Option<String>,
    timestamp: i64,
    version: String,
}

/// Reads and writes registry snapshots through a key-value store.
///
/// # Example
/// ```rust
/// use tabkeep_core::{MemoryStore, PersistenceAdapter, PersistenceConfig};
///
/// let adapter = PersistenceAdapter::new(MemoryStore::new(), PersistenceConfig::default())?;
/// assert!(adapter.save_state(&[], None));
/// let loaded = adapter.load_state().unwrap();
/// assert!(loaded.tabs.is_empty());
/// # Ok::<(), tabkeep_core::TabkeepError>(())
/// ```
pub struct PersistenceAdapter<S: KeyValueStore> {
    store: S,
    config: PersistenceConfig,
    filter: TabFilter,
    clock: Arc<dyn Clock>,
    errors: Mutex<VecDeque<SyncError>>,
    last_saved_at: Mutex<Option<DateTime<Utc>>>,
}

impl<S: KeyValueStore> PersistenceAdapter<S> {
    /// Create an adapter whose filter drops the configured excluded routes.
    pub fn new(store: S, config: PersistenceConfig) -> Result<Self> {
        config.validate()?;
        let filter = Self::route_filter(&config.excluded_routes);
        Ok(Self {
            store,
            config,
            filter,
            clock: Arc::new(SystemClock),
            errors: Mutex::new(VecDeque::new()),
            last_saved_at: Mutex::new(None),
        })
    }

    /// Replace the persistence filter.
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Tab) -> bool + Send + Sync + 'static,
    {
        self.filter = Arc::new(filter);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn route_filter(excluded: &[String]) -> TabFilter {
        let excluded: HashSet<String> = excluded.iter().cloned().collect();
        Arc::new(move |tab: &Tab| !excluded.contains(&tab.route))
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn key(&self) -> &str {
        &self.config.storage_key
    }

    /// Persist `tabs` (after filtering) with `active_id`.
    ///
    /// Returns `false` and records a sync error when serialization or the
    /// store write fails.
    pub fn save_state(&self, tabs: &[Tab], active_id: Option<&str>) -> bool {
        match self.try_save(tabs, active_id) {
            Ok(saved) => {
                debug!(
                    key = %self.config.storage_key,
                    entries = saved.entries.len(),
                    "Snapshot saved"
                );
                record_event(MetricEvent::SnapshotWritten);
                true
            }
            Err(e) => {
                self.record(SyncErrorKind::Save, format!("Failed to save snapshot: {e}"));
                false
            }
        }
    }

    /// Load the stored state.
    ///
    /// Returns `None` when nothing is stored, the value is malformed, or the
    /// snapshot is older than the configured expiry. A stored version that
    /// differs from the configured one is only logged.
    pub fn load_state(&self) -> Option<TabState> {
        match self.try_load() {
            Ok(state) => state,
            Err(e) => {
                self.record(SyncErrorKind::Load, format!("Failed to load snapshot: {e}"));
                None
            }
        }
    }

    /// Overwrite the stored value with an empty snapshot.
    pub fn clear_state(&self) -> bool {
        match self.try_save(&[], None) {
            Ok(_) => {
                info!(key = %self.config.storage_key, "Snapshot cleared");
                true
            }
            Err(e) => {
                self.record(SyncErrorKind::Clear, format!("Failed to clear snapshot: {e}"));
                false
            }
        }
    }

    /// Delete the stored value entirely.
    pub fn remove_state(&self) -> bool {
        match self.store.remove(&self.config.storage_key) {
            Ok(()) => {
                info!(key = %self.config.storage_key, "Snapshot removed");
                true
            }
            Err(e) => {
                self.record(SyncErrorKind::Remove, format!("Failed to remove snapshot: {e}"));
                false
            }
        }
    }

    /// Describe what is currently stored. Records nothing.
    pub fn storage_info(&self) -> StorageInfo {
        let raw = self.store.read(&self.config.storage_key).ok().flatten();
        let size_bytes = raw.as_ref().map_or(0, |r| r.len());
        let parsed = raw.as_deref().and_then(|r| Self::parse(r).ok());

        let is_expired = parsed
            .as_ref()
            .is_some_and(|p| self.is_expired(p.timestamp));

        StorageInfo {
            key: self.config.storage_key.clone(),
            version: self.config.version.clone(),
            stored_version: parsed.as_ref().map(|p| p.version.clone()),
            has_valid_data: parsed.is_some() && !is_expired,
            is_expired,
            entry_count: parsed.as_ref().map_or(0, |p| p.entries.len()),
            size_bytes,
            saved_at: parsed
                .as_ref()
                .and_then(|p| DateTime::from_timestamp_millis(p.timestamp)),
            error_count: self.lock_errors().len(),
        }
    }

    /// Recorded sync errors, oldest first.
    pub fn sync_errors(&self) -> Vec<SyncError> {
        self.lock_errors().iter().cloned().collect()
    }

    pub fn clear_errors(&self) {
        self.lock_errors().clear();
    }

    /// When this adapter last wrote a snapshot successfully.
    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        *self
            .last_saved_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn try_save(&self, tabs: &[Tab], active_id: Option<&str>) -> Result<Snapshot> {
        let now = self.clock.now();
        let snapshot = Snapshot {
            entries: tabs.iter().filter(|t| (self.filter)(t)).cloned().collect(),
            active_id: active_id.map(str::to_string),
            timestamp: now.timestamp_millis(),
            version: self.config.version.clone(),
        };

        let json = serde_json::to_string(&snapshot)?;
        self.store.write(&self.config.storage_key, &json)?;

        *self
            .last_saved_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(now);
        Ok(snapshot)
    }

    fn try_load(&self) -> Result<Option<TabState>> {
        let Some(raw) = self.store.read(&self.config.storage_key)? else {
            debug!(key = %self.config.storage_key, "No stored snapshot");
            return Ok(None);
        };

        let parsed = Self::parse(&raw)?;
        if self.is_expired(parsed.timestamp) {
            info!(
                key = %self.config.storage_key,
                saved_at = parsed.timestamp,
                "Stored snapshot expired, ignoring it"
            );
            return Ok(None);
        }

        for reason in &parsed.skipped {
            self.record(SyncErrorKind::Load, reason.clone());
        }

        if parsed.version != self.config.version {
            warn!(
                stored = %parsed.version,
                expected = %self.config.version,
                "Snapshot version mismatch, loading anyway"
            );
        }

        let mut seen = HashSet::new();
        let tabs: Vec<Tab> = parsed
            .entries
            .into_iter()
            .filter(|t| (self.filter)(t))
            .filter(|t| seen.insert(t.id.clone()))
            .collect();
        let active_id = parsed
            .active_id
            .filter(|id| tabs.iter().any(|t| &t.id == id));

        debug!(entries = tabs.len(), "Snapshot loaded");
        Ok(Some(TabState::new(tabs, active_id)))
    }

    /// Whether a snapshot saved at `timestamp` (epoch ms) is past the expiry.
    fn is_expired(&self, timestamp: i64) -> bool {
        if self.config.expire_time.is_zero() {
            return false;
        }
        let age = self.clock.now().timestamp_millis().saturating_sub(timestamp);
        age > i64::try_from(self.config.expire_time.as_millis()).unwrap_or(i64::MAX)
    }

    /// Parse and shape-check a raw snapshot.
    ///
    /// The top-level fields must be present and well-typed. Individual
    /// entries that do not deserialize, or lack a title or route, are
    /// dropped and reported in `skipped`.
    fn parse(raw: &str) -> Result<ParsedSnapshot> {
        let value: serde_json::Value = serde_json::from_str(raw)?;
        let object = value
            .as_object()
            .ok_or_else(|| TabkeepError::invalid_format("snapshot is not a JSON object"))?;

        let entries = object
            .get("entries")
            .and_then(|v| v.as_array())
            .ok_or_else(|| TabkeepError::invalid_format("missing or non-array field: entries"))?;
        let timestamp = object
            .get("timestamp")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| TabkeepError::invalid_format("missing or non-integer field: timestamp"))?;
        let version = object
            .get("version")
            .and_then(|v| v.as_str())
            .ok_or_else(|| TabkeepError::invalid_format("missing or non-string field: version"))?
            .to_string();
        let active_id = match object.get("activeId") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(id)) => Some(id.clone()),
            Some(_) => {
                return Err(TabkeepError::invalid_format(
                    "field activeId must be a string or null",
                ))
            }
        };

        let mut tabs = Vec::with_capacity(entries.len());
        let mut skipped = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            match serde_json::from_value::<Tab>(entry.clone()) {
                Ok(tab) if tab.title.trim().is_empty() || tab.route.trim().is_empty() => {
                    skipped.push(format!("Skipped entry {index}: empty title or route"));
                }
                Ok(tab) => tabs.push(tab),
                Err(e) => skipped.push(format!("Skipped entry {index}: {e}")),
            }
        }

        Ok(ParsedSnapshot {
            entries: tabs,
            skipped,
            active_id,
            timestamp,
            version,
        })
    }

    fn record(&self, kind: SyncErrorKind, message: String) {
        error!(kind = ?kind, "{message}");
        record_event(MetricEvent::SyncError);
        let entry = SyncError {
            kind,
            message,
            timestamp: self.clock.now(),
        };
        push_bounded(&mut self.lock_errors(), entry);
    }

    fn lock_errors(&self) -> std::sync::MutexGuard<'_, VecDeque<SyncError>> {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: KeyValueStore> fmt::Debug for PersistenceAdapter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceAdapter")
            .field("config", &self.config)
            .field("errors", &self.lock_errors().len())
            .finish()
    }
}
