//! Configuration for the registry and the persistence layer
//!
//! Both sections are plain serde structs so they can be loaded from one
//! JSON document. Durations are stored as milliseconds on the wire.

use crate::registry::strategy::RemovalStrategy;
use crate::{Result, TabkeepError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default storage key for the persisted snapshot
pub const DEFAULT_STORAGE_KEY: &str = "tabkeep:tabs";

/// Default snapshot version string
pub const DEFAULT_SNAPSHOT_VERSION: &str = "1.0.0";

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

/// Registry settings: capacity, eviction policy, cleanup timer and hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistryConfig {
    /// Maximum number of open tabs (at least 1)
    pub max_tabs: usize,
    /// Which tab to evict when a new one does not fit
    pub removal_strategy: RemovalStrategy,
    /// Enable the recurring expired-tab cleanup
    pub auto_cleanup: bool,
    /// Idle time after which a tab is considered expired
    #[serde(with = "duration_ms")]
    pub tab_expire_time: Duration,
    /// Period of the cleanup timer
    #[serde(with = "duration_ms")]
    pub cleanup_interval: Duration,
    /// Upper bound on a single hook invocation; `None` waits forever
    #[serde(with = "option_duration_ms")]
    pub hook_timeout: Option<Duration>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_tabs: 10,
            removal_strategy: RemovalStrategy::Lru,
            auto_cleanup: false,
            tab_expire_time: Duration::from_secs(30 * 60),
            cleanup_interval: Duration::from_secs(5 * 60),
            hook_timeout: None,
        }
    }
}

impl RegistryConfig {
    pub fn with_max_tabs(mut self, max_tabs: usize) -> Self {
        self.max_tabs = max_tabs;
        self
    }

    pub fn with_strategy(mut self, strategy: RemovalStrategy) -> Self {
        self.removal_strategy = strategy;
        self
    }

    pub fn with_auto_cleanup(mut self, expire_after: Duration, interval: Duration) -> Self {
        self.auto_cleanup = true;
        self.tab_expire_time = expire_after;
        self.cleanup_interval = interval;
        self
    }

    pub fn with_hook_timeout(mut self, timeout: Duration) -> Self {
        self.hook_timeout = Some(timeout);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_tabs == 0 {
            return Err(TabkeepError::config("maxTabs must be at least 1"));
        }
        if self.auto_cleanup && self.cleanup_interval.is_zero() {
            return Err(TabkeepError::config(
                "cleanupInterval must be non-zero when autoCleanup is enabled",
            ));
        }
        if matches!(self.hook_timeout, Some(t) if t.is_zero()) {
            return Err(TabkeepError::config("hookTimeout must be non-zero when set"));
        }
        Ok(())
    }
}

/// Persistence settings for the snapshot adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistenceConfig {
    /// Key under which the snapshot is stored
    pub storage_key: String,
    /// Version string written into every snapshot
    pub version: String,
    /// Write the snapshot back whenever the registry changes
    pub auto_sync: bool,
    /// Maximum snapshot age; zero disables expiry
    #[serde(with = "duration_ms")]
    pub expire_time: Duration,
    /// Routes that are never persisted by the default filter
    pub excluded_routes: Vec<String>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            version: DEFAULT_SNAPSHOT_VERSION.to_string(),
            auto_sync: true,
            expire_time: Duration::from_secs(7 * 24 * 60 * 60),
            excluded_routes: ["/login", "/register", "/404", "/403", "/500"]
                .iter()
                .map(|r| r.to_string())
                .collect(),
        }
    }
}

impl PersistenceConfig {
    pub fn with_storage_key<S: Into<String>>(mut self, key: S) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn with_version<S: Into<String>>(mut self, version: S) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_expire_time(mut self, expire_time: Duration) -> Self {
        self.expire_time = expire_time;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage_key.trim().is_empty() {
            return Err(TabkeepError::config("storageKey cannot be empty"));
        }
        if self.version.trim().is_empty() {
            return Err(TabkeepError::config("version cannot be empty"));
        }
        Ok(())
    }
}

/// Combined configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TabkeepConfig {
    pub registry: RegistryConfig,
    pub persistence: PersistenceConfig,
}

impl TabkeepConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: TabkeepConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TabkeepError::config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    /// Validate both sections
    pub fn validate(&self) -> Result<()> {
        self.registry.validate()?;
        self.persistence.validate()
    }
}
