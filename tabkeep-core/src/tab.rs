/*!
Tab entries: the unit the registry tracks and the snapshot stores.
*/

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// String-keyed map used for route params, query and free-form metadata.
///
/// A `BTreeMap` keeps equality independent of insertion order, which the
/// duplicate check relies on.
pub type Fields = BTreeMap<String, serde_json::Value>;

/// Display status of a tab.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TabStatus {
    #[default]
    Normal,
    Loading,
    Modified,
    Error,
}

fn default_closable() -> bool {
    true
}

/// A single open entry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    /// Opaque unique identifier, immutable once created
    pub id: String,

    pub title: String,

    /// Route identifier the tab points at
    pub route: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    /// Non-closable tabs are never evicted or bulk-closed
    #[serde(default = "default_closable")]
    pub closable: bool,

    /// Temporary tabs are preferred by the `temporary` eviction strategy
    #[serde(default)]
    pub temporary: bool,

    #[serde(default)]
    pub status: TabStatus,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_accessed: DateTime<Utc>,

    #[serde(default)]
    pub params: Fields,

    #[serde(default)]
    pub query: Fields,

    #[serde(default)]
    pub meta: Fields,
}

impl Tab {
    /// Build a tab from creation input, stamping both timestamps with `now`.
    pub fn from_new(data: NewTab, id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: data.title,
            route: data.route,
            icon: data.icon,
            closable: data.closable,
            temporary: data.temporary,
            status: data.status,
            created_at: now,
            last_accessed: now,
            params: data.params,
            query: data.query,
            meta: data.meta,
        }
    }

    /// True when this tab points at exactly `(route, params, query)`.
    pub fn same_location(&self, route: &str, params: &Fields, query: &Fields) -> bool {
        self.route == route && &self.params == params && &self.query == query
    }

    /// True when both tabs point at the same `(route, params, query)`.
    pub fn same_location_as(&self, other: &Tab) -> bool {
        self.same_location(&other.route, &other.params, &other.query)
    }

    /// Whether the tab has gone unused for longer than `ttl`.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.last_accessed > ttl
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed = now;
    }

    /// Apply a partial update. The id is never changed.
    pub fn apply(&mut self, patch: TabPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(route) = patch.route {
            self.route = route;
        }
        if let Some(icon) = patch.icon {
            self.icon = icon;
        }
        if let Some(closable) = patch.closable {
            self.closable = closable;
        }
        if let Some(temporary) = patch.temporary {
            self.temporary = temporary;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(params) = patch.params {
            self.params = params;
        }
        if let Some(query) = patch.query {
            self.query = query;
        }
        if let Some(meta) = patch.meta {
            self.meta = meta;
        }
    }
}

/// Input for creating a tab.
///
/// # Example
/// ```rust
/// use tabkeep_core::NewTab;
///
/// let data = NewTab::new("Orders", "/orders")
///     .with_query("page", 2)
///     .with_icon("list")
///     .temporary(true);
/// assert_eq!(data.route, "/orders");
/// assert!(data.temporary);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewTab {
    /// Explicit id; one is generated when absent
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    pub route: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default = "default_closable")]
    pub closable: bool,
    #[serde(default)]
    pub temporary: bool,
    #[serde(default)]
    pub status: TabStatus,
    #[serde(default)]
    pub params: Fields,
    #[serde(default)]
    pub query: Fields,
    #[serde(default)]
    pub meta: Fields,
}

impl NewTab {
    pub fn new<S1, S2>(title: S1, route: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            id: None,
            title: title.into(),
            route: route.into(),
            icon: None,
            closable: true,
            temporary: false,
            status: TabStatus::Normal,
            params: Fields::new(),
            query: Fields::new(),
            meta: Fields::new(),
        }
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_icon<S: Into<String>>(mut self, icon: S) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn closable(mut self, closable: bool) -> Self {
        self.closable = closable;
        self
    }

    pub fn temporary(mut self, temporary: bool) -> Self {
        self.temporary = temporary;
        self
    }

    pub fn with_status(mut self, status: TabStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_param<K: Into<String>, V: Into<serde_json::Value>>(mut self, key: K, value: V) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_query<K: Into<String>, V: Into<serde_json::Value>>(mut self, key: K, value: V) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_meta<K: Into<String>, V: Into<serde_json::Value>>(mut self, key: K, value: V) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

/// A shallow partial update. `None` leaves the field untouched.
///
/// `icon` is doubly optional so a patch can clear it with `Some(None)`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TabPatch {
    pub title: Option<String>,
    pub route: Option<String>,
    pub icon: Option<Option<String>>,
    pub closable: Option<bool>,
    pub temporary: Option<bool>,
    pub status: Option<TabStatus>,
    pub params: Option<Fields>,
    pub query: Option<Fields>,
    pub meta: Option<Fields>,
}

impl TabPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn route<S: Into<String>>(mut self, route: S) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn status(mut self, status: TabStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn closable(mut self, closable: bool) -> Self {
        self.closable = Some(closable);
        self
    }

    pub fn meta(mut self, meta: Fields) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Whether applying this patch can change the tab's location.
    pub fn touches_location(&self) -> bool {
        self.route.is_some() || self.params.is_some() || self.query.is_some()
    }
}
