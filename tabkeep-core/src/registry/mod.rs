/*!
The tab registry.

[`TabRegistry`] owns the live set of tabs and the active pointer. All
mutators are `async` because lifecycle hooks may suspend; they are
serialized behind an internal lock, so overlapping calls from different
tasks run one after another and each observes the state its predecessor
committed.

State is published through a `tokio::sync::watch` channel: readers get an
immutable [`TabState`] and can subscribe to changes. Discrete lifecycle
notifications, including the route to navigate to when the active tab
changes, go out on a broadcast channel as [`TabEvent`]s.

Rejected operations never return an error. They return `None`/`false`
and append a [`ValidationError`] to [`TabRegistry::errors`].
*/

pub mod hooks;
pub mod strategy;

use crate::clock::{Clock, SystemClock};
use crate::config::RegistryConfig;
use crate::error::{push_bounded, ValidationError, ValidationErrorKind};
use crate::observability::{record_event, MetricEvent};
use crate::tab::{Fields, NewTab, Tab, TabPatch};
use crate::Result;
use hooks::{HookRunner, LifecycleHooks};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use strategy::EvictionStrategy;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Capacity of the lifecycle event channel; slow receivers see `Lagged`.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Immutable view of the registry contents.
///
/// This is also the shape the persistence layer loads and the synchronizer
/// hydrates from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabState {
    pub tabs: Vec<Tab>,
    pub active_id: Option<String>,
}

impl TabState {
    pub fn new(tabs: Vec<Tab>, active_id: Option<String>) -> Self {
        Self { tabs, active_id }
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.tabs.iter().position(|t| t.id == id)
    }

    pub fn find(&self, id: &str) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Tab> {
        self.tabs.iter_mut().find(|t| t.id == id)
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        self.active_id.as_deref().and_then(|id| self.find(id))
    }

    pub fn ids(&self) -> Vec<String> {
        self.tabs.iter().map(|t| t.id.clone()).collect()
    }

    /// Enforce the registry invariants on externally supplied state.
    ///
    /// Keeps the first occurrence of each id and of each location, truncates
    /// to `max_tabs` and clears an active id that no longer resolves.
    fn sanitized(mut self, max_tabs: usize) -> Self {
        let mut seen = HashSet::new();
        let mut kept: Vec<Tab> = Vec::with_capacity(self.tabs.len());
        for tab in self.tabs.drain(..) {
            if !seen.insert(tab.id.clone()) || kept.iter().any(|k| k.same_location_as(&tab)) {
                continue;
            }
            kept.push(tab);
        }
        kept.truncate(max_tabs);
        let active_id = self
            .active_id
            .filter(|id| kept.iter().any(|t| &t.id == id));
        Self {
            tabs: kept,
            active_id,
        }
    }
}

/// Lifecycle notification published after a mutation commits.
#[derive(Debug, Clone, PartialEq)]
pub enum TabEvent {
    Created(Tab),
    Removed {
        tab: Tab,
        /// Removed to make room for a new tab
        evicted: bool,
    },
    Activated {
        tab: Tab,
        previous: Option<String>,
    },
    Updated(Tab),
    Reordered(Vec<String>),
    Cleared,
    Hydrated {
        count: usize,
    },
    /// The active tab changed; the collaborator should navigate to `route`.
    Navigate {
        tab_id: String,
        route: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemovalCause {
    Requested,
    Evicted,
}

/// Builder for [`TabRegistry`].
pub struct TabRegistryBuilder {
    config: RegistryConfig,
    strategy: Option<Arc<dyn EvictionStrategy>>,
    hooks: Vec<Arc<dyn LifecycleHooks>>,
    clock: Option<Arc<dyn Clock>>,
}

impl TabRegistryBuilder {
    /// Override the strategy named in the configuration.
    pub fn strategy(mut self, strategy: Arc<dyn EvictionStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Register a hook set; hooks run in registration order.
    pub fn hook(mut self, hook: Arc<dyn LifecycleHooks>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<TabRegistry> {
        self.config.validate()?;

        let strategy = self
            .strategy
            .unwrap_or_else(|| Arc::new(self.config.removal_strategy) as Arc<dyn EvictionStrategy>);
        let hooks = HookRunner::new(self.hooks, self.config.hook_timeout);
        let (state, _) = watch::channel(TabState::default());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        debug!(
            max_tabs = self.config.max_tabs,
            strategy = strategy.name(),
            hooks = hooks.len(),
            "Tab registry created"
        );

        Ok(TabRegistry {
            config: self.config,
            strategy,
            hooks,
            clock: self
                .clock
                .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>),
            mutation: tokio::sync::Mutex::new(()),
            state,
            events,
            errors: Mutex::new(VecDeque::new()),
        })
    }
}

/// Capacity-bounded registry of open tabs.
///
/// # Example
/// ```rust
/// use tabkeep_core::{NewTab, RegistryConfig, TabRegistry};
///
/// # tokio_test_block(async {
/// let registry = TabRegistry::new(RegistryConfig::default().with_max_tabs(3))?;
/// let tab = registry.add_tab(NewTab::new("Dashboard", "/dashboard"), true).await.unwrap();
/// assert_eq!(registry.active_id(), Some(tab.id));
/// # Ok::<(), tabkeep_core::TabkeepError>(())
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
pub struct TabRegistry {
    config: RegistryConfig,
    strategy: Arc<dyn EvictionStrategy>,
    hooks: HookRunner,
    clock: Arc<dyn Clock>,
    /// Serializes mutators, including their hook suspensions
    mutation: tokio::sync::Mutex<()>,
    state: watch::Sender<TabState>,
    events: broadcast::Sender<TabEvent>,
    errors: Mutex<VecDeque<ValidationError>>,
}

impl TabRegistry {
    pub fn builder(config: RegistryConfig) -> TabRegistryBuilder {
        TabRegistryBuilder {
            config,
            strategy: None,
            hooks: Vec::new(),
            clock: None,
        }
    }

    /// Registry with no hooks and the system clock.
    pub fn new(config: RegistryConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    // ---------------------------------------------------------------------
    // Mutators
    // ---------------------------------------------------------------------

    /// Create a tab, evicting others if the registry is full.
    ///
    /// Returns the created tab, or `None` when validation failed, a hook
    /// vetoed, or no room could be made.
    pub async fn add_tab(&self, data: NewTab, activate: bool) -> Option<Tab> {
        let _guard = self.mutation.lock().await;

        let now = self.clock.now();
        let id = data
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let candidate = Tab::from_new(data, id, now);
        if !self.validate_new(&candidate) {
            return None;
        }

        let candidate = self.hooks.before_create(candidate).await?;
        // A replacement from beforeCreate gets the same checks.
        if !self.validate_new(&candidate) {
            return None;
        }

        if !self.make_room(&candidate).await {
            return None;
        }

        self.state.send_modify(|s| s.tabs.push(candidate.clone()));
        debug!(tab_id = %candidate.id, route = %candidate.route, "Tab created");
        record_event(MetricEvent::TabCreated);
        self.emit(TabEvent::Created(candidate.clone()));

        if activate {
            self.activate_locked(&candidate.id).await;
        }

        let created = self.get_tab(&candidate.id).unwrap_or(candidate);
        self.hooks.after_create(&created).await;
        Some(created)
    }

    /// Remove a tab. Returns `false` if the id is unknown or a hook vetoed.
    pub async fn remove_tab(&self, id: &str) -> bool {
        let _guard = self.mutation.lock().await;
        self.remove_locked(id, RemovalCause::Requested).await
    }

    /// Make a tab the active one, stamping its `last_accessed`.
    pub async fn activate_tab(&self, id: &str) -> bool {
        let _guard = self.mutation.lock().await;
        self.activate_locked(id).await
    }

    /// Shallow-merge `patch` into a tab.
    ///
    /// The merged tab must keep a non-empty title and route and must not
    /// collide with another tab's location.
    pub async fn update_tab(&self, id: &str, patch: TabPatch) -> bool {
        let _guard = self.mutation.lock().await;

        let Some(previous) = self.get_tab(id) else {
            self.reject(
                ValidationErrorKind::NotFound,
                format!("Cannot update unknown tab {id}"),
                None,
            );
            return false;
        };

        let touches_location = patch.touches_location();
        let mut updated = previous.clone();
        updated.apply(patch);

        if !self.validate_fields(&updated) {
            return false;
        }
        if touches_location && self.location_taken(&updated, Some(id)) {
            self.reject(
                ValidationErrorKind::Duplicate,
                format!("Another tab is already open at {}", updated.route),
                Some(updated),
            );
            return false;
        }

        self.state.send_modify(|s| {
            if let Some(tab) = s.find_mut(id) {
                *tab = updated.clone();
            }
        });
        debug!(tab_id = %id, "Tab updated");
        self.emit(TabEvent::Updated(updated.clone()));
        self.hooks.after_update(&updated, &previous).await;
        true
    }

    /// Reorder tabs. `order` must be a permutation of the current ids.
    pub async fn reorder_tabs<S: AsRef<str>>(&self, order: &[S]) -> bool {
        let _guard = self.mutation.lock().await;

        let reordered = {
            let state = self.state.borrow();
            if order.len() != state.tabs.len() {
                None
            } else {
                let mut by_id: HashMap<&str, &Tab> =
                    state.tabs.iter().map(|t| (t.id.as_str(), t)).collect();
                order
                    .iter()
                    .map(|id| by_id.remove(id.as_ref()).cloned())
                    .collect::<Option<Vec<Tab>>>()
            }
        };

        let Some(reordered) = reordered else {
            debug!("Reorder rejected: not a permutation of the current tabs");
            return false;
        };

        let ids: Vec<String> = reordered.iter().map(|t| t.id.clone()).collect();
        self.state.send_modify(|s| s.tabs = reordered);
        self.emit(TabEvent::Reordered(ids));
        true
    }

    /// Remove closable, inactive tabs idle for longer than `ttl`.
    ///
    /// Does nothing unless auto-cleanup is enabled. Removal goes through
    /// the normal path, so hooks can keep a tab alive. The active tab and
    /// non-closable tabs are never swept: expiry is an idle policy, and
    /// neither the tab on screen nor a pinned tab is idle clutter.
    pub async fn cleanup_expired_tabs(&self, ttl: Duration) -> usize {
        if !self.config.auto_cleanup {
            debug!("Auto-cleanup disabled, skipping expired tab sweep");
            return 0;
        }

        let _guard = self.mutation.lock().await;
        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);

        let expired: Vec<String> = {
            let state = self.state.borrow();
            state
                .tabs
                .iter()
                .filter(|t| t.closable && state.active_id.as_deref() != Some(t.id.as_str()))
                .filter(|t| t.is_expired(now, ttl))
                .map(|t| t.id.clone())
                .collect()
        };

        let mut removed = 0;
        for id in expired {
            if self.remove_locked(&id, RemovalCause::Requested).await {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "Expired tabs cleaned up");
        }
        removed
    }

    /// Start the recurring cleanup timer from the configuration.
    ///
    /// Returns `None` when auto-cleanup is disabled. The timer stops when
    /// the handle is dropped or the registry is.
    pub fn spawn_cleanup(self: &Arc<Self>) -> Option<CleanupHandle> {
        if !self.config.auto_cleanup {
            return None;
        }

        let registry: Weak<Self> = Arc::downgrade(self);
        let period = self.config.cleanup_interval;
        let ttl = self.config.tab_expire_time;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.cleanup_expired_tabs(ttl).await;
            }
        });

        info!(interval_ms = period.as_millis() as u64, "Tab cleanup timer started");
        Some(CleanupHandle { task })
    }

    /// Close every closable tab except `id`, then activate `id`.
    pub async fn close_other_tabs(&self, id: &str) -> usize {
        let _guard = self.mutation.lock().await;
        let Some(ids) = self.closable_ids_around(id, |pos, i| pos != i) else {
            return 0;
        };
        let removed = self.remove_many(ids).await;
        if self.active_id().as_deref() != Some(id) {
            self.activate_locked(id).await;
        }
        removed
    }

    /// Close every closable tab before `id` in list order.
    pub async fn close_tabs_to_left(&self, id: &str) -> usize {
        let _guard = self.mutation.lock().await;
        match self.closable_ids_around(id, |pos, i| i < pos) {
            Some(ids) => self.remove_many(ids).await,
            None => 0,
        }
    }

    /// Close every closable tab after `id` in list order.
    pub async fn close_tabs_to_right(&self, id: &str) -> usize {
        let _guard = self.mutation.lock().await;
        match self.closable_ids_around(id, |pos, i| i > pos) {
            Some(ids) => self.remove_many(ids).await,
            None => 0,
        }
    }

    /// Close every closable tab.
    pub async fn close_all_tabs(&self) -> usize {
        let _guard = self.mutation.lock().await;
        let ids: Vec<String> = self
            .state
            .borrow()
            .tabs
            .iter()
            .filter(|t| t.closable)
            .map(|t| t.id.clone())
            .collect();
        self.remove_many(ids).await
    }

    /// Drop all tabs and the active pointer without running hooks.
    pub async fn clear(&self) {
        let _guard = self.mutation.lock().await;
        self.state.send_replace(TabState::default());
        info!("Tab registry cleared");
        self.emit(TabEvent::Cleared);
    }

    /// Replace the contents with `state`, but only while the registry is empty.
    ///
    /// The incoming state is sanitized against the registry invariants.
    /// Returns `false`, leaving the registry untouched, when tabs are
    /// already open.
    pub async fn hydrate(&self, state: TabState) -> bool {
        self.hydrate_observed(state, None).await
    }

    /// [`hydrate`](Self::hydrate), marking the hydrated state as seen on
    /// `observer` before the lock is released. Changes committed by other
    /// mutators stay unseen.
    pub(crate) async fn hydrate_observed(
        &self,
        state: TabState,
        observer: Option<&mut watch::Receiver<TabState>>,
    ) -> bool {
        let _guard = self.mutation.lock().await;

        if !self.state.borrow().is_empty() {
            info!("Registry already populated, skipping hydration");
            return false;
        }

        let incoming = state.len();
        let state = state.sanitized(self.config.max_tabs);
        if state.len() < incoming {
            warn!(
                incoming,
                kept = state.len(),
                "Dropped tabs that violated registry invariants during hydration"
            );
        }

        let count = state.len();
        let navigate = state
            .active_tab()
            .map(|t| (t.id.clone(), t.route.clone()));
        self.state.send_replace(state);
        if let Some(observer) = observer {
            observer.mark_unchanged();
        }
        info!(count, "Registry hydrated");
        self.emit(TabEvent::Hydrated { count });
        if let Some((tab_id, route)) = navigate {
            self.emit(TabEvent::Navigate { tab_id, route });
        }
        true
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Current contents as an immutable copy.
    pub fn snapshot(&self) -> TabState {
        self.state.borrow().clone()
    }

    pub fn tabs(&self) -> Vec<Tab> {
        self.state.borrow().tabs.clone()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.config.max_tabs
    }

    pub fn active_id(&self) -> Option<String> {
        self.state.borrow().active_id.clone()
    }

    pub fn active_tab(&self) -> Option<Tab> {
        self.state.borrow().active_tab().cloned()
    }

    /// Route of the active tab, for the navigation collaborator.
    pub fn active_route(&self) -> Option<String> {
        self.state.borrow().active_tab().map(|t| t.route.clone())
    }

    pub fn get_tab(&self, id: &str) -> Option<Tab> {
        self.state.borrow().find(id).cloned()
    }

    pub fn has_tab(&self, id: &str) -> bool {
        self.state.borrow().find(id).is_some()
    }

    /// Find a tab by route; `None` for params or query matches any value.
    pub fn get_by_route(
        &self,
        route: &str,
        params: Option<&Fields>,
        query: Option<&Fields>,
    ) -> Option<Tab> {
        self.state
            .borrow()
            .tabs
            .iter()
            .find(|t| {
                t.route == route
                    && params.map_or(true, |p| &t.params == p)
                    && query.map_or(true, |q| &t.query == q)
            })
            .cloned()
    }

    /// Id of the tab after `id`, if any.
    pub fn next_id(&self, id: &str) -> Option<String> {
        let state = self.state.borrow();
        let pos = state.position(id)?;
        state.tabs.get(pos + 1).map(|t| t.id.clone())
    }

    /// Id of the tab before `id`, if any.
    pub fn previous_id(&self, id: &str) -> Option<String> {
        let state = self.state.borrow();
        let pos = state.position(id)?;
        pos.checked_sub(1)
            .and_then(|p| state.tabs.get(p))
            .map(|t| t.id.clone())
    }

    /// Watch the registry contents. The receiver starts with the current
    /// state marked as seen.
    pub fn subscribe(&self) -> watch::Receiver<TabState> {
        self.state.subscribe()
    }

    /// Receive lifecycle events published from now on.
    pub fn events(&self) -> broadcast::Receiver<TabEvent> {
        self.events.subscribe()
    }

    /// Recorded validation errors, oldest first.
    pub fn errors(&self) -> Vec<ValidationError> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn last_error(&self) -> Option<ValidationError> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .cloned()
    }

    pub fn clear_errors(&self) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    // ---------------------------------------------------------------------
    // Internals; callers hold the mutation lock
    // ---------------------------------------------------------------------

    async fn remove_locked(&self, id: &str, cause: RemovalCause) -> bool {
        let Some(tab) = self.get_tab(id) else {
            debug!(tab_id = %id, "Remove ignored: unknown tab");
            return false;
        };

        if !self.hooks.before_remove(&tab).await {
            return false;
        }

        let now = self.clock.now();
        let mut removed = None;
        let mut navigate = None;
        self.state.send_modify(|s| {
            let Some(index) = s.position(id) else {
                return;
            };
            removed = Some(s.tabs.remove(index));
            if s.active_id.as_deref() != Some(id) {
                return;
            }
            // Fill the gap: the tab that slid into `index`, else the one before it.
            let replacement = if index < s.tabs.len() {
                Some(index)
            } else {
                index.checked_sub(1)
            };
            match replacement.and_then(|i| s.tabs.get_mut(i)) {
                Some(next) => {
                    next.touch(now);
                    navigate = Some((next.id.clone(), next.route.clone()));
                    s.active_id = Some(next.id.clone());
                }
                None => s.active_id = None,
            }
        });

        let Some(removed) = removed else {
            return false;
        };

        let evicted = cause == RemovalCause::Evicted;
        if evicted {
            info!(tab_id = %removed.id, route = %removed.route, strategy = self.strategy.name(), "Tab evicted");
            record_event(MetricEvent::TabEvicted);
        } else {
            debug!(tab_id = %removed.id, "Tab removed");
        }
        self.emit(TabEvent::Removed {
            tab: removed.clone(),
            evicted,
        });
        if let Some((tab_id, route)) = navigate {
            self.emit(TabEvent::Navigate { tab_id, route });
        }

        self.hooks.after_remove(&removed).await;
        true
    }

    async fn activate_locked(&self, id: &str) -> bool {
        let (candidate, previous) = {
            let state = self.state.borrow();
            (state.find(id).cloned(), state.active_tab().cloned())
        };

        let Some(candidate) = candidate else {
            self.reject(
                ValidationErrorKind::NotFound,
                format!("Cannot activate unknown tab {id}"),
                None,
            );
            return false;
        };

        if !self.hooks.before_activate(&candidate, previous.as_ref()).await {
            return false;
        }

        let now = self.clock.now();
        let mut activated = None;
        self.state.send_modify(|s| {
            if let Some(tab) = s.find_mut(id) {
                tab.touch(now);
                activated = Some(tab.clone());
                s.active_id = Some(id.to_string());
            }
        });

        let Some(tab) = activated else {
            return false;
        };

        debug!(tab_id = %tab.id, route = %tab.route, "Tab activated");
        self.emit(TabEvent::Activated {
            tab: tab.clone(),
            previous: previous.as_ref().map(|p| p.id.clone()),
        });
        self.emit(TabEvent::Navigate {
            tab_id: tab.id.clone(),
            route: tab.route.clone(),
        });

        self.hooks.after_activate(&tab, previous.as_ref()).await;
        true
    }

    /// Evict until `incoming` fits. Candidates whose removal a hook vetoes
    /// are not offered again.
    async fn make_room(&self, incoming: &Tab) -> bool {
        let mut refused: HashSet<String> = HashSet::new();

        loop {
            let pick = {
                let state = self.state.borrow();
                if state.tabs.len() < self.config.max_tabs {
                    return true;
                }
                let candidates: Vec<&Tab> = state
                    .tabs
                    .iter()
                    .filter(|t| t.closable && !refused.contains(&t.id))
                    .collect();
                self.strategy.select(&candidates).map(|t| t.id.clone())
            };

            let Some(victim) = pick else {
                self.reject(
                    ValidationErrorKind::MaxTabsExceeded,
                    format!(
                        "Registry is full ({} tabs) and the {} strategy found nothing to evict",
                        self.config.max_tabs,
                        self.strategy.name()
                    ),
                    Some(incoming.clone()),
                );
                return false;
            };

            if !self.remove_locked(&victim, RemovalCause::Evicted).await {
                refused.insert(victim);
            }
        }
    }

    async fn remove_many(&self, ids: Vec<String>) -> usize {
        let mut removed = 0;
        for id in ids {
            if self.remove_locked(&id, RemovalCause::Requested).await {
                removed += 1;
            }
        }
        removed
    }

    /// Closable ids for which `select(anchor_pos, index)` holds, or `None`
    /// with a recorded error when `id` is unknown.
    fn closable_ids_around(
        &self,
        id: &str,
        select: impl Fn(usize, usize) -> bool,
    ) -> Option<Vec<String>> {
        let ids = {
            let state = self.state.borrow();
            state.position(id).map(|pos| {
                state
                    .tabs
                    .iter()
                    .enumerate()
                    .filter(|(i, t)| t.closable && select(pos, *i))
                    .map(|(_, t)| t.id.clone())
                    .collect::<Vec<_>>()
            })
        };

        if ids.is_none() {
            self.reject(
                ValidationErrorKind::NotFound,
                format!("Unknown tab {id}"),
                None,
            );
        }
        ids
    }

    fn validate_fields(&self, tab: &Tab) -> bool {
        if tab.title.trim().is_empty() {
            self.reject(
                ValidationErrorKind::MissingTitle,
                "Tab title cannot be empty",
                Some(tab.clone()),
            );
            return false;
        }
        if tab.route.trim().is_empty() {
            self.reject(
                ValidationErrorKind::InvalidRoute,
                "Tab route cannot be empty",
                Some(tab.clone()),
            );
            return false;
        }
        true
    }

    fn validate_new(&self, tab: &Tab) -> bool {
        if !self.validate_fields(tab) {
            return false;
        }
        if self.has_tab(&tab.id) {
            self.reject(
                ValidationErrorKind::Duplicate,
                format!("Tab id {} is already in use", tab.id),
                Some(tab.clone()),
            );
            return false;
        }
        if self.location_taken(tab, None) {
            self.reject(
                ValidationErrorKind::Duplicate,
                format!("A tab is already open at {}", tab.route),
                Some(tab.clone()),
            );
            return false;
        }
        true
    }

    /// Whether a tab other than `except` already points at `tab`'s location.
    fn location_taken(&self, tab: &Tab, except: Option<&str>) -> bool {
        self.state
            .borrow()
            .tabs
            .iter()
            .any(|t| Some(t.id.as_str()) != except && t.same_location_as(tab))
    }

    fn reject<S: Into<String>>(&self, kind: ValidationErrorKind, message: S, offending: Option<Tab>) {
        let error = ValidationError::new(kind, message, offending, self.clock.now());
        warn!(kind = %error.kind, "{}", error.message);
        push_bounded(
            &mut self.errors.lock().unwrap_or_else(PoisonError::into_inner),
            error,
        );
    }

    fn emit(&self, event: TabEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

impl fmt::Debug for TabRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("TabRegistry")
            .field("config", &self.config)
            .field("strategy", &self.strategy.name())
            .field("tabs", &state.len())
            .field("active_id", &state.active_id)
            .finish()
    }
}

/// Handle for the cleanup timer started by [`TabRegistry::spawn_cleanup`].
#[derive(Debug)]
pub struct CleanupHandle {
    task: JoinHandle<()>,
}

impl CleanupHandle {
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests;
