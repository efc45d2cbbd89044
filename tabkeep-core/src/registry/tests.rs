use super::hooks::{CreateDecision, HookDecision, HookResult, LifecycleHooks};
use super::strategy::RemovalStrategy;
use super::*;
use crate::clock::ManualClock;
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

fn registry_with(max_tabs: usize, strategy: RemovalStrategy) -> (TabRegistry, ManualClock) {
    let clock = ManualClock::starting_at_millis(1_700_000_000_000);
    let config = RegistryConfig::default()
        .with_max_tabs(max_tabs)
        .with_strategy(strategy);
    let registry = TabRegistry::builder(config)
        .clock(Arc::new(clock.clone()))
        .build()
        .unwrap();
    (registry, clock)
}

fn registry_with_hooks(max_tabs: usize, hook: Arc<dyn LifecycleHooks>) -> TabRegistry {
    TabRegistry::builder(RegistryConfig::default().with_max_tabs(max_tabs))
        .hook(hook)
        .build()
        .unwrap()
}

async fn add(registry: &TabRegistry, name: &str) -> Tab {
    registry
        .add_tab(NewTab::new(name, format!("/{name}")), true)
        .await
        .unwrap()
}

fn ids(registry: &TabRegistry) -> Vec<String> {
    registry.snapshot().ids()
}

fn assert_invariants(registry: &TabRegistry) {
    let state = registry.snapshot();
    assert!(state.len() <= registry.config().max_tabs);
    let unique: HashSet<_> = state.tabs.iter().map(|t| t.id.clone()).collect();
    assert_eq!(unique.len(), state.len());
    if let Some(active) = &state.active_id {
        assert_eq!(state.tabs.iter().filter(|t| &t.id == active).count(), 1);
    }
}

#[tokio::test]
async fn test_add_first_tab_activates_it() {
    let (registry, _) = registry_with(3, RemovalStrategy::Lru);

    let tab = registry
        .add_tab(NewTab::new("Dashboard", "/dashboard"), true)
        .await
        .unwrap();

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.active_id(), Some(tab.id.clone()));
    assert_eq!(registry.active_route().as_deref(), Some("/dashboard"));
    assert!(tab.closable);
    assert!(!tab.id.is_empty());
}

#[tokio::test]
async fn test_add_without_activation_keeps_active() {
    let (registry, _) = registry_with(3, RemovalStrategy::Lru);
    let first = add(&registry, "a").await;

    registry
        .add_tab(NewTab::new("b", "/b"), false)
        .await
        .unwrap();

    assert_eq!(registry.active_id(), Some(first.id));
}

#[tokio::test]
async fn test_empty_title_is_rejected() {
    let (registry, _) = registry_with(3, RemovalStrategy::Lru);

    let result = registry.add_tab(NewTab::new("", "/x"), true).await;

    assert!(result.is_none());
    assert!(registry.is_empty());
    let error = registry.last_error().unwrap();
    assert_eq!(error.kind, ValidationErrorKind::MissingTitle);
    assert_eq!(error.offending.unwrap().route, "/x");
}

#[tokio::test]
async fn test_blank_route_is_rejected() {
    let (registry, _) = registry_with(3, RemovalStrategy::Lru);

    assert!(registry.add_tab(NewTab::new("X", "  "), true).await.is_none());
    assert_eq!(
        registry.last_error().unwrap().kind,
        ValidationErrorKind::InvalidRoute
    );
}

#[tokio::test]
async fn test_duplicate_location_is_rejected() {
    let (registry, _) = registry_with(5, RemovalStrategy::Lru);
    let data = NewTab::new("User", "/users").with_param("id", 1);
    registry.add_tab(data.clone(), true).await.unwrap();
    let before = registry.snapshot();

    assert!(registry.add_tab(data.clone(), true).await.is_none());
    assert_eq!(registry.snapshot(), before);
    assert_eq!(
        registry.last_error().unwrap().kind,
        ValidationErrorKind::Duplicate
    );

    // Different params is a different location.
    let other = NewTab::new("User", "/users").with_param("id", 2);
    assert!(registry.add_tab(other, true).await.is_some());
}

#[tokio::test]
async fn test_explicit_id_collision_is_rejected() {
    let (registry, _) = registry_with(5, RemovalStrategy::Lru);
    registry
        .add_tab(NewTab::new("A", "/a").with_id("fixed"), true)
        .await
        .unwrap();

    let result = registry
        .add_tab(NewTab::new("B", "/b").with_id("fixed"), true)
        .await;
    assert!(result.is_none());
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_lru_evicts_least_recently_touched() {
    let (registry, clock) = registry_with(3, RemovalStrategy::Lru);
    let t1 = add(&registry, "t1").await;
    clock.advance_millis(10);
    let t2 = add(&registry, "t2").await;
    clock.advance_millis(10);
    let t3 = add(&registry, "t3").await;
    clock.advance_millis(10);
    assert!(registry.activate_tab(&t1.id).await);
    clock.advance_millis(10);
    assert!(registry.activate_tab(&t3.id).await);
    clock.advance_millis(10);

    let t4 = add(&registry, "t4").await;

    assert!(!registry.has_tab(&t2.id));
    assert_eq!(ids(&registry), vec![t1.id, t3.id, t4.id.clone()]);
    assert_eq!(registry.active_id(), Some(t4.id));
    assert_invariants(&registry);
}

#[tokio::test]
async fn test_oldest_evicts_first_created() {
    let (registry, clock) = registry_with(2, RemovalStrategy::Oldest);
    let a = add(&registry, "a").await;
    clock.advance_millis(10);
    let b = add(&registry, "b").await;
    clock.advance_millis(10);
    registry.activate_tab(&a.id).await;

    let c = add(&registry, "c").await;
    assert_eq!(ids(&registry), vec![b.id, c.id]);
}

#[tokio::test]
async fn test_temporary_strategy_prefers_temporary_tab() {
    let (registry, _) = registry_with(3, RemovalStrategy::Temporary);
    let a = add(&registry, "a").await;
    let temp = registry
        .add_tab(NewTab::new("preview", "/preview").temporary(true), true)
        .await
        .unwrap();
    let c = add(&registry, "c").await;

    let d = add(&registry, "d").await;
    assert!(!registry.has_tab(&temp.id));
    assert_eq!(ids(&registry), vec![a.id.clone(), c.id.clone(), d.id.clone()]);

    // No temporary tab left: the last closable one goes.
    let e = add(&registry, "e").await;
    assert_eq!(ids(&registry), vec![a.id, c.id, e.id]);
    assert!(!registry.has_tab(&d.id));
}

#[tokio::test]
async fn test_manual_strategy_fails_when_full() {
    let (registry, _) = registry_with(2, RemovalStrategy::Manual);
    add(&registry, "a").await;
    add(&registry, "b").await;

    let result = registry.add_tab(NewTab::new("c", "/c"), true).await;

    assert!(result.is_none());
    assert_eq!(registry.len(), 2);
    assert_eq!(
        registry.last_error().unwrap().kind,
        ValidationErrorKind::MaxTabsExceeded
    );
}

#[tokio::test]
async fn test_non_closable_tabs_are_never_evicted() {
    let (registry, _) = registry_with(2, RemovalStrategy::Lru);
    registry
        .add_tab(NewTab::new("home", "/").closable(false), true)
        .await
        .unwrap();
    registry
        .add_tab(NewTab::new("settings", "/settings").closable(false), true)
        .await
        .unwrap();

    assert!(registry.add_tab(NewTab::new("c", "/c"), true).await.is_none());
    assert_eq!(
        registry.last_error().unwrap().kind,
        ValidationErrorKind::MaxTabsExceeded
    );
    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn test_remove_active_fills_gap_with_next() {
    let (registry, _) = registry_with(5, RemovalStrategy::Lru);
    let a = add(&registry, "a").await;
    let b = add(&registry, "b").await;
    let c = add(&registry, "c").await;
    registry.activate_tab(&b.id).await;

    assert!(registry.remove_tab(&b.id).await);
    assert_eq!(registry.active_id(), Some(c.id.clone()));

    // Removing the last tab while active falls back to the previous one.
    assert!(registry.remove_tab(&c.id).await);
    assert_eq!(registry.active_id(), Some(a.id.clone()));

    assert!(registry.remove_tab(&a.id).await);
    assert!(registry.active_id().is_none());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_remove_inactive_keeps_active() {
    let (registry, _) = registry_with(5, RemovalStrategy::Lru);
    let a = add(&registry, "a").await;
    let b = add(&registry, "b").await;

    assert!(registry.remove_tab(&a.id).await);
    assert_eq!(registry.active_id(), Some(b.id));
}

#[tokio::test]
async fn test_remove_unknown_returns_false() {
    let (registry, _) = registry_with(5, RemovalStrategy::Lru);
    add(&registry, "a").await;

    assert!(!registry.remove_tab("missing").await);
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_activate_unknown_records_not_found() {
    let (registry, _) = registry_with(5, RemovalStrategy::Lru);

    assert!(!registry.activate_tab("missing").await);
    assert_eq!(
        registry.last_error().unwrap().kind,
        ValidationErrorKind::NotFound
    );
}

#[tokio::test]
async fn test_activate_stamps_last_accessed() {
    let (registry, clock) = registry_with(5, RemovalStrategy::Lru);
    let a = add(&registry, "a").await;
    add(&registry, "b").await;
    clock.advance_millis(5_000);

    assert!(registry.activate_tab(&a.id).await);
    let a = registry.get_tab(&a.id).unwrap();
    assert_eq!(a.last_accessed, clock.now());
    assert!(a.last_accessed > a.created_at);
}

struct VetoActivate;

#[async_trait]
impl LifecycleHooks for VetoActivate {
    async fn before_activate(
        &self,
        candidate: &Tab,
        _previous: Option<&Tab>,
    ) -> HookResult<HookDecision> {
        if candidate.route == "/locked" {
            Ok(HookDecision::Veto)
        } else {
            Ok(HookDecision::Continue)
        }
    }
}

#[tokio::test]
async fn test_before_activate_veto_keeps_previous_active() {
    let registry = registry_with_hooks(5, Arc::new(VetoActivate));
    let open = add(&registry, "open").await;
    let locked = registry
        .add_tab(NewTab::new("Locked", "/locked"), false)
        .await
        .unwrap();

    assert!(!registry.activate_tab(&locked.id).await);
    assert_eq!(registry.active_id(), Some(open.id));
}

#[tokio::test]
async fn test_vetoed_activation_on_add_still_creates_tab() {
    let registry = registry_with_hooks(5, Arc::new(VetoActivate));
    let open = add(&registry, "open").await;

    let locked = registry
        .add_tab(NewTab::new("Locked", "/locked"), true)
        .await
        .unwrap();

    assert!(registry.has_tab(&locked.id));
    assert_eq!(registry.active_id(), Some(open.id));
}

struct GuardRemoval;

#[async_trait]
impl LifecycleHooks for GuardRemoval {
    async fn before_remove(&self, tab: &Tab) -> HookResult<HookDecision> {
        if tab.meta.get("dirty") == Some(&json!(true)) {
            Ok(HookDecision::Veto)
        } else {
            Ok(HookDecision::Continue)
        }
    }
}

#[tokio::test]
async fn test_before_remove_veto_leaves_tab() {
    let registry = registry_with_hooks(5, Arc::new(GuardRemoval));
    let dirty = registry
        .add_tab(NewTab::new("Draft", "/draft").with_meta("dirty", true), true)
        .await
        .unwrap();

    assert!(!registry.remove_tab(&dirty.id).await);
    assert!(registry.has_tab(&dirty.id));
    assert_eq!(registry.active_id(), Some(dirty.id));
}

#[tokio::test]
async fn test_eviction_skips_vetoed_candidates() {
    let registry = registry_with_hooks(2, Arc::new(GuardRemoval));
    let dirty = registry
        .add_tab(NewTab::new("Draft", "/draft").with_meta("dirty", true), true)
        .await
        .unwrap();
    let clean = add(&registry, "clean").await;

    let newest = add(&registry, "newest").await;

    assert!(registry.has_tab(&dirty.id));
    assert!(!registry.has_tab(&clean.id));
    assert!(registry.has_tab(&newest.id));
}

#[tokio::test]
async fn test_eviction_fails_when_every_candidate_vetoed() {
    let registry = registry_with_hooks(1, Arc::new(GuardRemoval));
    registry
        .add_tab(NewTab::new("Draft", "/draft").with_meta("dirty", true), true)
        .await
        .unwrap();

    assert!(registry.add_tab(NewTab::new("x", "/x"), true).await.is_none());
    assert_eq!(
        registry.last_error().unwrap().kind,
        ValidationErrorKind::MaxTabsExceeded
    );
}

struct CreatePolicy;

#[async_trait]
impl LifecycleHooks for CreatePolicy {
    async fn before_create(&self, candidate: &Tab) -> HookResult<CreateDecision> {
        match candidate.route.as_str() {
            "/admin" => Ok(CreateDecision::Veto),
            "/broken" => Err("policy lookup failed".into()),
            "/short" => {
                let mut replaced = candidate.clone();
                replaced.title = "Shortened".to_string();
                replaced.temporary = true;
                Ok(CreateDecision::Replace(replaced))
            }
            "/blank" => {
                let mut replaced = candidate.clone();
                replaced.title.clear();
                Ok(CreateDecision::Replace(replaced))
            }
            _ => Ok(CreateDecision::Continue),
        }
    }
}

#[tokio::test]
async fn test_before_create_veto_and_failure_abort() {
    let registry = registry_with_hooks(5, Arc::new(CreatePolicy));

    assert!(registry.add_tab(NewTab::new("Admin", "/admin"), true).await.is_none());
    assert!(registry.add_tab(NewTab::new("Broken", "/broken"), true).await.is_none());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_before_create_replacement_is_used() {
    let registry = registry_with_hooks(5, Arc::new(CreatePolicy));

    let tab = registry
        .add_tab(NewTab::new("Original", "/short"), true)
        .await
        .unwrap();

    assert_eq!(tab.title, "Shortened");
    assert!(tab.temporary);
    assert_eq!(registry.get_tab(&tab.id).unwrap().title, "Shortened");
}

#[tokio::test]
async fn test_invalid_replacement_is_rejected() {
    let registry = registry_with_hooks(5, Arc::new(CreatePolicy));

    assert!(registry.add_tab(NewTab::new("Blank", "/blank"), true).await.is_none());
    assert_eq!(
        registry.last_error().unwrap().kind,
        ValidationErrorKind::MissingTitle
    );
}

struct FailingAfterHooks {
    calls: AtomicUsize,
}

#[async_trait]
impl LifecycleHooks for FailingAfterHooks {
    async fn after_create(&self, _tab: &Tab) -> HookResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err("analytics offline".into())
    }

    async fn after_remove(&self, _tab: &Tab) -> HookResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("after_remove exploded");
    }

    async fn after_update(&self, _tab: &Tab, _previous: &Tab) -> HookResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err("nope".into())
    }
}

#[tokio::test]
async fn test_after_hook_failures_do_not_roll_back() {
    let hooks = Arc::new(FailingAfterHooks {
        calls: AtomicUsize::new(0),
    });
    let registry = registry_with_hooks(5, hooks.clone());

    let tab = add(&registry, "a").await;
    assert!(registry.has_tab(&tab.id));

    assert!(registry.update_tab(&tab.id, TabPatch::new().title("A1")).await);
    assert_eq!(registry.get_tab(&tab.id).unwrap().title, "A1");

    assert!(registry.remove_tab(&tab.id).await);
    assert!(registry.is_empty());
    assert_eq!(hooks.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_update_merges_fields() {
    let (registry, _) = registry_with(5, RemovalStrategy::Lru);
    let tab = add(&registry, "a").await;

    let mut meta = Fields::new();
    meta.insert("badge".to_string(), json!(3));
    assert!(
        registry
            .update_tab(
                &tab.id,
                TabPatch::new()
                    .title("Renamed")
                    .status(crate::tab::TabStatus::Modified)
                    .meta(meta.clone())
            )
            .await
    );

    let updated = registry.get_tab(&tab.id).unwrap();
    assert_eq!(updated.id, tab.id);
    assert_eq!(updated.title, "Renamed");
    assert_eq!(updated.route, "/a");
    assert_eq!(updated.status, crate::tab::TabStatus::Modified);
    assert_eq!(updated.meta, meta);
}

#[tokio::test]
async fn test_update_rejects_invalid_merges() {
    let (registry, _) = registry_with(5, RemovalStrategy::Lru);
    let a = add(&registry, "a").await;
    add(&registry, "b").await;

    assert!(!registry.update_tab("missing", TabPatch::new().title("x")).await);
    assert_eq!(registry.last_error().unwrap().kind, ValidationErrorKind::NotFound);

    assert!(!registry.update_tab(&a.id, TabPatch::new().title(" ")).await);
    assert_eq!(
        registry.last_error().unwrap().kind,
        ValidationErrorKind::MissingTitle
    );

    assert!(!registry.update_tab(&a.id, TabPatch::new().route("/b")).await);
    assert_eq!(registry.last_error().unwrap().kind, ValidationErrorKind::Duplicate);
    assert_eq!(registry.get_tab(&a.id).unwrap().route, "/a");
}

#[tokio::test]
async fn test_reorder_requires_exact_permutation() {
    let (registry, _) = registry_with(5, RemovalStrategy::Lru);
    let a = add(&registry, "a").await;
    let b = add(&registry, "b").await;
    let c = add(&registry, "c").await;
    let original = ids(&registry);

    assert!(!registry.reorder_tabs(&[a.id.clone(), b.id.clone()]).await);
    assert!(!registry.reorder_tabs(&[a.id.clone(), a.id.clone(), b.id.clone()]).await);
    assert!(!registry.reorder_tabs(&[a.id.clone(), b.id.clone(), "x".to_string()]).await);
    assert_eq!(ids(&registry), original);

    assert!(registry.reorder_tabs(&[c.id.clone(), a.id.clone(), b.id.clone()]).await);
    assert_eq!(ids(&registry), vec![c.id.clone(), a.id, b.id]);
    assert_eq!(registry.active_id(), Some(c.id));
}

#[tokio::test]
async fn test_queries() {
    let (registry, _) = registry_with(5, RemovalStrategy::Lru);
    let a = add(&registry, "a").await;
    let b = registry
        .add_tab(NewTab::new("b", "/items").with_query("page", 2), true)
        .await
        .unwrap();
    let c = add(&registry, "c").await;

    assert_eq!(registry.next_id(&a.id), Some(b.id.clone()));
    assert_eq!(registry.next_id(&c.id), None);
    assert_eq!(registry.previous_id(&b.id), Some(a.id.clone()));
    assert_eq!(registry.previous_id(&a.id), None);
    assert_eq!(registry.next_id("missing"), None);

    assert_eq!(registry.get_by_route("/items", None, None).unwrap().id, b.id);
    let mut query = Fields::new();
    query.insert("page".to_string(), json!(2));
    assert!(registry.get_by_route("/items", None, Some(&query)).is_some());
    query.insert("page".to_string(), json!(3));
    assert!(registry.get_by_route("/items", None, Some(&query)).is_none());
    assert!(registry.get_by_route("/nowhere", None, None).is_none());
}

#[tokio::test]
async fn test_cleanup_removes_idle_tabs() {
    let clock = ManualClock::starting_at_millis(0);
    let config = RegistryConfig::default()
        .with_max_tabs(10)
        .with_auto_cleanup(Duration::from_millis(1_000), Duration::from_millis(500));
    let registry = TabRegistry::builder(config)
        .clock(Arc::new(clock.clone()))
        .build()
        .unwrap();

    let idle = add(&registry, "idle").await;
    let pinned = registry
        .add_tab(NewTab::new("pinned", "/pinned").closable(false), true)
        .await
        .unwrap();
    clock.advance_millis(800);
    let fresh = add(&registry, "fresh").await;
    let active = add(&registry, "active").await;
    clock.advance_millis(800);

    let removed = registry
        .cleanup_expired_tabs(Duration::from_millis(1_000))
        .await;

    assert_eq!(removed, 1);
    assert!(!registry.has_tab(&idle.id));
    assert!(registry.has_tab(&pinned.id));
    assert!(registry.has_tab(&fresh.id));
    assert!(registry.has_tab(&active.id));
}

#[tokio::test]
async fn test_cleanup_disabled_does_nothing() {
    let (registry, clock) = registry_with(5, RemovalStrategy::Lru);
    add(&registry, "a").await;
    add(&registry, "b").await;
    clock.advance_millis(10_000_000);

    assert_eq!(registry.cleanup_expired_tabs(Duration::from_millis(1)).await, 0);
    assert_eq!(registry.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_timer_runs_on_interval() {
    let clock = ManualClock::starting_at_millis(0);
    let config = RegistryConfig::default()
        .with_auto_cleanup(Duration::from_millis(1_000), Duration::from_millis(500));
    let registry = Arc::new(
        TabRegistry::builder(config)
            .clock(Arc::new(clock.clone()))
            .build()
            .unwrap(),
    );

    let stale = add(&registry, "stale").await;
    add(&registry, "current").await;
    clock.advance_millis(5_000);

    let handle = registry.spawn_cleanup().unwrap();
    assert!(handle.is_running());
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert!(!registry.has_tab(&stale.id));
    assert_eq!(registry.len(), 1);
    handle.stop();
}

#[tokio::test]
async fn test_spawn_cleanup_requires_auto_cleanup() {
    let (registry, _) = registry_with(5, RemovalStrategy::Lru);
    assert!(Arc::new(registry).spawn_cleanup().is_none());
}

#[tokio::test]
async fn test_close_other_and_directional() {
    let (registry, _) = registry_with(10, RemovalStrategy::Lru);
    let home = registry
        .add_tab(NewTab::new("home", "/").closable(false), true)
        .await
        .unwrap();
    let a = add(&registry, "a").await;
    let b = add(&registry, "b").await;
    let c = add(&registry, "c").await;
    let d = add(&registry, "d").await;

    assert_eq!(registry.close_tabs_to_right(&c.id).await, 1);
    assert!(!registry.has_tab(&d.id));
    assert_eq!(registry.active_id(), Some(c.id.clone()));

    assert_eq!(registry.close_tabs_to_left(&b.id).await, 1);
    assert_eq!(ids(&registry), vec![home.id.clone(), b.id.clone(), c.id.clone()]);

    assert_eq!(registry.close_other_tabs(&b.id).await, 1);
    assert_eq!(ids(&registry), vec![home.id.clone(), b.id.clone()]);
    assert_eq!(registry.active_id(), Some(b.id));

    assert_eq!(registry.close_all_tabs().await, 1);
    assert_eq!(ids(&registry), vec![home.id.clone()]);
    assert_eq!(registry.active_id(), Some(home.id));

    assert_eq!(registry.close_other_tabs("missing").await, 0);
    assert_eq!(registry.last_error().unwrap().kind, ValidationErrorKind::NotFound);
    let _ = a;
}

#[tokio::test]
async fn test_events_surface_navigation() {
    let (registry, _) = registry_with(5, RemovalStrategy::Lru);
    let mut events = registry.events();

    let a = add(&registry, "a").await;
    let b = add(&registry, "b").await;
    registry.remove_tab(&b.id).await;

    let mut navigations = Vec::new();
    let mut created = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            TabEvent::Navigate { route, .. } => navigations.push(route),
            TabEvent::Created(_) => created += 1,
            _ => {}
        }
    }

    assert_eq!(created, 2);
    assert_eq!(navigations, vec!["/a", "/b", "/a"]);
    assert_eq!(registry.active_id(), Some(a.id));
}

#[tokio::test]
async fn test_eviction_emits_evicted_removal() {
    let (registry, _) = registry_with(1, RemovalStrategy::Lru);
    let a = add(&registry, "a").await;
    let mut events = registry.events();

    add(&registry, "b").await;

    let mut evicted = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let TabEvent::Removed { tab, evicted: true } = event {
            evicted.push(tab.id);
        }
    }
    assert_eq!(evicted, vec![a.id]);
}

#[tokio::test]
async fn test_subscribe_sees_changes() {
    let (registry, _) = registry_with(5, RemovalStrategy::Lru);
    let mut rx = registry.subscribe();
    assert!(!rx.has_changed().unwrap());

    add(&registry, "a").await;

    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().len(), 1);
}

#[tokio::test]
async fn test_hydrate_only_when_empty() {
    let (source, _) = registry_with(5, RemovalStrategy::Lru);
    add(&source, "a").await;
    let b = add(&source, "b").await;
    let saved = source.snapshot();

    let (target, _) = registry_with(5, RemovalStrategy::Lru);
    assert!(target.hydrate(saved.clone()).await);
    assert_eq!(target.snapshot(), saved);
    assert_eq!(target.active_id(), Some(b.id));

    // Already populated: first state wins.
    assert!(!target.hydrate(TabState::default()).await);
    assert_eq!(target.len(), 2);
}

#[tokio::test]
async fn test_hydrate_sanitizes_state() {
    let (source, _) = registry_with(10, RemovalStrategy::Lru);
    for name in ["a", "b", "c", "d"] {
        add(&source, name).await;
    }
    let mut state = source.snapshot();
    let duplicate = state.tabs[0].clone();
    state.tabs.push(duplicate);
    state.active_id = Some("gone".to_string());

    let (target, _) = registry_with(3, RemovalStrategy::Lru);
    assert!(target.hydrate(state).await);

    assert_eq!(target.len(), 3);
    assert!(target.active_id().is_none());
    assert_invariants(&target);
}

#[tokio::test]
async fn test_clear_empties_registry() {
    let (registry, _) = registry_with(5, RemovalStrategy::Lru);
    add(&registry, "a").await;
    add(&registry, "b").await;

    registry.clear().await;

    assert!(registry.is_empty());
    assert!(registry.active_id().is_none());
}

#[tokio::test]
async fn test_errors_can_be_cleared() {
    let (registry, _) = registry_with(5, RemovalStrategy::Lru);
    registry.add_tab(NewTab::new("", "/"), true).await;
    registry.add_tab(NewTab::new("x", ""), true).await;
    assert_eq!(registry.errors().len(), 2);

    registry.clear_errors();
    assert!(registry.errors().is_empty());
}

struct SlowCreate;

#[async_trait]
impl LifecycleHooks for SlowCreate {
    async fn before_create(&self, _candidate: &Tab) -> HookResult<CreateDecision> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(CreateDecision::Continue)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_are_serialized() {
    let registry = Arc::new(registry_with_hooks(2, Arc::new(SlowCreate)));
    let mut events = registry.events();

    let tasks: Vec<_> = (0..6)
        .map(|i| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry
                    .add_tab(NewTab::new(format!("t{i}"), format!("/t{i}")), true)
                    .await
            })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().is_some());
    }

    assert_eq!(registry.len(), 2);
    assert_invariants(&registry);

    let mut evictions = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, TabEvent::Removed { evicted: true, .. }) {
            evictions += 1;
        }
    }
    assert_eq!(evictions, 4);
}

#[tokio::test]
async fn test_build_rejects_invalid_config() {
    let result = TabRegistry::new(RegistryConfig::default().with_max_tabs(0));
    assert!(result.is_err());
}
