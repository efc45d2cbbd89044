/*!
Lifecycle hooks.

Hooks observe and gate registry mutations. `before_*` hooks decide whether
the operation goes ahead; `before_create` can also swap in a replacement
tab. `after_*` hooks run once the mutation is committed and cannot undo it.

A `before_*` hook that returns `Err`, panics or runs past the configured
timeout counts as a veto. The same failures in an `after_*` hook are logged
and dropped.
*/

use crate::observability::{record_event, MetricEvent};
use crate::tab::Tab;
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Error a hook may return.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by every hook.
pub type HookResult<T> = std::result::Result<T, HookError>;

/// Lifecycle stage a hook runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStage {
    BeforeCreate,
    AfterCreate,
    BeforeRemove,
    AfterRemove,
    BeforeActivate,
    AfterActivate,
    AfterUpdate,
}

impl HookStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeCreate => "beforeCreate",
            Self::AfterCreate => "afterCreate",
            Self::BeforeRemove => "beforeRemove",
            Self::AfterRemove => "afterRemove",
            Self::BeforeActivate => "beforeActivate",
            Self::AfterActivate => "afterActivate",
            Self::AfterUpdate => "afterUpdate",
        }
    }
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a gating hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookDecision {
    Continue,
    Veto,
}

/// Outcome of a `before_create` hook.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateDecision {
    Continue,
    Veto,
    /// Create this tab instead of the candidate
    Replace(Tab),
}

/// Caller-supplied lifecycle hooks. Every method defaults to a no-op.
///
/// Hooks may read the registry through its query methods but must not call
/// its mutators: mutations are serialized, so a nested mutation would wait
/// on the one that invoked the hook.
///
/// # Example
/// ```rust
/// use async_trait::async_trait;
/// use tabkeep_core::registry::hooks::{HookDecision, HookResult, LifecycleHooks};
/// use tabkeep_core::Tab;
///
/// struct KeepSettingsOpen;
///
/// #[async_trait]
/// impl LifecycleHooks for KeepSettingsOpen {
///     async fn before_remove(&self, tab: &Tab) -> HookResult<HookDecision> {
///         if tab.route == "/settings" {
///             Ok(HookDecision::Veto)
///         } else {
///             Ok(HookDecision::Continue)
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    async fn before_create(&self, _candidate: &Tab) -> HookResult<CreateDecision> {
        Ok(CreateDecision::Continue)
    }

    async fn after_create(&self, _tab: &Tab) -> HookResult<()> {
        Ok(())
    }

    async fn before_remove(&self, _tab: &Tab) -> HookResult<HookDecision> {
        Ok(HookDecision::Continue)
    }

    async fn after_remove(&self, _tab: &Tab) -> HookResult<()> {
        Ok(())
    }

    async fn before_activate(
        &self,
        _candidate: &Tab,
        _previous: Option<&Tab>,
    ) -> HookResult<HookDecision> {
        Ok(HookDecision::Continue)
    }

    async fn after_activate(&self, _tab: &Tab, _previous: Option<&Tab>) -> HookResult<()> {
        Ok(())
    }

    async fn after_update(&self, _tab: &Tab, _previous: &Tab) -> HookResult<()> {
        Ok(())
    }
}

/// Runs registered hooks in registration order with failure containment.
#[derive(Clone, Default)]
pub(crate) struct HookRunner {
    hooks: Vec<Arc<dyn LifecycleHooks>>,
    timeout: Option<Duration>,
}

impl HookRunner {
    pub(crate) fn new(hooks: Vec<Arc<dyn LifecycleHooks>>, timeout: Option<Duration>) -> Self {
        Self { hooks, timeout }
    }

    pub(crate) fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Await one hook future, turning errors, panics and timeouts into `Err(reason)`.
    async fn invoke<T, F>(&self, stage: HookStage, fut: F) -> Result<T, String>
    where
        F: Future<Output = HookResult<T>>,
    {
        let guarded = AssertUnwindSafe(fut).catch_unwind();
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(stage = %stage, timeout_ms = limit.as_millis() as u64, "Hook timed out");
                    return Err(format!("{stage} hook timed out after {limit:?}"));
                }
            },
            None => guarded.await,
        };

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(stage = %stage, error = %e, "Hook failed");
                Err(e.to_string())
            }
            Err(panic) => {
                let reason = panic_message(&*panic);
                warn!(stage = %stage, panic = %reason, "Hook panicked");
                Err(reason)
            }
        }
    }

    /// Returns the tab to create, or `None` when a hook vetoed.
    pub(crate) async fn before_create(&self, mut candidate: Tab) -> Option<Tab> {
        for hook in &self.hooks {
            let decision = self
                .invoke(HookStage::BeforeCreate, hook.before_create(&candidate))
                .await;
            match decision {
                Ok(CreateDecision::Continue) => {}
                Ok(CreateDecision::Replace(replacement)) => {
                    debug!(original = %candidate.id, replacement = %replacement.id, "beforeCreate replaced tab");
                    candidate = replacement;
                }
                Ok(CreateDecision::Veto) | Err(_) => {
                    debug!(tab_id = %candidate.id, route = %candidate.route, "beforeCreate vetoed");
                    record_event(MetricEvent::HookVeto);
                    return None;
                }
            }
        }
        Some(candidate)
    }

    /// Returns `true` when every hook let the removal through.
    pub(crate) async fn before_remove(&self, tab: &Tab) -> bool {
        for hook in &self.hooks {
            match self.invoke(HookStage::BeforeRemove, hook.before_remove(tab)).await {
                Ok(HookDecision::Continue) => {}
                Ok(HookDecision::Veto) | Err(_) => {
                    debug!(tab_id = %tab.id, "beforeRemove vetoed");
                    record_event(MetricEvent::HookVeto);
                    return false;
                }
            }
        }
        true
    }

    /// Returns `true` when every hook let the activation through.
    pub(crate) async fn before_activate(&self, candidate: &Tab, previous: Option<&Tab>) -> bool {
        for hook in &self.hooks {
            match self
                .invoke(
                    HookStage::BeforeActivate,
                    hook.before_activate(candidate, previous),
                )
                .await
            {
                Ok(HookDecision::Continue) => {}
                Ok(HookDecision::Veto) | Err(_) => {
                    debug!(tab_id = %candidate.id, "beforeActivate vetoed");
                    record_event(MetricEvent::HookVeto);
                    return false;
                }
            }
        }
        true
    }

    pub(crate) async fn after_create(&self, tab: &Tab) {
        for hook in &self.hooks {
            let _ = self.invoke(HookStage::AfterCreate, hook.after_create(tab)).await;
        }
    }

    pub(crate) async fn after_remove(&self, tab: &Tab) {
        for hook in &self.hooks {
            let _ = self.invoke(HookStage::AfterRemove, hook.after_remove(tab)).await;
        }
    }

    pub(crate) async fn after_activate(&self, tab: &Tab, previous: Option<&Tab>) {
        for hook in &self.hooks {
            let _ = self
                .invoke(HookStage::AfterActivate, hook.after_activate(tab, previous))
                .await;
        }
    }

    pub(crate) async fn after_update(&self, tab: &Tab, previous: &Tab) {
        for hook in &self.hooks {
            let _ = self
                .invoke(HookStage::AfterUpdate, hook.after_update(tab, previous))
                .await;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "hook panicked".to_string()
    }
}
