/*!
Observability for Tabkeep.

- Structured logging setup on top of `tracing-subscriber`
- Prometheus counters for registry and persistence activity (`metrics` feature)
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
use tracing::subscriber::set_global_default;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{Result, TabkeepError};

/// Events counted by the metrics layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MetricEvent {
    TabCreated,
    TabEvicted,
    HookVeto,
    SnapshotWritten,
    SyncError,
}

/// Count `event`; a no-op unless the `metrics` feature is enabled.
#[cfg(feature = "metrics")]
pub(crate) fn record_event(event: MetricEvent) {
    if let Some(metrics) = TabkeepMetrics::global() {
        metrics.record(event);
    }
}

#[cfg(not(feature = "metrics"))]
#[inline]
pub(crate) fn record_event(_event: MetricEvent) {}

#[cfg(feature = "metrics")]
static METRICS: OnceLock<Option<TabkeepMetrics>> = OnceLock::new();

/// Counters for Tabkeep operations
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct TabkeepMetrics {
    pub tabs_created_total: Counter,
    pub tabs_evicted_total: Counter,
    pub hook_vetoes_total: Counter,
    pub snapshot_writes_total: Counter,
    pub sync_errors_total: Counter,

    registry: Registry,
}

#[cfg(feature = "metrics")]
impl TabkeepMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        Ok(Self {
            tabs_created_total: register_counter(
                &registry,
                "tabkeep_tabs_created_total",
                "Tabs added to the registry",
            )?,
            tabs_evicted_total: register_counter(
                &registry,
                "tabkeep_tabs_evicted_total",
                "Tabs evicted to make room for new ones",
            )?,
            hook_vetoes_total: register_counter(
                &registry,
                "tabkeep_hook_vetoes_total",
                "Operations cancelled by a lifecycle hook",
            )?,
            snapshot_writes_total: register_counter(
                &registry,
                "tabkeep_snapshot_writes_total",
                "Snapshots written to the key-value store",
            )?,
            sync_errors_total: register_counter(
                &registry,
                "tabkeep_sync_errors_total",
                "Recorded persistence failures",
            )?,
            registry,
        })
    }

    /// Get or initialize the global metrics instance
    ///
    /// Returns `None` if the counters could not be registered; the failure
    /// is logged once.
    pub fn global() -> Option<&'static TabkeepMetrics> {
        METRICS
            .get_or_init(|| match Self::new() {
                Ok(metrics) => Some(metrics),
                Err(e) => {
                    tracing::error!("Failed to initialize Tabkeep metrics: {e}");
                    None
                }
            })
            .as_ref()
    }

    fn record(&self, event: MetricEvent) {
        let counter = match event {
            MetricEvent::TabCreated => &self.tabs_created_total,
            MetricEvent::TabEvicted => &self.tabs_evicted_total,
            MetricEvent::HookVeto => &self.hook_vetoes_total,
            MetricEvent::SnapshotWritten => &self.snapshot_writes_total,
            MetricEvent::SyncError => &self.sync_errors_total,
        };
        counter.inc();
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| TabkeepError::Observability(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer).map_err(|e| {
            TabkeepError::Observability(format!("Failed to convert metrics to string: {e}"))
        })
    }
}

#[cfg(feature = "metrics")]
fn register_counter(registry: &Registry, name: &str, help: &str) -> Result<Counter> {
    let counter = Counter::new(name, help)
        .map_err(|e| TabkeepError::Observability(format!("Failed to create {name}: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| TabkeepError::Observability(format!("Failed to register {name}: {e}")))?;
    Ok(counter)
}

fn directive(raw: &str) -> Result<Directive> {
    raw.parse()
        .map_err(|e| TabkeepError::Observability(format!("Invalid log directive {raw}: {e}")))
}

/// Build the log filter: `RUST_LOG` plus `info` for Tabkeep's own targets.
fn env_filter() -> Result<EnvFilter> {
    Ok(EnvFilter::from_default_env()
        .add_directive(directive("tabkeep_core=info")?)
        .add_directive(directive("tabkeep=info")?))
}

/// Initialize the global tracing subscriber
///
/// # Arguments
/// * `json` - Emit one JSON object per event instead of human-readable lines
///
/// # Returns
/// An error if a global subscriber is already installed
pub fn init_observability(json: bool) -> Result<()> {
    #[cfg(feature = "metrics")]
    TabkeepMetrics::global();

    let filter = env_filter()?;
    let installed = if json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_current_span(false);
        set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);
        set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
    };

    installed.map_err(|e| {
        TabkeepError::Observability(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::info!("Tabkeep observability initialized");
    Ok(())
}

/// Initialize observability with JSON output
pub fn init_default_observability() -> Result<()> {
    init_observability(true)
}
