//! Metric registry shared by all plugins.
//!
//! Wraps a `prometheus::Registry` with get-or-register semantics keyed by
//! metric name, so a plugin that asks for the same gauge on every refresh (or
//! after a reload) gets the already-registered handle back instead of a
//! duplicate-registration error. Each metric remembers the plugin that last
//! claimed it, which lets the exporter drop a plugin's metrics on demand.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use prometheus::core::Collector;
use prometheus::{Counter, Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};

use crate::error::{ExporterError, Result};
use crate::provider::PluginId;

/// Kinds of metric a plugin may register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
    GaugeVec,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
            MetricKind::GaugeVec => "gauge_vec",
        }
    }
}

#[derive(Clone)]
enum Handle {
    Gauge(Gauge),
    Counter(Counter),
    GaugeVec(GaugeVec),
}

impl Handle {
    fn kind(&self) -> MetricKind {
        match self {
            Handle::Gauge(_) => MetricKind::Gauge,
            Handle::Counter(_) => MetricKind::Counter,
            Handle::GaugeVec(_) => MetricKind::GaugeVec,
        }
    }

    fn collector(&self) -> Box<dyn Collector> {
        match self {
            Handle::Gauge(m) => Box::new(m.clone()),
            Handle::Counter(m) => Box::new(m.clone()),
            Handle::GaugeVec(m) => Box::new(m.clone()),
        }
    }
}

/// What a registration looks like from the outside: same shape means the
/// existing collector can be handed back as is.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Shape {
    kind: MetricKind,
    help: String,
    labels: Vec<String>,
}

impl Shape {
    fn new(kind: MetricKind, help: &str, labels: &[&str]) -> Self {
        Self {
            kind,
            help: help.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    /// Kind and label names; help text alone never blocks a handover.
    fn compatible(&self, other: &Shape) -> bool {
        self.kind == other.kind && self.labels == other.labels
    }

    fn describe(&self) -> String {
        if self.labels.is_empty() {
            self.kind.as_str().to_string()
        } else {
            format!("{}[{}]", self.kind.as_str(), self.labels.join(","))
        }
    }
}

struct Registered {
    owner: PluginId,
    shape: Shape,
    handle: Handle,
}

/// Anything that can produce exposition text for the serving cache.
pub trait Exposition: Send + Sync {
    fn render(&self) -> Result<String>;
}

pub struct MetricRegistry {
    inner: Registry,
    metrics: DashMap<String, Registered>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self {
            inner: Registry::new(),
            metrics: DashMap::new(),
        }
    }

    pub fn gauge(&self, owner: &PluginId, name: &str, help: &str) -> Result<Gauge> {
        let shape = Shape::new(MetricKind::Gauge, help, &[]);
        let handle = self.get_or_register(owner, name, shape, || {
            Ok(Handle::Gauge(Gauge::with_opts(Opts::new(name, help))?))
        })?;
        match handle {
            Handle::Gauge(g) => Ok(g),
            other => Err(kind_mismatch(owner, name, other.kind(), MetricKind::Gauge)),
        }
    }

    pub fn counter(&self, owner: &PluginId, name: &str, help: &str) -> Result<Counter> {
        let shape = Shape::new(MetricKind::Counter, help, &[]);
        let handle = self.get_or_register(owner, name, shape, || {
            Ok(Handle::Counter(Counter::with_opts(Opts::new(name, help))?))
        })?;
        match handle {
            Handle::Counter(c) => Ok(c),
            other => Err(kind_mismatch(owner, name, other.kind(), MetricKind::Counter)),
        }
    }

    pub fn gauge_vec(
        &self,
        owner: &PluginId,
        name: &str,
        help: &str,
        labels: &[&str],
    ) -> Result<GaugeVec> {
        let shape = Shape::new(MetricKind::GaugeVec, help, labels);
        let handle = self.get_or_register(owner, name, shape, || {
            Ok(Handle::GaugeVec(GaugeVec::new(Opts::new(name, help), labels)?))
        })?;
        match handle {
            Handle::GaugeVec(v) => Ok(v),
            other => Err(kind_mismatch(owner, name, other.kind(), MetricKind::GaugeVec)),
        }
    }

    /// Return the metric registered under `name`, creating it if absent.
    ///
    /// A compatible request (same kind and label names) hands back the
    /// existing handle and moves ownership to `owner`, so a renamed plugin
    /// file keeps its metrics. An incompatible request from the current owner
    /// replaces the collector (a reloaded plugin changed the metric); from
    /// any other plugin it is rejected.
    fn get_or_register(
        &self,
        owner: &PluginId,
        name: &str,
        shape: Shape,
        make: impl FnOnce() -> prometheus::Result<Handle>,
    ) -> Result<Handle> {
        match self.metrics.entry(name.to_string()) {
            Entry::Occupied(mut e) => {
                let reg = e.get_mut();
                if &reg.owner == owner && reg.shape != shape {
                    let handle = make().map_err(|err| ExporterError::execution(owner, err))?;
                    self.replace(name, &reg.handle, &handle)
                        .map_err(|err| ExporterError::execution(owner, err))?;
                    tracing::info!(
                        metric = %name,
                        plugin = %owner,
                        from = %reg.shape.describe(),
                        to = %shape.describe(),
                        "metric re-registered with a new shape"
                    );
                    reg.shape = shape;
                    reg.handle = handle.clone();
                    return Ok(handle);
                }
                if !reg.shape.compatible(&shape) {
                    return Err(conflict(owner, name, reg, &shape));
                }
                if &reg.owner != owner {
                    tracing::debug!(metric = %name, from = %reg.owner, to = %owner, "metric ownership moved");
                    reg.owner = owner.clone();
                }
                Ok(reg.handle.clone())
            }
            Entry::Vacant(e) => {
                let handle = make().map_err(|err| ExporterError::execution(owner, err))?;
                self.inner
                    .register(handle.collector())
                    .map_err(|err| ExporterError::execution(owner, err))?;
                e.insert(Registered {
                    owner: owner.clone(),
                    shape,
                    handle: handle.clone(),
                });
                Ok(handle)
            }
        }
    }

    /// Swap `old` for `new` in the prometheus registry. If `new` is refused
    /// the old collector goes back in.
    fn replace(&self, name: &str, old: &Handle, new: &Handle) -> prometheus::Result<()> {
        self.inner.unregister(old.collector())?;
        if let Err(err) = self.inner.register(new.collector()) {
            if let Err(e) = self.inner.register(old.collector()) {
                tracing::warn!(metric = %name, error = %e, "could not restore previous collector");
            }
            return Err(err);
        }
        Ok(())
    }

    /// Names of metrics currently owned by `owner`, sorted.
    pub fn owned_by(&self, owner: &PluginId) -> Vec<String> {
        let mut names: Vec<String> = self
            .metrics
            .iter()
            .filter(|r| &r.value().owner == owner)
            .map(|r| r.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Unregister every metric owned by `owner`. Returns how many were removed.
    pub fn unregister_owned_by(&self, owner: &PluginId) -> usize {
        let mut removed = 0;
        for name in self.owned_by(owner) {
            if let Some((_, reg)) = self.metrics.remove(&name) {
                if let Err(e) = self.inner.unregister(reg.handle.collector()) {
                    tracing::warn!(metric = %name, error = %e, "unregister failed");
                }
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Underlying prometheus registry (read-only use).
    pub fn prometheus(&self) -> &Registry {
        &self.inner
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Exposition for MetricRegistry {
    fn render(&self) -> Result<String> {
        encode_text(&self.inner)
    }
}

/// Encode a prometheus registry in the text exposition format.
pub fn encode_text(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let families = registry.gather();
    let mut buf = Vec::new();
    encoder
        .encode(&families, &mut buf)
        .map_err(|e| ExporterError::Render(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| ExporterError::Render(e.to_string()))
}

fn conflict(owner: &PluginId, name: &str, existing: &Registered, want: &Shape) -> ExporterError {
    ExporterError::execution(
        owner,
        format!(
            "metric {name} is registered by {} as {}, requested as {}",
            existing.owner,
            existing.shape.describe(),
            want.describe()
        ),
    )
}

fn kind_mismatch(owner: &PluginId, name: &str, have: MetricKind, want: MetricKind) -> ExporterError {
    ExporterError::execution(
        owner,
        format!(
            "metric {name} is registered as {}, requested as {}",
            have.as_str(),
            want.as_str()
        ),
    )
}
