//! Rhai script plugins.
//!
//! A plugin file is a Rhai script that defines `fn apply(registry)`. Loading
//! compiles the script, checks the entry point, and runs its top-level
//! statements once; the result is a [`ScriptProvider`] that owns the compiled
//! AST. Each refresh calls `apply` on a blocking worker with a fresh engine
//! whose progress hook aborts the script once the plugin deadline passes.
//! Scripts reach outside data through the functions in [`super::host`].
//!
//! ```rhai
//! fn apply(registry) {
//!     let g = registry.gauge("queue_depth", "items waiting");
//!     g.set(10);
//! }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use prometheus::{Counter, Gauge, GaugeVec};
use rhai::{Array, CallFnOptions, Dynamic, Engine, EvalAltResult, ImmutableString, Scope, AST};

use hotprom_core::error::{ExporterError, Result};
use hotprom_core::{MetricProvider, MetricRegistry, PluginId};

use crate::plugin::host;

/// Function every plugin script must define.
pub const ENTRY_POINT: &str = "apply";

type ScriptResult<T> = std::result::Result<T, Box<EvalAltResult>>;

/// Registry handle passed to `apply`. Scoped to the calling plugin so
/// registrations are attributed to it.
#[derive(Clone)]
pub struct ScriptRegistry {
    owner: PluginId,
    registry: Arc<MetricRegistry>,
}

impl ScriptRegistry {
    fn gauge(&mut self, name: ImmutableString, help: ImmutableString) -> ScriptResult<Gauge> {
        self.registry
            .gauge(&self.owner, name.as_str(), help.as_str())
            .map_err(|e| e.to_string().into())
    }

    fn counter(&mut self, name: ImmutableString, help: ImmutableString) -> ScriptResult<Counter> {
        self.registry
            .counter(&self.owner, name.as_str(), help.as_str())
            .map_err(|e| e.to_string().into())
    }

    fn gauge_vec(
        &mut self,
        name: ImmutableString,
        help: ImmutableString,
        labels: Array,
    ) -> ScriptResult<GaugeVec> {
        let labels = strings(&labels);
        let refs: Vec<&str> = labels.iter().map(String::as_str).collect();
        self.registry
            .gauge_vec(&self.owner, name.as_str(), help.as_str(), &refs)
            .map_err(|e| e.to_string().into())
    }
}

fn strings(values: &Array) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn counter_inc_by(c: &mut Counter, v: f64) -> ScriptResult<()> {
    if v < 0.0 {
        return Err(format!("counter cannot decrease (inc_by {v})").into());
    }
    c.inc_by(v);
    Ok(())
}

fn gauge_vec_set(v: &mut GaugeVec, values: Array, n: f64) -> ScriptResult<()> {
    let values = strings(&values);
    let refs: Vec<&str> = values.iter().map(String::as_str).collect();
    let g = v
        .get_metric_with_label_values(&refs)
        .map_err(|e| -> Box<EvalAltResult> { e.to_string().into() })?;
    g.set(n);
    Ok(())
}

/// Build an engine exposing the metric API and the host functions.
/// `print`/`debug` go to tracing tagged with the plugin name.
fn build_engine(id: &PluginId, deadline: Instant) -> Engine {
    let mut engine = Engine::new();

    let tag = id.name();
    engine.on_print(move |s| tracing::info!(plugin = %tag, "{s}"));
    let tag = id.name();
    engine.on_debug(move |s, _src, pos| tracing::debug!(plugin = %tag, %pos, "{s}"));
    engine.on_progress(move |_ops| {
        if Instant::now() >= deadline {
            Some(Dynamic::UNIT)
        } else {
            None
        }
    });

    host::register(&mut engine, deadline);

    engine
        .register_type_with_name::<ScriptRegistry>("Registry")
        .register_fn("gauge", ScriptRegistry::gauge)
        .register_fn("counter", ScriptRegistry::counter)
        .register_fn("gauge_vec", ScriptRegistry::gauge_vec);

    engine
        .register_type_with_name::<Gauge>("Gauge")
        .register_fn("set", |g: &mut Gauge, v: f64| g.set(v))
        .register_fn("set", |g: &mut Gauge, v: i64| g.set(v as f64))
        .register_fn("add", |g: &mut Gauge, v: f64| g.add(v))
        .register_fn("add", |g: &mut Gauge, v: i64| g.add(v as f64))
        .register_fn("inc", |g: &mut Gauge| g.inc())
        .register_fn("dec", |g: &mut Gauge| g.dec())
        .register_fn("get", |g: &mut Gauge| g.get());

    engine
        .register_type_with_name::<Counter>("Counter")
        .register_fn("inc", |c: &mut Counter| c.inc())
        .register_fn("inc_by", counter_inc_by)
        .register_fn("inc_by", |c: &mut Counter, v: i64| counter_inc_by(c, v as f64))
        .register_fn("get", |c: &mut Counter| c.get());

    engine
        .register_type_with_name::<GaugeVec>("GaugeVec")
        .register_fn("set", gauge_vec_set)
        .register_fn("set", |v: &mut GaugeVec, values: Array, n: i64| {
            gauge_vec_set(v, values, n as f64)
        });

    engine
}

fn check_entry_point(id: &PluginId, ast: &AST) -> Result<()> {
    let arities: Vec<usize> = ast
        .iter_functions()
        .filter(|f| f.name == ENTRY_POINT)
        .map(|f| f.params.len())
        .collect();

    if arities.is_empty() {
        return Err(ExporterError::load(id, "missing fn apply(registry)"));
    }
    if !arities.contains(&1) {
        return Err(ExporterError::load(
            id,
            format!("apply must take exactly one parameter (registry), found arity {arities:?}"),
        ));
    }
    Ok(())
}

fn terminated(e: &EvalAltResult) -> bool {
    match e {
        EvalAltResult::ErrorTerminated(..) => true,
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => terminated(inner),
        _ => false,
    }
}

fn describe(e: &EvalAltResult, timeout: Duration) -> String {
    if terminated(e) {
        format!("timed out after {}ms", timeout.as_millis())
    } else {
        e.to_string()
    }
}

struct Compiled {
    id: PluginId,
    ast: AST,
    timeout: Duration,
}

impl Compiled {
    fn call(&self, registry: Arc<MetricRegistry>) -> Result<()> {
        let engine = build_engine(&self.id, Instant::now() + self.timeout);
        let handle = ScriptRegistry {
            owner: self.id.clone(),
            registry,
        };
        let mut scope = Scope::new();
        let options = CallFnOptions::new().eval_ast(false);

        engine
            .call_fn_with_options::<Dynamic>(options, &mut scope, &self.ast, ENTRY_POINT, (handle,))
            .map(|_| ())
            .map_err(|e| ExporterError::execution(&self.id, describe(&e, self.timeout)))
    }
}

/// A loaded script plugin instance.
pub struct ScriptProvider {
    inner: Arc<Compiled>,
}

impl ScriptProvider {
    /// Compile, validate, and construct a plugin. Blocking; top-level script
    /// statements run here, bounded by `timeout`.
    pub fn compile(id: PluginId, source: &str, timeout: Duration) -> Result<Self> {
        let engine = build_engine(&id, Instant::now() + timeout);
        let ast = engine
            .compile(source)
            .map_err(|e| ExporterError::load(&id, e))?;
        check_entry_point(&id, &ast)?;
        engine
            .run_ast(&ast)
            .map_err(|e| ExporterError::load(&id, describe(&e, timeout)))?;

        Ok(Self {
            inner: Arc::new(Compiled { id, ast, timeout }),
        })
    }
}

#[async_trait]
impl MetricProvider for ScriptProvider {
    fn id(&self) -> &PluginId {
        &self.inner.id
    }

    async fn apply(&self, registry: Arc<MetricRegistry>) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.call(registry))
            .await
            .map_err(|e| ExporterError::execution(&self.inner.id, format!("worker failed: {e}")))?
    }
}
