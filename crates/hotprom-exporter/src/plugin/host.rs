//! Host functions for plugin scripts: environment, files, HTTP, JSON.
//!
//! Everything here runs on the blocking worker that executes the script, so
//! plain blocking I/O is fine. Reads are size-capped and HTTP requests are
//! bounded by whatever is left of the plugin deadline.
//!
//! ```rhai
//! fn apply(registry) {
//!     let token = env("ASSETS_TOKEN");
//!     let body = http_get("http://inventory.local/api/systems?token=" + token);
//!     let systems = parse_json(body);
//!     registry.gauge("inventory_systems", "systems listed").set(systems.total);
//! }
//! ```

use std::io::Read;
use std::time::{Duration, Instant};

use rhai::{Dynamic, Engine, EvalAltResult, ImmutableString, Map};

type ScriptResult<T> = std::result::Result<T, Box<EvalAltResult>>;

/// Largest file or response body a script may read.
pub const MAX_BODY_BYTES: u64 = 4 * 1024 * 1024;

pub(crate) fn register(engine: &mut Engine, deadline: Instant) {
    engine
        .register_fn("env", env)
        .register_fn("read_file", read_file)
        .register_fn("parse_json", parse_json)
        .register_fn("http_get", move |url: ImmutableString| {
            http_get(url.as_str(), deadline)
        });
}

/// Value of an environment variable, or `()` when unset.
fn env(name: ImmutableString) -> Dynamic {
    match std::env::var(name.as_str()) {
        Ok(v) => v.into(),
        Err(_) => Dynamic::UNIT,
    }
}

fn read_file(path: ImmutableString) -> ScriptResult<String> {
    let file = std::fs::File::open(path.as_str())
        .map_err(|e| format!("read_file {path}: {e}"))?;
    read_capped(file).map_err(|e| format!("read_file {path}: {e}").into())
}

fn parse_json(text: ImmutableString) -> ScriptResult<Map> {
    Engine::new_raw().parse_json(text.as_str(), true)
}

fn http_get(url: &str, deadline: Instant) -> ScriptResult<String> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(format!("http_get {url}: plugin deadline already passed").into());
    }

    let fail = |e: reqwest::Error| -> Box<EvalAltResult> { format!("http_get {url}: {e}").into() };
    let client = reqwest::blocking::Client::builder()
        .timeout(remaining)
        .connect_timeout(remaining.min(Duration::from_secs(5)))
        .build()
        .map_err(fail)?;
    let resp = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(fail)?;

    read_capped(resp).map_err(|e| format!("http_get {url}: {e}").into())
}

fn read_capped(src: impl Read) -> std::io::Result<String> {
    let mut buf = String::new();
    let read = src.take(MAX_BODY_BYTES + 1).read_to_string(&mut buf)?;
    if read as u64 > MAX_BODY_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("larger than {MAX_BODY_BYTES} bytes"),
        ));
    }
    Ok(buf)
}
