//! Axum router wiring.

use axum::{routing::get, Router};

use crate::{app_state::AppState, ops};

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new().route("/metrics", get(ops::metrics));
    if state.cfg().server.default_metrics {
        router = router.route("/default-metrics", get(ops::default_metrics));
    }
    router.fallback(ops::status).with_state(state)
}
