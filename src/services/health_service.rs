use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether storage is reachable, logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let mut reachable = false;
    match state.require_match_store().await {
        Ok(store) => match store.health_check().await {
            Ok(()) => reachable = true,
            Err(err) => warn!(error = %err, "storage health check failed"),
        },
        Err(_) => warn!("storage unavailable (degraded mode)"),
    }

    let live_matches = state.sessions().len();
    if reachable && !state.is_degraded() {
        HealthResponse::ok(live_matches)
    } else {
        HealthResponse::degraded(live_matches)
    }
}
