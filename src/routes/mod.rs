use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod health;
pub mod matches;
pub mod rankings;
pub mod scoring;
pub mod sse;

/// Every REST, SSE and documentation route, bound to the shared state.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(matches::router())
        .merge(scoring::router())
        .merge(rankings::router())
        .merge(docs::router());

    api_router.with_state(state)
}
