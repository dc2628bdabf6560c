use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::AppError,
    services::sse_service::{self, StreamKind},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/lobby",
    tag = "sse",
    responses((status = 200, description = "Lobby SSE stream", content_type = "text/event-stream", body = String))
)]
/// Stream match creations, phase changes and storage status.
pub async fn lobby_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = sse_service::subscribe_lobby(&state);
    info!("New lobby SSE connection");
    let first = sse_service::handshake(&state, &StreamKind::Lobby, None);
    sse_service::to_sse_stream(state, receiver, StreamKind::Lobby, first)
}

#[utoipa::path(
    get,
    path = "/matches/{id}/stream",
    tag = "sse",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Match SSE stream", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown match")
    )
)]
/// Stream the events, score and phase changes of one match.
pub async fn match_stream(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let (receiver, snapshot) = sse_service::subscribe_match(&state, id).await?;
    info!(match_id = %id, "New match SSE connection");
    let kind = StreamKind::Match(id);
    let first = sse_service::handshake(&state, &kind, Some(snapshot));
    Ok(sse_service::to_sse_stream(state, receiver, kind, first))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse/lobby", get(lobby_stream))
        .route("/matches/{id}/stream", get(match_stream))
}
