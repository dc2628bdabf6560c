use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::matches::{CreateMatchRequest, MatchListQuery, MatchSummary},
    error::AppError,
    services::match_service,
    state::SharedState,
};

/// Routes registering matches and driving their lifecycle.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/matches", post(create_match).get(list_matches))
        .route("/matches/{id}", get(get_match))
        .route("/matches/{id}/start", post(start_match))
        .route("/matches/{id}/pause", post(pause_match))
        .route("/matches/{id}/resume", post(resume_match))
        .route("/matches/{id}/finish", post(finish_match))
        .route("/matches/{id}/cancel", post(cancel_match))
}

/// Register a new match between two teams.
#[utoipa::path(
    post,
    path = "/matches",
    tag = "matches",
    request_body = CreateMatchRequest,
    responses(
        (status = 201, description = "Match created", body = MatchSummary),
        (status = 400, description = "Invalid teams or rules"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn create_match(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<CreateMatchRequest>>,
) -> Result<(StatusCode, Json<MatchSummary>), AppError> {
    let summary = match_service::create_match(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// Match history, newest first.
#[utoipa::path(
    get,
    path = "/matches",
    tag = "matches",
    params(MatchListQuery),
    responses(
        (status = 200, description = "Matches", body = [MatchSummary])
    )
)]
pub async fn list_matches(
    State(state): State<SharedState>,
    Query(query): Query<MatchListQuery>,
) -> Result<Json<Vec<MatchSummary>>, AppError> {
    let matches = match_service::list_matches(&state, query).await?;
    Ok(Json(matches))
}

#[utoipa::path(
    get,
    path = "/matches/{id}",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Match found", body = MatchSummary),
        (status = 404, description = "Unknown match")
    )
)]
pub async fn get_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchSummary>, AppError> {
    Ok(Json(match_service::get_match(&state, id).await?))
}

/// Open the match for scoring.
#[utoipa::path(
    post,
    path = "/matches/{id}/start",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Match started", body = MatchSummary),
        (status = 409, description = "Transition not allowed")
    )
)]
pub async fn start_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchSummary>, AppError> {
    Ok(Json(match_service::start_match(&state, id).await?))
}

/// Suspend play.
#[utoipa::path(
    post,
    path = "/matches/{id}/pause",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Match paused", body = MatchSummary),
        (status = 409, description = "Transition not allowed")
    )
)]
pub async fn pause_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchSummary>, AppError> {
    Ok(Json(match_service::pause_match(&state, id).await?))
}

/// Resume a paused match.
#[utoipa::path(
    post,
    path = "/matches/{id}/resume",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Match resumed", body = MatchSummary),
        (status = 409, description = "Transition not allowed")
    )
)]
pub async fn resume_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchSummary>, AppError> {
    Ok(Json(match_service::resume_match(&state, id).await?))
}

/// Confirm the result; the ledger is sealed afterwards.
#[utoipa::path(
    post,
    path = "/matches/{id}/finish",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Match finished", body = MatchSummary),
        (status = 409, description = "Transition not allowed")
    )
)]
pub async fn finish_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchSummary>, AppError> {
    Ok(Json(match_service::finish_match(&state, id).await?))
}

/// Abandon the match; the ledger is sealed afterwards.
#[utoipa::path(
    post,
    path = "/matches/{id}/cancel",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Match cancelled", body = MatchSummary),
        (status = 409, description = "Transition not allowed")
    )
)]
pub async fn cancel_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MatchSummary>, AppError> {
    Ok(Json(match_service::cancel_match(&state, id).await?))
}
