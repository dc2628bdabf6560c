use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::score::{
        ControlsResponse, EventLogResponse, GoalRequest, IngestOutcomeDto, IngestResponse,
        ReconcileResponse, ScoreEventDto, ScoreStateResponse, ScoreUpdateResponse,
    },
    error::AppError,
    services::{scoring_service, sync_service},
    state::SharedState,
};

/// Routes recording goals and exposing the score of a match.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/matches/{id}/goals", post(record_goal))
        .route("/matches/{id}/undo", post(undo_last_goal))
        .route("/matches/{id}/score", get(current_score))
        .route("/matches/{id}/controls", get(controls))
        .route("/matches/{id}/events", get(event_log).post(ingest_event))
        .route("/matches/{id}/reconcile", post(reconcile))
}

/// Record a goal for one side.
#[utoipa::path(
    post,
    path = "/matches/{id}/goals",
    tag = "scoring",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = GoalRequest,
    responses(
        (status = 200, description = "Goal recorded", body = ScoreUpdateResponse),
        (status = 409, description = "Match not accepting goals")
    )
)]
pub async fn record_goal(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<GoalRequest>,
) -> Result<Json<ScoreUpdateResponse>, AppError> {
    let update = scoring_service::record_goal(&state, id, payload.team.into()).await?;
    Ok(Json(update))
}

/// Cancel the latest active goal.
#[utoipa::path(
    post,
    path = "/matches/{id}/undo",
    tag = "scoring",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Goal undone", body = ScoreUpdateResponse),
        (status = 409, description = "Nothing to undo or undo not allowed")
    )
)]
pub async fn undo_last_goal(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScoreUpdateResponse>, AppError> {
    Ok(Json(scoring_service::undo_last_goal(&state, id).await?))
}

#[utoipa::path(
    get,
    path = "/matches/{id}/score",
    tag = "scoring",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses((status = 200, description = "Current score", body = ScoreStateResponse))
)]
pub async fn current_score(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScoreStateResponse>, AppError> {
    Ok(Json(scoring_service::current_state(&state, id).await?))
}

/// Scoring buttons the referee console may enable.
#[utoipa::path(
    get,
    path = "/matches/{id}/controls",
    tag = "scoring",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses((status = 200, description = "Legal actions", body = ControlsResponse))
)]
pub async fn controls(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ControlsResponse>, AppError> {
    Ok(Json(scoring_service::legal_actions(&state, id).await?))
}

#[utoipa::path(
    get,
    path = "/matches/{id}/events",
    tag = "scoring",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses((status = 200, description = "Committed events", body = EventLogResponse))
)]
pub async fn event_log(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<EventLogResponse>, AppError> {
    Ok(Json(scoring_service::event_log(&state, id).await?))
}

/// Feed an event committed by another contributor.
#[utoipa::path(
    post,
    path = "/matches/{id}/events",
    tag = "sync",
    params(("id" = Uuid, Path, description = "Match identifier")),
    request_body = ScoreEventDto,
    responses(
        (status = 200, description = "Applied, duplicate or reconciled", body = IngestResponse),
        (status = 202, description = "Buffered until the missing event arrives", body = IngestResponse),
        (status = 409, description = "Event contradicts the ledger")
    )
)]
pub async fn ingest_event(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ScoreEventDto>,
) -> Result<(StatusCode, Json<IngestResponse>), AppError> {
    let response = sync_service::ingest(&state, id, payload).await?;
    let status = match response.outcome {
        IngestOutcomeDto::Buffered => StatusCode::ACCEPTED,
        _ => StatusCode::OK,
    };
    Ok((status, Json(response)))
}

/// Rebuild the ledger from the stored log.
#[utoipa::path(
    post,
    path = "/matches/{id}/reconcile",
    tag = "sync",
    params(("id" = Uuid, Path, description = "Match identifier")),
    responses(
        (status = 200, description = "Ledger rebuilt", body = ReconcileResponse),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn reconcile(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReconcileResponse>, AppError> {
    Ok(Json(sync_service::reconcile(&state, id).await?))
}
