use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};

use crate::{
    dto::ranking::{PlayerRanking, RankingQuery},
    error::AppError,
    services::ranking_service,
    state::SharedState,
};

pub fn router() -> Router<SharedState> {
    Router::new().route("/rankings", get(rankings))
}

/// Player leaderboard over finished matches.
#[utoipa::path(
    get,
    path = "/rankings",
    tag = "rankings",
    params(RankingQuery),
    responses(
        (status = 200, description = "Players ordered by the requested criterion", body = [PlayerRanking])
    )
)]
pub async fn rankings(
    State(state): State<SharedState>,
    Query(query): Query<RankingQuery>,
) -> Result<Json<Vec<PlayerRanking>>, AppError> {
    Ok(Json(ranking_service::rankings(&state, query).await?))
}
