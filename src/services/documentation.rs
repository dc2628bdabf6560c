use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Baby Foot Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::lobby_stream,
        crate::routes::sse::match_stream,
        crate::routes::matches::create_match,
        crate::routes::matches::list_matches,
        crate::routes::matches::get_match,
        crate::routes::matches::start_match,
        crate::routes::matches::pause_match,
        crate::routes::matches::resume_match,
        crate::routes::matches::finish_match,
        crate::routes::matches::cancel_match,
        crate::routes::scoring::record_goal,
        crate::routes::scoring::undo_last_goal,
        crate::routes::scoring::current_score,
        crate::routes::scoring::controls,
        crate::routes::scoring::event_log,
        crate::routes::scoring::ingest_event,
        crate::routes::scoring::reconcile,
        crate::routes::rankings::rankings,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::matches::CreateMatchRequest,
            crate::dto::matches::MatchSummary,
            crate::dto::score::GoalRequest,
            crate::dto::score::ScoreEventDto,
            crate::dto::score::ScoreStateResponse,
            crate::dto::score::ScoreUpdateResponse,
            crate::dto::score::ControlsResponse,
            crate::dto::score::EventLogResponse,
            crate::dto::score::IngestResponse,
            crate::dto::score::ReconcileResponse,
            crate::dto::ranking::PlayerRanking,
            crate::dto::ranking::RankingSortDto,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::ScoreEventBroadcast,
            crate::dto::sse::ScoreStateEvent,
            crate::dto::sse::PhaseChangedEvent,
            crate::dto::sse::MatchCreatedEvent,
            crate::dto::sse::SyncFailedEvent,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "matches", description = "Match registration and lifecycle"),
        (name = "scoring", description = "Goals, undo and live score"),
        (name = "sync", description = "Events committed by other contributors"),
        (name = "rankings", description = "Player statistics"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_the_scoring_routes() {
        let doc = ApiDoc::openapi();
        for path in ["/matches/{id}/goals", "/matches/{id}/events", "/rankings", "/sse/lobby"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
