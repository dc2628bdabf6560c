use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::score::{
        ControlsResponse, EventLogResponse, ScoreEventDto, ScoreStateResponse, ScoreUpdateResponse,
    },
    error::ServiceError,
    services::{
        match_service::load_session,
        persistence,
        sse_events::{broadcast_phase_changed, broadcast_score_event, broadcast_score_state},
    },
    state::{
        SharedState,
        ledger::Side,
        session::{MatchSession, ScoreUpdate, event_entity},
    },
};

/// Record a goal for `team`.
pub async fn record_goal(
    state: &SharedState,
    match_id: Uuid,
    team: Side,
) -> Result<ScoreUpdateResponse, ServiceError> {
    let session = load_session(state, match_id).await?;
    let mut guard = session.lock().await;
    let update = guard.record_goal(team)?;
    info!(%match_id, team = ?team, score_a = update.state.score_a, score_b = update.state.score_b, "goal recorded");
    publish_update(state, &guard, &update);
    respond(&guard, update)
}

/// Cancel the most recent active goal.
pub async fn undo_last_goal(
    state: &SharedState,
    match_id: Uuid,
) -> Result<ScoreUpdateResponse, ServiceError> {
    let session = load_session(state, match_id).await?;
    let mut guard = session.lock().await;
    let update = guard.undo_last_goal()?;
    info!(%match_id, score_a = update.state.score_a, score_b = update.state.score_b, "goal undone");
    publish_update(state, &guard, &update);
    respond(&guard, update)
}

/// Score derived from the committed events.
pub async fn current_state(
    state: &SharedState,
    match_id: Uuid,
) -> Result<ScoreStateResponse, ServiceError> {
    let session = load_session(state, match_id).await?;
    let guard = session.lock().await;
    Ok(ScoreStateResponse::new(match_id, guard.phase(), guard.state()))
}

/// Which scoring actions are legal right now.
pub async fn legal_actions(
    state: &SharedState,
    match_id: Uuid,
) -> Result<ControlsResponse, ServiceError> {
    let session = load_session(state, match_id).await?;
    let guard = session.lock().await;
    Ok(guard.controls().into())
}

/// Committed history of the match, in sequence order.
pub async fn event_log(
    state: &SharedState,
    match_id: Uuid,
) -> Result<EventLogResponse, ServiceError> {
    let session = load_session(state, match_id).await?;
    let guard = session.lock().await;
    let ledger = guard.ledger();
    Ok(EventLogResponse {
        match_id,
        events: ledger.events().iter().map(ScoreEventDto::from).collect(),
        pending: ledger.pending_len(),
    })
}

/// Fan a ledger change out to subscribers, then hand it to the persistence queue.
///
/// Must be called while the session lock is held so writes are queued in
/// sequence order.
pub(crate) fn publish_update(state: &SharedState, session: &MatchSession, update: &ScoreUpdate) {
    let match_id = session.id;
    for event in &update.appended {
        broadcast_score_event(state, match_id, event);
    }
    broadcast_score_state(state, match_id, session.phase(), update.state);
    if let Some(phase) = update.phase_change {
        info!(%match_id, phase = ?phase, "match phase followed the score");
        broadcast_phase_changed(state, match_id, phase);
    }
    for rejection in &update.rejected {
        warn!(%match_id, error = %rejection, "buffered event dropped");
    }

    let events = update
        .appended
        .iter()
        .map(|event| event_entity(match_id, event))
        .collect();
    persistence::enqueue_update(state, match_id, events, session.to_entity());
}

fn respond(
    session: &MatchSession,
    update: ScoreUpdate,
) -> Result<ScoreUpdateResponse, ServiceError> {
    let event = update
        .appended
        .last()
        .ok_or_else(|| ServiceError::InvalidState("no event was appended".into()))?;
    Ok(ScoreUpdateResponse {
        event: ScoreEventDto::from(event),
        state: ScoreStateResponse::new(session.id, session.phase(), update.state),
    })
}
