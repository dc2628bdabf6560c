use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::{
        matches::MatchSummary,
        score::{ScoreEventDto, ScoreStateResponse},
        sse::{
            MatchCreatedEvent, PhaseChangedEvent, ScoreEventBroadcast, ScoreStateEvent,
            ServerEvent, SyncFailedEvent, SystemStatus,
        },
    },
    state::{
        SharedState,
        ledger::{MatchState, ScoreEvent},
        state_machine::MatchPhase,
    },
};

/// An event was appended to a match ledger.
pub const EVENT_SCORE_EVENT: &str = "score.event";
/// Recomputed score of a match.
pub const EVENT_SCORE_STATE: &str = "score.state";
/// A match changed phase.
pub const EVENT_MATCH_PHASE: &str = "match.phase";
/// A match was registered.
pub const EVENT_MATCH_CREATED: &str = "match.created";
/// An event could not be committed to storage.
pub const EVENT_SYNC_FAILED: &str = "sync.failed";
/// Degraded mode was entered or left.
pub const EVENT_SYSTEM_STATUS: &str = "system.status";

/// Broadcast a freshly committed ledger event to the match stream.
pub fn broadcast_score_event(state: &SharedState, match_id: Uuid, event: &ScoreEvent) {
    let payload = ScoreEventBroadcast {
        match_id,
        event: ScoreEventDto::from(event),
    };
    send_match_event(state, match_id, EVENT_SCORE_EVENT, &payload);
}

/// Broadcast the recomputed score of a match.
pub fn broadcast_score_state(
    state: &SharedState,
    match_id: Uuid,
    phase: MatchPhase,
    score: MatchState,
) {
    let payload = ScoreStateEvent(ScoreStateResponse::new(match_id, phase, score));
    send_match_event(state, match_id, EVENT_SCORE_STATE, &payload);
}

/// Broadcast a lifecycle phase change on the match stream and the lobby.
pub fn broadcast_phase_changed(state: &SharedState, match_id: Uuid, phase: MatchPhase) {
    let payload = PhaseChangedEvent {
        match_id,
        phase: phase.into(),
    };
    send_match_event(state, match_id, EVENT_MATCH_PHASE, &payload);
    send_lobby_event(state, EVENT_MATCH_PHASE, &payload);
}

/// Announce a new match on the lobby.
pub fn broadcast_match_created(state: &SharedState, summary: MatchSummary) {
    let payload = MatchCreatedEvent { summary };
    send_lobby_event(state, EVENT_MATCH_CREATED, &payload);
}

/// Report that a write could not reach storage.
pub fn broadcast_sync_failed(
    state: &SharedState,
    match_id: Uuid,
    sequence: Option<u64>,
    reason: String,
) {
    let payload = SyncFailedEvent {
        match_id,
        sequence,
        reason,
    };
    send_match_event(state, match_id, EVENT_SYNC_FAILED, &payload);
}

/// Tell lobby subscribers whether storage is reachable.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    send_lobby_event(state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

fn send_match_event<T: Serialize>(state: &SharedState, match_id: Uuid, event: &str, payload: &T) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(message) => state.match_sse(match_id).broadcast(message),
        Err(err) => {
            warn!(event, %match_id, error = %err, "failed to serialize match SSE payload")
        }
    }
}

fn send_lobby_event<T: Serialize>(state: &SharedState, event: &str, payload: &T) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(message) => state.lobby_sse().broadcast(message),
        Err(err) => warn!(event, error = %err, "failed to serialize lobby SSE payload"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::{config::AppConfig, state::AppState, state::ledger::Side};

    #[test]
    fn phase_changes_reach_match_and_lobby() {
        let state = AppState::new(AppConfig::default());
        let match_id = Uuid::new_v4();
        let mut lobby = state.lobby_sse().subscribe();
        let mut stream = state.match_sse(match_id).subscribe();

        broadcast_phase_changed(&state, match_id, MatchPhase::Paused);

        let lobby_event = lobby.try_recv().unwrap();
        assert_eq!(lobby_event.event.as_deref(), Some(EVENT_MATCH_PHASE));
        assert!(lobby_event.data.contains("\"paused\""));
        let match_event = stream.try_recv().unwrap();
        assert_eq!(match_event.data, lobby_event.data);
    }

    #[test]
    fn score_events_stay_on_their_match() {
        let state = AppState::new(AppConfig::default());
        let match_id = Uuid::new_v4();
        let mut lobby = state.lobby_sse().subscribe();
        let mut stream = state.match_sse(match_id).subscribe();
        let mut other = state.match_sse(Uuid::new_v4()).subscribe();

        let goal = ScoreEvent::goal(Side::A, 1, SystemTime::now());
        broadcast_score_event(&state, match_id, &goal);

        let message = stream.try_recv().unwrap();
        assert_eq!(message.event.as_deref(), Some(EVENT_SCORE_EVENT));
        let body: serde_json::Value = serde_json::from_str(&message.data).unwrap();
        assert_eq!(body["event"]["sequence"], 1);
        assert!(lobby.try_recv().is_err());
        assert!(other.try_recv().is_err());
    }
}
