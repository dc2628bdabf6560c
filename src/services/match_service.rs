use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dto::matches::{CreateMatchRequest, MatchListQuery, MatchSummary},
    error::ServiceError,
    services::{persistence, sse_events::broadcast_match_created},
    state::{
        SharedSession, SharedState,
        session::{MatchMode, MatchSession},
        state_machine::{MatchEvent, MatchPhase},
        transitions::run_transition_with_broadcast,
    },
};

/// Register a new match and announce it on the lobby stream.
pub async fn create_match(
    state: &SharedState,
    request: CreateMatchRequest,
) -> Result<MatchSummary, ServiceError> {
    let store = state.require_match_store().await?;
    let rules = request.rules(state.config().default_rules);
    let session = MatchSession::new(
        MatchMode::from(request.mode),
        request.team_a.into(),
        request.team_b.into(),
        request
            .venue
            .map(|venue| venue.trim().to_owned())
            .filter(|venue| !venue.is_empty()),
        rules,
        state.config().reorder.max_pending_events,
    );

    let entity = session.to_entity();
    store.save_match(entity.clone()).await?;

    let match_id = session.id;
    state
        .sessions()
        .insert(match_id, Arc::new(Mutex::new(session)));

    let summary = MatchSummary::from(entity);
    info!(%match_id, winning_score = rules.winning_score, "match created");
    broadcast_match_created(state, summary.clone());
    Ok(summary)
}

/// Live session of a match, rehydrated from storage when it is not loaded yet.
pub async fn load_session(
    state: &SharedState,
    match_id: Uuid,
) -> Result<SharedSession, ServiceError> {
    if let Some(session) = state.sessions().get(&match_id) {
        return Ok(session.clone());
    }

    let store = state.require_match_store().await?;
    let entity = store
        .find_match(match_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("match `{match_id}`")))?;
    let events = store.load_events(match_id).await?;
    let replayed = events.len();
    let session = MatchSession::from_storage(
        entity,
        events,
        state.config().reorder.max_pending_events,
    )
    .map_err(|err| ServiceError::InvalidState(format!("stored log of `{match_id}`: {err}")))?;
    debug!(%match_id, replayed, "match rehydrated from storage");

    let shared = state
        .sessions()
        .entry(match_id)
        .or_insert_with(|| Arc::new(Mutex::new(session)))
        .clone();
    Ok(shared)
}

/// Current view of one match.
pub async fn get_match(state: &SharedState, match_id: Uuid) -> Result<MatchSummary, ServiceError> {
    let session = load_session(state, match_id).await?;
    let guard = session.lock().await;
    Ok(guard.to_entity().into())
}

/// Match history, newest first. Loaded sessions override their stored header.
pub async fn list_matches(
    state: &SharedState,
    query: MatchListQuery,
) -> Result<Vec<MatchSummary>, ServiceError> {
    let store = state.require_match_store().await?;
    let stored = store.list_matches().await?;
    let wanted = query.phase.map(MatchPhase::from);

    let mut summaries = Vec::with_capacity(stored.len());
    for entity in stored {
        let live = state.sessions().get(&entity.id).map(|entry| entry.clone());
        let entity = match live {
            Some(session) => session.lock().await.to_entity(),
            None => entity,
        };
        if wanted.is_some_and(|phase| MatchPhase::from(entity.phase) != phase) {
            continue;
        }
        summaries.push(MatchSummary::from(entity));
    }

    Ok(summaries)
}

/// Open the match for scoring.
pub async fn start_match(state: &SharedState, match_id: Uuid) -> Result<MatchSummary, ServiceError> {
    transition(state, match_id, MatchEvent::Start).await
}

/// Freeze scoring until the match resumes.
pub async fn pause_match(state: &SharedState, match_id: Uuid) -> Result<MatchSummary, ServiceError> {
    transition(state, match_id, MatchEvent::Pause).await
}

/// Reopen a paused match.
pub async fn resume_match(
    state: &SharedState,
    match_id: Uuid,
) -> Result<MatchSummary, ServiceError> {
    transition(state, match_id, MatchEvent::Resume).await
}

/// Confirm the result and seal the ledger.
pub async fn finish_match(
    state: &SharedState,
    match_id: Uuid,
) -> Result<MatchSummary, ServiceError> {
    transition(state, match_id, MatchEvent::Finish).await
}

/// Abandon the match and seal the ledger.
pub async fn cancel_match(
    state: &SharedState,
    match_id: Uuid,
) -> Result<MatchSummary, ServiceError> {
    transition(state, match_id, MatchEvent::Cancel).await
}

/// Persist the header as it will look after `event`, then commit the phase.
async fn transition(
    state: &SharedState,
    match_id: Uuid,
    event: MatchEvent,
) -> Result<MatchSummary, ServiceError> {
    let session = load_session(state, match_id).await?;
    let store = state.require_match_store().await?;

    let writer_state = state.clone();
    let stored = run_transition_with_broadcast(state, &session, event, |preview| async move {
        // Queued score writes must land before the header they precede.
        persistence::flush(&writer_state, match_id).await;
        store.save_match(preview.clone()).await?;
        Ok::<_, ServiceError>(preview)
    })
    .await?;

    let phase = MatchPhase::from(stored.phase);
    info!(%match_id, event = ?event, phase = ?phase, "match phase changed");

    if phase.is_terminal() {
        persistence::retire(state, match_id);
        state.sessions().remove(&match_id);
        return Ok(stored.into());
    }

    let guard = session.lock().await;
    Ok(guard.to_entity().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        dao::match_store::{MatchStore, memory::MemoryMatchStore},
        dto::matches::MatchPhaseDto,
        state::AppState,
    };

    fn create_request() -> CreateMatchRequest {
        serde_json::from_value(serde_json::json!({
            "mode": "1v1",
            "team_a": {"name": "Reds", "players": ["Ana"]},
            "team_b": {"name": "Blues", "players": ["Bo"]},
            "rules": {"winning_score": 3},
        }))
        .unwrap()
    }

    fn state_with_store() -> (SharedState, MemoryMatchStore) {
        let store = MemoryMatchStore::new();
        let state = AppState::with_store(AppConfig::default(), Arc::new(store.clone()));
        (state, store)
    }

    #[tokio::test]
    async fn created_match_is_stored_and_announced() {
        let (state, store) = state_with_store();
        let mut lobby = state.lobby_sse().subscribe();

        let summary = create_match(&state, create_request()).await.unwrap();

        assert_eq!(summary.phase, MatchPhaseDto::NotStarted);
        assert_eq!(summary.rules.winning_score, 3);
        assert!(store.find_match(summary.id).await.unwrap().is_some());
        let announced = lobby.try_recv().unwrap();
        assert_eq!(announced.event.as_deref(), Some("match.created"));
    }

    #[tokio::test]
    async fn creation_fails_without_storage() {
        let state = AppState::new(AppConfig::default());
        let err = create_match(&state, create_request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Degraded));
    }

    #[tokio::test]
    async fn lifecycle_is_persisted_and_validated() {
        let (state, store) = state_with_store();
        let id = create_match(&state, create_request()).await.unwrap().id;

        assert!(matches!(
            pause_match(&state, id).await,
            Err(ServiceError::InvalidState(_))
        ));

        let started = start_match(&state, id).await.unwrap();
        assert_eq!(started.phase, MatchPhaseDto::InProgress);
        assert!(started.started_at.is_some());

        pause_match(&state, id).await.unwrap();
        let stored = store.find_match(id).await.unwrap().unwrap();
        assert_eq!(MatchPhase::from(stored.phase), MatchPhase::Paused);

        let finished = finish_match(&state, id).await.unwrap();
        assert_eq!(finished.phase, MatchPhaseDto::Finished);
        assert!(finished.ended_at.is_some());
        assert!(state.sessions().get(&id).is_none());

        // Rehydrated from storage after eviction.
        let reloaded = get_match(&state, id).await.unwrap();
        assert_eq!(reloaded.phase, MatchPhaseDto::Finished);
        assert!(cancel_match(&state, id).await.is_err());
    }

    #[tokio::test]
    async fn listing_filters_by_phase() {
        let (state, _store) = state_with_store();
        let first = create_match(&state, create_request()).await.unwrap().id;
        create_match(&state, create_request()).await.unwrap();
        start_match(&state, first).await.unwrap();

        let all = list_matches(&state, MatchListQuery::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let running = list_matches(
            &state,
            MatchListQuery {
                phase: Some(MatchPhaseDto::InProgress),
            },
        )
        .await
        .unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].id, first);
    }

    #[tokio::test]
    async fn unknown_match_is_not_found() {
        let (state, _store) = state_with_store();
        let err = get_match(&state, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
