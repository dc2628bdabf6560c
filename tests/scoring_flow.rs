use std::sync::Arc;

use baby_foot_back::{
    config::AppConfig,
    dao::match_store::{MatchStore, memory::MemoryMatchStore},
    dto::matches::{CreateMatchRequest, MatchPhaseDto, SideDto},
    services::{match_service, persistence, scoring_service},
    state::{AppState, ledger::Side},
};
use uuid::Uuid;

fn request() -> CreateMatchRequest {
    serde_json::from_value(serde_json::json!({
        "mode": "2v2",
        "team_a": {"name": "Reds", "players": ["Ana", "Bo"]},
        "team_b": {"name": "Blues", "players": ["Cy", "Di"]},
        "venue": "Office",
        "rules": {"winning_score": 3},
    }))
    .unwrap()
}

#[tokio::test]
async fn ledger_survives_a_restart() {
    let store = MemoryMatchStore::new();
    let first = AppState::with_store(AppConfig::default(), Arc::new(store.clone()));

    let id = match_service::create_match(&first, request()).await.unwrap().id;
    match_service::start_match(&first, id).await.unwrap();
    for team in [Side::A, Side::B, Side::A] {
        scoring_service::record_goal(&first, id, team).await.unwrap();
    }
    scoring_service::undo_last_goal(&first, id).await.unwrap();
    persistence::flush(&first, id).await;

    // A second process sharing the store sees the same history.
    let second = AppState::with_store(AppConfig::default(), Arc::new(store.clone()));
    let score = scoring_service::current_state(&second, id).await.unwrap();
    assert_eq!((score.score_a, score.score_b), (1, 1));
    assert_eq!(score.phase, MatchPhaseDto::InProgress);

    let log = scoring_service::event_log(&second, id).await.unwrap();
    let sequences: Vec<u64> = log.events.iter().map(|event| event.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4]);

    let next = scoring_service::record_goal(&second, id, Side::B).await.unwrap();
    assert_eq!(next.event.sequence, 5);
}

#[tokio::test]
async fn winner_is_the_first_to_reach_the_threshold() {
    let store = MemoryMatchStore::new();
    let state = AppState::with_store(AppConfig::default(), Arc::new(store.clone()));
    let id = match_service::create_match(&state, request()).await.unwrap().id;
    match_service::start_match(&state, id).await.unwrap();

    for team in [Side::B, Side::B, Side::A, Side::A, Side::B] {
        scoring_service::record_goal(&state, id, team).await.unwrap();
    }
    let score = scoring_service::current_state(&state, id).await.unwrap();
    assert_eq!(score.winner, Some(SideDto::B));
    assert_eq!(score.phase, MatchPhaseDto::Completed);

    let finished = match_service::finish_match(&state, id).await.unwrap();
    assert_eq!(finished.phase, MatchPhaseDto::Finished);
    assert_eq!(finished.score.winner, Some(SideDto::B));
    assert_eq!(finished.venue.as_deref(), Some("Office"));

    let stored = store.find_match(id).await.unwrap().unwrap();
    assert_eq!((stored.score_a, stored.score_b), (2, 3));
    assert_eq!(store.load_events(id).await.unwrap().len(), 5);

    assert!(scoring_service::record_goal(&state, id, Side::A).await.is_err());
}

#[tokio::test]
async fn match_stream_sees_goals_in_order() {
    let state = AppState::with_store(AppConfig::default(), Arc::new(MemoryMatchStore::new()));
    let id = match_service::create_match(&state, request()).await.unwrap().id;
    match_service::start_match(&state, id).await.unwrap();
    let mut stream = state.match_sse(id).subscribe();

    scoring_service::record_goal(&state, id, Side::A).await.unwrap();
    scoring_service::record_goal(&state, id, Side::B).await.unwrap();

    let mut sequences = Vec::new();
    while let Ok(message) = stream.try_recv() {
        if message.event.as_deref() == Some("score.event") {
            let body: serde_json::Value = serde_json::from_str(&message.data).unwrap();
            assert_eq!(body["match_id"], id.to_string());
            sequences.push(body["event"]["sequence"].as_u64().unwrap());
        }
    }
    assert_eq!(sequences, vec![1, 2]);
}

#[tokio::test]
async fn unknown_matches_are_reported() {
    let state = AppState::with_store(AppConfig::default(), Arc::new(MemoryMatchStore::new()));
    assert!(scoring_service::record_goal(&state, Uuid::new_v4(), Side::A).await.is_err());
}
