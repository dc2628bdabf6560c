//! Per-match ordered writer between the live ledger and the match store.
//!
//! Scoring never awaits storage: committed events and refreshed headers are
//! queued here and written by one task per match, in the order they were
//! produced.

use std::{
    future::Future,
    sync::{Arc, Weak},
};

use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot},
    time::sleep,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        match_store::MatchStore,
        models::{MatchEntity, ScoreEventEntity},
        storage::{StorageError, StorageResult},
    },
    services::sse_events::broadcast_sync_failed,
    state::{AppState, SharedState},
};

/// Work item handled by a match writer.
#[derive(Debug)]
pub enum PersistenceCommand {
    /// Conditionally append one event to the stored log.
    Append(ScoreEventEntity),
    /// Upsert the match header.
    SaveMatch(MatchEntity),
    /// Resolved once every command queued before it has been handled.
    Flush(oneshot::Sender<()>),
    /// Storage and ledger agree again; resume appending.
    Resync,
}

/// Sending half of a match writer.
#[derive(Clone)]
pub struct PersistenceQueue {
    sender: mpsc::UnboundedSender<PersistenceCommand>,
}

impl PersistenceQueue {
    fn spawn(state: &SharedState, match_id: Uuid) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(Arc::downgrade(state), match_id, receiver));
        Self { sender }
    }

    fn send(&self, command: PersistenceCommand) -> Result<(), PersistenceCommand> {
        self.sender.send(command).map_err(|err| err.0)
    }
}

#[derive(Debug, Error)]
enum WriteFailure {
    #[error(transparent)]
    Rejected(StorageError),
    #[error("gave up after {attempts} attempts: {reason}")]
    Exhausted { attempts: u32, reason: String },
}

/// Queue `command` on the writer of `match_id`, starting the writer if needed.
pub fn enqueue(state: &SharedState, match_id: Uuid, command: PersistenceCommand) {
    let queue = state
        .persistence_queues()
        .entry(match_id)
        .or_insert_with(|| PersistenceQueue::spawn(state, match_id))
        .clone();

    if let Err(command) = queue.send(command) {
        warn!(%match_id, "persistence writer stopped; restarting it");
        let queue = PersistenceQueue::spawn(state, match_id);
        state.persistence_queues().insert(match_id, queue.clone());
        if queue.send(command).is_err() {
            warn!(%match_id, "persistence writer refused a command");
        }
    }
}

/// Queue the events appended by a ledger update followed by the refreshed header.
pub fn enqueue_update(
    state: &SharedState,
    match_id: Uuid,
    events: Vec<ScoreEventEntity>,
    header: MatchEntity,
) {
    for event in events {
        enqueue(state, match_id, PersistenceCommand::Append(event));
    }
    enqueue(state, match_id, PersistenceCommand::SaveMatch(header));
}

/// Wait until everything queued for `match_id` so far has been handled.
pub async fn flush(state: &SharedState, match_id: Uuid) {
    if !state.persistence_queues().contains_key(&match_id) {
        return;
    }
    let (tx, rx) = oneshot::channel();
    enqueue(state, match_id, PersistenceCommand::Flush(tx));
    let _ = rx.await;
}

/// Stop the writer of a match once its queue has drained.
pub fn retire(state: &SharedState, match_id: Uuid) {
    state.persistence_queues().remove(&match_id);
}

async fn run_writer(
    state: Weak<AppState>,
    match_id: Uuid,
    mut receiver: mpsc::UnboundedReceiver<PersistenceCommand>,
) {
    // Set once an append is lost; later appends would land at the wrong position.
    let mut diverged = false;

    while let Some(command) = receiver.recv().await {
        let Some(state) = state.upgrade() else {
            break;
        };

        match command {
            PersistenceCommand::Append(event) => {
                let sequence = event.sequence;
                if diverged {
                    warn!(%match_id, sequence, "skipping append until the match is reconciled");
                    broadcast_sync_failed(
                        &state,
                        match_id,
                        Some(sequence),
                        "stored log diverged; reconciliation required".into(),
                    );
                    continue;
                }
                match write(&state, |store| store.append_event(event.clone())).await {
                    Ok(committed) => debug!(%match_id, sequence = committed, "event persisted"),
                    Err(WriteFailure::Rejected(StorageError::Conflict { .. }))
                        if already_stored(&state, &event).await =>
                    {
                        debug!(%match_id, sequence, "event already committed by its author");
                    }
                    Err(err) => {
                        diverged = true;
                        warn!(%match_id, sequence, error = %err, "failed to persist event");
                        broadcast_sync_failed(&state, match_id, Some(sequence), err.to_string());
                    }
                }
            }
            PersistenceCommand::SaveMatch(entity) => {
                if let Err(err) = write(&state, |store| store.save_match(entity.clone())).await {
                    warn!(%match_id, error = %err, "failed to persist match header");
                    broadcast_sync_failed(&state, match_id, None, err.to_string());
                }
            }
            PersistenceCommand::Flush(done) => {
                let _ = done.send(());
            }
            PersistenceCommand::Resync => {
                if diverged {
                    info!(%match_id, "match reconciled; resuming persistence");
                }
                diverged = false;
            }
        }
    }

    debug!(%match_id, "persistence writer stopped");
}

/// Whether the stored log holds `event` itself at its sequence.
async fn already_stored(state: &AppState, event: &ScoreEventEntity) -> bool {
    let Some(store) = state.match_store().await else {
        return false;
    };
    match store.load_events(event.match_id).await {
        Ok(stored) => stored
            .iter()
            .any(|candidate| candidate.sequence == event.sequence && candidate.id == event.id),
        Err(err) => {
            warn!(match_id = %event.match_id, error = %err, "failed to read back stored log");
            false
        }
    }
}

/// Run `op` against the installed store, retrying transient failures with
/// exponential backoff.
async fn write<T, F, Fut>(state: &AppState, mut op: F) -> Result<T, WriteFailure>
where
    F: FnMut(Arc<dyn MatchStore>) -> Fut,
    Fut: Future<Output = StorageResult<T>>,
{
    let policy = state.config().persistence;
    let mut delay = policy.initial_backoff;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let reason = match state.match_store().await {
            Some(store) => match op(store).await {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(WriteFailure::Rejected(err)),
                Err(err) => err.to_string(),
            },
            None => "storage unavailable (degraded mode)".to_string(),
        };

        if attempt >= policy.max_attempts {
            return Err(WriteFailure::Exhausted {
                attempts: attempt,
                reason,
            });
        }

        debug!(attempt, reason = %reason, "storage write failed; retrying");
        sleep(delay).await;
        delay = policy.next_backoff(delay);
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            match_store::memory::MemoryMatchStore,
            models::{EventKindEntity, SideEntity},
        },
        services::sse_events::EVENT_SYNC_FAILED,
    };

    fn goal(match_id: Uuid, sequence: u64) -> ScoreEventEntity {
        ScoreEventEntity {
            id: Uuid::new_v4(),
            match_id,
            team: SideEntity::A,
            kind: EventKindEntity::Goal,
            target: None,
            sequence,
            occurred_at: SystemTime::now(),
        }
    }

    fn fast_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.persistence.max_attempts = 2;
        config.persistence.initial_backoff = Duration::from_millis(1);
        config.persistence.max_backoff = Duration::from_millis(2);
        config
    }

    #[tokio::test]
    async fn events_are_written_in_order() {
        let store = MemoryMatchStore::new();
        let state = AppState::with_store(fast_config(), Arc::new(store.clone()));
        let match_id = Uuid::new_v4();

        for sequence in 1..=3 {
            enqueue(&state, match_id, PersistenceCommand::Append(goal(match_id, sequence)));
        }
        flush(&state, match_id).await;

        let stored = store.load_events(match_id).await.unwrap();
        let sequences: Vec<u64> = stored.iter().map(|event| event.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn lost_append_is_reported_and_blocks_followers() {
        let store = MemoryMatchStore::new();
        let state = AppState::with_store(fast_config(), Arc::new(store.clone()));
        let match_id = Uuid::new_v4();
        let mut stream = state.match_sse(match_id).subscribe();

        store.set_offline(true);
        enqueue(&state, match_id, PersistenceCommand::Append(goal(match_id, 1)));
        flush(&state, match_id).await;
        store.set_offline(false);

        enqueue(&state, match_id, PersistenceCommand::Append(goal(match_id, 2)));
        flush(&state, match_id).await;

        for expected in [1, 2] {
            let message = stream.try_recv().unwrap();
            assert_eq!(message.event.as_deref(), Some(EVENT_SYNC_FAILED));
            let body: serde_json::Value = serde_json::from_str(&message.data).unwrap();
            assert_eq!(body["sequence"], expected);
        }
        assert!(store.load_events(match_id).await.unwrap().is_empty());

        enqueue(&state, match_id, PersistenceCommand::Resync);
        enqueue(&state, match_id, PersistenceCommand::Append(goal(match_id, 1)));
        flush(&state, match_id).await;
        assert_eq!(store.load_events(match_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn events_committed_elsewhere_are_not_conflicts() {
        let store = MemoryMatchStore::new();
        let state = AppState::with_store(fast_config(), Arc::new(store.clone()));
        let match_id = Uuid::new_v4();
        let mut stream = state.match_sse(match_id).subscribe();

        let remote = goal(match_id, 1);
        store.append_event(remote.clone()).await.unwrap();
        enqueue(&state, match_id, PersistenceCommand::Append(remote));
        enqueue(&state, match_id, PersistenceCommand::Append(goal(match_id, 2)));
        flush(&state, match_id).await;

        assert!(stream.try_recv().is_err());
        assert_eq!(store.load_events(match_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn conflicts_are_not_retried() {
        let store = MemoryMatchStore::new();
        let state = AppState::with_store(fast_config(), Arc::new(store.clone()));
        let match_id = Uuid::new_v4();
        store.append_event(goal(match_id, 1)).await.unwrap();

        let err = write(&state, |store| store.append_event(goal(match_id, 1)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WriteFailure::Rejected(StorageError::Conflict { sequence: 1, .. })
        ));
    }
}
