use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    match_store::MatchStore,
    models::{MatchEntity, ScoreEventEntity},
    storage::{StorageError, StorageResult},
};

/// Error surfaced while the in-memory store is switched offline.
#[derive(Debug)]
struct Offline;

impl fmt::Display for Offline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("in-memory store is offline")
    }
}

impl std::error::Error for Offline {}

/// Process-local [`MatchStore`], used by default and in tests.
#[derive(Clone, Default)]
pub struct MemoryMatchStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    matches: DashMap<Uuid, MatchEntity>,
    events: DashMap<Uuid, Vec<ScoreEventEntity>>,
    offline: AtomicBool,
}

impl MemoryMatchStore {
    /// Empty, reachable store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with an unavailable error until toggled back.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self, operation: &str) -> StorageResult<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(
                format!("{operation} failed"),
                Offline,
            ));
        }
        Ok(())
    }

    fn append(&self, event: ScoreEventEntity) -> StorageResult<u64> {
        self.check_online("append event")?;
        let mut log = self.inner.events.entry(event.match_id).or_default();
        let expected = log.last().map_or(1, |last| last.sequence + 1);
        if event.sequence != expected {
            return Err(StorageError::Conflict {
                match_id: event.match_id,
                sequence: event.sequence,
            });
        }
        let sequence = event.sequence;
        log.push(event);
        Ok(sequence)
    }
}

impl MatchStore for MemoryMatchStore {
    fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online("save match")?;
            store.inner.matches.insert(entity.id, entity);
            Ok(())
        })
    }

    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online("find match")?;
            Ok(store.inner.matches.get(&id).map(|entry| entry.clone()))
        })
    }

    fn list_matches(&self) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online("list matches")?;
            let mut matches: Vec<MatchEntity> = store
                .inner
                .matches
                .iter()
                .map(|entry| entry.value().clone())
                .collect();
            matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(matches)
        })
    }

    fn append_event(&self, event: ScoreEventEntity) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.append(event) })
    }

    fn load_events(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ScoreEventEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online("load events")?;
            Ok(store
                .inner
                .events
                .get(&match_id)
                .map(|log| log.clone())
                .unwrap_or_default())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.check_online("health check") })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.check_online("reconnect") })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::dao::models::{EventKindEntity, SideEntity};

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

    #[tokio::test]
    async fn append_is_conditional_on_sequence() {
        let store = MemoryMatchStore::new();
        let match_id = Uuid::new_v4();

        assert_eq!(store.append_event(goal(match_id, 1)).await.unwrap(), 1);
        assert_eq!(store.append_event(goal(match_id, 2)).await.unwrap(), 2);

        let err = store.append_event(goal(match_id, 2)).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict { sequence: 2, .. }));
        let err = store.append_event(goal(match_id, 4)).await.unwrap_err();
        assert!(!err.is_retryable());

        let events = store.load_events(match_id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(store.load_events(Uuid::new_v4()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn offline_store_reports_retryable_errors() {
        let store = MemoryMatchStore::new();
        store.set_offline(true);

        let err = store.health_check().await.unwrap_err();
        assert!(err.is_retryable());
        assert!(store.append_event(goal(Uuid::new_v4(), 1)).await.is_err());

        store.set_offline(false);
        assert!(store.try_reconnect().await.is_ok());
    }
}
