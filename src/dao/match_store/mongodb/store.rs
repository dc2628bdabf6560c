use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::doc,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
    models::{MongoEventDocument, MongoMatchDocument, doc_id, match_filter},
};
use crate::dao::{
    match_store::MatchStore,
    models::{MatchEntity, ScoreEventEntity},
    storage::StorageResult,
};

const MATCH_COLLECTION_NAME: &str = "matches";
const EVENT_COLLECTION_NAME: &str = "score_events";
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Match store backed by MongoDB collections.
#[derive(Clone)]
pub struct MongoMatchStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = self.config.connect().await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoMatchStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = config.connect().await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let matches = self.matches().await;
        let phase_index = IndexModel::builder()
            .keys(doc! {"phase": 1, "created_at": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("match_phase_idx".to_owned()))
                    .build(),
            )
            .build();

        matches
            .create_index(phase_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: MATCH_COLLECTION_NAME,
                index: "phase,created_at",
                source,
            })?;

        let events = self.events().await;
        let sequence_index = IndexModel::builder()
            .keys(doc! {"match_id": 1, "sequence": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("event_sequence_idx".to_owned()))
                    .unique(Some(true))
                    .build(),
            )
            .build();

        events
            .create_index(sequence_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: EVENT_COLLECTION_NAME,
                index: "match_id,sequence",
                source,
            })?;

        Ok(())
    }

    async fn matches(&self) -> Collection<MongoMatchDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoMatchDocument>(MATCH_COLLECTION_NAME)
    }

    async fn events(&self) -> Collection<MongoEventDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoEventDocument>(EVENT_COLLECTION_NAME)
    }

    async fn save_match(&self, entity: MatchEntity) -> MongoResult<()> {
        let id = entity.id;
        let document: MongoMatchDocument = entity.into();
        self.matches()
            .await
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveMatch { id, source })?;

        Ok(())
    }

    async fn find_match(&self, id: Uuid) -> MongoResult<Option<MatchEntity>> {
        let document = self
            .matches()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadMatch { id, source })?;

        Ok(document.map(Into::into))
    }

    async fn list_matches(&self) -> MongoResult<Vec<MatchEntity>> {
        let documents: Vec<MongoMatchDocument> = self
            .matches()
            .await
            .find(doc! {})
            .sort(doc! {"created_at": -1})
            .await
            .map_err(|source| MongoDaoError::ListMatches { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListMatches { source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }

    /// Insert `event` only if it directly follows the last stored sequence.
    ///
    /// The unique `(match_id, sequence)` index settles concurrent writers that
    /// both observed the same head.
    async fn append_event(&self, event: ScoreEventEntity) -> MongoResult<u64> {
        let match_id = event.match_id;
        let sequence = event.sequence;
        let events = self.events().await;

        let head = events
            .find_one(match_filter(match_id))
            .sort(doc! {"sequence": -1})
            .await
            .map_err(|source| MongoDaoError::AppendEvent {
                match_id,
                sequence,
                source,
            })?;
        let expected = head.map_or(1, |last| last.sequence() + 1);
        if sequence != expected {
            return Err(MongoDaoError::SequenceConflict { match_id, sequence });
        }

        let document: MongoEventDocument = event.into();
        match events.insert_one(&document).await {
            Ok(_) => Ok(sequence),
            Err(source) if is_duplicate_key(&source) => {
                Err(MongoDaoError::SequenceConflict { match_id, sequence })
            }
            Err(source) => Err(MongoDaoError::AppendEvent {
                match_id,
                sequence,
                source,
            }),
        }
    }

    async fn load_events(&self, match_id: Uuid) -> MongoResult<Vec<ScoreEventEntity>> {
        let documents: Vec<MongoEventDocument> = self
            .events()
            .await
            .find(match_filter(match_id))
            .sort(doc! {"sequence": 1})
            .await
            .map_err(|source| MongoDaoError::LoadEvents { match_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadEvents { match_id, source })?;

        Ok(documents.into_iter().map(Into::into).collect())
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY_CODE
    )
}

impl MatchStore for MongoMatchStore {
    fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_match(entity).await.map_err(Into::into) })
    }

    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_match(id).await.map_err(Into::into) })
    }

    fn list_matches(&self) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_matches().await.map_err(Into::into) })
    }

    fn append_event(&self, event: ScoreEventEntity) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.append_event(event).await.map_err(Into::into) })
    }

    fn load_events(
        &self,
        match_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ScoreEventEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.load_events(match_id).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
