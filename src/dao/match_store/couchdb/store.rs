use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::from_value;
use uuid::Uuid;

use crate::dao::{
    match_store::MatchStore,
    models::{MatchEntity, ScoreEventEntity},
    storage::StorageResult,
};

use super::{
    config::{CouchConfig, CouchCredentials},
    error::{CouchDaoError, CouchOp, CouchResult},
    models::{
        AllDocsResponse, CouchEventDocument, CouchMatchDocument, END_SUFFIX, MATCH_PREFIX,
        event_prefix, match_doc_id,
    },
};

const ALL_DOCS: &str = "_all_docs";

/// Outcome of a create-only document write.
enum PutOutcome {
    Created,
    AlreadyExists,
}

/// Match store backed by a CouchDB database.
#[derive(Clone)]
pub struct CouchMatchStore {
    client: Client,
    database_url: Arc<str>,
    credentials: Option<Arc<CouchCredentials>>,
}

impl CouchMatchStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder().build().map_err(CouchDaoError::Client)?;

        let store = Self {
            client,
            database_url: Arc::from(config.database_url()),
            credentials: config.credentials.map(Arc::new),
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.database_url, path);
        self.authorize(self.client.request(method, url))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some(credentials) => {
                builder.basic_auth(&credentials.username, Some(&credentials.password))
            }
            None => builder,
        }
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let op = CouchOp::Provision;
        let response = self
            .authorize(self.client.get(self.database_url.as_ref()))
            .send()
            .await
            .map_err(CouchDaoError::transport(&op))?;

        let status = match response.status() {
            StatusCode::NOT_FOUND => self
                .authorize(self.client.put(self.database_url.as_ref()))
                .send()
                .await
                .map_err(CouchDaoError::transport(&op))?
                .status(),
            status => status,
        };

        if status.is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::Status { op, status })
        }
    }

    async fn get_document<T>(&self, doc_id: &str, op: CouchOp) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(CouchDaoError::transport(&op))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<T>()
                .await
                .map(Some)
                .map_err(CouchDaoError::decode(&op)),
            status => Err(CouchDaoError::Status { op, status }),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T, op: CouchOp) -> CouchResult<PutOutcome>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(CouchDaoError::transport(&op))?;

        match response.status() {
            status if status.is_success() => Ok(PutOutcome::Created),
            StatusCode::CONFLICT => Ok(PutOutcome::AlreadyExists),
            status => Err(CouchDaoError::Status { op, status }),
        }
    }

    /// Read documents whose id starts with `prefix`, in key order.
    async fn list_documents<T>(
        &self,
        prefix: &str,
        descending: bool,
        limit: Option<usize>,
        op: CouchOp,
    ) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let (start, end) = if descending {
            (format!("{prefix}{END_SUFFIX}"), prefix.to_string())
        } else {
            (prefix.to_string(), format!("{prefix}{END_SUFFIX}"))
        };

        let mut query = vec![
            ("include_docs", "true".to_string()),
            ("startkey", format!("\"{start}\"")),
            ("endkey", format!("\"{end}\"")),
            ("descending", descending.to_string()),
        ];
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(CouchDaoError::transport(&op))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CouchDaoError::Status { op, status });
        }

        let payload = response
            .json::<AllDocsResponse>()
            .await
            .map_err(CouchDaoError::decode(&op))?;

        payload
            .rows
            .into_iter()
            .filter_map(|row| row.doc)
            .map(|doc| from_value(doc).map_err(CouchDaoError::decode(&op)))
            .collect()
    }

    /// Create the event document for the next position of the match log.
    ///
    /// Event ids embed the sequence, so two writers racing for the same
    /// position collide on the document id and CouchDB answers 409.
    async fn append_event(&self, event: ScoreEventEntity) -> CouchResult<u64> {
        let match_id = event.match_id;
        let sequence = event.sequence;
        let op = CouchOp::AppendEvent { match_id, sequence };

        let head = self
            .list_documents::<CouchEventDocument>(&event_prefix(match_id), true, Some(1), op.clone())
            .await?;
        let expected = head.first().map_or(1, |last| last.sequence + 1);
        if sequence != expected {
            return Err(CouchDaoError::SequenceConflict { match_id, sequence });
        }

        let document = CouchEventDocument::from(event);
        match self.put_document(&document.id, &document, op).await? {
            PutOutcome::Created => Ok(sequence),
            PutOutcome::AlreadyExists => Err(CouchDaoError::SequenceConflict { match_id, sequence }),
        }
    }

    async fn save_match(&self, entity: MatchEntity) -> CouchResult<()> {
        let op = CouchOp::SaveMatch(entity.id);
        let doc_id = match_doc_id(entity.id);
        let mut doc = CouchMatchDocument::from_entity(entity);
        if let Some(existing) = self
            .get_document::<CouchMatchDocument>(&doc_id, op.clone())
            .await?
        {
            doc.rev = existing.rev;
        }
        match self.put_document(&doc_id, &doc, op.clone()).await? {
            PutOutcome::Created => Ok(()),
            // Someone else updated the header between our read and write.
            PutOutcome::AlreadyExists => Err(CouchDaoError::Status {
                op,
                status: StatusCode::CONFLICT,
            }),
        }
    }
}

impl MatchStore for CouchMatchStore {
    fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_match(entity).await.map_err(Into::into) })
    }

    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = match_doc_id(id);
            let maybe_doc = store
                .get_document::<CouchMatchDocument>(&doc_id, CouchOp::FindMatch(id))
                .await?;
            Ok(maybe_doc.map(CouchMatchDocument::into_entity))
        })
    }

    fn list_matches(&self) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .list_documents::<CouchMatchDocument>(MATCH_PREFIX, false, None, CouchOp::ListMatches)
                .await?;
            let mut matches: Vec<MatchEntity> = docs
                .into_iter()
                .map(CouchMatchDocument::into_entity)
                .collect();
            matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(matches)
        })
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
        Box::pin(async move {
            let docs = store
                .list_documents::<CouchEventDocument>(
                    &event_prefix(match_id),
                    false,
                    None,
                    CouchOp::LoadEvents(match_id),
                )
                .await?;
            Ok(docs.into_iter().map(Into::into).collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let op = CouchOp::HealthCheck;
            let response = store
                .authorize(store.client.get(store.database_url.as_ref()))
                .send()
                .await
                .map_err(CouchDaoError::transport(&op))?;

            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::Status { op, status }.into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
