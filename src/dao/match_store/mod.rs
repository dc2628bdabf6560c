#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{MatchEntity, ScoreEventEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Abstraction over the persistence layer for match headers and their event logs.
///
/// `append_event` is a conditional write: it only succeeds when the event
/// sequence is exactly one past the last stored sequence of the match, and
/// fails with [`crate::dao::storage::StorageError::Conflict`] otherwise.
pub trait MatchStore: Send + Sync {
    fn save_match(&self, entity: MatchEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_match(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<MatchEntity>>>;
    fn list_matches(&self) -> BoxFuture<'static, StorageResult<Vec<MatchEntity>>>;
    /// Append `event` to the log of its match and return the committed sequence.
    fn append_event(&self, event: ScoreEventEntity) -> BoxFuture<'static, StorageResult<u64>>;
    /// Load the whole log of a match ordered by sequence.
    fn load_events(&self, match_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ScoreEventEntity>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
