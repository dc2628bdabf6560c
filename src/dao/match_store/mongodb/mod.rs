mod config;
mod error;
mod models;
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoMatchStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::SequenceConflict { match_id, sequence } => {
                StorageError::Conflict { match_id, sequence }
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
