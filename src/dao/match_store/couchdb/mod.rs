mod config;
mod error;
mod models;
mod store;

pub use config::{CouchConfig, CouchCredentials};
pub use error::{CouchDaoError, CouchOp, DecodeError};
pub use store::CouchMatchStore;

use crate::dao::storage::StorageError;

impl From<CouchDaoError> for StorageError {
    fn from(err: CouchDaoError) -> Self {
        match err {
            CouchDaoError::SequenceConflict { match_id, sequence } => {
                StorageError::Conflict { match_id, sequence }
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
