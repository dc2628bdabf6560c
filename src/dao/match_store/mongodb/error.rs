use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

/// Result of a MongoDB store operation.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures of the MongoDB match store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save match `{id}`")]
    SaveMatch {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load match `{id}`")]
    LoadMatch {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to list matches")]
    ListMatches {
        #[source]
        source: MongoError,
    },
    #[error("failed to append event {sequence} to match `{match_id}`")]
    AppendEvent {
        match_id: Uuid,
        sequence: u64,
        #[source]
        source: MongoError,
    },
    #[error("sequence {sequence} of match `{match_id}` is already committed")]
    SequenceConflict { match_id: Uuid, sequence: u64 },
    #[error("failed to load events of match `{match_id}`")]
    LoadEvents {
        match_id: Uuid,
        #[source]
        source: MongoError,
    },
}
