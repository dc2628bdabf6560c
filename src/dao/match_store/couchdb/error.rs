//! Failures of the CouchDB match store, tagged with the operation that hit them.

use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;
use uuid::Uuid;

/// Result of a CouchDB store operation.
pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Store operation during which CouchDB failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CouchOp {
    /// Checking or creating the database.
    Provision,
    /// Writing the header of a match.
    SaveMatch(Uuid),
    /// Reading the header of a match.
    FindMatch(Uuid),
    /// Listing the match history.
    ListMatches,
    /// Committing one event of a match log.
    AppendEvent {
        /// Match the event belongs to.
        match_id: Uuid,
        /// Position the event claims.
        sequence: u64,
    },
    /// Reading the event log of a match.
    LoadEvents(Uuid),
    /// Probing the database.
    HealthCheck,
}

impl fmt::Display for CouchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CouchOp::Provision => f.write_str("provisioning the database"),
            CouchOp::SaveMatch(id) => write!(f, "saving match `{id}`"),
            CouchOp::FindMatch(id) => write!(f, "loading match `{id}`"),
            CouchOp::ListMatches => f.write_str("listing matches"),
            CouchOp::AppendEvent { match_id, sequence } => {
                write!(f, "appending event {sequence} of match `{match_id}`")
            }
            CouchOp::LoadEvents(id) => write!(f, "loading events of match `{id}`"),
            CouchOp::HealthCheck => f.write_str("checking health"),
        }
    }
}

/// Payload CouchDB sent back that could not be read.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Response body was not valid JSON.
    #[error(transparent)]
    Body(#[from] reqwest::Error),
    /// A document did not match the stored model.
    #[error(transparent)]
    Document(#[from] serde_json::Error),
}

/// Failures of the CouchDB match store.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// Required environment variable is missing.
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// The HTTP client could not be built.
    #[error("failed to build CouchDB client")]
    Client(#[source] reqwest::Error),
    /// CouchDB could not be reached.
    #[error("CouchDB unreachable while {op}")]
    Transport {
        op: CouchOp,
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB answered with an unexpected status.
    #[error("CouchDB answered {status} while {op}")]
    Status { op: CouchOp, status: StatusCode },
    /// CouchDB answered with an unreadable payload.
    #[error("unreadable CouchDB response while {op}")]
    Decode {
        op: CouchOp,
        #[source]
        source: DecodeError,
    },
    /// Another writer already holds this position of the match log.
    #[error("sequence {sequence} of match `{match_id}` is already committed")]
    SequenceConflict { match_id: Uuid, sequence: u64 },
}

impl CouchDaoError {
    pub(super) fn transport(op: &CouchOp) -> impl FnOnce(reqwest::Error) -> Self + '_ {
        move |source| CouchDaoError::Transport {
            op: op.clone(),
            source,
        }
    }

    pub(super) fn decode<E>(op: &CouchOp) -> impl FnOnce(E) -> Self + '_
    where
        E: Into<DecodeError>,
    {
        move |source| CouchDaoError::Decode {
            op: op.clone(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_name_the_event() {
        let match_id = Uuid::nil();
        let err = CouchDaoError::Status {
            op: CouchOp::AppendEvent {
                match_id,
                sequence: 4,
            },
            status: StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = err.to_string();
        assert!(message.contains("appending event 4"));
        assert!(message.contains(&match_id.to_string()));
    }
}
