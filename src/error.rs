use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

use crate::{
    dao::storage::StorageError,
    state::{AbortError, ApplyError, PlanError, ledger::LedgerError},
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// The request contradicts the match history.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Operation exceeded its timeout limit.
    #[error("operation timed out")]
    Timeout,
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict { .. } => ServiceError::Conflict(err.to_string()),
            other => ServiceError::Unavailable(other),
        }
    }
}

impl From<LedgerError> for ServiceError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidEvent { .. } => ServiceError::InvalidInput(err.to_string()),
            other => ServiceError::Conflict(other.to_string()),
        }
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Conflict(message) => AppError::Conflict(message),
            ServiceError::Timeout => AppError::ServiceUnavailable("operation timed out".into()),
        }
    }
}

/// JSON body of every error response.
#[derive(Serialize)]
struct ErrorBody {
    /// Stable machine-readable category.
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = match &self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "unknown_match"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "rejected_by_ledger"),
            AppError::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable"),
        };

        let payload = Json(ErrorBody {
            error,
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

impl From<PlanError> for ServiceError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::AlreadyPending => {
                ServiceError::InvalidState("the match is already changing phase".into())
            }
            PlanError::InvalidTransition(invalid) => ServiceError::InvalidState(format!(
                "a {:?} match cannot {:?}",
                invalid.from, invalid.event
            )),
        }
    }
}

// Apply and abort only fail when the session moved under a held lock,
// which callers cannot fix by retrying differently.
impl From<ApplyError> for ServiceError {
    fn from(err: ApplyError) -> Self {
        ServiceError::InvalidState(format!("match phase change lost: {err:?}"))
    }
}

impl From<AbortError> for ServiceError {
    fn from(err: AbortError) -> Self {
        ServiceError::InvalidState(format!("match phase change could not be rolled back: {err:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::state_machine::{InvalidTransition, MatchEvent, MatchPhase};

    #[test]
    fn ledger_rejections_map_to_conflict_or_bad_request() {
        let conflict: AppError = ServiceError::from(LedgerError::EmptyLedger).into();
        assert!(matches!(conflict, AppError::Conflict(_)));

        let invalid: AppError = ServiceError::from(LedgerError::InvalidEvent {
            id: uuid::Uuid::nil(),
            reason: "bad".into(),
        })
        .into();
        assert!(matches!(invalid, AppError::BadRequest(_)));
    }

    #[test]
    fn storage_conflict_is_not_an_outage() {
        let err = ServiceError::from(StorageError::Conflict {
            match_id: uuid::Uuid::nil(),
            sequence: 3,
        });
        assert!(matches!(err, ServiceError::Conflict(_)));
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn illegal_lifecycle_events_name_the_phase() {
        let err = ServiceError::from(PlanError::InvalidTransition(InvalidTransition {
            from: MatchPhase::Finished,
            event: MatchEvent::Resume,
        }));
        assert!(matches!(&err, ServiceError::InvalidState(message) if message.contains("Finished")));
    }
}
