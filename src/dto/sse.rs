use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::{
    matches::{MatchPhaseDto, MatchSummary},
    score::{ScoreEventDto, ScoreStateResponse},
};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream (`lobby` or `match`).
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
    /// Score at subscription time, for match streams.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<ScoreStateResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast for every event appended to a match ledger.
pub struct ScoreEventBroadcast {
    pub match_id: Uuid,
    pub event: ScoreEventDto,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
/// Broadcast with the recomputed score after a ledger change.
pub struct ScoreStateEvent(pub ScoreStateResponse);

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast whenever a match changes phase.
pub struct PhaseChangedEvent {
    pub match_id: Uuid,
    pub phase: MatchPhaseDto,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast on the lobby when a match is registered.
pub struct MatchCreatedEvent {
    pub summary: MatchSummary,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when an event could not be committed to storage.
pub struct SyncFailedEvent {
    pub match_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    pub reason: String,
}
