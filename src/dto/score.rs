use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::{
        format_system_time,
        matches::{MatchPhaseDto, SideDto},
        parse_system_time,
    },
    state::{
        ledger::{EventKind, MatchState, ScoreEvent},
        session::Controls,
        state_machine::MatchPhase,
    },
};

/// Body of `POST /matches/{id}/goals`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct GoalRequest {
    pub team: SideDto,
}

/// Kind of a ledger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum EventKindDto {
    Goal,
    Undo,
}

/// Wire form of a ledger event.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScoreEventDto {
    pub id: Uuid,
    pub team: SideDto,
    pub kind: EventKindDto,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Uuid>,
    pub sequence: u64,
    /// RFC 3339 timestamp.
    pub occurred_at: String,
}

impl From<&ScoreEvent> for ScoreEventDto {
    fn from(value: &ScoreEvent) -> Self {
        Self {
            id: value.id,
            team: value.team.into(),
            kind: match value.kind {
                EventKind::Goal => EventKindDto::Goal,
                EventKind::Undo => EventKindDto::Undo,
            },
            target: value.target,
            sequence: value.sequence,
            occurred_at: format_system_time(value.occurred_at),
        }
    }
}

impl TryFrom<ScoreEventDto> for ScoreEvent {
    type Error = String;

    fn try_from(value: ScoreEventDto) -> Result<Self, Self::Error> {
        if value.sequence == 0 {
            return Err("sequence numbers start at 1".into());
        }
        let occurred_at = parse_system_time(&value.occurred_at)
            .map_err(|err| format!("invalid occurred_at `{}`: {err}", value.occurred_at))?;

        Ok(Self {
            id: value.id,
            team: value.team.into(),
            kind: match value.kind {
                EventKindDto::Goal => EventKind::Goal,
                EventKindDto::Undo => EventKind::Undo,
            },
            target: value.target,
            sequence: value.sequence,
            occurred_at,
        })
    }
}

/// Current score of a match.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScoreStateResponse {
    pub match_id: Uuid,
    pub phase: MatchPhaseDto,
    pub score_a: u32,
    pub score_b: u32,
    pub is_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<SideDto>,
}

impl ScoreStateResponse {
    /// Snapshot of `state` for the match `match_id`.
    pub fn new(match_id: Uuid, phase: MatchPhase, state: MatchState) -> Self {
        Self {
            match_id,
            phase: phase.into(),
            score_a: state.score_a,
            score_b: state.score_b,
            is_complete: state.is_complete,
            winner: state.winner.map(Into::into),
        }
    }
}

/// Which scoring buttons the referee console should enable.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct ControlsResponse {
    pub can_score_a: bool,
    pub can_score_b: bool,
    pub can_undo: bool,
}

impl From<Controls> for ControlsResponse {
    fn from(value: Controls) -> Self {
        Self {
            can_score_a: value.can_score_a,
            can_score_b: value.can_score_b,
            can_undo: value.can_undo,
        }
    }
}

/// Result of a goal or undo.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScoreUpdateResponse {
    pub event: ScoreEventDto,
    pub state: ScoreStateResponse,
}

/// Committed history of a match.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EventLogResponse {
    pub match_id: Uuid,
    pub events: Vec<ScoreEventDto>,
    /// Events received ahead of a missing predecessor.
    pub pending: usize,
}

/// How a remote event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcomeDto {
    /// Appended to the ledger.
    Applied,
    /// Kept aside until the missing predecessor arrives.
    Buffered,
    /// Already known; ignored.
    Duplicate,
    /// The ledger was rebuilt from storage.
    Reconciled,
}

/// Response of `POST /matches/{id}/events`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IngestResponse {
    pub outcome: IngestOutcomeDto,
    /// Sequence the ledger is waiting for when the event was buffered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_sequence: Option<u64>,
    pub state: ScoreStateResponse,
}

/// Response of `POST /matches/{id}/reconcile`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReconcileResponse {
    /// Number of events in the rebuilt ledger.
    pub events: usize,
    pub state: ScoreStateResponse,
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::state::ledger::Side;

    #[test]
    fn wire_event_preserves_fields() {
        let occurred_at = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let event = ScoreEvent::goal(Side::B, 3, occurred_at);

        let dto = ScoreEventDto::from(&event);
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["team"], "b");
        assert_eq!(json["kind"], "goal");
        assert!(json.get("target").is_none());
        assert_eq!(json["occurred_at"], "2023-11-14T22:13:20Z");

        let back = ScoreEvent::try_from(dto).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn wire_event_rejects_bad_input() {
        let mut dto = ScoreEventDto::from(&ScoreEvent::goal(Side::A, 1, SystemTime::now()));
        dto.occurred_at = "yesterday".into();
        assert!(ScoreEvent::try_from(dto.clone()).is_err());

        dto.occurred_at = "2024-01-01T00:00:00Z".into();
        dto.sequence = 0;
        assert!(ScoreEvent::try_from(dto).is_err());
    }
}
