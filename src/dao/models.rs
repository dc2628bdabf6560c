use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Team format of a match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchModeEntity {
    /// One player per side.
    OneVsOne,
    /// Two players per side.
    TwoVsTwo,
}

/// Persisted lifecycle phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhaseEntity {
    NotStarted,
    InProgress,
    Paused,
    Completed,
    Finished,
    Cancelled,
}

/// Table side a team or an event refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SideEntity {
    A,
    B,
}

/// Persisted kind of a ledger event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventKindEntity {
    Goal,
    Undo,
}

/// Team lineup stored alongside the match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TeamLineupEntity {
    /// Display name of the team.
    pub name: String,
    /// Player names, in the order they were registered.
    pub players: Vec<String>,
}

/// Rules frozen at match creation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchRulesEntity {
    /// Goals required to win.
    pub winning_score: u32,
    /// Whether the winning goal may be undone.
    pub allow_undo_after_win: bool,
}

/// Match header persisted by the storage layer.
///
/// Scores are a cached projection of the event log, kept so history listings
/// and rankings do not need to replay every ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MatchEntity {
    /// Primary key of the match.
    pub id: Uuid,
    /// 1v1 or 2v2.
    pub mode: MatchModeEntity,
    /// Team playing on side A.
    pub team_a: TeamLineupEntity,
    /// Team playing on side B.
    pub team_b: TeamLineupEntity,
    /// Optional location label.
    pub venue: Option<String>,
    /// Scoring rules.
    pub rules: MatchRulesEntity,
    /// Lifecycle phase at the time of the last write.
    pub phase: MatchPhaseEntity,
    /// Last known score of side A.
    pub score_a: u32,
    /// Last known score of side B.
    pub score_b: u32,
    /// Last known winner.
    pub winner: Option<SideEntity>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Time the match entered play for the first time.
    pub started_at: Option<SystemTime>,
    /// Time the match was finished or cancelled.
    pub ended_at: Option<SystemTime>,
    /// Last time the header was written.
    pub updated_at: SystemTime,
}

/// Ledger event persisted in the append-only event log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreEventEntity {
    /// Unique event identifier.
    pub id: Uuid,
    /// Owning match.
    pub match_id: Uuid,
    /// Credited side (or side of the cancelled goal).
    pub team: SideEntity,
    /// Goal or undo.
    pub kind: EventKindEntity,
    /// Goal cancelled by an undo.
    pub target: Option<Uuid>,
    /// 1-based position in the match ledger.
    pub sequence: u64,
    /// Wall-clock time of the event.
    pub occurred_at: SystemTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_event_serializes_with_lowercase_tags() {
        let event = ScoreEventEntity {
            id: Uuid::nil(),
            match_id: Uuid::nil(),
            team: SideEntity::B,
            kind: EventKindEntity::Undo,
            target: Some(Uuid::nil()),
            sequence: 4,
            occurred_at: SystemTime::UNIX_EPOCH,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["team"], "b");
        assert_eq!(json["kind"], "undo");
        assert_eq!(json["sequence"], 4);

        let back: ScoreEventEntity = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn phase_uses_snake_case() {
        let json = serde_json::to_string(&MatchPhaseEntity::NotStarted).unwrap();
        assert_eq!(json, "\"not_started\"");
    }
}
