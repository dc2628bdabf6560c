use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{
    EventKindEntity, MatchEntity, MatchModeEntity, MatchPhaseEntity, MatchRulesEntity,
    ScoreEventEntity, SideEntity, TeamLineupEntity,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMatchDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    mode: MatchModeEntity,
    team_a: TeamLineupEntity,
    team_b: TeamLineupEntity,
    venue: Option<String>,
    rules: MatchRulesEntity,
    phase: MatchPhaseEntity,
    score_a: u32,
    score_b: u32,
    winner: Option<SideEntity>,
    created_at: DateTime,
    started_at: Option<DateTime>,
    ended_at: Option<DateTime>,
    updated_at: DateTime,
}

impl From<MatchEntity> for MongoMatchDocument {
    fn from(value: MatchEntity) -> Self {
        Self {
            id: value.id,
            mode: value.mode,
            team_a: value.team_a,
            team_b: value.team_b,
            venue: value.venue,
            rules: value.rules,
            phase: value.phase,
            score_a: value.score_a,
            score_b: value.score_b,
            winner: value.winner,
            created_at: DateTime::from_system_time(value.created_at),
            started_at: value.started_at.map(DateTime::from_system_time),
            ended_at: value.ended_at.map(DateTime::from_system_time),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl From<MongoMatchDocument> for MatchEntity {
    fn from(value: MongoMatchDocument) -> Self {
        Self {
            id: value.id,
            mode: value.mode,
            team_a: value.team_a,
            team_b: value.team_b,
            venue: value.venue,
            rules: value.rules,
            phase: value.phase,
            score_a: value.score_a,
            score_b: value.score_b,
            winner: value.winner,
            created_at: value.created_at.to_system_time(),
            started_at: value.started_at.map(DateTime::to_system_time),
            ended_at: value.ended_at.map(DateTime::to_system_time),
            updated_at: value.updated_at.to_system_time(),
        }
    }
}

/// One ledger event; `(match_id, sequence)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoEventDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    match_id: Uuid,
    team: SideEntity,
    kind: EventKindEntity,
    target: Option<Uuid>,
    sequence: i64,
    occurred_at: DateTime,
}

impl From<ScoreEventEntity> for MongoEventDocument {
    fn from(value: ScoreEventEntity) -> Self {
        Self {
            id: value.id,
            match_id: value.match_id,
            team: value.team,
            kind: value.kind,
            target: value.target,
            sequence: value.sequence as i64,
            occurred_at: DateTime::from_system_time(value.occurred_at),
        }
    }
}

impl From<MongoEventDocument> for ScoreEventEntity {
    fn from(value: MongoEventDocument) -> Self {
        Self {
            id: value.id,
            match_id: value.match_id,
            team: value.team,
            kind: value.kind,
            target: value.target,
            sequence: value.sequence.max(0) as u64,
            occurred_at: value.occurred_at.to_system_time(),
        }
    }
}

impl MongoEventDocument {
    pub fn sequence(&self) -> u64 {
        self.sequence.max(0) as u64
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

pub fn match_filter(match_id: Uuid) -> Document {
    doc! {"match_id": match_id.to_string()}
}
