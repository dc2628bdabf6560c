use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::models::{
    EventKindEntity, MatchEntity, MatchModeEntity, MatchPhaseEntity, MatchRulesEntity,
    ScoreEventEntity, SideEntity, TeamLineupEntity,
};

pub const MATCH_PREFIX: &str = "match::";
pub const EVENT_PREFIX: &str = "event::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    #[allow(dead_code)]
    pub id: String,
    #[serde(default)]
    pub doc: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchMatchDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub body: MatchBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchBody {
    pub match_id: Uuid,
    pub mode: MatchModeEntity,
    pub team_a: TeamLineupEntity,
    pub team_b: TeamLineupEntity,
    pub venue: Option<String>,
    pub rules: MatchRulesEntity,
    pub phase: MatchPhaseEntity,
    pub score_a: u32,
    pub score_b: u32,
    pub winner: Option<SideEntity>,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub ended_at: Option<SystemTime>,
    pub updated_at: SystemTime,
}

impl CouchMatchDocument {
    pub fn from_entity(entity: MatchEntity) -> Self {
        Self {
            id: match_doc_id(entity.id),
            rev: None,
            body: MatchBody {
                match_id: entity.id,
                mode: entity.mode,
                team_a: entity.team_a,
                team_b: entity.team_b,
                venue: entity.venue,
                rules: entity.rules,
                phase: entity.phase,
                score_a: entity.score_a,
                score_b: entity.score_b,
                winner: entity.winner,
                created_at: entity.created_at,
                started_at: entity.started_at,
                ended_at: entity.ended_at,
                updated_at: entity.updated_at,
            },
        }
    }

    pub fn into_entity(self) -> MatchEntity {
        let body = self.body;
        MatchEntity {
            id: body.match_id,
            mode: body.mode,
            team_a: body.team_a,
            team_b: body.team_b,
            venue: body.venue,
            rules: body.rules,
            phase: body.phase,
            score_a: body.score_a,
            score_b: body.score_b,
            winner: body.winner,
            created_at: body.created_at,
            started_at: body.started_at,
            ended_at: body.ended_at,
            updated_at: body.updated_at,
        }
    }
}

/// Event documents are never updated, so they carry no revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchEventDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub event_id: Uuid,
    pub match_id: Uuid,
    pub team: SideEntity,
    pub kind: EventKindEntity,
    pub target: Option<Uuid>,
    pub sequence: u64,
    pub occurred_at: SystemTime,
}

impl From<ScoreEventEntity> for CouchEventDocument {
    fn from(value: ScoreEventEntity) -> Self {
        Self {
            id: event_doc_id(value.match_id, value.sequence),
            event_id: value.id,
            match_id: value.match_id,
            team: value.team,
            kind: value.kind,
            target: value.target,
            sequence: value.sequence,
            occurred_at: value.occurred_at,
        }
    }
}

impl From<CouchEventDocument> for ScoreEventEntity {
    fn from(value: CouchEventDocument) -> Self {
        Self {
            id: value.event_id,
            match_id: value.match_id,
            team: value.team,
            kind: value.kind,
            target: value.target,
            sequence: value.sequence,
            occurred_at: value.occurred_at,
        }
    }
}

pub fn match_doc_id(id: Uuid) -> String {
    format!("{MATCH_PREFIX}{id}")
}

/// Zero-padded so `_all_docs` key order matches sequence order.
pub fn event_doc_id(match_id: Uuid, sequence: u64) -> String {
    format!("{}{sequence:020}", event_prefix(match_id))
}

pub fn event_prefix(match_id: Uuid) -> String {
    format!("{EVENT_PREFIX}{match_id}::")
}
