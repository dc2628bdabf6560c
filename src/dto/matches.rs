use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{MatchEntity, MatchModeEntity, MatchPhaseEntity, SideEntity},
    dto::{
        format_system_time,
        validation::{
            validate_display_name, validate_distinct_teams, validate_roster,
            validate_winning_score,
        },
    },
    state::{
        ledger::{MatchRules, Side},
        session::{MatchMode, TeamLineup},
        state_machine::MatchPhase,
    },
};

/// Team format advertised to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum MatchModeDto {
    #[serde(rename = "1v1")]
    OneVsOne,
    #[serde(rename = "2v2")]
    TwoVsTwo,
}

/// Side of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SideDto {
    A,
    B,
}

/// Lifecycle phase exposed over HTTP and SSE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhaseDto {
    NotStarted,
    InProgress,
    Paused,
    Completed,
    Finished,
    Cancelled,
}

/// Payload used to register a new match.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateMatchRequest {
    pub mode: MatchModeDto,
    pub team_a: TeamInput,
    pub team_b: TeamInput,
    #[serde(default)]
    pub venue: Option<String>,
    /// Overrides of the configured default rules.
    #[serde(default)]
    pub rules: Option<RulesInput>,
}

/// Incoming team definition.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TeamInput {
    pub name: String,
    pub players: Vec<String>,
}

/// Optional rule overrides.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RulesInput {
    #[serde(default)]
    pub winning_score: Option<u32>,
    #[serde(default)]
    pub allow_undo_after_win: Option<bool>,
}

impl Validate for CreateMatchRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_display_name(&self.team_a.name) {
            errors.add("team_a", e);
        }
        if let Err(e) = validate_display_name(&self.team_b.name) {
            errors.add("team_b", e);
        }
        if let Err(e) = validate_distinct_teams(&self.team_a.name, &self.team_b.name) {
            errors.add("team_b", e);
        }

        for player in self.team_a.players.iter().chain(&self.team_b.players) {
            if let Err(e) = validate_display_name(player) {
                errors.add("players", e);
            }
        }

        let per_team = MatchMode::from(self.mode).players_per_team();
        if let Err(e) = validate_roster(per_team, &self.team_a.players, &self.team_b.players) {
            errors.add("players", e);
        }

        if let Some(score) = self.rules.as_ref().and_then(|rules| rules.winning_score) {
            if let Err(e) = validate_winning_score(score) {
                errors.add("winning_score", e);
            }
        }

        if let Some(venue) = &self.venue {
            if let Err(e) = validate_display_name(venue) {
                errors.add("venue", e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl CreateMatchRequest {
    /// Merge the requested overrides into the configured defaults.
    pub fn rules(&self, defaults: MatchRules) -> MatchRules {
        let overrides = self.rules.as_ref();
        MatchRules {
            winning_score: overrides
                .and_then(|rules| rules.winning_score)
                .unwrap_or(defaults.winning_score),
            allow_undo_after_win: overrides
                .and_then(|rules| rules.allow_undo_after_win)
                .unwrap_or(defaults.allow_undo_after_win),
        }
    }
}

impl From<TeamInput> for TeamLineup {
    fn from(value: TeamInput) -> Self {
        Self {
            name: value.name.trim().to_owned(),
            players: value
                .players
                .into_iter()
                .map(|player| player.trim().to_owned())
                .collect(),
        }
    }
}

/// Filters accepted by the match history listing.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct MatchListQuery {
    /// Only return matches in this phase.
    pub phase: Option<MatchPhaseDto>,
}

/// Team as presented to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TeamSummary {
    pub name: String,
    pub players: Vec<String>,
}

/// Rules as presented to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RulesSummary {
    pub winning_score: u32,
    pub allow_undo_after_win: bool,
}

/// Score part of a match summary.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScoreSummary {
    pub score_a: u32,
    pub score_b: u32,
    pub is_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<SideDto>,
}

/// Match representation returned by the API.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MatchSummary {
    pub id: Uuid,
    pub mode: MatchModeDto,
    pub team_a: TeamSummary,
    pub team_b: TeamSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub venue: Option<String>,
    pub rules: RulesSummary,
    pub phase: MatchPhaseDto,
    pub score: ScoreSummary,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
}

impl From<MatchEntity> for MatchSummary {
    fn from(value: MatchEntity) -> Self {
        Self {
            id: value.id,
            mode: value.mode.into(),
            team_a: TeamSummary {
                name: value.team_a.name,
                players: value.team_a.players,
            },
            team_b: TeamSummary {
                name: value.team_b.name,
                players: value.team_b.players,
            },
            venue: value.venue,
            rules: RulesSummary {
                winning_score: value.rules.winning_score,
                allow_undo_after_win: value.rules.allow_undo_after_win,
            },
            phase: value.phase.into(),
            score: ScoreSummary {
                score_a: value.score_a,
                score_b: value.score_b,
                is_complete: value.winner.is_some(),
                winner: value.winner.map(Into::into),
            },
            created_at: format_system_time(value.created_at),
            started_at: value.started_at.map(format_system_time),
            ended_at: value.ended_at.map(format_system_time),
        }
    }
}

impl From<MatchModeDto> for MatchMode {
    fn from(value: MatchModeDto) -> Self {
        match value {
            MatchModeDto::OneVsOne => MatchMode::OneVsOne,
            MatchModeDto::TwoVsTwo => MatchMode::TwoVsTwo,
        }
    }
}

impl From<MatchModeEntity> for MatchModeDto {
    fn from(value: MatchModeEntity) -> Self {
        match value {
            MatchModeEntity::OneVsOne => MatchModeDto::OneVsOne,
            MatchModeEntity::TwoVsTwo => MatchModeDto::TwoVsTwo,
        }
    }
}

impl From<Side> for SideDto {
    fn from(value: Side) -> Self {
        match value {
            Side::A => SideDto::A,
            Side::B => SideDto::B,
        }
    }
}

impl From<SideDto> for Side {
    fn from(value: SideDto) -> Self {
        match value {
            SideDto::A => Side::A,
            SideDto::B => Side::B,
        }
    }
}

impl From<SideEntity> for SideDto {
    fn from(value: SideEntity) -> Self {
        Side::from(value).into()
    }
}

impl From<MatchPhase> for MatchPhaseDto {
    fn from(value: MatchPhase) -> Self {
        match value {
            MatchPhase::NotStarted => MatchPhaseDto::NotStarted,
            MatchPhase::InProgress => MatchPhaseDto::InProgress,
            MatchPhase::Paused => MatchPhaseDto::Paused,
            MatchPhase::Completed => MatchPhaseDto::Completed,
            MatchPhase::Finished => MatchPhaseDto::Finished,
            MatchPhase::Cancelled => MatchPhaseDto::Cancelled,
        }
    }
}

impl From<MatchPhaseDto> for MatchPhase {
    fn from(value: MatchPhaseDto) -> Self {
        match value {
            MatchPhaseDto::NotStarted => MatchPhase::NotStarted,
            MatchPhaseDto::InProgress => MatchPhase::InProgress,
            MatchPhaseDto::Paused => MatchPhase::Paused,
            MatchPhaseDto::Completed => MatchPhase::Completed,
            MatchPhaseDto::Finished => MatchPhase::Finished,
            MatchPhaseDto::Cancelled => MatchPhase::Cancelled,
        }
    }
}

impl From<MatchPhaseEntity> for MatchPhaseDto {
    fn from(value: MatchPhaseEntity) -> Self {
        MatchPhase::from(value).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(mode: &str, team_a: &[&str], team_b: &[&str]) -> CreateMatchRequest {
        let body = serde_json::json!({
            "mode": mode,
            "team_a": {"name": "Reds", "players": team_a},
            "team_b": {"name": "Blues", "players": team_b},
        });
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn two_vs_two_needs_two_players_each() {
        assert!(request("2v2", &["Ana", "Bo"], &["Cy", "Di"]).validate().is_ok());
        assert!(request("2v2", &["Ana"], &["Cy", "Di"]).validate().is_err());
        assert!(request("1v1", &["Ana"], &["Cy"]).validate().is_ok());
    }

    #[test]
    fn rule_overrides_merge_with_defaults() {
        let mut req = request("1v1", &["Ana"], &["Cy"]);
        req.rules = Some(RulesInput {
            winning_score: Some(10),
            allow_undo_after_win: None,
        });
        let rules = req.rules(MatchRules::default());
        assert_eq!(rules.winning_score, 10);
        assert!(rules.allow_undo_after_win);

        req.rules = Some(RulesInput {
            winning_score: Some(0),
            allow_undo_after_win: None,
        });
        assert!(req.validate().is_err());
    }

    #[test]
    fn phase_filter_uses_snake_case() {
        let query: MatchListQuery =
            serde_json::from_value(serde_json::json!({"phase": "in_progress"})).unwrap();
        assert_eq!(query.phase, Some(MatchPhaseDto::InProgress));
    }
}
