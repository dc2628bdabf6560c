use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Ordering of the leaderboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RankingSortDto {
    #[default]
    Rating,
    WinRate,
    Matches,
}

/// Query string of `GET /rankings`.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct RankingQuery {
    /// `rating` (default), `win_rate` or `matches`.
    pub sort: Option<RankingSortDto>,
}

/// Aggregated statistics of one player.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PlayerRanking {
    pub rank: usize,
    pub name: String,
    pub matches: u32,
    pub wins: u32,
    pub losses: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    /// Percentage of matches won, rounded to one decimal.
    pub win_rate: f64,
    pub rating: i64,
}
