use std::cmp::Ordering;

use indexmap::IndexMap;

use crate::{
    dao::models::{MatchEntity, MatchPhaseEntity, SideEntity},
    dto::ranking::{PlayerRanking, RankingQuery, RankingSortDto},
    error::ServiceError,
    state::SharedState,
};

const BASE_RATING: i64 = 1200;
const WIN_POINTS: i64 = 30;
const LOSS_POINTS: i64 = 20;
const STREAK_BONUS: i64 = 100;
/// Win rate (percent) above which the bonus applies.
const BONUS_WIN_RATE: f64 = 60.0;

#[derive(Debug, Default)]
struct Tally {
    matches: u32,
    wins: u32,
    losses: u32,
    goals_for: u32,
    goals_against: u32,
}

/// Leaderboard over every finished match with a winner.
pub async fn rankings(
    state: &SharedState,
    query: RankingQuery,
) -> Result<Vec<PlayerRanking>, ServiceError> {
    let store = state.require_match_store().await?;
    let matches = store.list_matches().await?;
    Ok(compute_rankings(&matches, query.sort.unwrap_or_default()))
}

/// Aggregate per-player statistics and order them by `sort`.
pub fn compute_rankings(matches: &[MatchEntity], sort: RankingSortDto) -> Vec<PlayerRanking> {
    let mut tallies: IndexMap<String, Tally> = IndexMap::new();

    for entity in matches {
        if entity.phase != MatchPhaseEntity::Finished {
            continue;
        }
        let Some(winner) = entity.winner else {
            continue;
        };

        let sides = [
            (&entity.team_a.players, SideEntity::A, entity.score_a, entity.score_b),
            (&entity.team_b.players, SideEntity::B, entity.score_b, entity.score_a),
        ];
        for (players, side, scored, conceded) in sides {
            for player in players {
                let tally = tallies.entry(player.clone()).or_default();
                tally.matches += 1;
                tally.goals_for += scored;
                tally.goals_against += conceded;
                if side == winner {
                    tally.wins += 1;
                } else {
                    tally.losses += 1;
                }
            }
        }
    }

    let mut rows: Vec<PlayerRanking> = tallies
        .into_iter()
        .map(|(name, tally)| {
            let win_rate = win_rate(&tally);
            PlayerRanking {
                rank: 0,
                rating: rating(&tally, win_rate),
                win_rate: (win_rate * 10.0).round() / 10.0,
                name,
                matches: tally.matches,
                wins: tally.wins,
                losses: tally.losses,
                goals_for: tally.goals_for,
                goals_against: tally.goals_against,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        let primary = match sort {
            RankingSortDto::Rating => b.rating.cmp(&a.rating),
            RankingSortDto::WinRate => b.win_rate.partial_cmp(&a.win_rate).unwrap_or(Ordering::Equal),
            RankingSortDto::Matches => b.matches.cmp(&a.matches),
        };
        primary.then_with(|| a.name.cmp(&b.name))
    });

    for (index, row) in rows.iter_mut().enumerate() {
        row.rank = index + 1;
    }
    rows
}

fn win_rate(tally: &Tally) -> f64 {
    if tally.matches == 0 {
        return 0.0;
    }
    f64::from(tally.wins) / f64::from(tally.matches) * 100.0
}

fn rating(tally: &Tally, win_rate: f64) -> i64 {
    let bonus = if win_rate > BONUS_WIN_RATE { STREAK_BONUS } else { 0 };
    BASE_RATING + WIN_POINTS * i64::from(tally.wins) - LOSS_POINTS * i64::from(tally.losses) + bonus
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use uuid::Uuid;

    use super::*;
    use crate::dao::models::{MatchModeEntity, MatchRulesEntity, TeamLineupEntity};

    fn finished(a: &[&str], b: &[&str], score_a: u32, score_b: u32) -> MatchEntity {
        let lineup = |name: &str, players: &[&str]| TeamLineupEntity {
            name: name.into(),
            players: players.iter().map(|p| p.to_string()).collect(),
        };
        let now = SystemTime::now();
        MatchEntity {
            id: Uuid::new_v4(),
            mode: if a.len() == 1 {
                MatchModeEntity::OneVsOne
            } else {
                MatchModeEntity::TwoVsTwo
            },
            team_a: lineup("A", a),
            team_b: lineup("B", b),
            venue: None,
            rules: MatchRulesEntity {
                winning_score: 7,
                allow_undo_after_win: true,
            },
            phase: MatchPhaseEntity::Finished,
            score_a,
            score_b,
            winner: Some(if score_a > score_b { SideEntity::A } else { SideEntity::B }),
            created_at: now,
            started_at: Some(now),
            ended_at: Some(now),
            updated_at: now,
        }
    }

    #[test]
    fn rating_rewards_wins_and_high_win_rate() {
        let matches = vec![
            finished(&["Ana"], &["Bo"], 7, 3),
            finished(&["Ana"], &["Bo"], 7, 5),
            finished(&["Bo"], &["Ana"], 7, 6),
        ];

        let table = compute_rankings(&matches, RankingSortDto::Rating);
        assert_eq!(table[0].name, "Ana");
        assert_eq!(table[0].rank, 1);
        assert_eq!((table[0].wins, table[0].losses), (2, 1));
        assert_eq!((table[0].goals_for, table[0].goals_against), (20, 15));
        assert_eq!(table[0].win_rate, 66.7);
        // 1200 + 2*30 - 1*20 + 100
        assert_eq!(table[0].rating, 1340);
        // 1200 + 30 - 40
        assert_eq!(table[1].rating, 1190);
    }

    #[test]
    fn unfinished_and_undecided_matches_are_ignored() {
        let mut running = finished(&["Ana"], &["Bo"], 3, 2);
        running.phase = MatchPhaseEntity::InProgress;
        let mut undecided = finished(&["Ana"], &["Bo"], 0, 0);
        undecided.winner = None;

        assert!(compute_rankings(&[running, undecided], RankingSortDto::Rating).is_empty());
    }

    #[test]
    fn ties_fall_back_to_name() {
        let matches = vec![
            finished(&["Zoe", "Yan"], &["Bea", "Abe"], 7, 1),
            finished(&["Cid"], &["Dan"], 7, 2),
        ];

        let by_matches = compute_rankings(&matches, RankingSortDto::Matches);
        let names: Vec<&str> = by_matches.iter().map(|row| row.name.as_str()).collect();
        assert_eq!(names, vec!["Abe", "Bea", "Cid", "Dan", "Yan", "Zoe"]);

        let by_rate = compute_rankings(&matches, RankingSortDto::WinRate);
        let names: Vec<&str> = by_rate.iter().map(|row| row.name.as_str()).collect();
        assert_eq!(names, vec!["Cid", "Yan", "Zoe", "Abe", "Bea", "Dan"]);
    }
}
