//! Validation helpers for DTOs.

use std::collections::HashSet;

use validator::ValidationError;

/// Longest accepted team or player name.
pub const MAX_NAME_LEN: usize = 40;
/// Highest accepted winning score.
pub const MAX_WINNING_SCORE: u32 = 99;

/// Validates that a team or player name is non-blank and reasonably short.
pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("name_blank");
        err.message = Some("Name must not be blank".into());
        return Err(err);
    }

    if trimmed.chars().count() > MAX_NAME_LEN {
        let mut err = ValidationError::new("name_length");
        err.message = Some(format!("Name must be at most {MAX_NAME_LEN} characters").into());
        return Err(err);
    }

    Ok(())
}

/// Validates that the winning score is between 1 and [`MAX_WINNING_SCORE`].
pub fn validate_winning_score(score: u32) -> Result<(), ValidationError> {
    if !(1..=MAX_WINNING_SCORE).contains(&score) {
        let mut err = ValidationError::new("winning_score_range");
        err.message =
            Some(format!("Winning score must be between 1 and {MAX_WINNING_SCORE}").into());
        return Err(err);
    }
    Ok(())
}

/// Validates that both teams carry different names.
pub fn validate_distinct_teams(team_a: &str, team_b: &str) -> Result<(), ValidationError> {
    if normalize(team_a) == normalize(team_b) {
        let mut err = ValidationError::new("team_names_distinct");
        err.message = Some("Both teams must have different names".into());
        return Err(err);
    }
    Ok(())
}

/// Validates that each side fields `per_team` players and nobody plays twice.
pub fn validate_roster(
    per_team: usize,
    team_a: &[String],
    team_b: &[String],
) -> Result<(), ValidationError> {
    if team_a.len() != per_team || team_b.len() != per_team {
        let mut err = ValidationError::new("roster_size");
        err.message = Some(format!("Each team must have exactly {per_team} player(s)").into());
        return Err(err);
    }

    let mut seen = HashSet::new();
    for player in team_a.iter().chain(team_b) {
        if !seen.insert(normalize(player)) {
            let mut err = ValidationError::new("roster_unique");
            err.message = Some(format!("Player `{}` is listed more than once", player.trim()).into());
            return Err(err);
        }
    }

    Ok(())
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn test_validate_display_name() {
        assert!(validate_display_name("Reds").is_ok());
        assert!(validate_display_name("   ").is_err());
        assert!(validate_display_name(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_validate_winning_score_bounds() {
        assert!(validate_winning_score(0).is_err());
        assert!(validate_winning_score(1).is_ok());
        assert!(validate_winning_score(MAX_WINNING_SCORE).is_ok());
        assert!(validate_winning_score(MAX_WINNING_SCORE + 1).is_err());
    }

    #[test]
    fn test_validate_distinct_teams_ignores_case() {
        assert!(validate_distinct_teams("Reds", "Blues").is_ok());
        assert!(validate_distinct_teams("Reds", " reds ").is_err());
    }

    #[test]
    fn test_validate_roster() {
        assert!(validate_roster(1, &names(&["Ana"]), &names(&["Ben"])).is_ok());
        assert!(validate_roster(2, &names(&["Ana", "Bo"]), &names(&["Cy", "Di"])).is_ok());
        // wrong size
        assert!(validate_roster(2, &names(&["Ana"]), &names(&["Cy", "Di"])).is_err());
        // same player on both sides
        assert!(validate_roster(1, &names(&["Ana"]), &names(&["ana"])).is_err());
    }
}
