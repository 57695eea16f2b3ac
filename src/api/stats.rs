use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;

use super::auth::{AuthContext, ensure_correct_user_or_admin};
use super::validation::AppJson;
use super::{ApiError, AppState};
use crate::db::StatsDelta;
use crate::entities::game_stats;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStatsBody {
    pub username: String,
    pub games_played: i64,
    pub games_won: i64,
    pub battles: i64,
    pub battles_won: i64,
}

impl From<game_stats::Model> for GameStatsBody {
    fn from(model: game_stats::Model) -> Self {
        Self {
            username: model.username,
            games_played: model.games_played,
            games_won: model.games_won,
            battles: model.battles,
            battles_won: model.battles_won,
        }
    }
}

/// One finished game's worth of counter increments. All four properties are
/// required and nothing else is accepted.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StatsDeltaRequest {
    pub games_played: i64,
    pub games_won: i64,
    pub battles: i64,
    pub battles_won: i64,
}

impl StatsDeltaRequest {
    /// A report covers exactly one game: one game played, at most one game
    /// won, and battle wins bounded by battles fought.
    fn validate(self) -> Result<StatsDelta, ApiError> {
        let plausible = self.games_played == 1
            && (0..=1).contains(&self.games_won)
            && self.battles >= 0
            && (0..=self.battles).contains(&self.battles_won);

        if !plausible {
            return Err(ApiError::invalid_json());
        }

        Ok(StatsDelta {
            games_played: self.games_played,
            games_won: self.games_won,
            battles: self.battles,
            battles_won: self.battles_won,
        })
    }
}

/// GET /users/{username}/stats
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Value>, ApiError> {
    ensure_correct_user_or_admin(&ctx, &username)?;

    let stats = state.store.get_game_stats(&username).await?;

    Ok(Json(json!({
        "success": true,
        "gameStats": GameStatsBody::from(stats),
    })))
}

/// PATCH /users/{username}/stats
///
/// Accumulates one game's results onto the stored counters. The increment
/// runs as a single in-place update, so concurrent reports both land.
pub async fn edit_stats(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    Extension(ctx): Extension<AuthContext>,
    AppJson(body): AppJson<StatsDeltaRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    ensure_correct_user_or_admin(&ctx, &username)?;

    let delta = body.validate()?;

    state.store.add_game_stats(&username, delta).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "modified": { "username": username },
        })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const fn delta(
        games_played: i64,
        games_won: i64,
        battles: i64,
        battles_won: i64,
    ) -> StatsDeltaRequest {
        StatsDeltaRequest {
            games_played,
            games_won,
            battles,
            battles_won,
        }
    }

    #[test]
    fn test_single_game_reports_accepted() {
        assert!(delta(1, 0, 0, 0).validate().is_ok());
        assert!(delta(1, 1, 20, 12).validate().is_ok());
        assert!(delta(1, 0, 5, 5).validate().is_ok());
    }

    #[test]
    fn test_multi_game_reports_rejected() {
        assert!(delta(0, 0, 0, 0).validate().is_err());
        assert!(delta(2, 1, 5, 3).validate().is_err());
        assert!(delta(1, 2, 5, 3).validate().is_err());
    }

    #[test]
    fn test_impossible_battle_counts_rejected() {
        assert!(delta(1, 0, 3, 4).validate().is_err());
        assert!(delta(1, 0, -1, 0).validate().is_err());
        assert!(delta(1, 0, 3, -1).validate().is_err());
    }
}
