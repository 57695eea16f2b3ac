use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::db::{StoreError, is_unique_violation};
use crate::entities::game_stats;

/// Per-request counter increments. All values are non-negative; validation
/// of the per-game rules happens at the API layer before this is built.
#[derive(Debug, Clone, Copy)]
pub struct StatsDelta {
    pub games_played: i64,
    pub games_won: i64,
    pub battles: i64,
    pub battles_won: i64,
}

pub struct StatsRepository {
    conn: DatabaseConnection,
}

impl StatsRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Create the zeroed counters row for a user. Registration does this
    /// inside its own transaction; this standalone path exists for repairing
    /// accounts whose stats row went missing.
    pub async fn init(&self, username: &str) -> Result<(), StoreError> {
        let row = game_stats::ActiveModel {
            username: Set(username.to_owned()),
            games_played: Set(0),
            games_won: Set(0),
            battles: Set(0),
            battles_won: Set(0),
        };

        game_stats::Entity::insert(row)
            .exec(&self.conn)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::DuplicateStats
                } else {
                    StoreError::Db(e)
                }
            })?;

        Ok(())
    }

    pub async fn get(&self, username: &str) -> Result<game_stats::Model, StoreError> {
        game_stats::Entity::find_by_id(username.to_owned())
            .one(&self.conn)
            .await?
            .ok_or(StoreError::StatsUnavailable)
    }

    /// Accumulate counters with a single `UPDATE ... SET col = col + delta`
    /// statement. Concurrent updates for the same user serialize at the
    /// database row, so no increment can be lost to a stale read.
    pub async fn add(&self, username: &str, delta: StatsDelta) -> Result<(), StoreError> {
        let result = game_stats::Entity::update_many()
            .col_expr(
                game_stats::Column::GamesPlayed,
                Expr::col(game_stats::Column::GamesPlayed).add(delta.games_played),
            )
            .col_expr(
                game_stats::Column::GamesWon,
                Expr::col(game_stats::Column::GamesWon).add(delta.games_won),
            )
            .col_expr(
                game_stats::Column::Battles,
                Expr::col(game_stats::Column::Battles).add(delta.battles),
            )
            .col_expr(
                game_stats::Column::BattlesWon,
                Expr::col(game_stats::Column::BattlesWon).add(delta.battles_won),
            )
            .filter(game_stats::Column::Username.eq(username))
            .exec(&self.conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::StatsUnavailable);
        }

        Ok(())
    }
}
