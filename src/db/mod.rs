use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::SecurityConfig;
use crate::entities::{game_stats, users};

pub mod migrator;
pub mod repositories;

pub use repositories::stats::StatsDelta;
pub use repositories::user::{NewUser, User, UserPatch};

/// Domain error taxonomy for the resource layer. Display strings double as
/// the user-facing messages, matching what the routes promise.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Username/email already exists")]
    DuplicateUser,

    #[error("Game stats already exist")]
    DuplicateStats,

    #[error("User not found")]
    UserNotFound,

    #[error("Incorrect username/password")]
    InvalidCredentials,

    #[error("Unable to retrieve game stats")]
    StatsUnavailable,

    #[error(transparent)]
    Db(#[from] DbErr),

    #[error("{0}")]
    Internal(String),
}

/// Classify a database error as a uniqueness-constraint violation. This is
/// the authoritative duplicate signal; the advisory pre-checks only exist to
/// produce a friendlier error in the non-racing case.
#[must_use]
pub fn is_unique_violation(err: &DbErr) -> bool {
    let msg = err.to_string();
    msg.contains("UNIQUE constraint failed") || msg.contains("duplicate key")
}

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
    security: SecurityConfig,
}

impl Store {
    pub async fn new(db_url: &str, security: SecurityConfig) -> Result<Self> {
        Self::with_pool_options(db_url, security, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        security: SecurityConfig,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn, security })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone(), self.security.clone())
    }

    fn stats_repo(&self) -> repositories::stats::StatsRepository {
        repositories::stats::StatsRepository::new(self.conn.clone())
    }

    // ========== Users ==========

    pub async fn register_user(&self, input: NewUser) -> Result<User, StoreError> {
        self.user_repo().register(input).await
    }

    pub async fn get_user(&self, username: &str) -> Result<users::Model, StoreError> {
        self.user_repo().get(username).await
    }

    pub async fn login_user(&self, username: &str, password: &str) -> Result<User, StoreError> {
        self.user_repo().login(username, password).await
    }

    pub async fn delete_user(&self, username: &str) -> Result<(), StoreError> {
        self.user_repo().delete(username).await
    }

    pub async fn edit_user(&self, username: &str, patch: UserPatch) -> Result<(), StoreError> {
        self.user_repo().edit(username, patch).await
    }

    pub async fn user_exists(&self, username: &str, email: &str) -> Result<bool, StoreError> {
        self.user_repo()
            .exists_username_or_email(username, email)
            .await
    }

    // ========== Game stats ==========

    pub async fn init_game_stats(&self, username: &str) -> Result<(), StoreError> {
        self.stats_repo().init(username).await
    }

    pub async fn get_game_stats(&self, username: &str) -> Result<game_stats::Model, StoreError> {
        // user existence first, so a missing account reads as 404 rather
        // than a stats problem
        self.user_repo().get(username).await?;
        self.stats_repo().get(username).await
    }

    pub async fn add_game_stats(
        &self,
        username: &str,
        delta: StatsDelta,
    ) -> Result<(), StoreError> {
        self.user_repo().get(username).await?;
        self.stats_repo().add(username, delta).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> Store {
        Store::new("sqlite::memory:", SecurityConfig::minimal())
            .await
            .expect("Failed to create in-memory store")
    }

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            password: "password".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            email: email.to_string(),
            is_admin: false,
        }
    }

    #[tokio::test]
    async fn test_register_creates_user_and_zeroed_stats() {
        let store = test_store().await;

        let user = store
            .register_user(new_user("testUser", "test@example.com"))
            .await
            .unwrap();
        assert_eq!(user.username, "testUser");
        assert!(!user.is_admin);

        let stats = store.get_game_stats("testUser").await.unwrap();
        assert_eq!(stats.games_played, 0);
        assert_eq!(stats.games_won, 0);
        assert_eq!(stats.battles, 0);
        assert_eq!(stats.battles_won, 0);
    }

    #[tokio::test]
    async fn test_duplicate_username_and_email_rejected() {
        let store = test_store().await;
        store
            .register_user(new_user("testUser", "test@example.com"))
            .await
            .unwrap();

        let same_name = store
            .register_user(new_user("testUser", "other@example.com"))
            .await;
        assert!(matches!(same_name, Err(StoreError::DuplicateUser)));

        let same_email = store
            .register_user(new_user("otherUser", "test@example.com"))
            .await;
        assert!(matches!(same_email, Err(StoreError::DuplicateUser)));
    }

    #[tokio::test]
    async fn test_login_collapses_failure_modes() {
        let store = test_store().await;
        store
            .register_user(new_user("testUser", "test@example.com"))
            .await
            .unwrap();

        let ok = store.login_user("testUser", "password").await.unwrap();
        assert_eq!(ok.username, "testUser");

        let bad_password = store.login_user("testUser", "wrong").await;
        assert!(matches!(bad_password, Err(StoreError::InvalidCredentials)));

        let no_user = store.login_user("ghost", "password").await;
        assert!(matches!(no_user, Err(StoreError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_delete_removes_user_and_stats() {
        let store = test_store().await;
        store
            .register_user(new_user("testUser", "test@example.com"))
            .await
            .unwrap();

        store.delete_user("testUser").await.unwrap();

        assert!(matches!(
            store.get_user("testUser").await,
            Err(StoreError::UserNotFound)
        ));
        assert!(matches!(
            store.delete_user("testUser").await,
            Err(StoreError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_edit_applies_only_provided_fields() {
        let store = test_store().await;
        store
            .register_user(new_user("testUser", "test@example.com"))
            .await
            .unwrap();

        let patch = UserPatch {
            first_name: Some("Edited".to_string()),
            ..Default::default()
        };
        store.edit_user("testUser", patch).await.unwrap();

        let user = store.get_user("testUser").await.unwrap();
        assert_eq!(user.first_name, "Edited");
        assert_eq!(user.last_name, "User");
        assert_eq!(user.email, "test@example.com");
    }

    #[tokio::test]
    async fn test_edit_email_does_not_collide_with_self() {
        let store = test_store().await;
        store
            .register_user(new_user("testUser", "test@example.com"))
            .await
            .unwrap();
        store
            .register_user(new_user("otherUser", "other@example.com"))
            .await
            .unwrap();

        // resubmitting your own email is fine
        let own = UserPatch {
            email: Some("test@example.com".to_string()),
            ..Default::default()
        };
        store.edit_user("testUser", own).await.unwrap();

        // someone else's email is not
        let taken = UserPatch {
            email: Some("other@example.com".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            store.edit_user("testUser", taken).await,
            Err(StoreError::DuplicateUser)
        ));
    }

    #[tokio::test]
    async fn test_stats_add_is_cumulative() {
        let store = test_store().await;
        store
            .register_user(new_user("testUser", "test@example.com"))
            .await
            .unwrap();

        let delta = StatsDelta {
            games_played: 1,
            games_won: 1,
            battles: 3,
            battles_won: 2,
        };
        store.add_game_stats("testUser", delta).await.unwrap();

        let stats = store.get_game_stats("testUser").await.unwrap();
        assert_eq!(stats.games_played, 1);
        assert_eq!(stats.games_won, 1);
        assert_eq!(stats.battles, 3);
        assert_eq!(stats.battles_won, 2);

        store.add_game_stats("testUser", delta).await.unwrap();
        let stats = store.get_game_stats("testUser").await.unwrap();
        assert_eq!(stats.games_played, 2);
        assert_eq!(stats.battles, 6);
    }

    #[tokio::test]
    async fn test_stats_for_missing_user_is_not_found() {
        let store = test_store().await;
        assert!(matches!(
            store.get_game_stats("ghost").await,
            Err(StoreError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_init_stats_twice_is_duplicate() {
        let store = test_store().await;
        store
            .register_user(new_user("testUser", "test@example.com"))
            .await
            .unwrap();

        assert!(matches!(
            store.init_game_stats("testUser").await,
            Err(StoreError::DuplicateStats)
        ));
    }
}
