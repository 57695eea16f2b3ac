use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set, TransactionTrait,
};
use tokio::task;

use crate::config::SecurityConfig;
use crate::db::{StoreError, is_unique_violation};
use crate::entities::{game_stats, users};

/// User data safe to hand to clients (no password hash).
#[derive(Debug, Clone)]
pub struct User {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_admin: bool,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            username: model.username,
            first_name: model.first_name,
            last_name: model.last_name,
            email: model.email,
            is_admin: model.is_admin,
        }
    }
}

/// Input for registration; `password` is the plaintext, hashed before insert.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_admin: bool,
}

/// Typed partial update. Fields left as `None` are untouched; `username`
/// itself is immutable through this path.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub is_admin: Option<bool>,
}

impl UserPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.password.is_none()
            && self.is_admin.is_none()
    }
}

pub struct UserRepository {
    conn: DatabaseConnection,
    security: SecurityConfig,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection, security: SecurityConfig) -> Self {
        Self { conn, security }
    }

    /// Full row including the password hash. Callers strip the hash before
    /// anything leaves the process boundary.
    pub async fn get(&self, username: &str) -> Result<users::Model, StoreError> {
        users::Entity::find_by_id(username.to_owned())
            .one(&self.conn)
            .await?
            .ok_or(StoreError::UserNotFound)
    }

    /// Advisory duplicate pre-check. NOT atomic with a following insert; the
    /// unique constraints in storage are the source of truth and a violation
    /// there is reported as the same `DuplicateUser` error.
    pub async fn exists_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<bool, StoreError> {
        let found = users::Entity::find()
            .filter(
                users::Column::Username
                    .eq(username)
                    .or(users::Column::Email.eq(email)),
            )
            .one(&self.conn)
            .await?;

        Ok(found.is_some())
    }

    /// Whether `email` belongs to an account other than `username`. Excluding
    /// the caller's own row lets a user re-submit their current email without
    /// colliding with themselves.
    pub async fn email_taken_by_other(
        &self,
        email: &str,
        username: &str,
    ) -> Result<bool, StoreError> {
        let found = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .filter(users::Column::Username.ne(username))
            .one(&self.conn)
            .await?;

        Ok(found.is_some())
    }

    /// Insert the user row and its zeroed stats row in one transaction, so a
    /// stats-insert failure cannot leave an orphaned user behind.
    pub async fn register(&self, input: NewUser) -> Result<User, StoreError> {
        if self
            .exists_username_or_email(&input.username, &input.email)
            .await?
        {
            return Err(StoreError::DuplicateUser);
        }

        let password_hash = self.hash_password_blocking(input.password).await?;
        let now = chrono::Utc::now().to_rfc3339();

        let txn = self.conn.begin().await?;

        let user = users::ActiveModel {
            username: Set(input.username.clone()),
            password_hash: Set(password_hash),
            first_name: Set(input.first_name),
            last_name: Set(input.last_name),
            email: Set(input.email),
            is_admin: Set(input.is_admin),
            created_at: Set(now.clone()),
            updated_at: Set(now),
        };

        let inserted = user.insert(&txn).await.map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateUser
            } else {
                StoreError::Db(e)
            }
        })?;

        game_stats::ActiveModel {
            username: Set(input.username),
            games_played: Set(0),
            games_won: Set(0),
            battles: Set(0),
            battles_won: Set(0),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        Ok(User::from(inserted))
    }

    /// Verify credentials and return the public projection. A missing user
    /// and a wrong password collapse to the same error so the response does
    /// not reveal which factor failed.
    pub async fn login(&self, username: &str, password: &str) -> Result<User, StoreError> {
        let user = users::Entity::find_by_id(username.to_owned())
            .one(&self.conn)
            .await?
            .ok_or(StoreError::InvalidCredentials)?;

        let password_hash = user.password_hash.clone();
        let password = password.to_string();

        // Run CPU-intensive password verification in a blocking task
        let is_valid = task::spawn_blocking(move || {
            let Ok(parsed_hash) = PasswordHash::new(&password_hash) else {
                return false;
            };

            Argon2::default()
                .verify_password(password.as_bytes(), &parsed_hash)
                .is_ok()
        })
        .await
        .map_err(|e| StoreError::Internal(format!("Password verification task panicked: {e}")))?;

        if !is_valid {
            return Err(StoreError::InvalidCredentials);
        }

        Ok(User::from(user))
    }

    /// Remove the user. The stats row goes in the same transaction rather
    /// than relying on FK cascade behavior of the backing store.
    pub async fn delete(&self, username: &str) -> Result<(), StoreError> {
        let txn = self.conn.begin().await?;

        game_stats::Entity::delete_by_id(username.to_owned())
            .exec(&txn)
            .await?;

        let result = users::Entity::delete_by_id(username.to_owned())
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Err(StoreError::UserNotFound);
        }

        txn.commit().await?;
        Ok(())
    }

    /// Apply a partial update. Only the provided fields change; a new
    /// password is hashed before storage.
    pub async fn edit(&self, username: &str, patch: UserPatch) -> Result<(), StoreError> {
        let user = self.get(username).await?;

        if let Some(email) = &patch.email
            && self.email_taken_by_other(email, username).await?
        {
            return Err(StoreError::DuplicateUser);
        }

        let mut active = user.into_active_model();

        if let Some(first_name) = patch.first_name {
            active.first_name = Set(first_name);
        }
        if let Some(last_name) = patch.last_name {
            active.last_name = Set(last_name);
        }
        if let Some(email) = patch.email {
            active.email = Set(email);
        }
        if let Some(is_admin) = patch.is_admin {
            active.is_admin = Set(is_admin);
        }
        if let Some(password) = patch.password {
            active.password_hash = Set(self.hash_password_blocking(password).await?);
        }
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        active.update(&self.conn).await.map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::DuplicateUser
            } else {
                StoreError::Db(e)
            }
        })?;

        Ok(())
    }

    async fn hash_password_blocking(&self, password: String) -> Result<String, StoreError> {
        let security = self.security.clone();

        task::spawn_blocking(move || hash_password(&password, &security))
            .await
            .map_err(|e| StoreError::Internal(format!("Password hashing task panicked: {e}")))?
    }
}

/// Hash a password using Argon2id with the configured work factor.
pub fn hash_password(password: &str, config: &SecurityConfig) -> Result<String, StoreError> {
    let salt = SaltString::generate(&mut OsRng);

    let params = Params::new(
        config.argon2_memory_cost_kib,
        config.argon2_time_cost,
        config.argon2_parallelism,
        None, // output length (use default)
    )
    .map_err(|e| StoreError::Internal(format!("Invalid Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| StoreError::Internal(format!("Failed to hash password: {e}")))?;

    Ok(hash.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verify(password: &str, hash: &str) -> bool {
        let parsed = PasswordHash::new(hash).unwrap();
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    #[test]
    fn test_password_round_trip() {
        let config = SecurityConfig::minimal();
        let hash = hash_password("password", &config).unwrap();

        assert_ne!(hash, "password");
        assert!(verify("password", &hash));
        assert!(!verify("wrongPassword", &hash));
    }

    #[test]
    fn test_hashes_are_salted() {
        let config = SecurityConfig::minimal();
        let a = hash_password("password", &config).unwrap();
        let b = hash_password("password", &config).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_patch() {
        assert!(UserPatch::default().is_empty());
        let patch = UserPatch {
            email: Some("a@b.com".to_string()),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
