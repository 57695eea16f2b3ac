use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

use super::auth::{AuthContext, ensure_admin, ensure_correct_user_or_admin};
use super::validation::{
    AppJson, validate_email, validate_name, validate_password, validate_username,
};
use super::{ApiError, AppState};
use crate::db::{NewUser, User, UserPatch};

/// User fields as they appear on the wire.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_admin: bool,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            is_admin: user.is_admin,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Partial profile update. `username` is deliberately absent: accounts are
/// keyed by it everywhere, so renames are not supported and an attempt is
/// rejected as an unknown property.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EditUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub is_admin: Option<bool>,
}

/// POST /users/register
///
/// Creates the account with zeroed game stats and returns a signed token so
/// the client is logged in immediately.
pub async fn register(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let username = validate_username(&body.username)?.to_string();
    validate_password(&body.password)?;
    validate_name(&body.first_name, "firstName")?;
    validate_name(&body.last_name, "lastName")?;
    let email = validate_email(&body.email)?.to_string();

    let user = state
        .store
        .register_user(NewUser {
            username,
            password: body.password,
            first_name: body.first_name,
            last_name: body.last_name,
            email,
            is_admin: false,
        })
        .await?;

    let token = state
        .tokens
        .issue(&user.username, user.is_admin)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    info!("Registered user '{}'", user.username);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "user": PublicUser::from(user),
            "_token": token,
        })),
    ))
}

/// POST /users/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    AppJson(body): AppJson<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let user = state.store.login_user(&body.username, &body.password).await?;

    let token = state
        .tokens
        .issue(&user.username, user.is_admin)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(json!({
        "success": true,
        "user": PublicUser::from(user),
        "_token": token,
    })))
}

/// GET /users/{username}
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Value>, ApiError> {
    ensure_correct_user_or_admin(&ctx, &username)?;

    let user = state.store.get_user(&username).await?;

    Ok(Json(json!({
        "success": true,
        "user": PublicUser::from(User::from(user)),
    })))
}

/// DELETE /users/{username}
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    Extension(ctx): Extension<AuthContext>,
) -> Result<Json<Value>, ApiError> {
    ensure_correct_user_or_admin(&ctx, &username)?;

    state.store.delete_user(&username).await?;

    info!("Deleted user '{}'", username);

    Ok(Json(json!({
        "success": true,
        "deleted": { "username": username },
    })))
}

/// PATCH /users/{username}
///
/// Applies the provided fields only. Changing `isAdmin` additionally
/// requires the caller to already be an admin.
pub async fn edit_user(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    Extension(ctx): Extension<AuthContext>,
    AppJson(body): AppJson<EditUserRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    ensure_correct_user_or_admin(&ctx, &username)?;

    if body.is_admin.is_some() {
        ensure_admin(&ctx)?;
    }

    if let Some(email) = &body.email {
        validate_email(email)?;
    }
    if let Some(password) = &body.password {
        validate_password(password)?;
    }
    if let Some(first_name) = &body.first_name {
        validate_name(first_name, "firstName")?;
    }
    if let Some(last_name) = &body.last_name {
        validate_name(last_name, "lastName")?;
    }

    let patch = UserPatch {
        first_name: body.first_name,
        last_name: body.last_name,
        email: body.email.map(|e| e.trim().to_string()),
        password: body.password,
        is_admin: body.is_admin,
    };

    if patch.is_empty() {
        return Err(ApiError::invalid_json());
    }

    state.store.edit_user(&username, patch).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "modified": { "username": username },
        })),
    ))
}
