use axum::{
    Json,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;

use super::ApiError;

/// JSON body extractor that maps every deserialization failure to the
/// canonical 400 "Invalid JSON properties" response instead of axum's
/// plaintext rejection.
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(_) => Err(ApiError::invalid_json()),
        }
    }
}

pub fn validate_username(username: &str) -> Result<&str, ApiError> {
    let trimmed = username.trim();

    if trimmed.is_empty() {
        return Err(ApiError::bad_request("Username cannot be empty"));
    }

    if trimmed.len() > 30 {
        return Err(ApiError::bad_request(
            "Username must be 30 characters or less",
        ));
    }

    if !trimmed.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(ApiError::bad_request(
            "Username can only contain letters, numbers, and underscores",
        ));
    }

    Ok(trimmed)
}

pub fn validate_password(password: &str) -> Result<&str, ApiError> {
    if password.len() < 5 {
        return Err(ApiError::bad_request(
            "Password must be at least 5 characters",
        ));
    }
    Ok(password)
}

/// Minimal shape check; real deliverability is the mail server's problem.
pub fn validate_email(email: &str) -> Result<&str, ApiError> {
    let trimmed = email.trim();

    let well_formed = trimmed
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));

    if !well_formed {
        return Err(ApiError::bad_request("Invalid email address"));
    }

    Ok(trimmed)
}

pub fn validate_name(name: &str, field: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{} cannot be empty", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert!(validate_username("testUser").is_ok());
        assert!(validate_username("user_123").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("   ").is_err());
        assert!(validate_username("bad name").is_err());
        assert!(validate_username("a".repeat(31).as_str()).is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("password").is_ok());
        assert!(validate_password("abcd").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("  user@example.com  ").is_ok());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@nodot").is_err());
    }
}
