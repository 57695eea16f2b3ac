//! Signed bearer tokens for the REST API.
//!
//! HS256 JWTs carrying `{username, isAdmin, iat, exp}`. The server never
//! stores an issued token; possession of a token with a valid signature and
//! an unexpired `exp` is the whole credential.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Claim set embedded in every token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub username: String,
    pub is_admin: bool,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,

    #[error("Invalid token")]
    Invalid,

    #[error("Failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Issues and verifies bearer tokens with a process-wide signing key.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validity: Duration,
}

impl TokenService {
    #[must_use]
    pub fn new(secret: &str, validity_days: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validity: Duration::days(validity_days),
        }
    }

    /// Sign a fresh token for an authenticated identity.
    /// `exp` is always `iat` plus the configured validity window.
    pub fn issue(&self, username: &str, is_admin: bool) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            username: username.to_string(),
            is_admin,
            iat: now.timestamp(),
            exp: (now + self.validity).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding).map_err(TokenError::Signing)
    }

    /// Decode and verify a presented token. Expiration is checked by the
    /// decoder; a bad signature and a malformed token both come back as
    /// `Invalid`.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let validation = Validation::default();

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "test-secret-key-for-token-tests";

    #[test]
    fn test_issue_and_verify_round_trip() {
        let service = TokenService::new(TEST_SECRET, 5);

        let token = service.issue("testUser", false).unwrap();
        assert!(!token.is_empty());

        let claims = service.verify(&token).unwrap();
        assert_eq!(claims.username, "testUser");
        assert!(!claims.is_admin);
    }

    #[test]
    fn test_expiry_is_after_issuance() {
        let service = TokenService::new(TEST_SECRET, 5);
        let token = service.issue("testUser", true).unwrap();
        let claims = service.verify(&token).unwrap();

        assert!(claims.exp > claims.iat);
        assert_eq!(claims.exp - claims.iat, 5 * 24 * 60 * 60);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let service = TokenService::new(TEST_SECRET, 5);
        let other = TokenService::new("a-completely-different-secret", 5);

        let token = service.issue("testUser", false).unwrap();
        assert!(matches!(other.verify(&token), Err(TokenError::Invalid)));
    }

    #[test]
    fn test_expired_token_rejected() {
        // negative validity puts exp a full day in the past, beyond any leeway
        let service = TokenService::new(TEST_SECRET, -1);
        let token = service.issue("testUser", false).unwrap();

        assert!(matches!(service.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_malformed_token_rejected() {
        let service = TokenService::new(TEST_SECRET, 5);
        assert!(matches!(
            service.verify("not.a.token"),
            Err(TokenError::Invalid)
        ));
        assert!(matches!(service.verify(""), Err(TokenError::Invalid)));
    }

    #[test]
    fn test_admin_flag_survives_round_trip() {
        let service = TokenService::new(TEST_SECRET, 5);
        let token = service.issue("adminUser", true).unwrap();
        assert!(service.verify(&token).unwrap().is_admin);
    }
}
