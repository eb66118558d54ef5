//! Access tokens.
//!
//! HS256-signed JWTs carrying the user id, email and admin flag. The server
//! keeps no session state; a token is valid until it expires.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use stitchery_core::UserId;

use super::AuthError;
use crate::config::JwtConfig;
use crate::models::User;

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User ID.
    pub sub: UserId,
    pub email: String,
    pub is_admin: bool,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Signing and verification keys derived from the configured secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtKeys")
            .field("keys", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl JwtKeys {
    /// Build keys from configuration.
    #[must_use]
    pub fn new(config: &JwtConfig) -> Self {
        let secret = config.secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::hours(i64::from(config.ttl_hours)),
        }
    }

    /// Issue a token for `user`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenSigning` if encoding fails.
    pub fn issue(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            email: user.email.as_str().to_owned(),
            is_admin: user.is_admin,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(AuthError::TokenSigning)
    }

    /// Verify a token's signature and expiry and return its claims.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` for any malformed, forged or
    /// expired token.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Rejected access token");
                AuthError::InvalidToken
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;
    use stitchery_core::Email;

    use super::*;

    fn keys(secret: &str, ttl_hours: u32) -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: SecretString::from(secret.to_owned()),
            ttl_hours,
        })
    }

    fn user() -> User {
        User {
            id: UserId::generate(),
            email: Email::parse("ada@stitchery.test").unwrap(),
            name: Some("Ada".to_owned()),
            is_admin: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_issue_then_verify() {
        let keys = keys("k8Qz1vR3nT6wY9bC2eF5hJ7mP0sU4xA", 24);
        let user = user();

        let claims = keys.verify(&keys.issue(&user).unwrap()).unwrap();

        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, "ada@stitchery.test");
        assert!(claims.is_admin);
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let token = keys("k8Qz1vR3nT6wY9bC2eF5hJ7mP0sU4xA", 1)
            .issue(&user())
            .unwrap();
        let err = keys("Zr4Lp9Wq2Xc7Vb1Nm6Kj3Hg8Fd5Sa0T", 1)
            .verify(&token)
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = keys("k8Qz1vR3nT6wY9bC2eF5hJ7mP0sU4xA", 1)
            .verify("not.a.jwt")
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken));
    }
}
