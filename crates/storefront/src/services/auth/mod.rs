//! Authentication service.
//!
//! Password registration and login issuing JWT access tokens.

mod error;
mod token;

pub use error::AuthError;
pub use token::{Claims, JwtKeys};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use stitchery_core::{Email, UserId};

use crate::db::{RepositoryError, Store};
use crate::models::{NewUser, User};

/// Minimum password length.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum display name length.
const MAX_NAME_LENGTH: usize = 100;

/// Body of a registration request.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub email: String,
    pub name: Option<String>,
    pub password: String,
}

/// Body of a login request.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

/// Successful login.
#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user: User,
}

/// Authentication service.
///
/// Handles user registration and password login.
pub struct AuthService<'a> {
    store: &'a dyn Store,
    keys: &'a JwtKeys,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(store: &'a dyn Store, keys: &'a JwtKeys) -> Self {
        Self { store, keys }
    }

    /// Register a new customer account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password doesn't meet requirements.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: RegisterInput) -> Result<User, AuthError> {
        let user = create_user(
            self.store,
            &input.email,
            input.name.as_deref(),
            &input.password,
            false,
        )
        .await?;
        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email/password is wrong.
    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn login(&self, input: LoginInput) -> Result<LoginResponse, AuthError> {
        // Malformed email and unknown email look the same to the caller
        let email = Email::parse(&input.email).map_err(|_| AuthError::InvalidCredentials)?;

        let (user, password_hash) = self
            .store
            .get_password_hash(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(&input.password, &password_hash)?;

        let access_token = self.keys.issue(&user)?;
        tracing::info!(user_id = %user.id, "User logged in");
        Ok(LoginResponse { access_token, user })
    }

    /// The authenticated user's profile.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UserNotFound` if the account no longer exists.
    pub async fn profile(&self, user_id: UserId) -> Result<User, AuthError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }
}

/// Create an administrator account. Only reachable from the CLI.
///
/// # Errors
///
/// Same as registration.
pub async fn create_admin(
    store: &dyn Store,
    email: &str,
    name: Option<&str>,
    password: &str,
) -> Result<User, AuthError> {
    let user = create_user(store, email, name, password, true).await?;
    tracing::info!(user_id = %user.id, "Admin user created");
    Ok(user)
}

async fn create_user(
    store: &dyn Store,
    email: &str,
    name: Option<&str>,
    password: &str,
    is_admin: bool,
) -> Result<User, AuthError> {
    // Validate email
    let email = Email::parse(email)?;

    // Validate password
    validate_password(password)?;

    let name = validate_name(name)?;

    // Hash password
    let password_hash = hash_password(password)?;

    store
        .create_user(NewUser {
            email,
            name,
            password_hash,
            is_admin,
        })
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
            other => AuthError::Repository(other),
        })
}

pub(crate) fn validate_name(name: Option<&str>) -> Result<Option<String>, AuthError> {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(AuthError::Validation(format!(
            "name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(Some(name.to_owned()))
}

pub(crate) fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Hash a password using Argon2id.
pub(crate) fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::StorefrontConfig;
    use crate::db::MemoryStore;

    fn keys() -> JwtKeys {
        JwtKeys::new(&StorefrontConfig::for_testing("k8Qz1vR3nT6wY9bC2eF5hJ7mP0sU4xA").jwt)
    }

    fn register_input(email: &str, password: &str) -> RegisterInput {
        RegisterInput {
            email: email.to_owned(),
            name: Some("Grace".to_owned()),
            password: password.to_owned(),
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let store = MemoryStore::new();
        let keys = keys();
        let service = AuthService::new(&store, &keys);

        let user = service
            .register(register_input("Grace@Stitchery.test", "correct horse"))
            .await
            .unwrap();
        assert!(!user.is_admin);
        assert_eq!(user.email.as_str(), "grace@stitchery.test");

        let login = service
            .login(LoginInput {
                email: "grace@stitchery.test".to_owned(),
                password: "correct horse".to_owned(),
            })
            .await
            .unwrap();
        assert_eq!(login.user.id, user.id);
        assert_eq!(keys.verify(&login.access_token).unwrap().sub, user.id);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_weak_passwords() {
        let store = MemoryStore::new();
        let keys = keys();
        let service = AuthService::new(&store, &keys);

        service
            .register(register_input("grace@stitchery.test", "correct horse"))
            .await
            .unwrap();

        assert!(matches!(
            service
                .register(register_input("grace@stitchery.test", "another one"))
                .await,
            Err(AuthError::UserAlreadyExists)
        ));
        assert!(matches!(
            service.register(register_input("new@stitchery.test", "short")).await,
            Err(AuthError::WeakPassword(_))
        ));
        assert!(matches!(
            service.register(register_input("not-an-email", "correct horse")).await,
            Err(AuthError::InvalidEmail(_))
        ));
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let store = MemoryStore::new();
        let keys = keys();
        let service = AuthService::new(&store, &keys);
        service
            .register(register_input("grace@stitchery.test", "correct horse"))
            .await
            .unwrap();

        for (email, password) in [
            ("grace@stitchery.test", "wrong password"),
            ("nobody@stitchery.test", "correct horse"),
            ("garbage", "correct horse"),
        ] {
            let err = service
                .login(LoginInput {
                    email: email.to_owned(),
                    password: password.to_owned(),
                })
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials));
        }
    }

    #[tokio::test]
    async fn test_create_admin_sets_flag() {
        let store = MemoryStore::new();
        let admin = create_admin(&store, "root@stitchery.test", None, "correct horse")
            .await
            .unwrap();
        assert!(admin.is_admin);
    }
}
