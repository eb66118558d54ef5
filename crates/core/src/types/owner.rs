//! Cart ownership.
//!
//! A cart belongs either to an authenticated user or to an anonymous browser
//! session, never both and never neither. [`CartOwner`] makes the "neither"
//! and "both" states unrepresentable.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::id::UserId;

/// Errors that can occur when parsing a [`SessionId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionIdError {
    /// The session identifier is empty or whitespace.
    #[error("session id cannot be empty")]
    Empty,
    /// The session identifier is too long.
    #[error("session id must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
}

/// Opaque guest-session identifier supplied by the client.
///
/// The storefront frontend generates one per browser and sends it in the
/// `X-Session-Id` header (or in the request body for some cart calls).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Maximum length of a session identifier.
    pub const MAX_LENGTH: usize = 128;

    /// Parse a session identifier, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is empty or longer than
    /// [`SessionId::MAX_LENGTH`].
    pub fn parse(s: &str) -> Result<Self, SessionIdError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SessionIdError::Empty);
        }
        if s.len() > Self::MAX_LENGTH {
            return Err(SessionIdError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        Ok(Self(s.to_owned()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionId {
    type Error = SessionIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The identity a cart is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CartOwner {
    /// An authenticated user.
    User(UserId),
    /// An anonymous browser session.
    Session(SessionId),
}

impl CartOwner {
    /// Resolve the owner from the identities present on a request.
    ///
    /// An authenticated user takes precedence over a guest session. Returns
    /// `None` when neither is present.
    #[must_use]
    pub fn resolve(user_id: Option<UserId>, session_id: Option<SessionId>) -> Option<Self> {
        match (user_id, session_id) {
            (Some(user_id), _) => Some(Self::User(user_id)),
            (None, Some(session_id)) => Some(Self::Session(session_id)),
            (None, None) => None,
        }
    }

    /// The user ID, if this is a user-owned cart.
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::User(id) => Some(*id),
            Self::Session(_) => None,
        }
    }

    /// The session ID, if this is a guest cart.
    #[must_use]
    pub const fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::User(_) => None,
            Self::Session(id) => Some(id),
        }
    }
}

impl fmt::Display for CartOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Session(id) => write!(f, "session:{id}"),
        }
    }
}
