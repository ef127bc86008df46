//! Shared primitives for all Rust crates in CyberOps.

#![forbid(unsafe_code)]

/// Caller-facing mutation outcome shape.
pub mod outcome;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use outcome::MutationOutcome;

/// Result type used across CyberOps crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Normalizes optional free text, treating blank input as absent.
    #[must_use]
    pub fn from_optional(value: Option<String>) -> Option<Self> {
        value.and_then(|value| {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| Self(trimmed.to_owned()))
        })
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

/// Error taxonomy shared by every governance operation.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input, rejected before any mutation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Role name does not resolve to a catalog entry.
    #[error("role not found: {0}")]
    RoleNotFound(String),

    /// User identifier does not resolve to an existing user.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Role request identifier does not resolve to an existing request.
    #[error("role request not found: {0}")]
    RequestNotFound(String),

    /// Role request already reached a terminal status.
    #[error("role request already decided: {0}")]
    RequestAlreadyDecided(String),

    /// Mutation would leave the platform without any superadmin.
    #[error("last superadmin violation: {0}")]
    LastSuperadminViolation(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Caller is authenticated but blocked by authorization policy.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Persistent store could not serve the request.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns whether the caller may retry the same operation unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}
