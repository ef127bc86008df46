use serde::{Deserialize, Serialize};

use crate::AppResult;

/// Explicit success flag plus a human-readable reason.
///
/// Mutations are either fully applied or fully rejected, so there is no
/// third state to represent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationOutcome {
    success: bool,
    message: String,
}

impl MutationOutcome {
    /// Creates a successful outcome.
    #[must_use]
    pub fn applied(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Creates a rejected outcome.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    /// Converts a mutation result, keeping the error text as the reason.
    #[must_use]
    pub fn from_result<T>(result: &AppResult<T>, success_message: impl Into<String>) -> Self {
        match result {
            Ok(_) => Self::applied(success_message),
            Err(error) => Self::rejected(error.to_string()),
        }
    }

    /// Returns whether the mutation was applied.
    #[must_use]
    pub fn success(&self) -> bool {
        self.success
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}
