//! Role request lifecycle.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cyberops_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::{RoleName, UserId};

/// Identifier of a role request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleRequestId(i64);

impl RoleRequestId {
    /// Wraps a storage identifier.
    #[must_use]
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the storage identifier.
    #[must_use]
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for RoleRequestId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Lifecycle status of a role request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleRequestStatus {
    /// Awaiting an administrator decision.
    Pending,
    /// Approved; the requested role was assigned.
    Approved,
    /// Rejected; holdings were left untouched.
    Rejected,
}

impl RoleRequestStatus {
    /// Returns the storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Returns whether no further transition is allowed.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl FromStr for RoleRequestStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(AppError::Validation(format!(
                "unknown role request status '{value}'"
            ))),
        }
    }
}

/// Administrator decision on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    /// Assign the requested role.
    Approved,
    /// Leave holdings untouched.
    Rejected,
}

impl DecisionOutcome {
    /// Returns the terminal status this decision produces.
    #[must_use]
    pub fn status(&self) -> RoleRequestStatus {
        match self {
            Self::Approved => RoleRequestStatus::Approved,
            Self::Rejected => RoleRequestStatus::Rejected,
        }
    }
}

impl FromStr for DecisionOutcome {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.parse::<RoleRequestStatus>()? {
            RoleRequestStatus::Approved => Ok(Self::Approved),
            RoleRequestStatus::Rejected => Ok(Self::Rejected),
            RoleRequestStatus::Pending => Err(AppError::Validation(
                "decision must be either 'approved' or 'rejected'".to_owned(),
            )),
        }
    }
}

/// User-initiated proposal to change the requester's role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRequest {
    /// Request identifier.
    pub request_id: RoleRequestId,
    /// Requesting user.
    pub user_id: UserId,
    /// Requested role.
    pub requested_role: RoleName,
    /// Optional free-text justification.
    pub comment: Option<String>,
    /// Lifecycle status.
    pub status: RoleRequestStatus,
    /// Deciding administrator; `None` while pending or when decided by the system.
    pub decided_by: Option<UserId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last transition timestamp.
    pub updated_at: DateTime<Utc>,
}

impl RoleRequest {
    /// Returns the request after applying a decision.
    ///
    /// Terminal requests are immutable; a new request must be submitted.
    pub fn decide(
        &self,
        outcome: DecisionOutcome,
        decided_by: Option<UserId>,
        decided_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        if self.status.is_terminal() {
            return Err(AppError::RequestAlreadyDecided(format!(
                "role request '{}' is already {}",
                self.request_id,
                self.status.as_str()
            )));
        }

        Ok(Self {
            status: outcome.status(),
            decided_by,
            updated_at: decided_at,
            ..self.clone()
        })
    }
}

/// Roles users may request for themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfServiceRolePolicy {
    requestable_roles: BTreeSet<RoleName>,
}

impl SelfServiceRolePolicy {
    /// Builds the allow-list; superadmin is never requestable.
    pub fn new(requestable_roles: impl IntoIterator<Item = RoleName>) -> AppResult<Self> {
        let requestable_roles: BTreeSet<RoleName> = requestable_roles.into_iter().collect();

        if requestable_roles.is_empty() {
            return Err(AppError::Validation(
                "at least one self-requestable role is required".to_owned(),
            ));
        }

        if requestable_roles.iter().any(RoleName::is_superadmin) {
            return Err(AppError::Validation(
                "superadmin can never be self-requested".to_owned(),
            ));
        }

        Ok(Self { requestable_roles })
    }

    /// Returns the allow-list.
    #[must_use]
    pub fn requestable_roles(&self) -> &BTreeSet<RoleName> {
        &self.requestable_roles
    }

    /// Fails with a validation error unless the role is requestable.
    pub fn ensure_requestable(&self, role: &RoleName) -> AppResult<()> {
        if self.requestable_roles.contains(role) {
            return Ok(());
        }

        Err(AppError::Validation(format!(
            "role '{role}' cannot be self-requested"
        )))
    }
}

impl Default for SelfServiceRolePolicy {
    fn default() -> Self {
        Self {
            requestable_roles: BTreeSet::from([
                RoleName::from_constant(RoleName::ADMIN),
                RoleName::from_constant(RoleName::INSTRUCTOR),
            ]),
        }
    }
}
