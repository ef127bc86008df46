//! Role assignment invariants.
//!
//! The planners here are pure: storage adapters load the current holdings
//! and the superadmin holder count inside their serialization boundary, ask
//! for a plan, and apply it only when planning succeeds.

use chrono::{DateTime, Utc};
use cyberops_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::{RoleName, UserId};

/// Principal driving an assignment mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Actor {
    /// Platform itself, e.g. bootstrap or migrations.
    System,
    /// Authenticated user.
    User {
        /// Verified user identifier.
        user_id: UserId,
    },
}

impl Actor {
    /// Creates an actor for an authenticated user.
    #[must_use]
    pub fn user(user_id: UserId) -> Self {
        Self::User { user_id }
    }

    /// Returns the authenticated caller, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::System => None,
            Self::User { user_id } => Some(*user_id),
        }
    }

    /// Returns the assigner recorded on assignments; `None` means system.
    #[must_use]
    pub fn assigner(&self) -> Option<UserId> {
        self.user_id()
    }
}

/// Persisted link between a user and a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// Role holder.
    pub user_id: UserId,
    /// Held role.
    pub role: RoleName,
    /// Assigning user; `None` when assigned by the system.
    pub assigned_by: Option<UserId>,
    /// Assignment timestamp.
    pub assigned_at: DateTime<Utc>,
}

/// Planned or applied change to one user's role holdings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChange {
    /// Target user.
    pub user_id: UserId,
    /// Roles removed from the user.
    pub removed: Vec<RoleName>,
    /// Role added to the user, if any.
    pub added: Option<RoleName>,
}

impl RoleChange {
    fn unchanged(user_id: UserId) -> Self {
        Self {
            user_id,
            removed: Vec::new(),
            added: None,
        }
    }

    /// Returns whether applying the change leaves holdings untouched.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.removed.is_empty() && self.added.is_none()
    }

    /// Returns whether the change drops a superadmin assignment.
    #[must_use]
    pub fn removes_superadmin(&self) -> bool {
        self.removed.iter().any(RoleName::is_superadmin)
    }
}

/// Plans replacing every current role of a user with `requested`.
///
/// `other_superadmin_holders` must count holders excluding `user_id` and be
/// read inside the same serialization boundary that applies the plan.
pub fn plan_role_replacement(
    user_id: UserId,
    current: &[RoleName],
    requested: &RoleName,
    other_superadmin_holders: u64,
) -> AppResult<RoleChange> {
    let already_held = current.contains(requested);
    let removed: Vec<RoleName> = current
        .iter()
        .filter(|role| *role != requested)
        .cloned()
        .collect();

    let change = RoleChange {
        user_id,
        removed,
        added: (!already_held).then(|| requested.clone()),
    };

    ensure_superadmin_remains(&change, other_superadmin_holders)?;
    Ok(change)
}

/// Plans an additive grant.
///
/// Users hold at most one role, so a grant on top of a different role is
/// refused instead of silently widening access.
pub fn plan_role_grant(
    user_id: UserId,
    current: &[RoleName],
    requested: &RoleName,
) -> AppResult<RoleChange> {
    if current.contains(requested) {
        return Ok(RoleChange::unchanged(user_id));
    }

    if let Some(held) = current.first() {
        return Err(AppError::Conflict(format!(
            "user '{user_id}' already holds role '{held}'; replace the role instead of granting '{requested}'"
        )));
    }

    Ok(RoleChange {
        user_id,
        removed: Vec::new(),
        added: Some(requested.clone()),
    })
}

/// Plans removing one role from a user.
pub fn plan_role_removal(
    user_id: UserId,
    current: &[RoleName],
    role: &RoleName,
    other_superadmin_holders: u64,
) -> AppResult<RoleChange> {
    if !current.contains(role) {
        return Ok(RoleChange::unchanged(user_id));
    }

    let change = RoleChange {
        user_id,
        removed: vec![role.clone()],
        added: None,
    };

    ensure_superadmin_remains(&change, other_superadmin_holders)?;
    Ok(change)
}

fn ensure_superadmin_remains(change: &RoleChange, other_superadmin_holders: u64) -> AppResult<()> {
    if change.removes_superadmin() && other_superadmin_holders == 0 {
        return Err(AppError::LastSuperadminViolation(format!(
            "user '{}' is the last superadmin; assign another superadmin first",
            change.user_id
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn role(name: &str) -> RoleName {
        RoleName::new(name).unwrap_or_else(|_| RoleName::superadmin())
    }

    #[test]
    fn replacing_with_the_held_role_is_a_noop() {
        let user_id = UserId::new();
        let change = plan_role_replacement(user_id, &[role("admin")], &role("admin"), 0);

        assert!(change.is_ok());
        assert!(change.map(|change| change.is_noop()).unwrap_or(false));
    }

    #[test]
    fn replacement_swaps_previous_role() {
        let user_id = UserId::new();
        let change = plan_role_replacement(user_id, &[role("user")], &role("instructor"), 0)
            .unwrap_or_else(|_| panic!("replacement should be planned"));

        assert_eq!(change.removed, vec![role("user")]);
        assert_eq!(change.added, Some(role("instructor")));
    }

    #[test]
    fn last_superadmin_cannot_be_replaced() {
        let user_id = UserId::new();
        let result = plan_role_replacement(user_id, &[RoleName::superadmin()], &role("admin"), 0);

        assert!(matches!(result, Err(AppError::LastSuperadminViolation(_))));
    }

    #[test]
    fn superadmin_can_step_down_when_another_exists() {
        let user_id = UserId::new();
        let result = plan_role_removal(user_id, &[RoleName::superadmin()], &RoleName::superadmin(), 1);

        assert!(result.map(|change| change.removes_superadmin()).unwrap_or(false));
    }

    #[test]
    fn removing_an_unheld_role_is_a_noop() {
        let user_id = UserId::new();
        let result = plan_role_removal(user_id, &[role("user")], &RoleName::superadmin(), 0);

        assert!(result.map(|change| change.is_noop()).unwrap_or(false));
    }

    #[test]
    fn grant_refuses_a_second_role() {
        let user_id = UserId::new();
        let result = plan_role_grant(user_id, &[role("user")], &role("admin"));

        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[test]
    fn system_actor_has_no_assigner() {
        let user_id = UserId::new();
        assert_eq!(Actor::System.assigner(), None);
        assert_eq!(Actor::user(user_id).assigner(), Some(user_id));
    }

    #[test]
    fn caller_identity_is_only_known_for_users() {
        let user_id = UserId::new();
        assert_eq!(Actor::System.user_id(), None);
        assert_eq!(Actor::user(user_id).user_id(), Some(user_id));
    }

    fn any_role() -> impl Strategy<Value = RoleName> {
        prop_oneof![
            Just(RoleName::superadmin()),
            Just(role("admin")),
            Just(role("instructor")),
            Just(role("user")),
        ]
    }

    proptest! {
        #[test]
        fn planned_replacements_never_strand_superadmin(
            current in proptest::option::of(any_role()),
            requested in any_role(),
            others in 0_u64..3,
        ) {
            let user_id = UserId::new();
            let current: Vec<RoleName> = current.into_iter().collect();
            let holds_superadmin = current.iter().any(RoleName::is_superadmin);

            match plan_role_replacement(user_id, &current, &requested, others) {
                Ok(change) => {
                    let remaining = others
                        + u64::from(holds_superadmin && !change.removes_superadmin())
                        + u64::from(change.added.as_ref().is_some_and(RoleName::is_superadmin));
                    prop_assert!(!holds_superadmin || remaining >= 1);
                }
                Err(error) => {
                    prop_assert!(matches!(error, AppError::LastSuperadminViolation(_)));
                    prop_assert!(holds_superadmin && others == 0);
                }
            }
        }

        #[test]
        fn replacement_leaves_exactly_the_requested_role(
            current in proptest::collection::vec(any_role(), 0..3),
            requested in any_role(),
        ) {
            let user_id = UserId::new();
            if let Ok(change) = plan_role_replacement(user_id, &current, &requested, 1) {
                let mut after: Vec<RoleName> = current
                    .iter()
                    .filter(|role| !change.removed.contains(role))
                    .cloned()
                    .collect();
                after.extend(change.added.clone());
                after.dedup();
                prop_assert_eq!(after, vec![requested]);
            }
        }
    }
}
