//! Effective role and permission lookups.
//!
//! Names are normalized value types, so every comparison here is already
//! case-insensitive. Superadmin holders pass every permission check.

use std::collections::BTreeSet;
use std::sync::Arc;

use cyberops_core::{AppError, AppResult};
use cyberops_domain::{Actor, PermissionName, RoleName, UserId};

use crate::RoleAssignmentRepository;

/// Read-only resolver over role holdings.
#[derive(Clone)]
pub struct PermissionResolver {
    repository: Arc<dyn RoleAssignmentRepository>,
}

impl PermissionResolver {
    /// Creates a resolver from a repository implementation.
    #[must_use]
    pub fn new(repository: Arc<dyn RoleAssignmentRepository>) -> Self {
        Self { repository }
    }

    /// Returns the roles a user holds; empty for unknown users.
    pub async fn roles_of(&self, user_id: UserId) -> AppResult<BTreeSet<RoleName>> {
        Ok(self
            .repository
            .list_roles_for_user(user_id)
            .await?
            .into_iter()
            .collect())
    }

    /// Returns the deduplicated permissions of a user in name order.
    pub async fn permissions_of(&self, user_id: UserId) -> AppResult<BTreeSet<PermissionName>> {
        Ok(self
            .repository
            .list_permissions_for_user(user_id)
            .await?
            .into_iter()
            .collect())
    }

    /// Returns whether the user holds the role.
    pub async fn has_role(&self, user_id: UserId, role: &RoleName) -> AppResult<bool> {
        Ok(self.roles_of(user_id).await?.contains(role))
    }

    /// Returns whether the user holds at least one of the roles.
    pub async fn has_any_role(&self, user_id: UserId, roles: &[RoleName]) -> AppResult<bool> {
        let held = self.roles_of(user_id).await?;
        Ok(roles.iter().any(|role| held.contains(role)))
    }

    /// Returns whether the user is granted the permission.
    pub async fn has_permission(
        &self,
        user_id: UserId,
        permission: &PermissionName,
    ) -> AppResult<bool> {
        self.has_any_permission(user_id, std::slice::from_ref(permission))
            .await
    }

    /// Returns whether the user is granted at least one of the permissions.
    ///
    /// An empty list is never satisfied, superadmin included.
    pub async fn has_any_permission(
        &self,
        user_id: UserId,
        permissions: &[PermissionName],
    ) -> AppResult<bool> {
        if permissions.is_empty() {
            return Ok(false);
        }

        if self.has_role(user_id, &RoleName::superadmin()).await? {
            return Ok(true);
        }

        let granted = self.permissions_of(user_id).await?;
        Ok(permissions
            .iter()
            .any(|permission| granted.contains(permission)))
    }

    /// Counts holders of a role, optionally excluding one user.
    pub async fn count_holders(
        &self,
        role: &RoleName,
        excluding: Option<UserId>,
    ) -> AppResult<u64> {
        self.repository.count_role_holders(role, excluding).await
    }

    /// Ensures the user holds the role.
    pub async fn require_role(&self, user_id: UserId, role: &RoleName) -> AppResult<()> {
        if self.has_role(user_id, role).await? {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "user '{user_id}' is missing role '{role}'"
        )))
    }

    /// Ensures the user is granted the permission.
    pub async fn require_permission(
        &self,
        user_id: UserId,
        permission: &PermissionName,
    ) -> AppResult<()> {
        if self.has_permission(user_id, permission).await? {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "user '{user_id}' is missing permission '{permission}'"
        )))
    }

    pub(crate) async fn authorize_role(&self, actor: &Actor, role: &RoleName) -> AppResult<()> {
        match actor {
            Actor::System => Ok(()),
            Actor::User { user_id } => self.require_role(*user_id, role).await,
        }
    }

    pub(crate) async fn authorize_permission(
        &self,
        actor: &Actor,
        permission: &PermissionName,
    ) -> AppResult<()> {
        match actor {
            Actor::System => Ok(()),
            Actor::User { user_id } => self.require_permission(*user_id, permission).await,
        }
    }
}
