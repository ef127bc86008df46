use async_trait::async_trait;

use cyberops_core::AppResult;
use cyberops_domain::{PermissionName, RoleChange, RoleName, UserId, UserProfile};

/// User profile with raw role holdings, as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserWithRoles {
    /// User profile.
    pub profile: UserProfile,
    /// Held roles, lowercase.
    pub roles: Vec<RoleName>,
}

/// User profile with effective roles and permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccess {
    /// User profile.
    pub profile: UserProfile,
    /// Held roles.
    pub roles: Vec<RoleName>,
    /// Deduplicated permissions in name order.
    pub permissions: Vec<PermissionName>,
}

/// Repository port for role holdings.
///
/// Every mutation must load current holdings, count other superadmin holders,
/// plan with the domain planners, and apply the plan inside one serialization
/// boundary shared by all role mutations.
#[async_trait]
pub trait RoleAssignmentRepository: Send + Sync {
    /// Lists roles held by a user; empty when the user is unknown.
    async fn list_roles_for_user(&self, user_id: UserId) -> AppResult<Vec<RoleName>>;

    /// Lists distinct permissions granted to a user, ordered by name.
    async fn list_permissions_for_user(&self, user_id: UserId) -> AppResult<Vec<PermissionName>>;

    /// Counts holders of a role, optionally excluding one user.
    async fn count_role_holders(
        &self,
        role: &RoleName,
        excluding: Option<UserId>,
    ) -> AppResult<u64>;

    /// Finds a user profile.
    async fn find_user_profile(&self, user_id: UserId) -> AppResult<Option<UserProfile>>;

    /// Lists every user with their roles, newest account first.
    async fn list_users_with_roles(&self) -> AppResult<Vec<UserWithRoles>>;

    /// Replaces all holdings of a user with one role and mirrors the legacy rank.
    async fn replace_role(
        &self,
        user_id: UserId,
        role: &RoleName,
        assigned_by: Option<UserId>,
    ) -> AppResult<RoleChange>;

    /// Adds a role without removing others.
    async fn grant_role(
        &self,
        user_id: UserId,
        role: &RoleName,
        assigned_by: Option<UserId>,
    ) -> AppResult<RoleChange>;

    /// Removes one role from a user.
    async fn remove_role(&self, user_id: UserId, role: &RoleName) -> AppResult<RoleChange>;

    /// Assigns superadmin as the system while nobody else holds it.
    ///
    /// Returns a no-op change when the user already holds superadmin and a
    /// conflict when another user does.
    async fn bootstrap_superadmin(&self, user_id: UserId) -> AppResult<RoleChange>;
}
