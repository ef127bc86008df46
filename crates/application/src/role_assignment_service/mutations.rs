use super::*;

impl RoleAssignmentService {
    /// Replaces every role of the target with `role`.
    ///
    /// Only superadmins (or the system) may assign roles directly. Reassigning
    /// the held role is a successful no-op.
    pub async fn replace_role(
        &self,
        actor: &Actor,
        user_id: UserId,
        role: &RoleName,
    ) -> AppResult<RoleChange> {
        self.resolver
            .authorize_role(actor, &RoleName::superadmin())
            .await?;
        self.require_catalog_role(role).await?;

        self.repository
            .replace_role(user_id, role, actor.assigner())
            .await
    }

    /// Adds `role` to the target without touching other holdings.
    ///
    /// Refused with a conflict while the target holds a different role.
    pub async fn grant_role(
        &self,
        actor: &Actor,
        user_id: UserId,
        role: &RoleName,
    ) -> AppResult<RoleChange> {
        self.resolver
            .authorize_role(actor, &RoleName::superadmin())
            .await?;
        self.require_catalog_role(role).await?;

        self.repository
            .grant_role(user_id, role, actor.assigner())
            .await
    }

    /// Removes `role` from the target; removing an unheld role is a no-op.
    pub async fn remove_role(
        &self,
        actor: &Actor,
        user_id: UserId,
        role: &RoleName,
    ) -> AppResult<RoleChange> {
        self.resolver
            .authorize_role(actor, &RoleName::superadmin())
            .await?;
        self.require_catalog_role(role).await?;

        self.repository.remove_role(user_id, role).await
    }

    /// Makes `user_id` the first superadmin of a fresh platform.
    pub async fn bootstrap_superadmin(&self, user_id: UserId) -> AppResult<RoleChange> {
        self.require_catalog_role(&RoleName::superadmin()).await?;
        self.repository.bootstrap_superadmin(user_id).await
    }
}
