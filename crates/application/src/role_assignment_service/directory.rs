use super::*;

impl RoleAssignmentService {
    /// Lists catalog roles in creation order.
    pub async fn list_roles(&self) -> AppResult<Vec<RoleDefinition>> {
        let catalog = self.catalog_repository.load_catalog().await?;
        Ok(catalog.roles().to_vec())
    }

    /// Lists catalog permissions in name order.
    pub async fn list_permissions(&self) -> AppResult<Vec<PermissionDefinition>> {
        let catalog = self.catalog_repository.load_catalog().await?;
        Ok(catalog.permissions().to_vec())
    }

    /// Lists every user with roles and permissions, newest account first.
    pub async fn list_users_with_roles(&self, actor: &Actor) -> AppResult<Vec<UserAccess>> {
        self.resolver
            .authorize_permission(actor, &PermissionName::users_view())
            .await?;

        let catalog = self.catalog_repository.load_catalog().await?;
        let users = self.repository.list_users_with_roles().await?;

        Ok(users
            .into_iter()
            .map(|user| Self::user_access(&catalog, user))
            .collect())
    }

    /// Returns one user's profile with roles and permissions.
    ///
    /// Users may always read their own profile.
    pub async fn access_profile(&self, actor: &Actor, user_id: UserId) -> AppResult<UserAccess> {
        if actor.user_id() != Some(user_id) {
            self.resolver
                .authorize_permission(actor, &PermissionName::users_view())
                .await?;
        }

        let profile = self
            .repository
            .find_user_profile(user_id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(format!("user '{user_id}' does not exist")))?;
        let roles = self.repository.list_roles_for_user(user_id).await?;
        let permissions = self.repository.list_permissions_for_user(user_id).await?;

        Ok(UserAccess {
            profile,
            roles,
            permissions,
        })
    }
}
