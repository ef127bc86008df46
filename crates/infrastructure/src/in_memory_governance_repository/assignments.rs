use super::*;

impl InMemoryGovernanceRepository {
    pub(super) async fn list_users_with_roles_impl(&self) -> AppResult<Vec<UserWithRoles>> {
        let state = self.state.read().await;

        let mut users: Vec<UserWithRoles> = state
            .users
            .iter()
            .map(|stored| UserWithRoles {
                profile: stored.profile.clone(),
                roles: state.held_roles(stored.profile.user_id),
            })
            .collect();
        // Newest first; ties keep the latest insertion first.
        users.reverse();
        users.sort_by(|left, right| right.profile.created_at.cmp(&left.profile.created_at));

        Ok(users)
    }

    pub(super) async fn grant_role_impl(
        &self,
        user_id: UserId,
        role: &RoleName,
        assigned_by: Option<UserId>,
    ) -> AppResult<RoleChange> {
        let mut state = self.state.write().await;
        state.profile(user_id)?;
        state.catalog.require(role)?;

        let current = state.held_roles(user_id);
        let change = plan_role_grant(user_id, &current, role)?;
        state.apply_role_change(&change, assigned_by);

        Ok(change)
    }

    pub(super) async fn remove_role_impl(
        &self,
        user_id: UserId,
        role: &RoleName,
    ) -> AppResult<RoleChange> {
        let mut state = self.state.write().await;
        state.profile(user_id)?;
        state.catalog.require(role)?;

        let current = state.held_roles(user_id);
        let other_superadmins = state.count_holders(&RoleName::superadmin(), Some(user_id));
        let change = plan_role_removal(user_id, &current, role, other_superadmins)?;
        state.apply_role_change(&change, None);

        Ok(change)
    }

    pub(super) async fn bootstrap_superadmin_impl(&self, user_id: UserId) -> AppResult<RoleChange> {
        let mut state = self.state.write().await;

        if state.count_holders(&RoleName::superadmin(), Some(user_id)) > 0 {
            return Err(AppError::Conflict(
                "a superadmin already exists; bootstrap only applies to a fresh platform"
                    .to_owned(),
            ));
        }

        state.replace_role(user_id, &RoleName::superadmin(), None)
    }
}
