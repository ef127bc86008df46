use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use cyberops_core::{AppError, AppResult};
use cyberops_domain::{
    PermissionName, RoleCatalog, RoleChange, RoleName, UserId, UserProfile, plan_role_grant,
    plan_role_removal, plan_role_replacement,
};

use crate::{RoleAssignmentRepository, RoleCatalogRepository, UserWithRoles};

pub(crate) fn role(name: &str) -> RoleName {
    RoleName::new(name).unwrap_or_else(|_| panic!("invalid test role '{name}'"))
}

pub(crate) fn permission(name: &str) -> PermissionName {
    PermissionName::new(name).unwrap_or_else(|_| panic!("invalid test permission '{name}'"))
}

pub(crate) fn profile(user_id: UserId, username: &str) -> UserProfile {
    UserProfile {
        user_id,
        username: username.to_owned(),
        email: format!("{username}@cyberops.example"),
        full_name: None,
        is_active: true,
        created_at: Utc::now(),
    }
}

pub(crate) struct FakeCatalogRepository;

#[async_trait]
impl RoleCatalogRepository for FakeCatalogRepository {
    async fn load_catalog(&self) -> AppResult<RoleCatalog> {
        Ok(RoleCatalog::training_platform())
    }
}

#[derive(Default)]
pub(crate) struct FakeAssignmentRepository {
    pub(crate) profiles: Mutex<Vec<UserProfile>>,
    pub(crate) holdings: Mutex<HashMap<UserId, Vec<(RoleName, Option<UserId>)>>>,
    pub(crate) mutations: Mutex<u32>,
}

impl FakeAssignmentRepository {
    pub(crate) async fn with_user(self, user_id: UserId, username: &str, roles: &[&str]) -> Self {
        self.profiles.lock().await.push(profile(user_id, username));
        self.holdings.lock().await.insert(
            user_id,
            roles.iter().map(|name| (role(name), None)).collect(),
        );
        self
    }

    async fn current(&self, user_id: UserId) -> Vec<RoleName> {
        self.holdings
            .lock()
            .await
            .get(&user_id)
            .map(|held| held.iter().map(|(role, _)| role.clone()).collect())
            .unwrap_or_default()
    }

    async fn ensure_user(&self, user_id: UserId) -> AppResult<()> {
        if self
            .profiles
            .lock()
            .await
            .iter()
            .any(|profile| profile.user_id == user_id)
        {
            return Ok(());
        }

        Err(AppError::UserNotFound(format!(
            "user '{user_id}' does not exist"
        )))
    }

    async fn apply(&self, change: &RoleChange, assigned_by: Option<UserId>) {
        let mut holdings = self.holdings.lock().await;
        let held = holdings.entry(change.user_id).or_default();
        held.retain(|(role, _)| !change.removed.contains(role));
        if let Some(added) = &change.added {
            held.push((added.clone(), assigned_by));
        }
        *self.mutations.lock().await += 1;
    }
}

#[async_trait]
impl RoleAssignmentRepository for FakeAssignmentRepository {
    async fn list_roles_for_user(&self, user_id: UserId) -> AppResult<Vec<RoleName>> {
        Ok(self.current(user_id).await)
    }

    async fn list_permissions_for_user(&self, user_id: UserId) -> AppResult<Vec<PermissionName>> {
        let roles = self.current(user_id).await;
        Ok(RoleCatalog::training_platform()
            .permissions_for(roles.iter())
            .into_iter()
            .collect())
    }

    async fn count_role_holders(
        &self,
        role: &RoleName,
        excluding: Option<UserId>,
    ) -> AppResult<u64> {
        let holdings = self.holdings.lock().await;
        let count = holdings
            .iter()
            .filter(|(user_id, _)| Some(**user_id) != excluding)
            .filter(|(_, held)| held.iter().any(|(held_role, _)| held_role == role))
            .count();
        Ok(count as u64)
    }

    async fn find_user_profile(&self, user_id: UserId) -> AppResult<Option<UserProfile>> {
        Ok(self
            .profiles
            .lock()
            .await
            .iter()
            .find(|profile| profile.user_id == user_id)
            .cloned())
    }

    async fn list_users_with_roles(&self) -> AppResult<Vec<UserWithRoles>> {
        let profiles = self.profiles.lock().await.clone();
        let mut users = Vec::with_capacity(profiles.len());
        for profile in profiles.into_iter().rev() {
            let roles = self.current(profile.user_id).await;
            users.push(UserWithRoles { profile, roles });
        }
        Ok(users)
    }

    async fn replace_role(
        &self,
        user_id: UserId,
        role: &RoleName,
        assigned_by: Option<UserId>,
    ) -> AppResult<RoleChange> {
        self.ensure_user(user_id).await?;
        let current = self.current(user_id).await;
        let others = self
            .count_role_holders(&RoleName::superadmin(), Some(user_id))
            .await?;
        let change = plan_role_replacement(user_id, &current, role, others)?;
        self.apply(&change, assigned_by).await;
        Ok(change)
    }

    async fn grant_role(
        &self,
        user_id: UserId,
        role: &RoleName,
        assigned_by: Option<UserId>,
    ) -> AppResult<RoleChange> {
        self.ensure_user(user_id).await?;
        let current = self.current(user_id).await;
        let change = plan_role_grant(user_id, &current, role)?;
        self.apply(&change, assigned_by).await;
        Ok(change)
    }

    async fn remove_role(&self, user_id: UserId, role: &RoleName) -> AppResult<RoleChange> {
        self.ensure_user(user_id).await?;
        let current = self.current(user_id).await;
        let others = self
            .count_role_holders(&RoleName::superadmin(), Some(user_id))
            .await?;
        let change = plan_role_removal(user_id, &current, role, others)?;
        self.apply(&change, None).await;
        Ok(change)
    }

    async fn bootstrap_superadmin(&self, user_id: UserId) -> AppResult<RoleChange> {
        let others = self
            .count_role_holders(&RoleName::superadmin(), Some(user_id))
            .await?;
        if others > 0 {
            return Err(AppError::Conflict("a superadmin already exists".to_owned()));
        }

        self.replace_role(user_id, &RoleName::superadmin(), None)
            .await
    }
}
