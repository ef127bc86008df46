//! In-memory adapter for role governance.
//!
//! All state sits behind one lock, so every port call observes and commits a
//! consistent snapshot. Mutations validate fully before touching state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use cyberops_application::{
    ClaimedNotification, DecidedRoleRequest, GovernanceSummary, NotificationOutboxRepository,
    RoleAssignmentRepository, RoleCatalogRepository, RoleRequestListing, RoleRequestQuery,
    RoleRequestRepository, SubmitRoleRequestInput, SubmittedRoleRequest, UserWithRoles,
};
use cyberops_core::{AppError, AppResult};
use cyberops_domain::{
    DecisionOutcome, GovernanceNotice, PermissionName, RequesterIdentity, RoleAssignment,
    RoleCatalog, RoleChange, RoleName, RoleRequest, RoleRequestId, RoleRequestStatus, UserId,
    UserProfile, plan_role_grant, plan_role_removal, plan_role_replacement,
};

mod assignments;
mod outbox;
mod requests;

#[cfg(test)]
mod tests;

/// In-memory repository for roles, role requests, and the outbox.
#[derive(Debug)]
pub struct InMemoryGovernanceRepository {
    state: RwLock<GovernanceState>,
}

#[derive(Debug)]
struct StoredUser {
    profile: UserProfile,
    legacy_rank: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutboxStatus {
    Pending,
    Leased,
    Delivered,
    Failed,
}

#[derive(Debug)]
struct OutboxEntry {
    notification_id: Uuid,
    notice: GovernanceNotice,
    status: OutboxStatus,
    attempts: u32,
    available_at: DateTime<Utc>,
    lease: Option<(String, DateTime<Utc>)>,
    last_error: Option<String>,
}

#[derive(Debug)]
struct GovernanceState {
    catalog: RoleCatalog,
    users: Vec<StoredUser>,
    assignments: Vec<RoleAssignment>,
    requests: Vec<RoleRequest>,
    next_request_id: i64,
    outbox: Vec<OutboxEntry>,
}

impl InMemoryGovernanceRepository {
    /// Creates an empty repository over the provided catalog.
    #[must_use]
    pub fn new(catalog: RoleCatalog) -> Self {
        Self {
            state: RwLock::new(GovernanceState {
                catalog,
                users: Vec::new(),
                assignments: Vec::new(),
                requests: Vec::new(),
                next_request_id: 1,
                outbox: Vec::new(),
            }),
        }
    }

    /// Inserts a user or refreshes the profile of an existing one.
    pub async fn upsert_user(&self, profile: UserProfile) {
        let mut state = self.state.write().await;

        match state
            .users
            .iter_mut()
            .find(|stored| stored.profile.user_id == profile.user_id)
        {
            Some(stored) => stored.profile = profile,
            None => state.users.push(StoredUser {
                profile,
                legacy_rank: None,
            }),
        }
    }

    /// Deletes a user together with their assignments.
    ///
    /// Role requests are kept, matching the storage schema where requests do
    /// not reference the users table.
    pub async fn delete_user(&self, user_id: UserId) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.profile(user_id)?;

        let current = state.held_roles(user_id);
        if current.iter().any(RoleName::is_superadmin)
            && state.count_holders(&RoleName::superadmin(), Some(user_id)) == 0
        {
            return Err(AppError::LastSuperadminViolation(format!(
                "user '{user_id}' is the last superadmin and cannot be deleted"
            )));
        }

        state.users.retain(|stored| stored.profile.user_id != user_id);
        state
            .assignments
            .retain(|assignment| assignment.user_id != user_id);
        Ok(())
    }

    /// Returns the rank label mirrored into the user's legacy profile field.
    pub async fn legacy_rank(&self, user_id: UserId) -> Option<String> {
        self.state
            .read()
            .await
            .users
            .iter()
            .find(|stored| stored.profile.user_id == user_id)
            .and_then(|stored| stored.legacy_rank.clone())
    }

    /// Returns every notice still waiting for delivery, oldest first.
    pub async fn queued_notices(&self) -> Vec<GovernanceNotice> {
        self.state
            .read()
            .await
            .outbox
            .iter()
            .filter(|entry| {
                matches!(entry.status, OutboxStatus::Pending | OutboxStatus::Leased)
            })
            .map(|entry| entry.notice.clone())
            .collect()
    }
}

impl Default for InMemoryGovernanceRepository {
    fn default() -> Self {
        Self::new(RoleCatalog::training_platform())
    }
}

impl GovernanceState {
    fn profile(&self, user_id: UserId) -> AppResult<&UserProfile> {
        self.users
            .iter()
            .map(|stored| &stored.profile)
            .find(|profile| profile.user_id == user_id)
            .ok_or_else(|| AppError::UserNotFound(format!("user '{user_id}' does not exist")))
    }

    fn held_roles(&self, user_id: UserId) -> Vec<RoleName> {
        let mut held: Vec<&RoleAssignment> = self
            .assignments
            .iter()
            .filter(|assignment| assignment.user_id == user_id)
            .collect();
        held.sort_by_key(|assignment| {
            self.catalog
                .find(&assignment.role)
                .map(|definition| definition.role_id)
        });

        held.into_iter()
            .map(|assignment| assignment.role.clone())
            .collect()
    }

    fn count_holders(&self, role: &RoleName, excluding: Option<UserId>) -> u64 {
        let count = self
            .assignments
            .iter()
            .filter(|assignment| &assignment.role == role)
            .filter(|assignment| Some(assignment.user_id) != excluding)
            .count();

        u64::try_from(count).unwrap_or(u64::MAX)
    }

    fn apply_role_change(&mut self, change: &RoleChange, assigned_by: Option<UserId>) {
        self.assignments.retain(|assignment| {
            assignment.user_id != change.user_id || !change.removed.contains(&assignment.role)
        });

        if let Some(added) = &change.added {
            self.assignments.push(RoleAssignment {
                user_id: change.user_id,
                role: added.clone(),
                assigned_by,
                assigned_at: Utc::now(),
            });
        }
    }

    /// Plans and applies a replacement; nothing changes when planning fails.
    fn replace_role(
        &mut self,
        user_id: UserId,
        role: &RoleName,
        assigned_by: Option<UserId>,
    ) -> AppResult<RoleChange> {
        self.profile(user_id)?;
        self.catalog.require(role)?;

        let current = self.held_roles(user_id);
        let other_superadmins = self.count_holders(&RoleName::superadmin(), Some(user_id));
        let change = plan_role_replacement(user_id, &current, role, other_superadmins)?;

        self.apply_role_change(&change, assigned_by);
        if let Some(stored) = self
            .users
            .iter_mut()
            .find(|stored| stored.profile.user_id == user_id)
        {
            stored.legacy_rank = Some(role.rank_label());
        }

        Ok(change)
    }

    fn requester_identity(&self, user_id: UserId) -> Option<RequesterIdentity> {
        self.profile(user_id).ok().map(|profile| RequesterIdentity {
            user_id: profile.user_id,
            username: profile.username.clone(),
            email: profile.email.clone(),
            full_name: profile.full_name.clone(),
        })
    }

    fn enqueue_notice(&mut self, notice: GovernanceNotice) {
        self.outbox.push(OutboxEntry {
            notification_id: Uuid::new_v4(),
            notice,
            status: OutboxStatus::Pending,
            attempts: 0,
            available_at: Utc::now(),
            lease: None,
            last_error: None,
        });
    }
}

#[async_trait]
impl RoleCatalogRepository for InMemoryGovernanceRepository {
    async fn load_catalog(&self) -> AppResult<RoleCatalog> {
        Ok(self.state.read().await.catalog.clone())
    }
}

#[async_trait]
impl RoleAssignmentRepository for InMemoryGovernanceRepository {
    async fn list_roles_for_user(&self, user_id: UserId) -> AppResult<Vec<RoleName>> {
        Ok(self.state.read().await.held_roles(user_id))
    }

    async fn list_permissions_for_user(&self, user_id: UserId) -> AppResult<Vec<PermissionName>> {
        let state = self.state.read().await;
        let held = state.held_roles(user_id);
        Ok(state.catalog.permissions_for(&held).into_iter().collect())
    }

    async fn count_role_holders(
        &self,
        role: &RoleName,
        excluding: Option<UserId>,
    ) -> AppResult<u64> {
        Ok(self.state.read().await.count_holders(role, excluding))
    }

    async fn find_user_profile(&self, user_id: UserId) -> AppResult<Option<UserProfile>> {
        Ok(self.state.read().await.profile(user_id).ok().cloned())
    }

    async fn list_users_with_roles(&self) -> AppResult<Vec<UserWithRoles>> {
        self.list_users_with_roles_impl().await
    }

    async fn replace_role(
        &self,
        user_id: UserId,
        role: &RoleName,
        assigned_by: Option<UserId>,
    ) -> AppResult<RoleChange> {
        self.state
            .write()
            .await
            .replace_role(user_id, role, assigned_by)
    }

    async fn grant_role(
        &self,
        user_id: UserId,
        role: &RoleName,
        assigned_by: Option<UserId>,
    ) -> AppResult<RoleChange> {
        self.grant_role_impl(user_id, role, assigned_by).await
    }

    async fn remove_role(&self, user_id: UserId, role: &RoleName) -> AppResult<RoleChange> {
        self.remove_role_impl(user_id, role).await
    }

    async fn bootstrap_superadmin(&self, user_id: UserId) -> AppResult<RoleChange> {
        self.bootstrap_superadmin_impl(user_id).await
    }
}

#[async_trait]
impl RoleRequestRepository for InMemoryGovernanceRepository {
    async fn submit_request(
        &self,
        input: SubmitRoleRequestInput,
    ) -> AppResult<SubmittedRoleRequest> {
        self.submit_request_impl(input).await
    }

    async fn find_request(&self, request_id: RoleRequestId) -> AppResult<Option<RoleRequest>> {
        Ok(self
            .state
            .read()
            .await
            .requests
            .iter()
            .find(|request| request.request_id == request_id)
            .cloned())
    }

    async fn list_requests(&self, query: &RoleRequestQuery) -> AppResult<Vec<RoleRequestListing>> {
        self.list_requests_impl(query).await
    }

    async fn latest_request_for_user(&self, user_id: UserId) -> AppResult<Option<RoleRequest>> {
        Ok(self
            .state
            .read()
            .await
            .requests
            .iter()
            .filter(|request| request.user_id == user_id)
            .max_by_key(|request| (request.created_at, request.request_id))
            .cloned())
    }

    async fn governance_summary(&self) -> AppResult<GovernanceSummary> {
        self.governance_summary_impl().await
    }

    async fn decide_request(
        &self,
        request_id: RoleRequestId,
        outcome: DecisionOutcome,
        decided_by: Option<UserId>,
    ) -> AppResult<DecidedRoleRequest> {
        self.decide_request_impl(request_id, outcome, decided_by)
            .await
    }
}

#[async_trait]
impl NotificationOutboxRepository for InMemoryGovernanceRepository {
    async fn claim_due(
        &self,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<Vec<ClaimedNotification>> {
        self.claim_due_impl(limit, lease_seconds).await
    }

    async fn mark_delivered(&self, notification_id: Uuid, lease_token: &str) -> AppResult<()> {
        self.settle_impl(notification_id, lease_token, OutboxStatus::Delivered, None, None)
            .await
    }

    async fn reschedule(
        &self,
        notification_id: Uuid,
        lease_token: &str,
        error_message: &str,
        retry_at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.settle_impl(
            notification_id,
            lease_token,
            OutboxStatus::Pending,
            Some(error_message),
            Some(retry_at),
        )
        .await
    }

    async fn mark_failed(
        &self,
        notification_id: Uuid,
        lease_token: &str,
        error_message: &str,
    ) -> AppResult<()> {
        self.settle_impl(
            notification_id,
            lease_token,
            OutboxStatus::Failed,
            Some(error_message),
            None,
        )
        .await
    }
}
