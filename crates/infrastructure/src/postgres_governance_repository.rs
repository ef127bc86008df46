//! PostgreSQL adapter for role governance.
//!
//! Every role mutation runs in one transaction that first takes a
//! transaction-scoped advisory lock, so holder counts read inside it cannot
//! go stale before commit. The deferred `ensure_superadmin_remains` trigger
//! backs the same invariant at commit time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::info;

use cyberops_application::{
    ClaimedNotification, DecidedRoleRequest, GovernanceSummary, NotificationOutboxRepository,
    RoleAssignmentRepository, RoleCatalogRepository, RoleRequestListing, RoleRequestQuery,
    RoleRequestRepository, SubmitRoleRequestInput, SubmittedRoleRequest, UserWithRoles,
};
use cyberops_core::{AppError, AppResult};
use cyberops_domain::{
    DecisionOutcome, GovernanceNotice, PermissionName, RequesterIdentity, RoleCatalog, RoleChange,
    RoleName, RoleRequest, RoleRequestId, RoleRequestStatus, UserId, UserProfile,
    plan_role_grant, plan_role_removal, plan_role_replacement,
};

mod assignments;
mod catalog;
mod outbox;
mod requests;


/// Advisory lock key serializing every role mutation.
const ROLE_MUTATION_LOCK_KEY: i64 = 0x6776_5f72_6f6c_6573;

/// SQLSTATE raised by the last-superadmin constraint trigger.
const LAST_SUPERADMIN_SQLSTATE: &str = "GV001";

/// PostgreSQL-backed repository for roles, role requests, and the outbox.
#[derive(Clone)]
pub struct PostgresGovernanceRepository {
    pool: PgPool,
}

impl PostgresGovernanceRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct UserProfileRow {
    user_id: uuid::Uuid,
    username: String,
    email: String,
    full_name: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<UserProfileRow> for UserProfile {
    fn from(row: UserProfileRow) -> Self {
        Self {
            user_id: UserId::from_uuid(row.user_id),
            username: row.username,
            email: row.email,
            full_name: row.full_name,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct RoleRequestRow {
    request_id: i64,
    user_id: uuid::Uuid,
    requested_role: String,
    comment: Option<String>,
    status: String,
    decided_by: Option<uuid::Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RoleRequestRow> for RoleRequest {
    type Error = AppError;

    fn try_from(row: RoleRequestRow) -> Result<Self, Self::Error> {
        Ok(Self {
            request_id: RoleRequestId::new(row.request_id),
            user_id: UserId::from_uuid(row.user_id),
            requested_role: stored_role_name(row.requested_role)?,
            comment: row.comment,
            status: row.status.parse::<RoleRequestStatus>().map_err(|error| {
                AppError::Internal(format!(
                    "stored role request '{}' has invalid status: {error}",
                    row.request_id
                ))
            })?,
            decided_by: row.decided_by.map(UserId::from_uuid),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn stored_role_name(value: String) -> AppResult<RoleName> {
    RoleName::new(value.as_str())
        .map_err(|error| AppError::Internal(format!("stored role name '{value}' is invalid: {error}")))
}

fn stored_count(value: i64) -> AppResult<u64> {
    u64::try_from(value)
        .map_err(|error| AppError::Internal(format!("stored count '{value}' is invalid: {error}")))
}

fn requester_identity(profile: &UserProfile) -> RequesterIdentity {
    RequesterIdentity {
        user_id: profile.user_id,
        username: profile.username.clone(),
        email: profile.email.clone(),
        full_name: profile.full_name.clone(),
    }
}

/// Maps driver errors, surfacing the constraint trigger as the domain violation.
fn map_storage_error(error: sqlx::Error, context: &str) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some(LAST_SUPERADMIN_SQLSTATE)
    {
        return AppError::LastSuperadminViolation(database_error.message().to_owned());
    }

    AppError::StorageUnavailable(format!("failed to {context}: {error}"))
}

async fn lock_role_mutations(connection: &mut PgConnection) -> AppResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(ROLE_MUTATION_LOCK_KEY)
        .execute(&mut *connection)
        .await
        .map_err(|error| map_storage_error(error, "acquire role mutation lock"))?;

    Ok(())
}

async fn find_profile(
    connection: &mut PgConnection,
    user_id: UserId,
    lock_row: bool,
) -> AppResult<Option<UserProfile>> {
    let statement = if lock_row {
        r#"
        SELECT user_id, username, email, full_name, is_active, created_at
        FROM users
        WHERE user_id = $1
        FOR UPDATE
        "#
    } else {
        r#"
        SELECT user_id, username, email, full_name, is_active, created_at
        FROM users
        WHERE user_id = $1
        "#
    };

    let row = sqlx::query_as::<_, UserProfileRow>(statement)
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *connection)
        .await
        .map_err(|error| map_storage_error(error, "load user profile"))?;

    Ok(row.map(UserProfile::from))
}

async fn require_profile(
    connection: &mut PgConnection,
    user_id: UserId,
    lock_row: bool,
) -> AppResult<UserProfile> {
    find_profile(connection, user_id, lock_row)
        .await?
        .ok_or_else(|| AppError::UserNotFound(format!("user '{user_id}' does not exist")))
}

async fn require_role_exists(connection: &mut PgConnection, role: &RoleName) -> AppResult<()> {
    let exists = sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (SELECT 1 FROM roles WHERE name = $1)
        "#,
    )
    .bind(role.as_str())
    .fetch_one(&mut *connection)
    .await
    .map_err(|error| map_storage_error(error, "resolve role"))?;

    if !exists {
        return Err(AppError::RoleNotFound(format!("role '{role}' does not exist")));
    }

    Ok(())
}

async fn held_roles(connection: &mut PgConnection, user_id: UserId) -> AppResult<Vec<RoleName>> {
    let names = sqlx::query_scalar::<_, String>(
        r#"
        SELECT roles.name
        FROM user_role_assignments AS assignments
        INNER JOIN roles ON roles.role_id = assignments.role_id
        WHERE assignments.user_id = $1
        ORDER BY roles.role_id
        "#,
    )
    .bind(user_id.as_uuid())
    .fetch_all(&mut *connection)
    .await
    .map_err(|error| map_storage_error(error, "list roles for user"))?;

    names.into_iter().map(stored_role_name).collect()
}

async fn count_holders(
    connection: &mut PgConnection,
    role: &RoleName,
    excluding: Option<UserId>,
) -> AppResult<u64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM user_role_assignments AS assignments
        INNER JOIN roles ON roles.role_id = assignments.role_id
        WHERE roles.name = $1
          AND ($2::UUID IS NULL OR assignments.user_id <> $2)
        "#,
    )
    .bind(role.as_str())
    .bind(excluding.map(|user_id| user_id.as_uuid()))
    .fetch_one(&mut *connection)
    .await
    .map_err(|error| map_storage_error(error, "count role holders"))?;

    stored_count(count)
}

async fn apply_role_change(
    connection: &mut PgConnection,
    change: &RoleChange,
    assigned_by: Option<UserId>,
) -> AppResult<()> {
    if !change.removed.is_empty() {
        let removed: Vec<String> = change
            .removed
            .iter()
            .map(|role| role.as_str().to_owned())
            .collect();

        sqlx::query(
            r#"
            DELETE FROM user_role_assignments AS assignments
            USING roles
            WHERE roles.role_id = assignments.role_id
              AND assignments.user_id = $1
              AND roles.name = ANY($2)
            "#,
        )
        .bind(change.user_id.as_uuid())
        .bind(removed)
        .execute(&mut *connection)
        .await
        .map_err(|error| map_storage_error(error, "remove role assignments"))?;
    }

    if let Some(added) = &change.added {
        sqlx::query(
            r#"
            INSERT INTO user_role_assignments (user_id, role_id, assigned_by, assigned_at)
            SELECT $1, roles.role_id, $3, now()
            FROM roles
            WHERE roles.name = $2
            ON CONFLICT (user_id, role_id) DO NOTHING
            "#,
        )
        .bind(change.user_id.as_uuid())
        .bind(added.as_str())
        .bind(assigned_by.map(|user_id| user_id.as_uuid()))
        .execute(&mut *connection)
        .await
        .map_err(|error| map_storage_error(error, "insert role assignment"))?;
    }

    Ok(())
}

async fn mirror_legacy_rank(
    connection: &mut PgConnection,
    user_id: UserId,
    role: &RoleName,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET profile_meta = jsonb_set(
            COALESCE(profile_meta, '{}'::JSONB),
            '{rank}',
            to_jsonb($2::TEXT)
        )
        WHERE user_id = $1
        "#,
    )
    .bind(user_id.as_uuid())
    .bind(role.rank_label())
    .execute(&mut *connection)
    .await
    .map_err(|error| map_storage_error(error, "mirror legacy rank"))?;

    Ok(())
}

/// Replaces holdings inside a transaction that already holds the mutation lock.
async fn replace_role_locked(
    connection: &mut PgConnection,
    user_id: UserId,
    role: &RoleName,
    assigned_by: Option<UserId>,
) -> AppResult<RoleChange> {
    require_profile(connection, user_id, false).await?;
    require_role_exists(connection, role).await?;

    let current = held_roles(connection, user_id).await?;
    let other_superadmins = count_holders(connection, &RoleName::superadmin(), Some(user_id)).await?;
    let change = plan_role_replacement(user_id, &current, role, other_superadmins)?;

    apply_role_change(connection, &change, assigned_by).await?;
    mirror_legacy_rank(connection, user_id, role).await?;

    Ok(change)
}

async fn enqueue_notice(connection: &mut PgConnection, notice: &GovernanceNotice) -> AppResult<()> {
    let payload = serde_json::to_value(notice).map_err(|error| {
        AppError::Internal(format!("failed to serialize governance notice: {error}"))
    })?;

    sqlx::query(
        r#"
        INSERT INTO notification_outbox (event_type, payload)
        VALUES ($1, $2)
        "#,
    )
    .bind(notice.event_type())
    .bind(payload)
    .execute(&mut *connection)
    .await
    .map_err(|error| map_storage_error(error, "queue governance notice"))?;

    Ok(())
}

#[async_trait]
impl RoleCatalogRepository for PostgresGovernanceRepository {
    async fn load_catalog(&self) -> AppResult<RoleCatalog> {
        self.load_catalog_impl().await
    }
}

#[async_trait]
impl RoleAssignmentRepository for PostgresGovernanceRepository {
    async fn list_roles_for_user(&self, user_id: UserId) -> AppResult<Vec<RoleName>> {
        let mut connection = self
            .pool
            .acquire()
            .await
            .map_err(|error| map_storage_error(error, "acquire connection"))?;
        held_roles(&mut connection, user_id).await
    }

    async fn list_permissions_for_user(&self, user_id: UserId) -> AppResult<Vec<PermissionName>> {
        self.list_permissions_for_user_impl(user_id).await
    }

    async fn count_role_holders(
        &self,
        role: &RoleName,
        excluding: Option<UserId>,
    ) -> AppResult<u64> {
        let mut connection = self
            .pool
            .acquire()
            .await
            .map_err(|error| map_storage_error(error, "acquire connection"))?;
        count_holders(&mut connection, role, excluding).await
    }

    async fn find_user_profile(&self, user_id: UserId) -> AppResult<Option<UserProfile>> {
        let mut connection = self
            .pool
            .acquire()
            .await
            .map_err(|error| map_storage_error(error, "acquire connection"))?;
        find_profile(&mut connection, user_id, false).await
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
        self.replace_role_impl(user_id, role, assigned_by).await
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
impl RoleRequestRepository for PostgresGovernanceRepository {
    async fn submit_request(
        &self,
        input: SubmitRoleRequestInput,
    ) -> AppResult<SubmittedRoleRequest> {
        self.submit_request_impl(input).await
    }

    async fn find_request(&self, request_id: RoleRequestId) -> AppResult<Option<RoleRequest>> {
        self.find_request_impl(request_id).await
    }

    async fn list_requests(&self, query: &RoleRequestQuery) -> AppResult<Vec<RoleRequestListing>> {
        self.list_requests_impl(query).await
    }

    async fn latest_request_for_user(&self, user_id: UserId) -> AppResult<Option<RoleRequest>> {
        self.latest_request_for_user_impl(user_id).await
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
impl NotificationOutboxRepository for PostgresGovernanceRepository {
    async fn claim_due(
        &self,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<Vec<ClaimedNotification>> {
        self.claim_due_impl(limit, lease_seconds).await
    }

    async fn mark_delivered(
        &self,
        notification_id: uuid::Uuid,
        lease_token: &str,
    ) -> AppResult<()> {
        self.settle_impl(notification_id, lease_token, outbox::Settlement::Delivered)
            .await
    }

    async fn reschedule(
        &self,
        notification_id: uuid::Uuid,
        lease_token: &str,
        error_message: &str,
        retry_at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.settle_impl(
            notification_id,
            lease_token,
            outbox::Settlement::Retry {
                error_message,
                retry_at,
            },
        )
        .await
    }

    async fn mark_failed(
        &self,
        notification_id: uuid::Uuid,
        lease_token: &str,
        error_message: &str,
    ) -> AppResult<()> {
        self.settle_impl(
            notification_id,
            lease_token,
            outbox::Settlement::Failed { error_message },
        )
        .await
    }
}

fn log_role_change(change: &RoleChange, operation: &'static str) {
    if change.is_noop() {
        return;
    }

    info!(
        user_id = %change.user_id,
        operation,
        removed = ?change.removed.iter().map(RoleName::as_str).collect::<Vec<_>>(),
        added = change.added.as_ref().map(RoleName::as_str),
        "role holdings changed"
    );
}
