use std::collections::HashMap;

use sqlx::{Postgres, Transaction};

use super::*;

#[derive(Debug, FromRow)]
struct UserRoleRow {
    user_id: uuid::Uuid,
    username: String,
    email: String,
    full_name: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    role_name: Option<String>,
}

impl PostgresGovernanceRepository {
    pub(super) async fn begin_role_mutation(&self) -> AppResult<Transaction<'static, Postgres>> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| map_storage_error(error, "begin role mutation"))?;
        lock_role_mutations(&mut transaction).await?;
        Ok(transaction)
    }

    pub(super) async fn list_permissions_for_user_impl(
        &self,
        user_id: UserId,
    ) -> AppResult<Vec<PermissionName>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT permissions.name
            FROM user_role_assignments AS assignments
            INNER JOIN role_permissions
                ON role_permissions.role_id = assignments.role_id
            INNER JOIN permissions
                ON permissions.permission_id = role_permissions.permission_id
            WHERE assignments.user_id = $1
            ORDER BY permissions.name
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_storage_error(error, "list permissions for user"))?;

        names
            .into_iter()
            .map(|name| {
                PermissionName::new(name.as_str()).map_err(|error| {
                    AppError::Internal(format!("stored permission '{name}' is invalid: {error}"))
                })
            })
            .collect()
    }

    pub(super) async fn list_users_with_roles_impl(&self) -> AppResult<Vec<UserWithRoles>> {
        let rows = sqlx::query_as::<_, UserRoleRow>(
            r#"
            SELECT
                users.user_id,
                users.username,
                users.email,
                users.full_name,
                users.is_active,
                users.created_at,
                roles.name AS role_name
            FROM users
            LEFT JOIN user_role_assignments AS assignments
                ON assignments.user_id = users.user_id
            LEFT JOIN roles
                ON roles.role_id = assignments.role_id
            ORDER BY users.created_at DESC, users.user_id, roles.role_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_storage_error(error, "list users with roles"))?;

        aggregate_users(rows)
    }

    pub(super) async fn replace_role_impl(
        &self,
        user_id: UserId,
        role: &RoleName,
        assigned_by: Option<UserId>,
    ) -> AppResult<RoleChange> {
        let mut transaction = self.begin_role_mutation().await?;
        let change = replace_role_locked(&mut transaction, user_id, role, assigned_by).await?;

        transaction
            .commit()
            .await
            .map_err(|error| map_storage_error(error, "commit role replacement"))?;

        log_role_change(&change, "replace");
        Ok(change)
    }

    pub(super) async fn grant_role_impl(
        &self,
        user_id: UserId,
        role: &RoleName,
        assigned_by: Option<UserId>,
    ) -> AppResult<RoleChange> {
        let mut transaction = self.begin_role_mutation().await?;
        require_profile(&mut transaction, user_id, false).await?;
        require_role_exists(&mut transaction, role).await?;

        let current = held_roles(&mut transaction, user_id).await?;
        let change = plan_role_grant(user_id, &current, role)?;
        apply_role_change(&mut transaction, &change, assigned_by).await?;

        transaction
            .commit()
            .await
            .map_err(|error| map_storage_error(error, "commit role grant"))?;

        log_role_change(&change, "grant");
        Ok(change)
    }

    pub(super) async fn remove_role_impl(
        &self,
        user_id: UserId,
        role: &RoleName,
    ) -> AppResult<RoleChange> {
        let mut transaction = self.begin_role_mutation().await?;
        require_profile(&mut transaction, user_id, false).await?;
        require_role_exists(&mut transaction, role).await?;

        let current = held_roles(&mut transaction, user_id).await?;
        let other_superadmins =
            count_holders(&mut transaction, &RoleName::superadmin(), Some(user_id)).await?;
        let change = plan_role_removal(user_id, &current, role, other_superadmins)?;
        apply_role_change(&mut transaction, &change, None).await?;

        transaction
            .commit()
            .await
            .map_err(|error| map_storage_error(error, "commit role removal"))?;

        log_role_change(&change, "remove");
        Ok(change)
    }

    pub(super) async fn bootstrap_superadmin_impl(&self, user_id: UserId) -> AppResult<RoleChange> {
        let mut transaction = self.begin_role_mutation().await?;

        let other_superadmins =
            count_holders(&mut transaction, &RoleName::superadmin(), Some(user_id)).await?;
        if other_superadmins > 0 {
            return Err(AppError::Conflict(
                "a superadmin already exists; bootstrap only applies to a fresh platform"
                    .to_owned(),
            ));
        }

        let change =
            replace_role_locked(&mut transaction, user_id, &RoleName::superadmin(), None).await?;

        transaction
            .commit()
            .await
            .map_err(|error| map_storage_error(error, "commit superadmin bootstrap"))?;

        log_role_change(&change, "bootstrap");
        Ok(change)
    }
}

fn aggregate_users(rows: Vec<UserRoleRow>) -> AppResult<Vec<UserWithRoles>> {
    let mut users: Vec<UserWithRoles> = Vec::new();
    let mut positions: HashMap<uuid::Uuid, usize> = HashMap::new();

    for row in rows {
        let position = match positions.get(&row.user_id).copied() {
            Some(position) => position,
            None => {
                users.push(UserWithRoles {
                    profile: UserProfile {
                        user_id: UserId::from_uuid(row.user_id),
                        username: row.username,
                        email: row.email,
                        full_name: row.full_name,
                        is_active: row.is_active,
                        created_at: row.created_at,
                    },
                    roles: Vec::new(),
                });
                positions.insert(row.user_id, users.len() - 1);
                users.len() - 1
            }
        };

        if let Some(role_name) = row.role_name {
            users[position].roles.push(stored_role_name(role_name)?);
        }
    }

    Ok(users)
}
