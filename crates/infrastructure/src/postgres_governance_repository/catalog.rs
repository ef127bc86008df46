use std::collections::BTreeSet;

use cyberops_domain::{PermissionDefinition, RoleDefinition};

use super::*;

#[derive(Debug, FromRow)]
struct RoleGrantRow {
    role_id: i64,
    role_name: String,
    description: Option<String>,
    permission: Option<String>,
}

#[derive(Debug, FromRow)]
struct PermissionRow {
    permission_id: i64,
    name: String,
    description: Option<String>,
}

impl PostgresGovernanceRepository {
    pub(super) async fn load_catalog_impl(&self) -> AppResult<RoleCatalog> {
        let role_rows = sqlx::query_as::<_, RoleGrantRow>(
            r#"
            SELECT
                roles.role_id,
                roles.name AS role_name,
                roles.description,
                permissions.name AS permission
            FROM roles
            LEFT JOIN role_permissions
                ON role_permissions.role_id = roles.role_id
            LEFT JOIN permissions
                ON permissions.permission_id = role_permissions.permission_id
            ORDER BY roles.role_id, permissions.name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_storage_error(error, "load role catalog"))?;

        let permission_rows = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT permission_id, name, description
            FROM permissions
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_storage_error(error, "load permission catalog"))?;

        let permissions = permission_rows
            .into_iter()
            .map(|row| {
                Ok(PermissionDefinition {
                    permission_id: row.permission_id,
                    name: stored_permission_name(row.name)?,
                    description: row.description,
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        RoleCatalog::new(aggregate_roles(role_rows)?, permissions)
    }
}

fn stored_permission_name(value: String) -> AppResult<PermissionName> {
    PermissionName::new(value.as_str()).map_err(|error| {
        AppError::Internal(format!("stored permission name '{value}' is invalid: {error}"))
    })
}

fn aggregate_roles(rows: Vec<RoleGrantRow>) -> AppResult<Vec<RoleDefinition>> {
    let mut roles: Vec<RoleDefinition> = Vec::new();

    for row in rows {
        let permission = row.permission.map(stored_permission_name).transpose()?;

        if let Some(role) = roles
            .last_mut()
            .filter(|role| role.role_id == row.role_id)
        {
            role.permissions.extend(permission);
            continue;
        }

        roles.push(RoleDefinition {
            role_id: row.role_id,
            name: stored_role_name(row.role_name)?,
            description: row.description,
            permissions: permission.into_iter().collect::<BTreeSet<_>>(),
        });
    }

    Ok(roles)
}
