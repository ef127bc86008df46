use std::sync::Arc;

use cyberops_core::{AppError, AppResult};
use cyberops_domain::{
    Actor, PermissionDefinition, PermissionName, RoleCatalog, RoleChange, RoleDefinition,
    RoleName, UserId,
};

use crate::{
    PermissionResolver, RoleAssignmentRepository, RoleCatalogRepository, UserAccess,
    UserWithRoles,
};

mod directory;
mod mutations;

/// Application service for direct role administration.
#[derive(Clone)]
pub struct RoleAssignmentService {
    repository: Arc<dyn RoleAssignmentRepository>,
    catalog_repository: Arc<dyn RoleCatalogRepository>,
    resolver: PermissionResolver,
}

impl RoleAssignmentService {
    /// Creates a new role assignment service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn RoleAssignmentRepository>,
        catalog_repository: Arc<dyn RoleCatalogRepository>,
    ) -> Self {
        Self {
            resolver: PermissionResolver::new(repository.clone()),
            repository,
            catalog_repository,
        }
    }

    /// Returns the resolver sharing this service's repository.
    #[must_use]
    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    async fn require_catalog_role(&self, role: &RoleName) -> AppResult<RoleCatalog> {
        let catalog = self.catalog_repository.load_catalog().await?;
        catalog.require(role)?;
        Ok(catalog)
    }

    fn user_access(catalog: &RoleCatalog, user: UserWithRoles) -> UserAccess {
        let permissions = catalog.permissions_for(user.roles.iter()).into_iter().collect();
        UserAccess {
            profile: user.profile,
            roles: user.roles,
            permissions,
        }
    }
}

#[cfg(test)]
mod tests;
