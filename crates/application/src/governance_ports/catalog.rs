use async_trait::async_trait;

use cyberops_core::AppResult;
use cyberops_domain::RoleCatalog;

/// Repository port for the static role catalog.
#[async_trait]
pub trait RoleCatalogRepository: Send + Sync {
    /// Loads every role with its grants and every permission.
    async fn load_catalog(&self) -> AppResult<RoleCatalog>;
}
