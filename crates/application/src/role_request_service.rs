//! Role request workflow: submit, review, decide.
//!
//! Persistence of a submission or decision and the outbox row that notifies
//! about it commit together; delivery happens later and can never undo the
//! workflow step.

use std::sync::Arc;

use cyberops_core::{AppError, AppResult, NonEmptyString};
use cyberops_domain::{
    Actor, DecisionOutcome, PermissionName, RoleName, RoleRequest, RoleRequestId,
    SelfServiceRolePolicy, UserId,
};

use crate::{
    DecidedRoleRequest, GovernanceSummary, PermissionResolver, RoleAssignmentRepository,
    RoleCatalogRepository, RoleRequestPage, RoleRequestQuery, RoleRequestRepository,
    SubmitRoleRequestInput, SubmittedRoleRequest,
};

mod review;
mod submission;

/// Maximum accepted comment length in characters.
pub const ROLE_REQUEST_COMMENT_MAX_LENGTH: usize = 2000;

/// Maximum page size for request listings.
pub const ROLE_REQUEST_PAGE_MAX: usize = 200;

/// Application service for the role request workflow.
#[derive(Clone)]
pub struct RoleRequestService {
    repository: Arc<dyn RoleRequestRepository>,
    catalog_repository: Arc<dyn RoleCatalogRepository>,
    resolver: PermissionResolver,
    policy: SelfServiceRolePolicy,
}

impl RoleRequestService {
    /// Creates a new role request service.
    #[must_use]
    pub fn new(
        repository: Arc<dyn RoleRequestRepository>,
        assignment_repository: Arc<dyn RoleAssignmentRepository>,
        catalog_repository: Arc<dyn RoleCatalogRepository>,
        policy: SelfServiceRolePolicy,
    ) -> Self {
        Self {
            repository,
            catalog_repository,
            resolver: PermissionResolver::new(assignment_repository),
            policy,
        }
    }

    async fn require_reviewer(&self, actor: &Actor) -> AppResult<()> {
        self.resolver
            .authorize_permission(actor, &PermissionName::role_requests_review())
            .await
    }
}
