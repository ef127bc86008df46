use async_trait::async_trait;

use cyberops_core::{AppResult, NonEmptyString};
use cyberops_domain::{
    DecisionOutcome, RequesterIdentity, RoleChange, RoleName, RoleRequest, RoleRequestId,
    RoleRequestStatus, UserId,
};

/// Default page size for role request listings.
pub const DEFAULT_REQUEST_PAGE_SIZE: usize = 50;

/// Validated input for a new role request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRoleRequestInput {
    /// Requesting user.
    pub user_id: UserId,
    /// Requested role, already checked against the allow-list and catalog.
    pub requested_role: RoleName,
    /// Optional non-blank comment.
    pub comment: Option<NonEmptyString>,
}

/// Result of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedRoleRequest {
    /// The new pending request.
    pub request: RoleRequest,
    /// Previous pending request deleted by this submission.
    pub superseded: Option<RoleRequestId>,
}

/// Result of a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecidedRoleRequest {
    /// The request in its terminal status.
    pub request: RoleRequest,
    /// Holdings change applied by an approval; `None` on rejection.
    pub change: Option<RoleChange>,
}

/// Filter and pagination for role request listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRequestQuery {
    /// Exact status filter.
    pub status: Option<RoleRequestStatus>,
    /// Requesting user filter.
    pub user_id: Option<UserId>,
    /// Include decided requests when no status or user filter is given.
    pub include_decided: bool,
    /// Maximum rows returned.
    pub limit: usize,
    /// Rows skipped.
    pub offset: usize,
}

impl Default for RoleRequestQuery {
    fn default() -> Self {
        Self {
            status: None,
            user_id: None,
            include_decided: false,
            limit: DEFAULT_REQUEST_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl RoleRequestQuery {
    /// Returns the status filter actually applied.
    ///
    /// Without an explicit status or user filter only pending requests are
    /// listed unless decided ones were asked for.
    #[must_use]
    pub fn effective_status(&self) -> Option<RoleRequestStatus> {
        if self.status.is_some() {
            return self.status;
        }

        if self.user_id.is_none() && !self.include_decided {
            return Some(RoleRequestStatus::Pending);
        }

        None
    }
}

/// Role request joined with the requester profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRequestListing {
    /// Request record.
    pub request: RoleRequest,
    /// Requester profile; `None` when the account no longer exists.
    pub requester: Option<RequesterIdentity>,
}

/// Aggregate counts shown on the review dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GovernanceSummary {
    /// Registered users.
    pub total_users: u64,
    /// Catalog roles.
    pub total_roles: u64,
    /// Catalog permissions.
    pub total_permissions: u64,
    /// Requests awaiting a decision.
    pub pending_requests: u64,
}

/// One page of role requests with the dashboard summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRequestPage {
    /// Requests, newest first.
    pub requests: Vec<RoleRequestListing>,
    /// Dashboard summary.
    pub summary: GovernanceSummary,
}

/// Repository port for the role request workflow.
#[async_trait]
pub trait RoleRequestRepository: Send + Sync {
    /// Deletes any pending request of the user, inserts the new one, and
    /// queues the administrator notice in the same transaction.
    async fn submit_request(&self, input: SubmitRoleRequestInput)
    -> AppResult<SubmittedRoleRequest>;

    /// Finds a request by identifier.
    async fn find_request(&self, request_id: RoleRequestId) -> AppResult<Option<RoleRequest>>;

    /// Lists requests, newest first.
    async fn list_requests(&self, query: &RoleRequestQuery) -> AppResult<Vec<RoleRequestListing>>;

    /// Returns the most recent request of a user.
    async fn latest_request_for_user(&self, user_id: UserId) -> AppResult<Option<RoleRequest>>;

    /// Returns dashboard counts.
    async fn governance_summary(&self) -> AppResult<GovernanceSummary>;

    /// Applies a decision atomically.
    ///
    /// Approval replaces the requester's roles with the requested role using
    /// `decided_by` as assigner; any failure leaves the request pending. Both
    /// outcomes queue a notice to the requester.
    async fn decide_request(
        &self,
        request_id: RoleRequestId,
        outcome: DecisionOutcome,
        decided_by: Option<UserId>,
    ) -> AppResult<DecidedRoleRequest>;
}
