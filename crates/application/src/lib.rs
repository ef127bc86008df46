//! Application services and ports.

#![forbid(unsafe_code)]

mod governance_ports;
mod notification_dispatch_service;
mod permission_resolver;
mod role_assignment_service;
mod role_request_service;

#[cfg(test)]
mod test_support;

pub use governance_ports::{
    ClaimedNotification, DEFAULT_REQUEST_PAGE_SIZE, DecidedRoleRequest, EmailService,
    GovernanceSummary, NotificationOutboxRepository, RoleAssignmentRepository,
    RoleCatalogRepository, RoleRequestListing, RoleRequestPage, RoleRequestQuery,
    RoleRequestRepository, SubmitRoleRequestInput, SubmittedRoleRequest, UserAccess,
    UserWithRoles,
};
pub use notification_dispatch_service::{
    DeliveryFailure, DispatchPolicy, DispatchReport, FailureOutcome, MAX_RETRY_DELAY_SECONDS,
    NotificationDispatchService,
};
pub use permission_resolver::PermissionResolver;
pub use role_assignment_service::RoleAssignmentService;
pub use role_request_service::{
    ROLE_REQUEST_COMMENT_MAX_LENGTH, ROLE_REQUEST_PAGE_MAX, RoleRequestService,
};
