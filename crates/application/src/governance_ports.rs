mod assignments;
mod catalog;
mod notifications;
mod requests;

pub use assignments::{RoleAssignmentRepository, UserAccess, UserWithRoles};
pub use catalog::RoleCatalogRepository;
pub use notifications::{ClaimedNotification, EmailService, NotificationOutboxRepository};
pub use requests::{
    DEFAULT_REQUEST_PAGE_SIZE, DecidedRoleRequest, GovernanceSummary, RoleRequestListing,
    RoleRequestPage, RoleRequestQuery, RoleRequestRepository, SubmitRoleRequestInput,
    SubmittedRoleRequest,
};
