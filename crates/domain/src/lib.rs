//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod assignment;
mod notification;
mod role;
mod role_request;
mod user;

pub use assignment::{
    Actor, RoleAssignment, RoleChange, plan_role_grant, plan_role_removal, plan_role_replacement,
};
pub use notification::{
    GovernanceNotice, NoticeRecipient, NotificationMessage, RequesterIdentity,
};
pub use role::{PermissionDefinition, PermissionName, RoleCatalog, RoleDefinition, RoleName};
pub use role_request::{
    DecisionOutcome, RoleRequest, RoleRequestId, RoleRequestStatus, SelfServiceRolePolicy,
};
pub use user::{EmailAddress, UserId, UserProfile};
