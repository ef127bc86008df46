//! Governance notices queued in the notification outbox.

use serde::{Deserialize, Serialize};

use crate::{DecisionOutcome, RoleName, RoleRequestId, UserId};

/// Requester identity captured when a notice is queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterIdentity {
    /// Requesting user.
    pub user_id: UserId,
    /// Login name.
    pub username: String,
    /// Contact email.
    pub email: String,
    /// Optional display name.
    pub full_name: Option<String>,
}

/// Where a notice should be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeRecipient {
    /// Every configured administrator address.
    Administrators,
    /// A single address.
    Address(String),
}

/// Rendered plain-text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub text_body: String,
}

/// Event payload stored in the outbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GovernanceNotice {
    /// A user submitted a role request.
    RoleRequestSubmitted {
        /// New request identifier.
        request_id: RoleRequestId,
        /// Requester identity.
        requester: RequesterIdentity,
        /// Requested role.
        requested_role: RoleName,
        /// Optional requester comment.
        comment: Option<String>,
    },
    /// An administrator decided a role request.
    RoleRequestDecided {
        /// Decided request identifier.
        request_id: RoleRequestId,
        /// Requester identity.
        requester: RequesterIdentity,
        /// Requested role.
        requested_role: RoleName,
        /// Decision taken.
        outcome: DecisionOutcome,
    },
}

impl GovernanceNotice {
    /// Returns the stable event name stored next to the payload.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RoleRequestSubmitted { .. } => "role_request.submitted",
            Self::RoleRequestDecided { .. } => "role_request.decided",
        }
    }

    /// Returns the request the notice is about.
    #[must_use]
    pub fn request_id(&self) -> RoleRequestId {
        match self {
            Self::RoleRequestSubmitted { request_id, .. }
            | Self::RoleRequestDecided { request_id, .. } => *request_id,
        }
    }

    /// Returns the delivery target.
    #[must_use]
    pub fn recipient(&self) -> NoticeRecipient {
        match self {
            Self::RoleRequestSubmitted { .. } => NoticeRecipient::Administrators,
            Self::RoleRequestDecided { requester, .. } => {
                NoticeRecipient::Address(requester.email.clone())
            }
        }
    }

    /// Renders subject and plain-text body.
    #[must_use]
    pub fn render(&self) -> NotificationMessage {
        match self {
            Self::RoleRequestSubmitted {
                request_id,
                requester,
                requested_role,
                comment,
            } => {
                let rank = requested_role.rank_label();
                let mut text_body = format!(
                    "A new role request has been submitted:\n\n\
                     User: {} ({})\n\
                     Full Name: {}\n\
                     Requested Role: {rank}\n\
                     Request ID: #{request_id}\n",
                    requester.username,
                    requester.email,
                    requester.full_name.as_deref().unwrap_or("N/A"),
                );
                if let Some(comment) = comment {
                    text_body.push_str(&format!("Comment: {comment}\n"));
                }
                text_body.push_str(
                    "\nPlease review and approve/reject this request in the Admin Dashboard.",
                );

                NotificationMessage {
                    subject: format!("New Role Request - {rank}"),
                    text_body,
                }
            }
            Self::RoleRequestDecided {
                request_id,
                requester,
                requested_role,
                outcome,
            } => {
                let rank = requested_role.rank_label();
                let (verdict, follow_up) = match outcome {
                    DecisionOutcome::Approved => (
                        "Approved",
                        "The new role is active the next time you sign in.",
                    ),
                    DecisionOutcome::Rejected => (
                        "Rejected",
                        "Your current role is unchanged. You may submit a new request.",
                    ),
                };

                NotificationMessage {
                    subject: format!("Role Request {verdict} - {rank}"),
                    text_body: format!(
                        "Hello {},\n\n\
                         Your request #{request_id} for the {rank} role has been {}.\n\n\
                         {follow_up}",
                        requester.username,
                        verdict.to_lowercase(),
                    ),
                }
            }
        }
    }
}
