use async_trait::async_trait;
use chrono::{DateTime, Utc};

use cyberops_core::AppResult;
use cyberops_domain::GovernanceNotice;

/// Outbox row leased to one dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedNotification {
    /// Outbox row identifier.
    pub notification_id: uuid::Uuid,
    /// Lease token required to finalize the row.
    pub lease_token: String,
    /// Delivery attempts including the current one.
    pub attempts: u32,
    /// Notice payload.
    pub notice: GovernanceNotice,
}

/// Repository port for the notification outbox.
#[async_trait]
pub trait NotificationOutboxRepository: Send + Sync {
    /// Leases up to `limit` due rows and increments their attempt counters.
    async fn claim_due(
        &self,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<Vec<ClaimedNotification>>;

    /// Marks a leased row delivered.
    async fn mark_delivered(&self, notification_id: uuid::Uuid, lease_token: &str)
    -> AppResult<()>;

    /// Releases a leased row for another attempt at `retry_at`.
    async fn reschedule(
        &self,
        notification_id: uuid::Uuid,
        lease_token: &str,
        error_message: &str,
        retry_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Marks a leased row permanently failed.
    async fn mark_failed(
        &self,
        notification_id: uuid::Uuid,
        lease_token: &str,
        error_message: &str,
    ) -> AppResult<()>;
}

/// Outbound mail transport used by the notification dispatcher.
///
/// Errors are treated as transient; the dispatcher reschedules the notice.
#[async_trait]
pub trait EmailService: Send + Sync {
    /// Sends one message to one address; `html_body` adds an HTML alternative.
    async fn send_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: Option<&str>,
    ) -> AppResult<()>;
}
