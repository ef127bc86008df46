//! Outbox dispatcher for governance notices.
//!
//! Delivery is best effort: failures are rescheduled with linear backoff and
//! eventually parked as failed, never surfaced to the workflow that queued
//! the notice.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use cyberops_core::{AppError, AppResult};
use cyberops_domain::{EmailAddress, NoticeRecipient};

use crate::{ClaimedNotification, EmailService, NotificationOutboxRepository};

/// Retry and batching policy for outbox delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchPolicy {
    /// Rows claimed per batch.
    pub batch_size: usize,
    /// Lease length for claimed rows.
    pub lease_seconds: u32,
    /// Attempts before a row is parked as failed.
    pub max_attempts: u32,
    /// Backoff unit; attempt `n` waits `n` units.
    pub retry_backoff_seconds: u32,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            batch_size: 20,
            lease_seconds: 60,
            max_attempts: 5,
            retry_backoff_seconds: 30,
        }
    }
}

impl DispatchPolicy {
    /// Returns when a row that just failed its `attempts`-th delivery is due again.
    ///
    /// The delay is capped at [`MAX_RETRY_DELAY_SECONDS`].
    #[must_use]
    pub fn retry_at(&self, attempts: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay_seconds = i64::from(self.retry_backoff_seconds)
            .saturating_mul(i64::from(attempts))
            .min(MAX_RETRY_DELAY_SECONDS);

        TimeDelta::try_seconds(delay_seconds)
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(now)
    }
}

/// Upper bound on a single retry delay (one day).
pub const MAX_RETRY_DELAY_SECONDS: i64 = 86_400;

/// What happened to a row whose delivery did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Released for another attempt after the backoff.
    Rescheduled,
    /// Attempts exhausted; parked as failed.
    Parked,
    /// Settling the row failed; it stays leased until the lease expires.
    Unsettled,
}

impl FailureOutcome {
    /// Returns a stable label for logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rescheduled => "rescheduled",
            Self::Parked => "parked",
            Self::Unsettled => "unsettled",
        }
    }
}

/// Delivery attempt that did not reach every recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    /// Outbox row identifier.
    pub notification_id: uuid::Uuid,
    /// Event type of the notice.
    pub event_type: &'static str,
    /// Attempts made so far, including this one.
    pub attempts: u32,
    /// Sender or settlement error text.
    pub error: String,
    /// Where the row ended up.
    pub outcome: FailureOutcome,
}

/// Counters for one dispatch batch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DispatchReport {
    /// Rows claimed.
    pub claimed: usize,
    /// Rows delivered.
    pub delivered: usize,
    /// Rows released for another attempt.
    pub rescheduled: usize,
    /// Rows parked as failed.
    pub failed: usize,
    /// Rows left leased because settling them failed.
    pub unsettled: usize,
    /// Per-row delivery failures, in claim order.
    pub failures: Vec<DeliveryFailure>,
}

/// Application service delivering queued notices by email.
#[derive(Clone)]
pub struct NotificationDispatchService {
    outbox: Arc<dyn NotificationOutboxRepository>,
    email_service: Arc<dyn EmailService>,
    administrators: Vec<EmailAddress>,
    policy: DispatchPolicy,
}

impl NotificationDispatchService {
    /// Creates a dispatcher.
    pub fn new(
        outbox: Arc<dyn NotificationOutboxRepository>,
        email_service: Arc<dyn EmailService>,
        administrators: Vec<EmailAddress>,
        policy: DispatchPolicy,
    ) -> AppResult<Self> {
        if administrators.is_empty() {
            return Err(AppError::Validation(
                "at least one administrator notification address is required".to_owned(),
            ));
        }

        if policy.batch_size == 0 || policy.lease_seconds == 0 || policy.max_attempts == 0 {
            return Err(AppError::Validation(
                "dispatch batch size, lease, and attempt limit must be greater than zero"
                    .to_owned(),
            ));
        }

        Ok(Self {
            outbox,
            email_service,
            administrators,
            policy,
        })
    }

    /// Returns the active policy.
    #[must_use]
    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    /// Claims one batch of due notices and attempts each once.
    ///
    /// Only a failed claim is returned as an error. Delivery and settlement
    /// errors are recorded per row and the batch continues.
    pub async fn dispatch_batch(&self) -> AppResult<DispatchReport> {
        let claimed = self
            .outbox
            .claim_due(self.policy.batch_size, self.policy.lease_seconds)
            .await?;

        let mut report = DispatchReport {
            claimed: claimed.len(),
            ..DispatchReport::default()
        };

        for notification in claimed {
            if let Some(failure) = self.process(&notification).await {
                match failure.outcome {
                    FailureOutcome::Rescheduled => report.rescheduled += 1,
                    FailureOutcome::Parked => report.failed += 1,
                    FailureOutcome::Unsettled => report.unsettled += 1,
                }
                report.failures.push(failure);
            } else {
                report.delivered += 1;
            }
        }

        Ok(report)
    }

    async fn process(&self, notification: &ClaimedNotification) -> Option<DeliveryFailure> {
        let failure = |error: String, outcome: FailureOutcome| DeliveryFailure {
            notification_id: notification.notification_id,
            event_type: notification.notice.event_type(),
            attempts: notification.attempts,
            error,
            outcome,
        };

        let send_error = match self.deliver(notification).await {
            Ok(()) => {
                return self
                    .outbox
                    .mark_delivered(notification.notification_id, &notification.lease_token)
                    .await
                    .err()
                    .map(|error| {
                        failure(
                            format!("delivered but not settled: {error}"),
                            FailureOutcome::Unsettled,
                        )
                    });
            }
            Err(error) => error.to_string(),
        };

        let (settled, outcome) = if notification.attempts >= self.policy.max_attempts {
            let settled = self
                .outbox
                .mark_failed(
                    notification.notification_id,
                    &notification.lease_token,
                    &send_error,
                )
                .await;
            (settled, FailureOutcome::Parked)
        } else {
            let settled = self
                .outbox
                .reschedule(
                    notification.notification_id,
                    &notification.lease_token,
                    &send_error,
                    self.policy.retry_at(notification.attempts, Utc::now()),
                )
                .await;
            (settled, FailureOutcome::Rescheduled)
        };

        Some(match settled {
            Ok(()) => failure(send_error, outcome),
            Err(error) => failure(
                format!("{send_error}; settlement failed: {error}"),
                FailureOutcome::Unsettled,
            ),
        })
    }

    async fn deliver(&self, notification: &ClaimedNotification) -> AppResult<()> {
        let message = notification.notice.render();
        let recipients: Vec<String> = match notification.notice.recipient() {
            NoticeRecipient::Administrators => self
                .administrators
                .iter()
                .map(|address| address.as_str().to_owned())
                .collect(),
            NoticeRecipient::Address(address) => vec![address],
        };

        for recipient in recipients {
            self.email_service
                .send_email(&recipient, &message.subject, &message.text_body, None)
                .await?;
        }

        Ok(())
    }
}
