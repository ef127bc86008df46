use chrono::Duration;

use super::*;

impl InMemoryGovernanceRepository {
    pub(super) async fn claim_due_impl(
        &self,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<Vec<ClaimedNotification>> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let lease_expires_at = now + Duration::seconds(i64::from(lease_seconds));

        let mut due: Vec<usize> = state
            .outbox
            .iter()
            .enumerate()
            .filter(|(_, entry)| match entry.status {
                OutboxStatus::Pending => entry.available_at <= now,
                OutboxStatus::Leased => entry
                    .lease
                    .as_ref()
                    .is_some_and(|(_, expires_at)| *expires_at < now),
                OutboxStatus::Delivered | OutboxStatus::Failed => false,
            })
            .map(|(position, _)| position)
            .collect();
        due.sort_by_key(|position| state.outbox[*position].available_at);
        due.truncate(limit);

        let mut claimed = Vec::with_capacity(due.len());
        for position in due {
            let entry = &mut state.outbox[position];
            let lease_token = Uuid::new_v4().to_string();

            entry.status = OutboxStatus::Leased;
            entry.attempts += 1;
            entry.lease = Some((lease_token.clone(), lease_expires_at));

            claimed.push(ClaimedNotification {
                notification_id: entry.notification_id,
                lease_token,
                attempts: entry.attempts,
                notice: entry.notice.clone(),
            });
        }

        Ok(claimed)
    }

    pub(super) async fn settle_impl(
        &self,
        notification_id: Uuid,
        lease_token: &str,
        status: OutboxStatus,
        error_message: Option<&str>,
        retry_at: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;

        let entry = state
            .outbox
            .iter_mut()
            .find(|entry| {
                entry.notification_id == notification_id
                    && entry.status == OutboxStatus::Leased
                    && entry
                        .lease
                        .as_ref()
                        .is_some_and(|(token, _)| token == lease_token)
            })
            .ok_or_else(|| {
                AppError::Conflict(format!(
                    "notification '{notification_id}' is no longer leased with the provided token"
                ))
            })?;

        entry.status = status;
        entry.lease = None;
        if let Some(error_message) = error_message {
            entry.last_error = Some(error_message.to_owned());
        }
        if let Some(retry_at) = retry_at {
            entry.available_at = retry_at;
        }

        Ok(())
    }

    /// Returns the last recorded delivery error for a notification.
    pub async fn last_delivery_error(&self, notification_id: Uuid) -> Option<String> {
        self.state
            .read()
            .await
            .outbox
            .iter()
            .find(|entry| entry.notification_id == notification_id)
            .and_then(|entry| entry.last_error.clone())
    }
}
