use tracing::warn;

use super::*;

#[derive(Debug, FromRow)]
struct ClaimedNotificationRow {
    notification_id: uuid::Uuid,
    lease_token: String,
    attempts: i32,
    payload: serde_json::Value,
}

/// Final state written for a leased outbox row.
pub(super) enum Settlement<'a> {
    Delivered,
    Retry {
        error_message: &'a str,
        retry_at: DateTime<Utc>,
    },
    Failed {
        error_message: &'a str,
    },
}

impl PostgresGovernanceRepository {
    pub(super) async fn claim_due_impl(
        &self,
        limit: usize,
        lease_seconds: u32,
    ) -> AppResult<Vec<ClaimedNotification>> {
        let rows = sqlx::query_as::<_, ClaimedNotificationRow>(
            r#"
            WITH candidate_notifications AS (
                SELECT notification_id
                FROM notification_outbox
                WHERE (status = 'pending' AND available_at <= now())
                   OR (status = 'leased' AND lease_expires_at < now())
                ORDER BY available_at ASC, created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE notification_outbox AS outbox
            SET
                status = 'leased',
                lease_token = gen_random_uuid()::TEXT,
                lease_expires_at = now() + make_interval(secs => $2::INT),
                attempts = outbox.attempts + 1,
                updated_at = now()
            FROM candidate_notifications
            WHERE outbox.notification_id = candidate_notifications.notification_id
            RETURNING outbox.notification_id, outbox.lease_token, outbox.attempts, outbox.payload
            "#,
        )
        .bind(i64::try_from(limit).map_err(|error| {
            AppError::Validation(format!("invalid outbox claim limit: {error}"))
        })?)
        .bind(i32::try_from(lease_seconds).map_err(|error| {
            AppError::Validation(format!("invalid outbox lease_seconds: {error}"))
        })?)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_storage_error(error, "claim due notifications"))?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in rows {
            let attempts = u32::try_from(row.attempts).map_err(|error| {
                AppError::Internal(format!("stored outbox attempts are invalid: {error}"))
            })?;

            match serde_json::from_value::<GovernanceNotice>(row.payload) {
                Ok(notice) => claimed.push(ClaimedNotification {
                    notification_id: row.notification_id,
                    lease_token: row.lease_token,
                    attempts,
                    notice,
                }),
                Err(error) => {
                    let error_message = format!("unreadable notification payload: {error}");
                    warn!(
                        notification_id = %row.notification_id,
                        error = %error_message,
                        "parking unreadable outbox row"
                    );
                    self.settle_impl(
                        row.notification_id,
                        &row.lease_token,
                        Settlement::Failed {
                            error_message: &error_message,
                        },
                    )
                    .await?;
                }
            }
        }

        Ok(claimed)
    }

    pub(super) async fn settle_impl(
        &self,
        notification_id: uuid::Uuid,
        lease_token: &str,
        settlement: Settlement<'_>,
    ) -> AppResult<()> {
        let (status, error_message, available_at) = match settlement {
            Settlement::Delivered => ("delivered", None, None),
            Settlement::Retry {
                error_message,
                retry_at,
            } => ("pending", Some(error_message), Some(retry_at)),
            Settlement::Failed { error_message } => ("failed", Some(error_message), None),
        };

        let result = sqlx::query(
            r#"
            UPDATE notification_outbox
            SET
                status = $3,
                last_error = COALESCE($4, last_error),
                available_at = COALESCE($5, available_at),
                delivered_at = CASE WHEN $3 = 'delivered' THEN now() ELSE delivered_at END,
                lease_token = NULL,
                lease_expires_at = NULL,
                updated_at = now()
            WHERE notification_id = $1
              AND status = 'leased'
              AND lease_token = $2
            "#,
        )
        .bind(notification_id)
        .bind(lease_token)
        .bind(status)
        .bind(error_message)
        .bind(available_at)
        .execute(&self.pool)
        .await
        .map_err(|error| map_storage_error(error, "settle outbox notification"))?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "notification '{notification_id}' is no longer leased with the provided token"
            )));
        }

        Ok(())
    }
}
