use super::*;

#[derive(Debug, FromRow)]
struct RoleRequestListingRow {
    request_id: i64,
    user_id: uuid::Uuid,
    requested_role: String,
    comment: Option<String>,
    status: String,
    decided_by: Option<uuid::Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    username: Option<String>,
    email: Option<String>,
    full_name: Option<String>,
}

impl TryFrom<RoleRequestListingRow> for RoleRequestListing {
    type Error = AppError;

    fn try_from(row: RoleRequestListingRow) -> Result<Self, Self::Error> {
        let requester = match (row.username, row.email) {
            (Some(username), Some(email)) => Some(RequesterIdentity {
                user_id: UserId::from_uuid(row.user_id),
                username,
                email,
                full_name: row.full_name,
            }),
            _ => None,
        };

        let request = RoleRequest::try_from(RoleRequestRow {
            request_id: row.request_id,
            user_id: row.user_id,
            requested_role: row.requested_role,
            comment: row.comment,
            status: row.status,
            decided_by: row.decided_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })?;

        Ok(Self { request, requester })
    }
}

#[derive(Debug, FromRow)]
struct SummaryRow {
    total_users: i64,
    total_roles: i64,
    total_permissions: i64,
    pending_requests: i64,
}

impl PostgresGovernanceRepository {
    pub(super) async fn submit_request_impl(
        &self,
        input: SubmitRoleRequestInput,
    ) -> AppResult<SubmittedRoleRequest> {
        let mut transaction = self
            .pool
            .begin()
            .await
            .map_err(|error| map_storage_error(error, "begin role request submission"))?;

        // The row lock serializes concurrent submissions of the same user.
        let requester = require_profile(&mut transaction, input.user_id, true).await?;
        require_role_exists(&mut transaction, &input.requested_role).await?;

        let superseded = sqlx::query_scalar::<_, i64>(
            r#"
            DELETE FROM role_requests
            WHERE user_id = $1
              AND status = 'pending'
            RETURNING request_id
            "#,
        )
        .bind(input.user_id.as_uuid())
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| map_storage_error(error, "supersede pending role request"))?
        .map(RoleRequestId::new);

        let row = sqlx::query_as::<_, RoleRequestRow>(
            r#"
            INSERT INTO role_requests (user_id, requested_role, comment, status)
            VALUES ($1, $2, $3, 'pending')
            RETURNING
                request_id,
                user_id,
                requested_role,
                comment,
                status,
                decided_by,
                created_at,
                updated_at
            "#,
        )
        .bind(input.user_id.as_uuid())
        .bind(input.requested_role.as_str())
        .bind(input.comment.as_ref().map(|comment| comment.as_str()))
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| map_pending_conflict(error, input.user_id))?;
        let request = RoleRequest::try_from(row)?;

        enqueue_notice(
            &mut transaction,
            &GovernanceNotice::RoleRequestSubmitted {
                request_id: request.request_id,
                requester: requester_identity(&requester),
                requested_role: request.requested_role.clone(),
                comment: request.comment.clone(),
            },
        )
        .await?;

        transaction
            .commit()
            .await
            .map_err(|error| map_storage_error(error, "commit role request submission"))?;

        info!(
            request_id = %request.request_id,
            user_id = %request.user_id,
            requested_role = %request.requested_role,
            superseded = superseded.map(|request_id| request_id.as_i64()),
            "role request submitted"
        );

        Ok(SubmittedRoleRequest {
            request,
            superseded,
        })
    }

    pub(super) async fn find_request_impl(
        &self,
        request_id: RoleRequestId,
    ) -> AppResult<Option<RoleRequest>> {
        let row = sqlx::query_as::<_, RoleRequestRow>(
            r#"
            SELECT
                request_id,
                user_id,
                requested_role,
                comment,
                status,
                decided_by,
                created_at,
                updated_at
            FROM role_requests
            WHERE request_id = $1
            "#,
        )
        .bind(request_id.as_i64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| map_storage_error(error, "load role request"))?;

        row.map(RoleRequest::try_from).transpose()
    }

    pub(super) async fn list_requests_impl(
        &self,
        query: &RoleRequestQuery,
    ) -> AppResult<Vec<RoleRequestListing>> {
        let limit = i64::try_from(query.limit)
            .map_err(|error| AppError::Validation(format!("invalid request limit: {error}")))?;
        let offset = i64::try_from(query.offset)
            .map_err(|error| AppError::Validation(format!("invalid request offset: {error}")))?;

        let rows = sqlx::query_as::<_, RoleRequestListingRow>(
            r#"
            SELECT
                requests.request_id,
                requests.user_id,
                requests.requested_role,
                requests.comment,
                requests.status,
                requests.decided_by,
                requests.created_at,
                requests.updated_at,
                users.username,
                users.email,
                users.full_name
            FROM role_requests AS requests
            LEFT JOIN users
                ON users.user_id = requests.user_id
            WHERE ($1::TEXT IS NULL OR requests.status = $1)
              AND ($2::UUID IS NULL OR requests.user_id = $2)
            ORDER BY requests.created_at DESC, requests.request_id DESC
            LIMIT $3
            OFFSET $4
            "#,
        )
        .bind(query.effective_status().map(|status| status.as_str()))
        .bind(query.user_id.map(|user_id| user_id.as_uuid()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| map_storage_error(error, "list role requests"))?;

        rows.into_iter().map(RoleRequestListing::try_from).collect()
    }

    pub(super) async fn latest_request_for_user_impl(
        &self,
        user_id: UserId,
    ) -> AppResult<Option<RoleRequest>> {
        let row = sqlx::query_as::<_, RoleRequestRow>(
            r#"
            SELECT
                request_id,
                user_id,
                requested_role,
                comment,
                status,
                decided_by,
                created_at,
                updated_at
            FROM role_requests
            WHERE user_id = $1
            ORDER BY created_at DESC, request_id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| map_storage_error(error, "load latest role request"))?;

        row.map(RoleRequest::try_from).transpose()
    }

    pub(super) async fn governance_summary_impl(&self) -> AppResult<GovernanceSummary> {
        let row = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) AS total_users,
                (SELECT COUNT(*) FROM roles) AS total_roles,
                (SELECT COUNT(*) FROM permissions) AS total_permissions,
                (SELECT COUNT(*) FROM role_requests WHERE status = 'pending') AS pending_requests
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|error| map_storage_error(error, "load governance summary"))?;

        Ok(GovernanceSummary {
            total_users: stored_count(row.total_users)?,
            total_roles: stored_count(row.total_roles)?,
            total_permissions: stored_count(row.total_permissions)?,
            pending_requests: stored_count(row.pending_requests)?,
        })
    }

    pub(super) async fn decide_request_impl(
        &self,
        request_id: RoleRequestId,
        outcome: DecisionOutcome,
        decided_by: Option<UserId>,
    ) -> AppResult<DecidedRoleRequest> {
        let mut transaction = self.begin_role_mutation().await?;

        let row = sqlx::query_as::<_, RoleRequestRow>(
            r#"
            SELECT
                request_id,
                user_id,
                requested_role,
                comment,
                status,
                decided_by,
                created_at,
                updated_at
            FROM role_requests
            WHERE request_id = $1
            FOR UPDATE
            "#,
        )
        .bind(request_id.as_i64())
        .fetch_optional(&mut *transaction)
        .await
        .map_err(|error| map_storage_error(error, "lock role request"))?
        .ok_or_else(|| {
            AppError::RequestNotFound(format!("role request '{request_id}' does not exist"))
        })?;
        let pending = RoleRequest::try_from(row)?;
        let decided = pending.decide(outcome, decided_by, Utc::now())?;

        let requester = require_profile(&mut transaction, pending.user_id, false).await?;

        let change = match outcome {
            DecisionOutcome::Approved => Some(
                replace_role_locked(
                    &mut transaction,
                    pending.user_id,
                    &pending.requested_role,
                    decided_by,
                )
                .await?,
            ),
            DecisionOutcome::Rejected => None,
        };

        let row = sqlx::query_as::<_, RoleRequestRow>(
            r#"
            UPDATE role_requests
            SET status = $2,
                decided_by = $3,
                updated_at = now()
            WHERE request_id = $1
              AND status = 'pending'
            RETURNING
                request_id,
                user_id,
                requested_role,
                comment,
                status,
                decided_by,
                created_at,
                updated_at
            "#,
        )
        .bind(request_id.as_i64())
        .bind(decided.status.as_str())
        .bind(decided_by.map(|user_id| user_id.as_uuid()))
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| map_storage_error(error, "record role request decision"))?;
        let request = RoleRequest::try_from(row)?;

        enqueue_notice(
            &mut transaction,
            &GovernanceNotice::RoleRequestDecided {
                request_id,
                requester: requester_identity(&requester),
                requested_role: request.requested_role.clone(),
                outcome,
            },
        )
        .await?;

        transaction
            .commit()
            .await
            .map_err(|error| map_storage_error(error, "commit role request decision"))?;

        info!(
            request_id = %request_id,
            user_id = %request.user_id,
            status = request.status.as_str(),
            "role request decided"
        );
        if let Some(change) = &change {
            log_role_change(change, "approve");
        }

        Ok(DecidedRoleRequest { request, change })
    }
}

fn map_pending_conflict(error: sqlx::Error, user_id: UserId) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::Conflict(format!(
            "user '{user_id}' already has a pending role request"
        ));
    }

    map_storage_error(error, "insert role request")
}
