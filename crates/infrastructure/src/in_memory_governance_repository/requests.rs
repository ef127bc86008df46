use super::*;

impl InMemoryGovernanceRepository {
    pub(super) async fn submit_request_impl(
        &self,
        input: SubmitRoleRequestInput,
    ) -> AppResult<SubmittedRoleRequest> {
        let mut state = self.state.write().await;
        state.profile(input.user_id)?;
        state.catalog.require(&input.requested_role)?;

        let superseded = state
            .requests
            .iter()
            .find(|request| {
                request.user_id == input.user_id && !request.status.is_terminal()
            })
            .map(|request| request.request_id);
        state.requests.retain(|request| {
            request.user_id != input.user_id || request.status.is_terminal()
        });

        let now = Utc::now();
        let request = RoleRequest {
            request_id: RoleRequestId::new(state.next_request_id),
            user_id: input.user_id,
            requested_role: input.requested_role,
            comment: input.comment.map(|comment| comment.as_str().to_owned()),
            status: RoleRequestStatus::Pending,
            decided_by: None,
            created_at: now,
            updated_at: now,
        };
        state.next_request_id += 1;
        state.requests.push(request.clone());

        let requester = state.requester_identity(request.user_id).ok_or_else(|| {
            AppError::UserNotFound(format!("user '{}' does not exist", request.user_id))
        })?;
        state.enqueue_notice(GovernanceNotice::RoleRequestSubmitted {
            request_id: request.request_id,
            requester,
            requested_role: request.requested_role.clone(),
            comment: request.comment.clone(),
        });

        Ok(SubmittedRoleRequest {
            request,
            superseded,
        })
    }

    pub(super) async fn list_requests_impl(
        &self,
        query: &RoleRequestQuery,
    ) -> AppResult<Vec<RoleRequestListing>> {
        let state = self.state.read().await;
        let status = query.effective_status();

        let mut matching: Vec<&RoleRequest> = state
            .requests
            .iter()
            .filter(|request| status.is_none_or(|status| request.status == status))
            .filter(|request| query.user_id.is_none_or(|user_id| request.user_id == user_id))
            .collect();
        matching.sort_by(|left, right| {
            (right.created_at, right.request_id).cmp(&(left.created_at, left.request_id))
        });

        Ok(matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|request| RoleRequestListing {
                request: request.clone(),
                requester: state.requester_identity(request.user_id),
            })
            .collect())
    }

    pub(super) async fn governance_summary_impl(&self) -> AppResult<GovernanceSummary> {
        let state = self.state.read().await;
        let count = |value: usize| u64::try_from(value).unwrap_or(u64::MAX);

        Ok(GovernanceSummary {
            total_users: count(state.users.len()),
            total_roles: count(state.catalog.roles().len()),
            total_permissions: count(state.catalog.permissions().len()),
            pending_requests: count(
                state
                    .requests
                    .iter()
                    .filter(|request| !request.status.is_terminal())
                    .count(),
            ),
        })
    }

    pub(super) async fn decide_request_impl(
        &self,
        request_id: RoleRequestId,
        outcome: DecisionOutcome,
        decided_by: Option<UserId>,
    ) -> AppResult<DecidedRoleRequest> {
        let mut state = self.state.write().await;

        let position = state
            .requests
            .iter()
            .position(|request| request.request_id == request_id)
            .ok_or_else(|| {
                AppError::RequestNotFound(format!("role request '{request_id}' does not exist"))
            })?;
        let decided = state.requests[position].decide(outcome, decided_by, Utc::now())?;
        let requester = state.requester_identity(decided.user_id).ok_or_else(|| {
            AppError::UserNotFound(format!("user '{}' does not exist", decided.user_id))
        })?;

        let change = match outcome {
            DecisionOutcome::Approved => Some(state.replace_role(
                decided.user_id,
                &decided.requested_role,
                decided_by,
            )?),
            DecisionOutcome::Rejected => None,
        };

        state.requests[position] = decided.clone();
        state.enqueue_notice(GovernanceNotice::RoleRequestDecided {
            request_id,
            requester,
            requested_role: decided.requested_role.clone(),
            outcome,
        });

        Ok(DecidedRoleRequest {
            request: decided,
            change,
        })
    }
}
