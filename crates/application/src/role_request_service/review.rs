use super::*;

impl RoleRequestService {
    /// Lists requests newest first together with the dashboard summary.
    pub async fn list_requests(
        &self,
        actor: &Actor,
        query: RoleRequestQuery,
    ) -> AppResult<RoleRequestPage> {
        self.require_reviewer(actor).await?;

        if query.limit == 0 {
            return Err(AppError::Validation(
                "limit must be greater than zero".to_owned(),
            ));
        }

        if query.limit > ROLE_REQUEST_PAGE_MAX {
            return Err(AppError::Validation(format!(
                "limit must not exceed {ROLE_REQUEST_PAGE_MAX}"
            )));
        }

        let requests = self.repository.list_requests(&query).await?;
        let summary = self.repository.governance_summary().await?;

        Ok(RoleRequestPage { requests, summary })
    }

    /// Returns one request; requesters may read their own.
    ///
    /// Non-reviewers get `Forbidden` for any request that is not theirs,
    /// including ids that do not exist.
    pub async fn get_request(
        &self,
        actor: &Actor,
        request_id: RoleRequestId,
    ) -> AppResult<RoleRequest> {
        let is_reviewer = match actor.user_id() {
            Some(user_id) => {
                self.resolver
                    .has_permission(user_id, &PermissionName::role_requests_review())
                    .await?
            }
            None => true,
        };

        let request = self.repository.find_request(request_id).await?;

        match request {
            Some(request) if is_reviewer || actor.user_id() == Some(request.user_id) => {
                Ok(request)
            }
            Some(_) => Err(AppError::Forbidden(format!(
                "role request '{request_id}' belongs to another user"
            ))),
            None if is_reviewer => Err(AppError::RequestNotFound(format!(
                "role request '{request_id}' does not exist"
            ))),
            None => Err(AppError::Forbidden(format!(
                "role request '{request_id}' is not visible to this caller"
            ))),
        }
    }

    /// Returns the dashboard summary alone.
    pub async fn governance_summary(&self, actor: &Actor) -> AppResult<GovernanceSummary> {
        self.require_reviewer(actor).await?;
        self.repository.governance_summary().await
    }

    /// Decides a pending request.
    ///
    /// Approval assigns the requested role with the decider as assigner in
    /// the same transaction as the status change.
    pub async fn decide(
        &self,
        actor: &Actor,
        request_id: RoleRequestId,
        outcome: DecisionOutcome,
    ) -> AppResult<DecidedRoleRequest> {
        self.require_reviewer(actor).await?;

        self.repository
            .decide_request(request_id, outcome, actor.assigner())
            .await
    }
}
