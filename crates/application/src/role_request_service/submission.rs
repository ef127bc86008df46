use super::*;

impl RoleRequestService {
    /// Submits a role request for the calling user.
    ///
    /// Validation happens before any write: the role must be on the
    /// self-service allow-list and in the catalog. A previous pending request
    /// of the same user is superseded.
    pub async fn submit(
        &self,
        user_id: UserId,
        requested_role: &RoleName,
        comment: Option<String>,
    ) -> AppResult<SubmittedRoleRequest> {
        self.policy.ensure_requestable(requested_role)?;

        let comment = NonEmptyString::from_optional(comment);
        if let Some(comment) = &comment
            && comment.as_str().chars().count() > ROLE_REQUEST_COMMENT_MAX_LENGTH
        {
            return Err(AppError::Validation(format!(
                "comment must not exceed {ROLE_REQUEST_COMMENT_MAX_LENGTH} characters"
            )));
        }

        let catalog = self.catalog_repository.load_catalog().await?;
        catalog.require(requested_role)?;

        self.repository
            .submit_request(SubmitRoleRequestInput {
                user_id,
                requested_role: requested_role.clone(),
                comment,
            })
            .await
    }

    /// Returns the caller's most recent request, whatever its status.
    pub async fn latest_request_for_user(&self, user_id: UserId) -> AppResult<Option<RoleRequest>> {
        self.repository.latest_request_for_user(user_id).await
    }

    /// Returns the allow-list of self-requestable roles.
    #[must_use]
    pub fn requestable_roles(&self) -> Vec<RoleName> {
        self.policy.requestable_roles().iter().cloned().collect()
    }
}
