use std::sync::Arc;

use chrono::{Duration, Utc};
use cyberops_application::{
    DispatchPolicy, NotificationDispatchService, NotificationOutboxRepository, PermissionResolver,
    RoleAssignmentRepository, RoleAssignmentService, RoleRequestQuery, RoleRequestRepository,
    RoleRequestService, SubmitRoleRequestInput,
};
use cyberops_core::AppError;
use cyberops_domain::{
    Actor, DecisionOutcome, EmailAddress, GovernanceNotice, RoleName, RoleRequestStatus,
    SelfServiceRolePolicy, UserId, UserProfile,
};

use super::InMemoryGovernanceRepository;
use crate::ConsoleEmailService;

fn role(name: &str) -> RoleName {
    RoleName::new(name).unwrap_or_else(|_| panic!("invalid test role '{name}'"))
}

fn profile(user_id: UserId, username: &str) -> UserProfile {
    UserProfile {
        user_id,
        username: username.to_owned(),
        email: format!("{username}@cyberops.example"),
        full_name: None,
        is_active: true,
        created_at: Utc::now(),
    }
}

struct Platform {
    repository: Arc<InMemoryGovernanceRepository>,
    assignments: RoleAssignmentService,
    requests: RoleRequestService,
    resolver: PermissionResolver,
}

impl Platform {
    fn new() -> Self {
        let repository = Arc::new(InMemoryGovernanceRepository::default());

        Self {
            assignments: RoleAssignmentService::new(repository.clone(), repository.clone()),
            requests: RoleRequestService::new(
                repository.clone(),
                repository.clone(),
                repository.clone(),
                SelfServiceRolePolicy::default(),
            ),
            resolver: PermissionResolver::new(repository.clone()),
            repository,
        }
    }

    async fn user(&self, username: &str, role_name: Option<&str>) -> UserId {
        let user_id = UserId::new();
        self.repository
            .upsert_user(profile(user_id, username))
            .await;

        if let Some(role_name) = role_name {
            let assigned = self
                .repository
                .replace_role(user_id, &role(role_name), None)
                .await;
            assert!(assigned.is_ok());
        }

        user_id
    }
}

#[tokio::test]
async fn second_superadmin_can_step_down_but_the_last_cannot() {
    let platform = Platform::new();
    let first = platform.user("root", Some("superadmin")).await;
    let second = platform.user("backup", Some("superadmin")).await;
    let actor = Actor::user(second);

    let removed = platform
        .assignments
        .remove_role(&actor, first, &RoleName::superadmin())
        .await;
    assert!(removed.map(|change| change.removes_superadmin()).unwrap_or(false));
    assert_eq!(
        platform
            .resolver
            .count_holders(&RoleName::superadmin(), None)
            .await
            .unwrap_or_default(),
        1
    );

    let last = platform
        .assignments
        .remove_role(&actor, second, &RoleName::superadmin())
        .await;
    assert!(matches!(last, Err(AppError::LastSuperadminViolation(_))));
    assert!(
        platform
            .resolver
            .has_role(second, &RoleName::superadmin())
            .await
            .unwrap_or(false)
    );
}

#[tokio::test]
async fn resubmission_keeps_a_single_pending_request() {
    let platform = Platform::new();
    platform.user("root", Some("superadmin")).await;
    let user_id = platform.user("tess", Some("user")).await;

    let first = platform
        .requests
        .submit(user_id, &role("admin"), Some("need access".to_owned()))
        .await;
    assert!(first.is_ok());
    let second = platform
        .requests
        .submit(user_id, &role("instructor"), None)
        .await;

    let second = second.unwrap_or_else(|error| panic!("resubmission should succeed: {error}"));
    assert_eq!(
        second.superseded,
        first.ok().map(|submitted| submitted.request.request_id)
    );

    let pending = platform
        .repository
        .list_requests(&RoleRequestQuery {
            user_id: Some(user_id),
            ..RoleRequestQuery::default()
        })
        .await
        .unwrap_or_default();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].request.requested_role, role("instructor"));
    assert_eq!(
        pending[0]
            .requester
            .as_ref()
            .map(|requester| requester.username.as_str()),
        Some("tess")
    );
    assert_eq!(platform.repository.queued_notices().await.len(), 2);
}

#[tokio::test]
async fn approval_replaces_previous_role() {
    let platform = Platform::new();
    let reviewer = platform.user("ada", Some("admin")).await;
    let user_id = platform.user("tess", Some("user")).await;

    let submitted = platform
        .requests
        .submit(user_id, &role("instructor"), None)
        .await
        .unwrap_or_else(|error| panic!("submission should succeed: {error}"));
    let decided = platform
        .requests
        .decide(
            &Actor::user(reviewer),
            submitted.request.request_id,
            DecisionOutcome::Approved,
        )
        .await
        .unwrap_or_else(|error| panic!("approval should succeed: {error}"));

    assert_eq!(decided.request.status, RoleRequestStatus::Approved);
    assert_eq!(decided.request.decided_by, Some(reviewer));
    assert_eq!(
        platform
            .resolver
            .roles_of(user_id)
            .await
            .unwrap_or_default()
            .into_iter()
            .collect::<Vec<_>>(),
        vec![role("instructor")]
    );
    assert_eq!(
        platform.repository.legacy_rank(user_id).await.as_deref(),
        Some("INSTRUCTOR")
    );
    assert!(
        platform
            .repository
            .find_request(submitted.request.request_id)
            .await
            .unwrap_or_default()
            .is_some()
    );
}

#[tokio::test]
async fn rejection_leaves_roles_untouched() {
    let platform = Platform::new();
    let reviewer = platform.user("ada", Some("admin")).await;
    let user_id = platform.user("tess", Some("user")).await;
    let before = platform.resolver.roles_of(user_id).await.unwrap_or_default();

    let submitted = platform
        .requests
        .submit(user_id, &role("admin"), None)
        .await
        .unwrap_or_else(|error| panic!("submission should succeed: {error}"));
    let decided = platform
        .requests
        .decide(
            &Actor::user(reviewer),
            submitted.request.request_id,
            DecisionOutcome::Rejected,
        )
        .await
        .unwrap_or_else(|error| panic!("rejection should succeed: {error}"));

    assert_eq!(decided.request.status, RoleRequestStatus::Rejected);
    assert!(decided.change.is_none());
    assert_eq!(
        platform.resolver.roles_of(user_id).await.unwrap_or_default(),
        before
    );
}

#[tokio::test]
async fn repeating_a_replacement_succeeds_without_further_change() {
    let platform = Platform::new();
    let root = platform.user("root", Some("superadmin")).await;
    let user_id = platform.user("tess", Some("user")).await;
    let actor = Actor::user(root);

    let first = platform
        .assignments
        .replace_role(&actor, user_id, &role("instructor"))
        .await
        .unwrap_or_else(|error| panic!("first replacement should succeed: {error}"));
    let second = platform
        .assignments
        .replace_role(&actor, user_id, &role("instructor"))
        .await
        .unwrap_or_else(|error| panic!("repeated replacement should succeed: {error}"));

    assert!(!first.is_noop());
    assert!(second.is_noop());
    assert_eq!(
        platform.repository.list_roles_for_user(user_id).await.unwrap_or_default(),
        vec![role("instructor")]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_step_downs_keep_one_superadmin() {
    let platform = Platform::new();
    let first = platform.user("root", Some("superadmin")).await;
    let second = platform.user("backup", Some("superadmin")).await;

    let step_down = |user_id: UserId| {
        let repository = platform.repository.clone();
        tokio::spawn(async move {
            repository
                .remove_role(user_id, &RoleName::superadmin())
                .await
        })
    };
    let (left, right) = tokio::join!(step_down(first), step_down(second));
    let results = [left, right].map(|joined| {
        joined.unwrap_or_else(|error| panic!("step-down task panicked: {error}"))
    });

    assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .any(|result| matches!(result, Err(AppError::LastSuperadminViolation(_))))
    );
    assert_eq!(
        platform
            .resolver
            .count_holders(&RoleName::superadmin(), None)
            .await
            .unwrap_or_default(),
        1
    );
}

#[tokio::test]
async fn failed_approval_leaves_the_request_pending() {
    let platform = Platform::new();
    let root = platform.user("root", Some("superadmin")).await;

    let submitted = platform
        .requests
        .submit(root, &role("admin"), None)
        .await
        .unwrap_or_else(|error| panic!("submission should succeed: {error}"));
    let result = platform
        .requests
        .decide(
            &Actor::System,
            submitted.request.request_id,
            DecisionOutcome::Approved,
        )
        .await;

    assert!(matches!(result, Err(AppError::LastSuperadminViolation(_))));
    let stored = platform
        .repository
        .find_request(submitted.request.request_id)
        .await
        .unwrap_or_default();
    assert_eq!(
        stored.map(|request| request.status),
        Some(RoleRequestStatus::Pending)
    );
    assert!(
        platform
            .repository
            .queued_notices()
            .await
            .iter()
            .all(|notice| matches!(notice, GovernanceNotice::RoleRequestSubmitted { .. }))
    );
    assert_eq!(
        platform.repository.legacy_rank(root).await.as_deref(),
        Some("SUPERADMIN")
    );
}

#[tokio::test]
async fn decided_requests_cannot_be_decided_again() {
    let platform = Platform::new();
    let reviewer = platform.user("ada", Some("admin")).await;
    let user_id = platform.user("tess", Some("user")).await;
    let actor = Actor::user(reviewer);

    let submitted = platform
        .requests
        .submit(user_id, &role("instructor"), None)
        .await
        .unwrap_or_else(|error| panic!("submission should succeed: {error}"));
    let request_id = submitted.request.request_id;

    let first = platform
        .requests
        .decide(&actor, request_id, DecisionOutcome::Rejected)
        .await;
    assert!(first.is_ok());

    let second = platform
        .requests
        .decide(&actor, request_id, DecisionOutcome::Approved)
        .await;
    assert!(matches!(second, Err(AppError::RequestAlreadyDecided(_))));
    assert_eq!(
        platform.repository.list_roles_for_user(user_id).await.unwrap_or_default(),
        vec![role("user")]
    );
}

#[tokio::test]
async fn decision_fails_when_requester_was_deleted() {
    let platform = Platform::new();
    let reviewer = platform.user("ada", Some("admin")).await;
    let user_id = platform.user("tess", Some("user")).await;

    let submitted = platform
        .requests
        .submit(user_id, &role("admin"), None)
        .await
        .unwrap_or_else(|error| panic!("submission should succeed: {error}"));
    assert!(platform.repository.delete_user(user_id).await.is_ok());

    let result = platform
        .requests
        .decide(
            &Actor::user(reviewer),
            submitted.request.request_id,
            DecisionOutcome::Rejected,
        )
        .await;
    assert!(matches!(result, Err(AppError::UserNotFound(_))));
}

#[tokio::test]
async fn last_superadmin_cannot_be_deleted() {
    let platform = Platform::new();
    let root = platform.user("root", Some("superadmin")).await;

    let result = platform.repository.delete_user(root).await;

    assert!(matches!(result, Err(AppError::LastSuperadminViolation(_))));
    assert!(
        platform
            .repository
            .find_user_profile(root)
            .await
            .unwrap_or_default()
            .is_some()
    );
}

#[tokio::test]
async fn summary_counts_catalog_and_pending_requests() {
    let platform = Platform::new();
    let reviewer = platform.user("ada", Some("admin")).await;
    let user_id = platform.user("tess", Some("user")).await;
    let submitted = platform
        .requests
        .submit(user_id, &role("instructor"), None)
        .await;
    assert!(submitted.is_ok());

    let summary = platform
        .requests
        .governance_summary(&Actor::user(reviewer))
        .await
        .unwrap_or_else(|error| panic!("summary should load: {error}"));

    assert_eq!(summary.total_users, 2);
    assert_eq!(summary.total_roles, 4);
    assert_eq!(summary.total_permissions, 8);
    assert_eq!(summary.pending_requests, 1);
}

#[tokio::test]
async fn rescheduled_notifications_come_back_after_backoff() {
    let repository = InMemoryGovernanceRepository::default();
    let user_id = UserId::new();
    repository.upsert_user(profile(user_id, "tess")).await;
    let submitted = repository
        .submit_request(SubmitRoleRequestInput {
            user_id,
            requested_role: role("admin"),
            comment: None,
        })
        .await;
    assert!(submitted.is_ok());

    let claimed = repository.claim_due(10, 60).await.unwrap_or_default();
    assert_eq!(claimed.len(), 1);
    assert!(repository.claim_due(10, 60).await.unwrap_or_default().is_empty());

    let rescheduled = repository
        .reschedule(
            claimed[0].notification_id,
            &claimed[0].lease_token,
            "smtp unavailable",
            Utc::now() - Duration::seconds(1),
        )
        .await;
    assert!(rescheduled.is_ok());

    let stale = repository
        .mark_delivered(claimed[0].notification_id, &claimed[0].lease_token)
        .await;
    assert!(matches!(stale, Err(AppError::Conflict(_))));

    let retried = repository.claim_due(10, 60).await.unwrap_or_default();
    assert_eq!(retried.len(), 1);
    assert_eq!(retried[0].attempts, 2);
    assert_eq!(
        repository
            .last_delivery_error(retried[0].notification_id)
            .await
            .as_deref(),
        Some("smtp unavailable")
    );

    let failed = repository
        .mark_failed(retried[0].notification_id, &retried[0].lease_token, "gave up")
        .await;
    assert!(failed.is_ok());
    assert!(repository.queued_notices().await.is_empty());
}

#[tokio::test]
async fn dispatcher_drains_the_outbox_through_console_sender() {
    let platform = Platform::new();
    let reviewer = platform.user("ada", Some("admin")).await;
    let user_id = platform.user("tess", Some("user")).await;

    let submitted = platform
        .requests
        .submit(user_id, &role("instructor"), Some("teaching track".to_owned()))
        .await
        .unwrap_or_else(|error| panic!("submission should succeed: {error}"));
    let decided = platform
        .requests
        .decide(
            &Actor::user(reviewer),
            submitted.request.request_id,
            DecisionOutcome::Approved,
        )
        .await;
    assert!(decided.is_ok());

    let administrators = vec![
        EmailAddress::new("ops@cyberops.example")
            .unwrap_or_else(|_| panic!("test address should be valid")),
    ];
    let dispatcher = NotificationDispatchService::new(
        platform.repository.clone(),
        Arc::new(ConsoleEmailService::new()),
        administrators,
        DispatchPolicy::default(),
    )
    .unwrap_or_else(|error| panic!("dispatcher should build: {error}"));

    let report = dispatcher
        .dispatch_batch()
        .await
        .unwrap_or_else(|error| panic!("dispatch should succeed: {error}"));

    assert_eq!(report.claimed, 2);
    assert_eq!(report.delivered, 2);
    assert!(platform.repository.queued_notices().await.is_empty());
}
