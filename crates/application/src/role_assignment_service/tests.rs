use std::sync::Arc;

use cyberops_core::AppError;
use cyberops_domain::{Actor, RoleName, UserId};

use crate::test_support::{FakeAssignmentRepository, FakeCatalogRepository, role};

use super::RoleAssignmentService;

struct Fixture {
    service: RoleAssignmentService,
    repository: Arc<FakeAssignmentRepository>,
    root: UserId,
    admin: UserId,
    trainee: UserId,
}

async fn fixture() -> Fixture {
    let root = UserId::new();
    let admin = UserId::new();
    let trainee = UserId::new();
    let repository = Arc::new(
        FakeAssignmentRepository::default()
            .with_user(root, "root", &["superadmin"])
            .await
            .with_user(admin, "ada", &["admin"])
            .await
            .with_user(trainee, "tess", &["user"])
            .await,
    );

    Fixture {
        service: RoleAssignmentService::new(repository.clone(), Arc::new(FakeCatalogRepository)),
        repository,
        root,
        admin,
        trainee,
    }
}

#[tokio::test]
async fn superadmin_replaces_a_role_and_is_recorded_as_assigner() {
    let fixture = fixture().await;

    let change = fixture
        .service
        .replace_role(&Actor::user(fixture.root), fixture.trainee, &role("instructor"))
        .await;

    assert!(change.is_ok());
    let holdings = fixture.repository.holdings.lock().await;
    assert_eq!(
        holdings.get(&fixture.trainee).cloned().unwrap_or_default(),
        vec![(role("instructor"), Some(fixture.root))]
    );
}

#[tokio::test]
async fn reassigning_the_held_role_changes_nothing() {
    let fixture = fixture().await;

    let change = fixture
        .service
        .replace_role(&Actor::user(fixture.root), fixture.admin, &role("admin"))
        .await;

    assert!(change.map(|change| change.is_noop()).unwrap_or(false));
}

#[tokio::test]
async fn admins_cannot_assign_roles_directly() {
    let fixture = fixture().await;

    let result = fixture
        .service
        .replace_role(&Actor::user(fixture.admin), fixture.trainee, &role("instructor"))
        .await;

    assert!(matches!(result, Err(AppError::Forbidden(_))));
    assert_eq!(*fixture.repository.mutations.lock().await, 0);
}

#[tokio::test]
async fn unknown_role_is_rejected_before_any_mutation() {
    let fixture = fixture().await;

    let result = fixture
        .service
        .replace_role(&Actor::user(fixture.root), fixture.trainee, &role("auditor"))
        .await;

    assert!(matches!(result, Err(AppError::RoleNotFound(_))));
    assert_eq!(*fixture.repository.mutations.lock().await, 0);
}

#[tokio::test]
async fn last_superadmin_cannot_step_down() {
    let fixture = fixture().await;
    let actor = Actor::user(fixture.root);

    let removal = fixture
        .service
        .remove_role(&actor, fixture.root, &RoleName::superadmin())
        .await;
    let demotion = fixture
        .service
        .replace_role(&actor, fixture.root, &role("admin"))
        .await;

    assert!(matches!(removal, Err(AppError::LastSuperadminViolation(_))));
    assert!(matches!(demotion, Err(AppError::LastSuperadminViolation(_))));
    assert_eq!(
        fixture
            .service
            .resolver()
            .count_holders(&RoleName::superadmin(), None)
            .await
            .ok(),
        Some(1)
    );
}

#[tokio::test]
async fn grant_refuses_to_stack_roles() {
    let fixture = fixture().await;

    let result = fixture
        .service
        .grant_role(&Actor::System, fixture.trainee, &role("admin"))
        .await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn listing_users_requires_users_view() {
    let fixture = fixture().await;

    let denied = fixture
        .service
        .list_users_with_roles(&Actor::user(fixture.trainee))
        .await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));

    let users = fixture
        .service
        .list_users_with_roles(&Actor::user(fixture.admin))
        .await
        .unwrap_or_default();
    let usernames: Vec<&str> = users
        .iter()
        .map(|user| user.profile.username.as_str())
        .collect();
    assert_eq!(usernames, vec!["tess", "ada", "root"]);

    let trainee = users.iter().find(|user| user.profile.username == "tess");
    assert_eq!(
        trainee.map(|user| user.permissions.len()),
        Some(2),
        "user role grants comments.post and labs.access"
    );
}

#[tokio::test]
async fn users_can_read_their_own_access_profile() {
    let fixture = fixture().await;

    let own = fixture
        .service
        .access_profile(&Actor::user(fixture.trainee), fixture.trainee)
        .await;
    assert_eq!(own.map(|access| access.roles).ok(), Some(vec![role("user")]));

    let other = fixture
        .service
        .access_profile(&Actor::user(fixture.trainee), fixture.root)
        .await;
    assert!(matches!(other, Err(AppError::Forbidden(_))));

    let missing = fixture
        .service
        .access_profile(&Actor::System, UserId::new())
        .await;
    assert!(matches!(missing, Err(AppError::UserNotFound(_))));
}

#[tokio::test]
async fn bootstrap_is_refused_once_a_superadmin_exists() {
    let fixture = fixture().await;

    let result = fixture.service.bootstrap_superadmin(fixture.admin).await;

    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn catalog_listings_follow_creation_and_name_order() {
    let fixture = fixture().await;

    let roles: Vec<String> = fixture
        .service
        .list_roles()
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|role| String::from(role.name))
        .collect();
    assert_eq!(roles, vec!["superadmin", "admin", "instructor", "user"]);

    let permissions = fixture.service.list_permissions().await.unwrap_or_default();
    assert!(
        permissions
            .windows(2)
            .all(|pair| pair[0].name < pair[1].name)
    );
}
