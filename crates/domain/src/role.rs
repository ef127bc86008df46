//! Role catalog types.
//!
//! Role and permission names are compared case-insensitively everywhere, so
//! both are normalized to lowercase exactly once when the value is built.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use cyberops_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

const ROLE_NAME_MAX_LENGTH: usize = 50;
const PERMISSION_NAME_MAX_LENGTH: usize = 100;

/// Normalized role name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoleName(String);

impl RoleName {
    /// Distinguished role that bypasses permission checks.
    pub const SUPERADMIN: &'static str = "superadmin";
    /// Platform administrator.
    pub const ADMIN: &'static str = "admin";
    /// Lab and challenge author.
    pub const INSTRUCTOR: &'static str = "instructor";
    /// Default trainee role.
    pub const USER: &'static str = "user";

    /// Validates and normalizes a role name.
    pub fn new(value: impl AsRef<str>) -> AppResult<Self> {
        let normalized = normalize_name(value.as_ref(), "role", ROLE_NAME_MAX_LENGTH, false)?;
        Ok(Self(normalized))
    }

    /// Returns the distinguished superadmin role.
    #[must_use]
    pub fn superadmin() -> Self {
        Self::from_constant(Self::SUPERADMIN)
    }

    pub(crate) fn from_constant(value: &'static str) -> Self {
        Self(value.to_owned())
    }

    /// Returns whether this is the distinguished superadmin role.
    #[must_use]
    pub fn is_superadmin(&self) -> bool {
        self.0 == Self::SUPERADMIN
    }

    /// Returns the normalized name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the uppercase rank label mirrored into legacy profile metadata.
    #[must_use]
    pub fn rank_label(&self) -> String {
        self.0.to_uppercase()
    }
}

impl Display for RoleName {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

impl FromStr for RoleName {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::new(value)
    }
}

impl TryFrom<String> for RoleName {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoleName> for String {
    fn from(value: RoleName) -> Self {
        value.0
    }
}

/// Normalized permission name, e.g. `role_requests.review`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionName(String);

impl PermissionName {
    /// Allows listing users together with their roles.
    pub const USERS_VIEW: &'static str = "users.view";
    /// Allows listing and deciding role requests.
    pub const ROLE_REQUESTS_REVIEW: &'static str = "role_requests.review";
    /// Allows direct role assignment and removal.
    pub const ROLES_MANAGE: &'static str = "roles.manage";

    /// Validates and normalizes a permission name.
    pub fn new(value: impl AsRef<str>) -> AppResult<Self> {
        let normalized = normalize_name(
            value.as_ref(),
            "permission",
            PERMISSION_NAME_MAX_LENGTH,
            true,
        )?;
        Ok(Self(normalized))
    }

    /// Returns the permission gating user listings.
    #[must_use]
    pub fn users_view() -> Self {
        Self(Self::USERS_VIEW.to_owned())
    }

    /// Returns the permission gating role request review.
    #[must_use]
    pub fn role_requests_review() -> Self {
        Self(Self::ROLE_REQUESTS_REVIEW.to_owned())
    }

    /// Returns the normalized name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for PermissionName {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

impl FromStr for PermissionName {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::new(value)
    }
}

impl TryFrom<String> for PermissionName {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PermissionName> for String {
    fn from(value: PermissionName) -> Self {
        value.0
    }
}

fn normalize_name(
    value: &str,
    kind: &str,
    max_length: usize,
    allow_dots: bool,
) -> AppResult<String> {
    let normalized = value.trim().to_lowercase();

    if normalized.is_empty() {
        return Err(AppError::Validation(format!("{kind} name must not be empty")));
    }

    if normalized.len() > max_length {
        return Err(AppError::Validation(format!(
            "{kind} name must not exceed {max_length} characters"
        )));
    }

    let valid = normalized.chars().all(|character| {
        character.is_ascii_lowercase()
            || character.is_ascii_digit()
            || character == '_'
            || character == '-'
            || (allow_dots && character == '.')
    });
    if !valid {
        return Err(AppError::Validation(format!(
            "{kind} name '{normalized}' contains unsupported characters"
        )));
    }

    Ok(normalized)
}

/// Permission catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDefinition {
    /// Stable permission identifier.
    pub permission_id: i64,
    /// Unique permission name.
    pub name: PermissionName,
    /// Optional description.
    pub description: Option<String>,
}

/// Role catalog entry with the permissions it grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    /// Stable role identifier; ascending in creation order.
    pub role_id: i64,
    /// Unique role name.
    pub name: RoleName,
    /// Optional description.
    pub description: Option<String>,
    /// Permissions granted by the role.
    pub permissions: BTreeSet<PermissionName>,
}

/// Static set of role definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleCatalog {
    roles: Vec<RoleDefinition>,
    permissions: Vec<PermissionDefinition>,
}

impl RoleCatalog {
    /// Builds a catalog, rejecting duplicate names and dangling grants.
    pub fn new(
        mut roles: Vec<RoleDefinition>,
        mut permissions: Vec<PermissionDefinition>,
    ) -> AppResult<Self> {
        roles.sort_by_key(|role| role.role_id);
        permissions.sort_by(|left, right| left.name.cmp(&right.name));

        let mut role_names = BTreeSet::new();
        for role in &roles {
            if !role_names.insert(role.name.clone()) {
                return Err(AppError::Validation(format!(
                    "duplicate role name '{}' in catalog",
                    role.name
                )));
            }
        }

        let mut permission_names = BTreeSet::new();
        for permission in &permissions {
            if !permission_names.insert(permission.name.clone()) {
                return Err(AppError::Validation(format!(
                    "duplicate permission name '{}' in catalog",
                    permission.name
                )));
            }
        }

        for role in &roles {
            if let Some(missing) = role
                .permissions
                .iter()
                .find(|permission| !permission_names.contains(*permission))
            {
                return Err(AppError::Validation(format!(
                    "role '{}' grants unknown permission '{missing}'",
                    role.name
                )));
            }
        }

        Ok(Self { roles, permissions })
    }

    /// Returns the catalog seeded for the training platform.
    ///
    /// Mirrors the seed migration shipped with the PostgreSQL adapter.
    #[must_use]
    pub fn training_platform() -> Self {
        let permissions: Vec<PermissionDefinition> = SEEDED_PERMISSIONS
            .iter()
            .zip(1_i64..)
            .map(|((name, description), permission_id)| PermissionDefinition {
                permission_id,
                name: PermissionName((*name).to_owned()),
                description: Some((*description).to_owned()),
            })
            .collect();

        let roles = SEEDED_ROLES
            .iter()
            .zip(1_i64..)
            .map(|((name, description, grants), role_id)| RoleDefinition {
                role_id,
                name: RoleName((*name).to_owned()),
                description: Some((*description).to_owned()),
                permissions: grants
                    .iter()
                    .map(|grant| PermissionName((*grant).to_owned()))
                    .collect(),
            })
            .collect();

        Self { roles, permissions }
    }

    /// Returns roles in creation order.
    #[must_use]
    pub fn roles(&self) -> &[RoleDefinition] {
        self.roles.as_slice()
    }

    /// Returns permissions in name order.
    #[must_use]
    pub fn permissions(&self) -> &[PermissionDefinition] {
        self.permissions.as_slice()
    }

    /// Finds a role definition by name.
    #[must_use]
    pub fn find(&self, role_name: &RoleName) -> Option<&RoleDefinition> {
        self.roles.iter().find(|role| &role.name == role_name)
    }

    /// Resolves a role or fails with `RoleNotFound`.
    pub fn require(&self, role_name: &RoleName) -> AppResult<&RoleDefinition> {
        self.find(role_name)
            .ok_or_else(|| AppError::RoleNotFound(format!("role '{role_name}' does not exist")))
    }

    /// Returns the deduplicated permission union for a set of roles.
    #[must_use]
    pub fn permissions_for<'a>(
        &self,
        role_names: impl IntoIterator<Item = &'a RoleName>,
    ) -> BTreeSet<PermissionName> {
        let by_name: BTreeMap<&RoleName, &RoleDefinition> =
            self.roles.iter().map(|role| (&role.name, role)).collect();

        role_names
            .into_iter()
            .filter_map(|role_name| by_name.get(role_name))
            .flat_map(|role| role.permissions.iter().cloned())
            .collect()
    }
}

const SEEDED_PERMISSIONS: &[(&str, &str)] = &[
    ("comments.moderate", "Hide or delete comments posted by other users"),
    ("comments.post", "Post comments in the network feed"),
    ("labs.access", "Open labs and challenges"),
    ("labs.manage", "Create and edit labs and challenges"),
    ("progress.view", "View training progress of other users"),
    ("role_requests.review", "List and decide role requests"),
    ("roles.manage", "Assign and remove roles directly"),
    ("users.view", "List users together with their roles"),
];

const SEEDED_ROLES: &[(&str, &str, &[&str])] = &[
    (
        RoleName::SUPERADMIN,
        "Full platform control, including role assignment",
        &[
            "comments.moderate",
            "comments.post",
            "labs.access",
            "labs.manage",
            "progress.view",
            "role_requests.review",
            "roles.manage",
            "users.view",
        ],
    ),
    (
        RoleName::ADMIN,
        "Platform administration and role request review",
        &[
            "comments.moderate",
            "comments.post",
            "labs.access",
            "labs.manage",
            "progress.view",
            "role_requests.review",
            "users.view",
        ],
    ),
    (
        RoleName::INSTRUCTOR,
        "Authors labs and follows trainee progress",
        &["comments.post", "labs.access", "labs.manage", "progress.view"],
    ),
    (
        RoleName::USER,
        "Default trainee access",
        &["comments.post", "labs.access"],
    ),
];
