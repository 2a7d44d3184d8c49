//! Role and permission resolution.
//!
//! A role's effective permission set is computed at query time and never cached:
//! `admin` resolves to the whole catalog, every other role to its grant rows.
//! Authorization checks use OR semantics (`AnyOf`): holding any one listed key is
//! enough.

use crate::{
    error::{RoleError, RoleNameError, StoreError},
    models::{CreatePermissionRequest, RoleSummary},
    repository::RepositoryState,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};

/// The distinguished role that implicitly holds every catalog permission.
pub const ADMIN_ROLE: &str = "admin";

/// Granted to a role created with an empty permission set, so the new role has at
/// least one row and therefore observably exists.
pub const BASELINE_PERMISSION: &str = "view_dashboard";

/// Role assigned to new users when the request names none.
pub const DEFAULT_USER_ROLE: &str = "viewer";

const MAX_ROLE_LEN: usize = 64;

/// Role
///
/// A validated role label. Comparison is exact and case-sensitive. Whether a role
/// "exists" is not a property of the value: see `Authorizer::role_exists`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Role(String);

impl Role {
    pub fn parse(raw: impl Into<String>) -> Result<Self, RoleNameError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(RoleNameError::Empty);
        }
        if raw.chars().count() > MAX_ROLE_LEN {
            return Err(RoleNameError::TooLong { max: MAX_ROLE_LEN });
        }
        if !raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(RoleNameError::InvalidCharacter);
        }
        Ok(Self(raw))
    }

    pub fn admin() -> Self {
        Self(ADMIN_ROLE.to_string())
    }

    pub fn is_admin(&self) -> bool {
        self.0 == ADMIN_ROLE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Role {
    type Error = RoleNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Role::parse(value)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// AnyOf
///
/// OR-semantics requirement: satisfied when the caller holds at least one of the
/// listed keys. An empty requirement is never satisfied by a non-admin role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnyOf(BTreeSet<String>);

impl AnyOf {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(keys.into_iter().map(Into::into).collect())
    }

    pub fn keys(&self) -> &BTreeSet<String> {
        &self.0
    }

    /// True iff `held` and the requirement intersect.
    pub fn is_satisfied_by(&self, held: &BTreeSet<String>) -> bool {
        self.0.iter().any(|key| held.contains(key))
    }
}

/// Admin's effective set: every key in the catalog snapshot.
fn all_keys(catalog: &[crate::models::Permission]) -> BTreeSet<String> {
    catalog.iter().map(|p| p.key.clone()).collect()
}

/// Authorizer
///
/// The authorization resolver. Holds only a handle to the stores; every call reads
/// current state, so catalog and grant changes are visible to the very next call.
#[derive(Clone)]
pub struct Authorizer {
    repo: RepositoryState,
}

impl Authorizer {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    // --- Resolution ---

    /// resolve_permissions
    ///
    /// The effective permission set of `role`. Admin reads the catalog; any other
    /// role reads its grant rows with one lookup. An unknown role yields the empty
    /// set. Grant rows whose key is missing from the catalog are returned as stored.
    pub async fn resolve_permissions(&self, role: &Role) -> Result<BTreeSet<String>, StoreError> {
        if role.is_admin() {
            let catalog = self.repo.list_all().await?;
            return Ok(all_keys(&catalog));
        }
        let keys = self.repo.list_for_role(role.as_str()).await?;
        Ok(keys.into_iter().collect())
    }

    /// authorize
    ///
    /// OR-semantics check. Admin passes without any store access. Denial is `false`,
    /// never an error; only store failures are errors.
    pub async fn authorize(&self, role: &Role, required: &AnyOf) -> Result<bool, StoreError> {
        if role.is_admin() {
            return Ok(true);
        }
        let held = self.resolve_permissions(role).await?;
        Ok(required.is_satisfied_by(&held))
    }

    // --- Derived role existence ---

    /// A role exists iff it is admin, any user holds it, or any grant row names it.
    pub async fn role_exists(&self, role: &Role) -> Result<bool, StoreError> {
        if role.is_admin() {
            return Ok(true);
        }
        if self.repo.exists_with_role(role.as_str()).await? {
            return Ok(true);
        }
        Ok(!self.repo.list_for_role(role.as_str()).await?.is_empty())
    }

    /// list_roles
    ///
    /// Every known role (admin ∪ grant-row roles ∪ user roles) with its effective
    /// permissions. Stored labels that fail `Role` validation are skipped.
    pub async fn list_roles(&self) -> Result<Vec<RoleSummary>, StoreError> {
        let mut names: BTreeSet<String> = self.repo.list_roles().await?.into_iter().collect();
        names.extend(self.repo.list_user_roles().await?);
        names.insert(ADMIN_ROLE.to_string());

        let mut summaries = Vec::with_capacity(names.len());
        for name in names {
            let Ok(role) = Role::parse(name.as_str()) else {
                tracing::warn!(role = %name, "skipping stored role with an invalid label");
                continue;
            };
            let permissions = self.resolve_permissions(&role).await?.into_iter().collect();
            let in_use = self.repo.exists_with_role(role.as_str()).await?;
            summaries.push(RoleSummary { role: name, permissions, in_use });
        }
        Ok(summaries)
    }

    // --- Role lifecycle ---

    /// replace_role_permissions
    ///
    /// Set-replace of the role's grants. Every key must exist in the catalog. Admin's
    /// set is implicit and cannot be replaced.
    pub async fn replace_role_permissions(
        &self,
        role: &Role,
        keys: impl IntoIterator<Item = String>,
    ) -> Result<BTreeSet<String>, RoleError> {
        if role.is_admin() {
            return Err(RoleError::AdminProtected);
        }
        let keys: BTreeSet<String> = keys.into_iter().collect();
        self.ensure_known(&keys).await?;
        self.repo.replace_for_role(role.as_str(), &keys).await?;
        tracing::info!(role = %role, count = keys.len(), "role permissions replaced");
        Ok(keys)
    }

    /// create_role
    ///
    /// Defines a new role by writing its initial grants. An empty request seeds
    /// `BASELINE_PERMISSION`, which is exempt from the catalog check. The existence
    /// check and the write happen in one store call, so of two concurrent creates of
    /// the same label exactly one succeeds.
    pub async fn create_role(
        &self,
        role: &Role,
        keys: impl IntoIterator<Item = String>,
    ) -> Result<BTreeSet<String>, RoleError> {
        if role.is_admin() {
            return Err(RoleError::AlreadyExists(role.to_string()));
        }
        let mut keys: BTreeSet<String> = keys.into_iter().collect();
        if keys.is_empty() {
            keys.insert(BASELINE_PERMISSION.to_string());
        } else {
            self.ensure_known(&keys).await?;
        }
        if !self.repo.create_role_if_absent(role.as_str(), &keys).await? {
            return Err(RoleError::AlreadyExists(role.to_string()));
        }
        tracing::info!(role = %role, count = keys.len(), "role created");
        Ok(keys)
    }

    /// delete_role
    ///
    /// Refused for admin and for any role still held by a user. Returns the number of
    /// grant rows removed; zero means the role had no rows.
    pub async fn delete_role(&self, role: &Role) -> Result<u64, RoleError> {
        if role.is_admin() {
            return Err(RoleError::AdminProtected);
        }
        let Some(removed) = self.repo.delete_role_if_unused(role.as_str()).await? else {
            return Err(RoleError::InUse(role.to_string()));
        };
        tracing::info!(role = %role, removed, "role deleted");
        Ok(removed)
    }

    /// delete_permission
    ///
    /// Removes the key from every role, then from the catalog. Returns false when the
    /// key was not in the catalog.
    pub async fn delete_permission(&self, key: &str) -> Result<bool, StoreError> {
        let deleted = self.repo.delete(key).await?;
        if deleted {
            tracing::info!(permission = key, "permission deleted");
        }
        Ok(deleted)
    }

    /// seed_defaults
    ///
    /// Populates an empty catalog with `default_permissions()` and writes the default
    /// role grants, all in one store call. Refused once the catalog has any entry. A
    /// failed seed writes nothing and can simply be retried.
    pub async fn seed_defaults(&self) -> Result<(usize, Vec<String>), RoleError> {
        let grants: Vec<(String, BTreeSet<String>)> = default_role_grants()
            .into_iter()
            .map(|(role, keys)| (role.to_string(), keys.into_iter().map(str::to_string).collect()))
            .collect();

        let inserted = self
            .repo
            .seed_catalog(default_permissions(), &grants)
            .await?
            .ok_or(RoleError::CatalogNotEmpty)?;

        let roles: Vec<String> = grants.into_iter().map(|(role, _)| role).collect();
        tracing::info!(permissions = inserted, roles = ?roles, "permission catalog seeded");
        Ok((inserted, roles))
    }

    async fn ensure_known(&self, keys: &BTreeSet<String>) -> Result<(), RoleError> {
        let mut unknown = Vec::new();
        for key in keys {
            if !self.repo.exists(key).await? {
                unknown.push(key.clone());
            }
        }
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(RoleError::UnknownPermissions(unknown))
        }
    }
}

const WEBSITE_KEYS: [&str; 7] = [
    "manage_home",
    "manage_news",
    "manage_council",
    "manage_history",
    "manage_agency",
    "manage_law",
    "manage_web_settings",
];

/// The catalog written by `seed_defaults`, in display order.
pub fn default_permissions() -> Vec<CreatePermissionRequest> {
    let entries: [(&str, &str, &str); 11] = [
        ("manage_home", "Manage home page", "website"),
        ("manage_news", "Manage news", "website"),
        ("manage_council", "Manage council members", "website"),
        ("manage_history", "Manage council history", "website"),
        ("manage_agency", "Manage agencies", "website"),
        ("manage_law", "Manage laws", "website"),
        ("manage_web_settings", "Manage web settings", "website"),
        ("manage_register", "Manage registry", "system"),
        ("view_dashboard", "View dashboard", "system"),
        ("manage_users", "Manage users", "system"),
        ("manage_roles", "Manage roles and permissions", "system"),
    ];
    entries
        .iter()
        .enumerate()
        .map(|(i, (key, label, group))| CreatePermissionRequest {
            key: key.to_string(),
            label: label.to_string(),
            group: Some(group.to_string()),
            sort_order: Some(i as i32 + 1),
        })
        .collect()
}

/// Default grants written by `seed_defaults`. Admin is absent on purpose: its set
/// is computed from the catalog.
pub fn default_role_grants() -> Vec<(&'static str, Vec<&'static str>)> {
    let editor: Vec<&str> = WEBSITE_KEYS.iter().copied().chain([BASELINE_PERMISSION]).collect();
    vec![
        ("editor", editor.clone()),
        ("web_editor", editor),
        ("viewer", vec![BASELINE_PERMISSION]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parse_accepts_plain_labels() {
        assert_eq!(Role::parse("web_editor").unwrap().as_str(), "web_editor");
        assert_eq!(Role::parse("Editor-2").unwrap().as_str(), "Editor-2");
    }

    #[test]
    fn role_parse_rejects_bad_labels() {
        assert_eq!(Role::parse(""), Err(RoleNameError::Empty));
        assert_eq!(Role::parse("has space"), Err(RoleNameError::InvalidCharacter));
        assert_eq!(
            Role::parse("x".repeat(MAX_ROLE_LEN + 1)),
            Err(RoleNameError::TooLong { max: MAX_ROLE_LEN })
        );
    }

    #[test]
    fn admin_is_case_sensitive() {
        assert!(Role::admin().is_admin());
        assert!(!Role::parse("Admin").unwrap().is_admin());
    }

    #[test]
    fn role_deserializes_through_validation() {
        let ok: Role = serde_json::from_str(r#""editor""#).unwrap();
        assert_eq!(ok.as_str(), "editor");
        assert!(serde_json::from_str::<Role>(r#""bad role""#).is_err());
    }

    #[test]
    fn any_of_uses_or_semantics() {
        let held: BTreeSet<String> = ["a".to_string()].into_iter().collect();
        assert!(AnyOf::new(["a", "b"]).is_satisfied_by(&held));
        assert!(!AnyOf::new(["b"]).is_satisfied_by(&held));
        assert!(!AnyOf::new(Vec::<String>::new()).is_satisfied_by(&held));
    }

    #[test]
    fn default_grants_only_reference_default_catalog() {
        let catalog: BTreeSet<String> = default_permissions().into_iter().map(|p| p.key).collect();
        assert!(catalog.contains(BASELINE_PERMISSION));
        for (role, keys) in default_role_grants() {
            assert_ne!(role, ADMIN_ROLE);
            for key in keys {
                assert!(catalog.contains(key), "{role} grants unknown key {key}");
            }
        }
    }
}
