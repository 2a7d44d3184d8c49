use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Core Schemas (Mapped to Database) ---

/// User
///
/// A console account row from the `users` table. Carries the password hash, so it is
/// never serialized directly; responses go through `UserProfile`.
#[derive(Debug, Clone, FromRow, Default)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub password_hash: String,
    pub display_name: String,
    // Free-form role label shared with `role_permissions.role`.
    pub role: String,
    pub created_at: DateTime<Utc>,
}

/// Permission
///
/// One grantable capability from the `permissions` catalog.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq, Eq)]
#[ts(export)]
pub struct Permission {
    /// Stable identifier, e.g. `manage_news`.
    pub key: String,
    pub label: String,

    /// `group` is reserved in SQL, so the column is `group_name`.
    #[sqlx(rename = "group_name")]
    pub group: Option<String>,

    #[serde(rename = "order")]
    pub sort_order: i32,
}

/// RolePermission
///
/// A grant of one permission key to one role. Duplicate pairs are harmless.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq, Eq)]
#[ts(export)]
pub struct RolePermission {
    pub role: String,
    pub permission_key: String,
}

/// News
///
/// A row from the `news` table.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct News {
    pub id: i32,
    #[serde(rename = "order")]
    pub sort_order: i32,
    pub title: String,
    pub content: String,
    // "draft" | "published"
    pub status: String,
    // "news" | "activity" | "announcement"
    pub category: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[ts(type = "string | null")]
    pub published_at: Option<DateTime<Utc>>,
}

// --- Internal Write Models ---

/// NewUser
///
/// Insert payload for the user store. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub display_name: String,
    pub role: String,
}

// --- Request Payloads (Input Schemas) ---

/// CreatePermissionRequest
///
/// Input for POST /admin/permissions. Also the insert payload of the catalog store.
/// When `order` is omitted the permission is appended after the current last entry.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreatePermissionRequest {
    #[schema(example = "manage_news")]
    pub key: String,
    #[schema(example = "Manage news")]
    pub label: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default, rename = "order")]
    pub sort_order: Option<i32>,
}

/// ReplaceRolePermissionsRequest
///
/// Full replacement set for PUT /admin/roles/{role}. Not a patch: keys missing from
/// `permissions` are revoked.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ReplaceRolePermissionsRequest {
    pub permissions: Vec<String>,
}

/// CreateRoleRequest
///
/// Input for POST /admin/roles. An empty `permissions` list is allowed; the role is
/// then created with the baseline permission only.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateRoleRequest {
    #[schema(example = "intern")]
    pub role: String,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// CreateUserRequest
///
/// Input for POST /admin/users. `display_name` falls back to the username and `role`
/// falls back to `viewer`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// UpdateUserRoleRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateUserRoleRequest {
    pub role: String,
}

/// CreateNewsRequest
///
/// Input for POST /news. `category` defaults to `news`, `status` to `draft`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateNewsRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "order")]
    pub sort_order: Option<i32>,
}

/// UpdateNewsRequest
///
/// Partial update payload for PUT /news/{id}. Only provided fields are written.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateNewsRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none", rename = "order")]
    pub sort_order: Option<i32>,
}

// --- Response Schemas (Output) ---

/// UserProfile
///
/// Public view of a `User` without the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UserProfile {
    pub id: i32,
    pub username: String,
    pub display_name: String,
    pub role: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

/// MeResponse
///
/// Output of GET /auth/me: the caller's profile plus their effective permission keys.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct MeResponse {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub permissions: Vec<String>,
}

/// RolePermissionsResponse
///
/// A role together with a list of permission keys.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq, Eq)]
#[ts(export)]
pub struct RolePermissionsResponse {
    pub role: String,
    pub permissions: Vec<String>,
}

/// RoleSummary
///
/// One entry of GET /admin/roles. `in_use` is true while any user holds the role.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq, Eq)]
#[ts(export)]
pub struct RoleSummary {
    pub role: String,
    pub permissions: Vec<String>,
    pub in_use: bool,
}

/// SeedPermissionsResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SeedPermissionsResponse {
    /// Number of catalog entries created.
    pub permissions: usize,
    /// Roles that received default grants.
    pub roles: Vec<String>,
}
