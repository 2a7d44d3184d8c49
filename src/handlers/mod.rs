//! HTTP handlers, grouped by resource.
//!
//! Protected handlers take an `AuthUser` and gate themselves with
//! `AuthUser::require_any` before touching the stores.

pub mod news;
pub mod permissions;
pub mod roles;
pub mod users;

/// Required to read or change the permission catalog and role grants.
pub const MANAGE_ROLES: &str = "manage_roles";
/// Required for user administration.
pub const MANAGE_USERS: &str = "manage_users";
/// Required to create, edit or delete news.
pub const MANAGE_NEWS: &str = "manage_news";
