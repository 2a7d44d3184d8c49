/// Router Module Index
///
/// Organizes routing into modules by how much identity a caller needs. Whether a
/// caller must be authenticated is decided here, by which router a path lives in
/// and the layers `create_router` applies to it. Which permission a caller needs is
/// decided inside each handler, from its effective permission set.

/// Routes accessible to all clients (anonymous, read-only apart from bootstrap).
pub mod public;

/// Routes wrapped in the `AuthUser` middleware. Requires a valid identity; handlers
/// may additionally require a permission such as `manage_news`.
pub mod authenticated;

/// Routes nested under `/admin`, authenticated, and gated per handler by
/// `manage_roles` or `manage_users`.
pub mod admin;
