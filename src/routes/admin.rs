use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// Admin Router Module
///
/// Defines the role, permission and user administration endpoints, nested under
/// `/admin`. These are the only routes that can change who may do what.
///
/// Access Control:
/// The router is wrapped in the `auth_middleware` route layer, so every request is
/// authenticated before routing. Each handler then resolves the caller's effective
/// permissions and requires `manage_roles` (catalog and role endpoints) or
/// `manage_users` (user endpoints). The admin role holds both implicitly and can
/// never be locked out by a grant change. A denial is a bare 403.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // --- Permission Catalog (manage_roles) ---
        // GET /admin/permissions
        // The full catalog in display order. This is also admin's effective set.
        // POST /admin/permissions
        // Adds a catalog entry. A duplicate key is 409; a missing order appends.
        .route(
            "/permissions",
            get(handlers::permissions::list_permissions).post(handlers::permissions::create_permission),
        )
        // POST /admin/permissions/seed
        // Writes the default catalog and the default editor/web_editor/viewer grants
        // in one transaction. Only allowed while the catalog is empty (409 otherwise).
        .route("/permissions/seed", post(handlers::permissions::seed_permissions))
        // DELETE /admin/permissions/{key}
        // Removes the key from every role first, then from the catalog.
        .route("/permissions/{key}", delete(handlers::permissions::delete_permission))
        // --- Roles (manage_roles) ---
        // GET /admin/roles
        // Every known role (admin, grant-row roles, user roles) with its effective set.
        // POST /admin/roles
        // Creates a role. An empty set gets the `view_dashboard` baseline; an existing
        // label, including one racing in concurrently, is 409.
        .route(
            "/roles",
            get(handlers::roles::list_roles).post(handlers::roles::create_role),
        )
        // GET/PUT/DELETE /admin/roles/{role}
        // Reads or set-replaces a role's grants, or deletes the role. Admin cannot be
        // replaced or deleted, and a role still held by a user cannot be deleted (403).
        .route(
            "/roles/{role}",
            get(handlers::roles::get_role_permissions)
                .put(handlers::roles::replace_role_permissions)
                .delete(handlers::roles::delete_role),
        )
        // --- Users (manage_users) ---
        // GET /admin/users
        // All accounts, without password hashes.
        // POST /admin/users
        // Creates an account with an Argon2 hash. The target role must already exist.
        .route(
            "/users",
            get(handlers::users::list_users).post(handlers::users::create_user),
        )
        // DELETE /admin/users/{id}
        // Removes an account. Callers cannot delete themselves (400).
        .route("/users/{id}", delete(handlers::users::delete_user))
        // PUT /admin/users/{id}/role
        // Moves a user to another existing role. Takes effect on the user's next request.
        .route("/users/{id}/role", put(handlers::users::update_user_role))
}
