use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Defines endpoints that are **unauthenticated** and accessible to any client:
/// health, first-run bootstrap, and reading news.
///
/// Security Mandate:
/// Nothing here may read or change roles, grants or accounts, with one exception:
/// `/auth/seed`, which only works while the users table is empty.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for the load balancer. Never touches the database.
        .route("/health", get(|| async { "ok" }))
        // POST /auth/seed
        // Bootstraps the first admin account with the configured seed password.
        // Refused with 403 once any user exists, so it cannot be replayed.
        .route("/auth/seed", post(handlers::users::seed_admin))
        // GET /news?category=...&status=...
        // Lists news items in display order, optionally filtered by exact match.
        .route("/news", get(handlers::news::list_news))
        // GET /news/{id}
        .route("/news/{id}", get(handlers::news::get_news))
}
