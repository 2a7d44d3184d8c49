use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Defines the routes available to any signed-in user: their own profile and
/// permission report, plus the news mutations.
///
/// Access Control Strategy:
/// The `auth_middleware` route layer above this module runs the `AuthUser`
/// extractor, so unauthenticated requests are answered with 401 before routing.
/// Handlers receive the validated user and its role. Anything beyond "is signed in"
/// is a permission check inside the handler, resolved fresh from the store on every
/// request so grant changes apply immediately.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /auth/me
        // The caller's profile merged with its effective permission keys.
        .route("/auth/me", get(handlers::users::get_me))
        // GET /permissions/my
        // The caller's effective permission keys only. Admin gets the whole catalog.
        // Drives which sections the dashboard shows.
        .route("/permissions/my", get(handlers::permissions::my_permissions))
        // --- News Management (manage_news) ---
        // POST /news
        // Creates a news item. Items created as `published` are stamped immediately.
        .route("/news", post(handlers::news::create_news))
        // PUT/DELETE /news/{id}
        // Partial update or removal. `published_at` is set the first time the item is
        // published and never moved afterwards.
        .route(
            "/news/{id}",
            put(handlers::news::update_news).delete(handlers::news::delete_news),
        )
}
