use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod authz;
pub mod config;
pub mod error;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod password;
pub mod repository;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use auth::AuthUser; // The resolved, store-backed caller identity.
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

// Core state and resolver types used by main.rs and the integration tests.

pub use authz::{Authorizer, Role};
pub use config::AppConfig;
pub use memory::MemoryRepository;
pub use repository::{PostgresRepository, RepositoryState};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and `ToSchema` model into the OpenAPI
/// document served at `/api-docs/openapi.json` and browsed through `/swagger-ui`.
/// A handler missing from `paths` still routes but is invisible in the docs, so new
/// handlers are listed here too.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::users::seed_admin, handlers::users::get_me, handlers::users::list_users,
        handlers::users::create_user, handlers::users::update_user_role, handlers::users::delete_user,
        handlers::permissions::list_permissions, handlers::permissions::create_permission,
        handlers::permissions::delete_permission, handlers::permissions::seed_permissions,
        handlers::permissions::my_permissions,
        handlers::roles::list_roles, handlers::roles::get_role_permissions,
        handlers::roles::replace_role_permissions, handlers::roles::create_role, handlers::roles::delete_role,
        handlers::news::list_news, handlers::news::get_news, handlers::news::create_news,
        handlers::news::update_news, handlers::news::delete_news
    ),
    components(
        schemas(
            models::Permission, models::CreatePermissionRequest, models::SeedPermissionsResponse,
            models::ReplaceRolePermissionsRequest, models::CreateRoleRequest, models::RolePermissionsResponse,
            models::RoleSummary, models::UserProfile, models::MeResponse, models::CreateUserRequest,
            models::UpdateUserRoleRequest, models::News, models::CreateNewsRequest, models::UpdateNewsRequest,
        )
    ),
    tags(
        (name = "council-cms", description = "Council CMS role and permission API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container handed to every handler. Cloning it clones two
/// handles, never data. It holds no permission cache: every
/// authorization decision reads the stores, so a grant change or a role change is
/// visible on the very next request.
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: users, permission catalog, role grants and news behind one
    /// trait object (`PostgresRepository` in production, `MemoryRepository` in tests).
    pub repo: RepositoryState,
    /// Configuration: the loaded, immutable environment configuration.
    pub config: AppConfig,
}

impl AppState {
    /// The permission resolver over this state's repository. Constructing one is a
    /// pointer clone, so handlers build it per request.
    pub fn authorizer(&self) -> Authorizer {
        Authorizer::new(self.repo.clone())
    }
}

// --- Axum FromRef Extractor Implementations ---

// Let extractors such as `AuthUser` pull just the component they need from AppState.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Enforces authentication for the authenticated and admin routers.
///
/// *Mechanism*: extracting `AuthUser` validates the bearer token (or the local
/// `x-user-id` bypass) and loads the user from the store. Any failure rejects the
/// request with 401 before routing reaches a handler. Permission checks are not done
/// here; each handler states the permissions it needs via `AuthUser::require_any`.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the public, authenticated and admin routers, applies the auth layer to the
/// protected ones, and wraps everything in the request-id, tracing and CORS layers.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name for request correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        // Documentation: the generated Swagger UI and OpenAPI JSON.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: no middleware.
        .merge(public::public_routes())
        // Authenticated Routes: `auth_middleware` as a route layer, so it only runs for
        // requests that matched one of these routes. News mutations then check
        // `manage_news` in the handler.
        .merge(
            authenticated::authenticated_routes()
                .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        // Admin Routes: nested under '/admin' behind the same authentication layer.
        // Each handler then requires `manage_roles` or `manage_users`.
        .nest(
            "/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        .with_state(state);

    // 3. Observability and Correlation Layers (outermost)
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. A fresh UUID per request, unless the client already sent one.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. One tracing span per request carrying that id, plus a response
                // log line with status and latency.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Echo the id back to the client in the response headers.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: method, URI and the `x-request-id` set above, so
/// every log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
