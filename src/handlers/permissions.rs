use crate::{
    AppState,
    auth::AuthUser,
    handlers::MANAGE_ROLES,
    models::{CreatePermissionRequest, Permission, SeedPermissionsResponse},
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

/// list_permissions
///
/// [Admin Route] The full permission catalog in display order.
#[utoipa::path(
    get,
    path = "/admin/permissions",
    responses(
        (status = 200, description = "Permission catalog", body = [Permission]),
        (status = 403, description = "Missing manage_roles")
    )
)]
pub async fn list_permissions(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Permission>>, StatusCode> {
    user.require_any(&state.authorizer(), &[MANAGE_ROLES]).await?;
    Ok(Json(state.repo.list_all().await?))
}

/// create_permission
///
/// [Admin Route] Adds a permission to the catalog. Admin gains it immediately,
/// since admin's set is computed from the catalog; no grant rows are written.
#[utoipa::path(
    post,
    path = "/admin/permissions",
    request_body = CreatePermissionRequest,
    responses(
        (status = 201, description = "Created", body = Permission),
        (status = 400, description = "Missing key or label"),
        (status = 409, description = "Key already exists")
    )
)]
pub async fn create_permission(
    user: AuthUser,
    State(state): State<AppState>,
    Json(mut payload): Json<CreatePermissionRequest>,
) -> Result<(StatusCode, Json<Permission>), StatusCode> {
    user.require_any(&state.authorizer(), &[MANAGE_ROLES]).await?;

    payload.key = payload.key.trim().to_string();
    payload.label = payload.label.trim().to_string();
    if payload.key.is_empty() || payload.label.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    match state.repo.create(payload).await? {
        Some(permission) => {
            tracing::info!(permission = %permission.key, "permission created");
            Ok((StatusCode::CREATED, Json(permission)))
        }
        None => Err(StatusCode::CONFLICT),
    }
}

/// delete_permission
///
/// [Admin Route] Revokes the key from every role, then removes it from the catalog.
#[utoipa::path(
    delete,
    path = "/admin/permissions/{key}",
    params(("key" = String, Path, description = "Permission key")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_permission(
    user: AuthUser,
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let authorizer = state.authorizer();
    user.require_any(&authorizer, &[MANAGE_ROLES]).await?;

    if authorizer.delete_permission(&key).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

/// seed_permissions
///
/// [Admin Route] Writes the default catalog and default role grants. Only allowed
/// while the catalog is empty.
#[utoipa::path(
    post,
    path = "/admin/permissions/seed",
    responses(
        (status = 200, description = "Seeded", body = SeedPermissionsResponse),
        (status = 409, description = "Catalog already populated")
    )
)]
pub async fn seed_permissions(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<SeedPermissionsResponse>, StatusCode> {
    let authorizer = state.authorizer();
    user.require_any(&authorizer, &[MANAGE_ROLES]).await?;

    let (permissions, roles) = authorizer.seed_defaults().await?;
    Ok(Json(SeedPermissionsResponse { permissions, roles }))
}

/// my_permissions
///
/// [Authenticated Route] The caller's effective permission keys.
#[utoipa::path(
    get,
    path = "/permissions/my",
    responses((status = 200, description = "Effective permission keys", body = [String]))
)]
pub async fn my_permissions(
    AuthUser { role, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, StatusCode> {
    let keys = state.authorizer().resolve_permissions(&role).await?;
    Ok(Json(keys.into_iter().collect()))
}
