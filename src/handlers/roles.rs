use crate::{
    AppState,
    auth::AuthUser,
    authz::Role,
    handlers::MANAGE_ROLES,
    models::{CreateRoleRequest, ReplaceRolePermissionsRequest, RolePermissionsResponse, RoleSummary},
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

/// list_roles
///
/// [Admin Route] Every role that exists: admin, roles with grant rows, and roles
/// held by users.
#[utoipa::path(
    get,
    path = "/admin/roles",
    responses((status = 200, description = "Known roles", body = [RoleSummary]))
)]
pub async fn list_roles(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<RoleSummary>>, StatusCode> {
    let authorizer = state.authorizer();
    user.require_any(&authorizer, &[MANAGE_ROLES]).await?;
    Ok(Json(authorizer.list_roles().await?))
}

/// get_role_permissions
///
/// [Admin Route] Effective permissions of one role. Unknown roles return an
/// empty list rather than 404.
#[utoipa::path(
    get,
    path = "/admin/roles/{role}",
    params(("role" = String, Path, description = "Role label")),
    responses(
        (status = 200, description = "Role permissions", body = RolePermissionsResponse),
        (status = 400, description = "Invalid role label")
    )
)]
pub async fn get_role_permissions(
    user: AuthUser,
    State(state): State<AppState>,
    Path(role): Path<String>,
) -> Result<Json<RolePermissionsResponse>, StatusCode> {
    let authorizer = state.authorizer();
    user.require_any(&authorizer, &[MANAGE_ROLES]).await?;

    let role = Role::parse(role)?;
    let permissions = authorizer.resolve_permissions(&role).await?;
    Ok(Json(RolePermissionsResponse {
        role: role.into(),
        permissions: permissions.into_iter().collect(),
    }))
}

/// replace_role_permissions
///
/// [Admin Route] Replaces the role's entire permission set with the body's list.
#[utoipa::path(
    put,
    path = "/admin/roles/{role}",
    params(("role" = String, Path, description = "Role label")),
    request_body = ReplaceRolePermissionsRequest,
    responses(
        (status = 200, description = "Replaced", body = RolePermissionsResponse),
        (status = 400, description = "Invalid role label or unknown permission key"),
        (status = 403, description = "Admin permissions are implicit")
    )
)]
pub async fn replace_role_permissions(
    user: AuthUser,
    State(state): State<AppState>,
    Path(role): Path<String>,
    Json(payload): Json<ReplaceRolePermissionsRequest>,
) -> Result<Json<RolePermissionsResponse>, StatusCode> {
    let authorizer = state.authorizer();
    user.require_any(&authorizer, &[MANAGE_ROLES]).await?;

    let role = Role::parse(role)?;
    let keys = authorizer
        .replace_role_permissions(&role, payload.permissions)
        .await?;
    Ok(Json(RolePermissionsResponse {
        role: role.into(),
        permissions: keys.into_iter().collect(),
    }))
}

/// create_role
///
/// [Admin Route] Defines a new role. With an empty permission list the role is
/// created holding the baseline permission.
#[utoipa::path(
    post,
    path = "/admin/roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Created", body = RolePermissionsResponse),
        (status = 400, description = "Invalid role label or unknown permission key"),
        (status = 409, description = "Role already exists")
    )
)]
pub async fn create_role(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateRoleRequest>,
) -> Result<(StatusCode, Json<RolePermissionsResponse>), StatusCode> {
    let authorizer = state.authorizer();
    user.require_any(&authorizer, &[MANAGE_ROLES]).await?;

    let role = Role::parse(payload.role)?;
    let keys = authorizer.create_role(&role, payload.permissions).await?;
    Ok((
        StatusCode::CREATED,
        Json(RolePermissionsResponse {
            role: role.into(),
            permissions: keys.into_iter().collect(),
        }),
    ))
}

/// delete_role
///
/// [Admin Route] Deletes every grant row of the role.
///
/// *Guards*: `admin` can never be deleted, and a role cannot be deleted while any
/// user still holds it (403 in both cases). A role with no rows is 404.
#[utoipa::path(
    delete,
    path = "/admin/roles/{role}",
    params(("role" = String, Path, description = "Role label")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Admin role or role still in use"),
        (status = 404, description = "Role has no permission rows")
    )
)]
pub async fn delete_role(
    user: AuthUser,
    State(state): State<AppState>,
    Path(role): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let authorizer = state.authorizer();
    user.require_any(&authorizer, &[MANAGE_ROLES]).await?;

    let role = Role::parse(role)?;
    match authorizer.delete_role(&role).await? {
        0 => Err(StatusCode::NOT_FOUND),
        _ => Ok(StatusCode::NO_CONTENT),
    }
}
