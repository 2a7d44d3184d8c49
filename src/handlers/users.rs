use crate::{
    AppState,
    auth::AuthUser,
    authz::{ADMIN_ROLE, DEFAULT_USER_ROLE, Role},
    handlers::MANAGE_USERS,
    models::{CreateUserRequest, MeResponse, NewUser, UpdateUserRoleRequest, UserProfile},
    password::hash_password,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

/// Username of the account created by `seed_admin`.
const SEED_ADMIN_USERNAME: &str = "admin";

/// get_me
///
/// [Authenticated Route] The caller's profile with their effective permission keys.
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Profile", body = MeResponse),
        (status = 404, description = "Account no longer exists")
    )
)]
pub async fn get_me(
    AuthUser { id, role, .. }: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<MeResponse>, StatusCode> {
    let user = state.repo.get_user(id).await?.ok_or(StatusCode::NOT_FOUND)?;
    let permissions = state.authorizer().resolve_permissions(&role).await?;
    Ok(Json(MeResponse {
        profile: user.into(),
        permissions: permissions.into_iter().collect(),
    }))
}

/// seed_admin
///
/// [Public Route] Creates the first administrator account. Works only while the
/// user table is empty; afterwards it is refused with 403.
#[utoipa::path(
    post,
    path = "/auth/seed",
    responses(
        (status = 201, description = "Admin created", body = UserProfile),
        (status = 403, description = "Users already exist")
    )
)]
pub async fn seed_admin(State(state): State<AppState>) -> Result<(StatusCode, Json<UserProfile>), StatusCode> {
    if state.repo.count_users().await? > 0 {
        return Err(StatusCode::FORBIDDEN);
    }

    let password_hash = hash_password(&state.config.seed_admin_password)?;
    let created = state
        .repo
        .create_user(NewUser {
            username: SEED_ADMIN_USERNAME.to_string(),
            password_hash,
            display_name: "Administrator".to_string(),
            role: ADMIN_ROLE.to_string(),
        })
        .await?
        // Lost a race against another seed call.
        .ok_or(StatusCode::FORBIDDEN)?;

    tracing::warn!(user_id = created.id, "seeded initial admin account; change its password");
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// list_users
///
/// [Admin Route] Every account, without password hashes.
#[utoipa::path(
    get,
    path = "/admin/users",
    responses((status = 200, description = "Users", body = [UserProfile]))
)]
pub async fn list_users(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<UserProfile>>, StatusCode> {
    user.require_any(&state.authorizer(), &[MANAGE_USERS]).await?;
    let users = state.repo.list_users().await?;
    Ok(Json(users.into_iter().map(UserProfile::from).collect()))
}

/// create_user
///
/// [Admin Route] Creates an account. The role defaults to `viewer` and must
/// already exist (admin, a role with grants, or a role some user holds).
#[utoipa::path(
    post,
    path = "/admin/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Created", body = UserProfile),
        (status = 400, description = "Missing fields or unknown role"),
        (status = 409, description = "Username taken")
    )
)]
pub async fn create_user(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserProfile>), StatusCode> {
    let authorizer = state.authorizer();
    user.require_any(&authorizer, &[MANAGE_USERS]).await?;

    let username = payload.username.trim().to_string();
    if username.is_empty() || payload.password.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let role = Role::parse(payload.role.unwrap_or_else(|| DEFAULT_USER_ROLE.to_string()))?;
    if !authorizer.role_exists(&role).await? {
        return Err(StatusCode::BAD_REQUEST);
    }

    let display_name = payload
        .display_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| username.clone());

    let new_user = NewUser {
        username,
        password_hash: hash_password(&payload.password)?,
        display_name,
        role: role.into(),
    };

    match state.repo.create_user(new_user).await? {
        Some(created) => {
            tracing::info!(user_id = created.id, role = %created.role, "user created");
            Ok((StatusCode::CREATED, Json(created.into())))
        }
        None => Err(StatusCode::CONFLICT),
    }
}

/// update_user_role
///
/// [Admin Route] Moves a user to another existing role.
#[utoipa::path(
    put,
    path = "/admin/users/{id}/role",
    params(("id" = i32, Path, description = "User ID")),
    request_body = UpdateUserRoleRequest,
    responses(
        (status = 200, description = "Updated", body = UserProfile),
        (status = 400, description = "Unknown role"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_user_role(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateUserRoleRequest>,
) -> Result<Json<UserProfile>, StatusCode> {
    let authorizer = state.authorizer();
    user.require_any(&authorizer, &[MANAGE_USERS]).await?;

    let role = Role::parse(payload.role)?;
    if !authorizer.role_exists(&role).await? {
        return Err(StatusCode::BAD_REQUEST);
    }

    match state.repo.update_user_role(id, role.as_str()).await? {
        Some(updated) => Ok(Json(updated.into())),
        None => Err(StatusCode::NOT_FOUND),
    }
}

/// delete_user
///
/// [Admin Route] Deletes an account. Deleting your own account is refused.
#[utoipa::path(
    delete,
    path = "/admin/users/{id}",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Cannot delete yourself"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_user(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<StatusCode, StatusCode> {
    user.require_any(&state.authorizer(), &[MANAGE_USERS]).await?;

    if id == user.id {
        return Err(StatusCode::BAD_REQUEST);
    }

    if state.repo.delete_user(id).await? {
        tracing::info!(user_id = id, deleted_by = user.id, "user deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}
