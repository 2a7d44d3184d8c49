use axum::http::StatusCode;
use thiserror::Error;

/// StoreError
///
/// Failures raised by the persistence layer. These are propagated unchanged to
/// callers; nothing in the crate retries or suppresses them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// PasswordError
///
/// Argon2 rejected the input or its parameters while hashing a password.
#[derive(Debug, Error)]
#[error("password hashing failed: {0}")]
pub struct PasswordError(pub String);

/// RoleNameError
///
/// Rejection reasons for strings that cannot be used as a role label.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoleNameError {
    #[error("role name must not be empty")]
    Empty,

    #[error("role name must be at most {max} characters")]
    TooLong { max: usize },

    #[error("role name may only contain ASCII letters, digits, '_' and '-'")]
    InvalidCharacter,
}

/// RoleError
///
/// Refusals of the role/permission lifecycle mutations.
#[derive(Debug, Error)]
pub enum RoleError {
    #[error("the admin role is implicit and cannot be modified or deleted")]
    AdminProtected,

    #[error("role `{0}` is still assigned to at least one user")]
    InUse(String),

    #[error("role `{0}` already exists")]
    AlreadyExists(String),

    #[error("unknown permission keys: {0:?}")]
    UnknownPermissions(Vec<String>),

    #[error("permission catalog is not empty")]
    CatalogNotEmpty,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<StoreError> for StatusCode {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "store failure");
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl From<PasswordError> for StatusCode {
    fn from(err: PasswordError) -> Self {
        tracing::error!(error = %err, "password hashing failure");
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl From<RoleError> for StatusCode {
    fn from(err: RoleError) -> Self {
        match err {
            RoleError::AdminProtected | RoleError::InUse(_) => {
                tracing::debug!(reason = %err, "role mutation refused");
                StatusCode::FORBIDDEN
            }
            RoleError::AlreadyExists(_) | RoleError::CatalogNotEmpty => StatusCode::CONFLICT,
            RoleError::UnknownPermissions(_) => StatusCode::BAD_REQUEST,
            RoleError::Store(e) => e.into(),
        }
    }
}

impl From<RoleNameError> for StatusCode {
    fn from(_: RoleNameError) -> Self {
        StatusCode::BAD_REQUEST
    }
}
