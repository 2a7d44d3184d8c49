use crate::{
    error::StoreError,
    models::{CreateNewsRequest, CreatePermissionRequest, News, NewUser, Permission, UpdateNewsRequest, User},
};
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, query_builder::QueryBuilder};
use std::{collections::BTreeSet, sync::Arc};

/// Result alias for every store operation.
pub type StoreResult<T> = Result<T, StoreError>;

/// PermissionCatalog
///
/// The set of permissions that exist. The admin role's effective set is computed
/// from `list_all`, so this is read on every admin permission report.
#[async_trait]
pub trait PermissionCatalog: Send + Sync {
    /// All permissions, ordered by display order then key.
    async fn list_all(&self) -> StoreResult<Vec<Permission>>;
    async fn exists(&self, key: &str) -> StoreResult<bool>;
    /// Inserts a permission. Returns `None` when the key is already taken.
    async fn create(&self, req: CreatePermissionRequest) -> StoreResult<Option<Permission>>;
    /// seed_catalog
    ///
    /// Inserts `permissions` and writes every `(role, keys)` grant set in one
    /// transaction. Returns `None`, writing nothing, when the catalog already has
    /// an entry. On failure nothing is written, so the call can be retried.
    async fn seed_catalog(
        &self,
        permissions: Vec<CreatePermissionRequest>,
        grants: &[(String, BTreeSet<String>)],
    ) -> StoreResult<Option<usize>>;
    /// Deletes every grant of `key`, then the permission itself, atomically.
    /// Returns false when no permission row existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;
}

/// RolePermissionStore
///
/// The role -> permission grant rows. Roles are plain strings here; validation
/// happens before anything reaches the store.
#[async_trait]
pub trait RolePermissionStore: Send + Sync {
    /// Distinct permission keys granted to `role` (exact, case-sensitive match).
    async fn list_for_role(&self, role: &str) -> StoreResult<Vec<String>>;
    /// Discards all rows for `role` and inserts `keys`, atomically. Concurrent
    /// replaces of one role are serialized: the last writer's set wins whole.
    async fn replace_for_role(&self, role: &str, keys: &BTreeSet<String>) -> StoreResult<()>;
    /// Writes `keys` for `role` unless the role already exists (any grant row or any
    /// user holding it). Returns false, writing nothing, when it does.
    async fn create_role_if_absent(&self, role: &str, keys: &BTreeSet<String>) -> StoreResult<bool>;
    /// Removes all rows for `role` unless a user holds it. `None` means the role is
    /// in use; otherwise the number of rows removed.
    async fn delete_role_if_unused(&self, role: &str) -> StoreResult<Option<u64>>;
    /// Distinct roles that have at least one grant row.
    async fn list_roles(&self) -> StoreResult<Vec<String>>;
}

/// UserStore
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Consulted by the role-deletion guard.
    async fn exists_with_role(&self, role: &str) -> StoreResult<bool>;
    /// Distinct roles held by at least one user.
    async fn list_user_roles(&self) -> StoreResult<Vec<String>>;
    async fn get_user(&self, id: i32) -> StoreResult<Option<User>>;
    async fn list_users(&self) -> StoreResult<Vec<User>>;
    async fn count_users(&self) -> StoreResult<i64>;
    /// Returns `None` when the username is already taken.
    async fn create_user(&self, user: NewUser) -> StoreResult<Option<User>>;
    async fn update_user_role(&self, id: i32, role: &str) -> StoreResult<Option<User>>;
    async fn delete_user(&self, id: i32) -> StoreResult<bool>;
}

/// NewsStore
#[async_trait]
pub trait NewsStore: Send + Sync {
    async fn list_news(&self, category: Option<String>, status: Option<String>) -> StoreResult<Vec<News>>;
    async fn get_news(&self, id: i32) -> StoreResult<Option<News>>;
    async fn create_news(&self, req: CreateNewsRequest) -> StoreResult<News>;
    /// Writes only the provided fields. `published_at` is stamped the first time
    /// the status becomes `published`.
    async fn update_news(&self, id: i32, req: UpdateNewsRequest) -> StoreResult<Option<News>>;
    async fn delete_news(&self, id: i32) -> StoreResult<bool>;
}

/// Repository
///
/// Every store the application needs, behind one trait object.
pub trait Repository: PermissionCatalog + RolePermissionStore + UserStore + NewsStore {}

impl<T> Repository for T where T: PermissionCatalog + RolePermissionStore + UserStore + NewsStore {}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations in `./migrations`.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

const PERMISSION_COLUMNS: &str = "key, label, group_name, sort_order";
const USER_COLUMNS: &str = "id, username, password_hash, display_name, role, created_at";
const NEWS_COLUMNS: &str =
    "id, sort_order, title, content, status, category, created_at, updated_at, published_at";

// Key namespaces for the two-argument `pg_advisory_xact_lock`.
const ROLE_LOCK: i32 = 1;
const CATALOG_SEED_LOCK: i32 = 2;

/// lock_role
///
/// Transaction-scoped advisory lock on one role label. Every write to a role's grant
/// rows, and every write that assigns the role to a user, takes it first. Under READ
/// COMMITTED each later statement then sees everything the previous holder committed,
/// so a delete-then-insert cannot interleave with another one and merge two sets.
async fn lock_role(conn: &mut PgConnection, role: &str) -> StoreResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock($1, hashtext($2))")
        .bind(ROLE_LOCK)
        .bind(role)
        .execute(conn)
        .await?;
    Ok(())
}

/// Replaces the grant rows of `role` with `keys`. Caller holds the role lock.
async fn write_grants(conn: &mut PgConnection, role: &str, keys: &BTreeSet<String>) -> StoreResult<()> {
    sqlx::query("DELETE FROM role_permissions WHERE role = $1")
        .bind(role)
        .execute(&mut *conn)
        .await?;
    if !keys.is_empty() {
        let keys: Vec<String> = keys.iter().cloned().collect();
        sqlx::query("INSERT INTO role_permissions (role, permission_key) SELECT $1, UNNEST($2::text[])")
            .bind(role)
            .bind(keys)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl PermissionCatalog for PostgresRepository {
    async fn list_all(&self) -> StoreResult<Vec<Permission>> {
        let sql = format!("SELECT {PERMISSION_COLUMNS} FROM permissions ORDER BY sort_order, key");
        Ok(sqlx::query_as::<_, Permission>(&sql).fetch_all(&self.pool).await?)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let found = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM permissions WHERE key = $1)")
            .bind(key)
            .fetch_one(&self.pool)
            .await?;
        Ok(found)
    }

    /// create
    ///
    /// `ON CONFLICT DO NOTHING` turns a duplicate key into an empty result instead of
    /// a constraint error. A missing order appends after the current maximum.
    async fn create(&self, req: CreatePermissionRequest) -> StoreResult<Option<Permission>> {
        let sql = format!(
            r#"INSERT INTO permissions (key, label, group_name, sort_order)
               VALUES ($1, $2, $3, COALESCE($4, (SELECT COALESCE(MAX(sort_order), 0) + 1 FROM permissions)))
               ON CONFLICT (key) DO NOTHING
               RETURNING {PERMISSION_COLUMNS}"#
        );
        let created = sqlx::query_as::<_, Permission>(&sql)
            .bind(req.key)
            .bind(req.label)
            .bind(req.group)
            .bind(req.sort_order)
            .fetch_optional(&self.pool)
            .await?;
        Ok(created)
    }

    /// seed_catalog
    ///
    /// Concurrent seeds queue on `CATALOG_SEED_LOCK`; the emptiness check runs after
    /// the lock is held, so only the first one writes.
    async fn seed_catalog(
        &self,
        permissions: Vec<CreatePermissionRequest>,
        grants: &[(String, BTreeSet<String>)],
    ) -> StoreResult<Option<usize>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1, 0)")
            .bind(CATALOG_SEED_LOCK)
            .execute(&mut *tx)
            .await?;

        let populated = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM permissions)")
            .fetch_one(&mut *tx)
            .await?;
        if populated {
            return Ok(None);
        }

        let mut inserted = 0;
        for (index, req) in permissions.into_iter().enumerate() {
            let res = sqlx::query(
                r#"INSERT INTO permissions (key, label, group_name, sort_order)
                   VALUES ($1, $2, $3, $4)
                   ON CONFLICT (key) DO NOTHING"#,
            )
            .bind(req.key)
            .bind(req.label)
            .bind(req.group)
            .bind(req.sort_order.unwrap_or(index as i32 + 1))
            .execute(&mut *tx)
            .await?;
            inserted += res.rows_affected() as usize;
        }

        for (role, keys) in grants {
            lock_role(&mut tx, role).await?;
            write_grants(&mut tx, role, keys).await?;
        }

        tx.commit().await?;
        Ok(Some(inserted))
    }

    /// delete
    ///
    /// Grants go first so no row ever points at a key that was just removed.
    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM role_permissions WHERE permission_key = $1")
            .bind(key)
            .execute(&mut *tx)
            .await?;
        let res = sqlx::query("DELETE FROM permissions WHERE key = $1")
            .bind(key)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(res.rows_affected() > 0)
    }
}

#[async_trait]
impl RolePermissionStore for PostgresRepository {
    async fn list_for_role(&self, role: &str) -> StoreResult<Vec<String>> {
        let keys = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT permission_key FROM role_permissions WHERE role = $1 ORDER BY permission_key",
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }

    /// replace_for_role
    ///
    /// Delete-then-insert inside one transaction under the role lock. A failure part
    /// way through rolls back to the previous set; concurrent replaces run one after
    /// the other, so the last writer's set is the one that remains.
    async fn replace_for_role(&self, role: &str, keys: &BTreeSet<String>) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        lock_role(&mut tx, role).await?;
        write_grants(&mut tx, role, keys).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn create_role_if_absent(&self, role: &str, keys: &BTreeSet<String>) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        lock_role(&mut tx, role).await?;

        let exists = sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS(SELECT 1 FROM role_permissions WHERE role = $1)
                   OR EXISTS(SELECT 1 FROM users WHERE role = $1)"#,
        )
        .bind(role)
        .fetch_one(&mut *tx)
        .await?;
        if exists {
            return Ok(false);
        }

        write_grants(&mut tx, role, keys).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn delete_role_if_unused(&self, role: &str) -> StoreResult<Option<u64>> {
        let mut tx = self.pool.begin().await?;
        lock_role(&mut tx, role).await?;

        let in_use = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE role = $1)")
            .bind(role)
            .fetch_one(&mut *tx)
            .await?;
        if in_use {
            return Ok(None);
        }

        let res = sqlx::query("DELETE FROM role_permissions WHERE role = $1")
            .bind(role)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(res.rows_affected()))
    }

    async fn list_roles(&self) -> StoreResult<Vec<String>> {
        let roles = sqlx::query_scalar::<_, String>("SELECT DISTINCT role FROM role_permissions ORDER BY role")
            .fetch_all(&self.pool)
            .await?;
        Ok(roles)
    }
}

#[async_trait]
impl UserStore for PostgresRepository {
    async fn exists_with_role(&self, role: &str) -> StoreResult<bool> {
        let found = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE role = $1)")
            .bind(role)
            .fetch_one(&self.pool)
            .await?;
        Ok(found)
    }

    async fn list_user_roles(&self) -> StoreResult<Vec<String>> {
        let roles = sqlx::query_scalar::<_, String>("SELECT DISTINCT role FROM users ORDER BY role")
            .fetch_all(&self.pool)
            .await?;
        Ok(roles)
    }

    async fn get_user(&self, id: i32) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY id");
        Ok(sqlx::query_as::<_, User>(&sql).fetch_all(&self.pool).await?)
    }

    async fn count_users(&self) -> StoreResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<Option<User>> {
        let mut tx = self.pool.begin().await?;
        lock_role(&mut tx, &user.role).await?;

        let sql = format!(
            r#"INSERT INTO users (username, password_hash, display_name, role)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (username) DO NOTHING
               RETURNING {USER_COLUMNS}"#
        );
        let created = sqlx::query_as::<_, User>(&sql)
            .bind(user.username)
            .bind(user.password_hash)
            .bind(user.display_name)
            .bind(user.role)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(created)
    }

    /// update_user_role
    ///
    /// Holds the target role's lock, so it cannot interleave with that role's
    /// in-use check and deletion.
    async fn update_user_role(&self, id: i32, role: &str) -> StoreResult<Option<User>> {
        let mut tx = self.pool.begin().await?;
        lock_role(&mut tx, role).await?;

        let sql = format!("UPDATE users SET role = $2 WHERE id = $1 RETURNING {USER_COLUMNS}");
        let updated = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(role)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_user(&self, id: i32) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[async_trait]
impl NewsStore for PostgresRepository {
    /// list_news
    ///
    /// Optional equality filters, built with `QueryBuilder` so every value is bound.
    async fn list_news(&self, category: Option<String>, status: Option<String>) -> StoreResult<Vec<News>> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT {NEWS_COLUMNS} FROM news WHERE 1 = 1"));

        if let Some(c) = category {
            builder.push(" AND category = ");
            builder.push_bind(c);
        }
        if let Some(s) = status {
            builder.push(" AND status = ");
            builder.push_bind(s);
        }
        builder.push(" ORDER BY sort_order ASC, id ASC");

        Ok(builder.build_query_as::<News>().fetch_all(&self.pool).await?)
    }

    async fn get_news(&self, id: i32) -> StoreResult<Option<News>> {
        let sql = format!("SELECT {NEWS_COLUMNS} FROM news WHERE id = $1");
        Ok(sqlx::query_as::<_, News>(&sql).bind(id).fetch_optional(&self.pool).await?)
    }

    async fn create_news(&self, req: CreateNewsRequest) -> StoreResult<News> {
        let sql = format!(
            r#"INSERT INTO news (title, content, category, status, sort_order, published_at)
               VALUES ($1, $2, $3, $4, $5, CASE WHEN $4 = 'published' THEN NOW() ELSE NULL END)
               RETURNING {NEWS_COLUMNS}"#
        );
        let created = sqlx::query_as::<_, News>(&sql)
            .bind(req.title)
            .bind(req.content)
            .bind(req.category.unwrap_or_else(|| "news".to_string()))
            .bind(req.status.unwrap_or_else(|| "draft".to_string()))
            .bind(req.sort_order.unwrap_or(0))
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    /// update_news
    ///
    /// `COALESCE` keeps the stored value for every field that is `None`.
    async fn update_news(&self, id: i32, req: UpdateNewsRequest) -> StoreResult<Option<News>> {
        let sql = format!(
            r#"UPDATE news
               SET title = COALESCE($2, title),
                   content = COALESCE($3, content),
                   category = COALESCE($4, category),
                   status = COALESCE($5, status),
                   sort_order = COALESCE($6, sort_order),
                   published_at = CASE
                       WHEN $5 = 'published' AND published_at IS NULL THEN NOW()
                       ELSE published_at
                   END,
                   updated_at = NOW()
               WHERE id = $1
               RETURNING {NEWS_COLUMNS}"#
        );
        Ok(sqlx::query_as::<_, News>(&sql)
            .bind(id)
            .bind(req.title)
            .bind(req.content)
            .bind(req.category)
            .bind(req.status)
            .bind(req.sort_order)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn delete_news(&self, id: i32) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM news WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
