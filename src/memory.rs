use crate::{
    models::{
        CreateNewsRequest, CreatePermissionRequest, News, NewUser, Permission, RolePermission,
        UpdateNewsRequest, User,
    },
    repository::{NewsStore, PermissionCatalog, RolePermissionStore, StoreResult, UserStore},
};
use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::BTreeSet,
    sync::atomic::{AtomicUsize, Ordering},
};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    permissions: Vec<Permission>,
    role_permissions: Vec<RolePermission>,
    users: Vec<User>,
    news: Vec<News>,
    next_user_id: i32,
    next_news_id: i32,
}

/// MemoryRepository
///
/// A process-local `Repository` used by the test suites and for running handlers
/// without a database. Each method takes the table lock once, so every call is
/// atomic with respect to the others, matching the one-transaction-per-operation
/// behaviour of `PostgresRepository`.
///
/// It also counts role-permission lookups, which lets tests observe that the admin
/// short-circuit never touches the grant table.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
    role_lookups: AtomicUsize,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `list_for_role` calls served so far.
    pub fn role_lookup_count(&self) -> usize {
        self.role_lookups.load(Ordering::SeqCst)
    }

    /// Inserts a raw grant row without any validation. Lets tests reproduce legacy
    /// data such as duplicate pairs or keys missing from the catalog.
    pub async fn insert_raw_grant(&self, role: &str, permission_key: &str) {
        self.tables.write().await.role_permissions.push(RolePermission {
            role: role.to_string(),
            permission_key: permission_key.to_string(),
        });
    }
}

fn write_grants(tables: &mut Tables, role: &str, keys: &BTreeSet<String>) {
    tables.role_permissions.retain(|rp| rp.role != role);
    tables.role_permissions.extend(keys.iter().map(|key| RolePermission {
        role: role.to_string(),
        permission_key: key.clone(),
    }));
}

fn sort_permissions(permissions: &mut [Permission]) {
    permissions.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.key.cmp(&b.key)));
}

#[async_trait]
impl PermissionCatalog for MemoryRepository {
    async fn list_all(&self) -> StoreResult<Vec<Permission>> {
        let mut all = self.tables.read().await.permissions.clone();
        sort_permissions(&mut all);
        Ok(all)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.tables.read().await.permissions.iter().any(|p| p.key == key))
    }

    async fn create(&self, req: CreatePermissionRequest) -> StoreResult<Option<Permission>> {
        let mut tables = self.tables.write().await;
        if tables.permissions.iter().any(|p| p.key == req.key) {
            return Ok(None);
        }
        let next_order = tables.permissions.iter().map(|p| p.sort_order).max().unwrap_or(0) + 1;
        let permission = Permission {
            key: req.key,
            label: req.label,
            group: req.group,
            sort_order: req.sort_order.unwrap_or(next_order),
        };
        tables.permissions.push(permission.clone());
        Ok(Some(permission))
    }

    async fn seed_catalog(
        &self,
        permissions: Vec<CreatePermissionRequest>,
        grants: &[(String, BTreeSet<String>)],
    ) -> StoreResult<Option<usize>> {
        let mut tables = self.tables.write().await;
        if !tables.permissions.is_empty() {
            return Ok(None);
        }
        let mut inserted = 0;
        for (index, req) in permissions.into_iter().enumerate() {
            if tables.permissions.iter().any(|p| p.key == req.key) {
                continue;
            }
            tables.permissions.push(Permission {
                key: req.key,
                label: req.label,
                group: req.group,
                sort_order: req.sort_order.unwrap_or(index as i32 + 1),
            });
            inserted += 1;
        }
        for (role, keys) in grants {
            write_grants(&mut tables, role, keys);
        }
        Ok(Some(inserted))
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        tables.role_permissions.retain(|rp| rp.permission_key != key);
        let before = tables.permissions.len();
        tables.permissions.retain(|p| p.key != key);
        Ok(tables.permissions.len() < before)
    }
}

#[async_trait]
impl RolePermissionStore for MemoryRepository {
    async fn list_for_role(&self, role: &str) -> StoreResult<Vec<String>> {
        self.role_lookups.fetch_add(1, Ordering::SeqCst);
        let keys: BTreeSet<String> = self
            .tables
            .read()
            .await
            .role_permissions
            .iter()
            .filter(|rp| rp.role == role)
            .map(|rp| rp.permission_key.clone())
            .collect();
        Ok(keys.into_iter().collect())
    }

    async fn replace_for_role(&self, role: &str, keys: &BTreeSet<String>) -> StoreResult<()> {
        write_grants(&mut *self.tables.write().await, role, keys);
        Ok(())
    }

    async fn create_role_if_absent(&self, role: &str, keys: &BTreeSet<String>) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let exists = tables.role_permissions.iter().any(|rp| rp.role == role)
            || tables.users.iter().any(|u| u.role == role);
        if exists {
            return Ok(false);
        }
        write_grants(&mut tables, role, keys);
        Ok(true)
    }

    async fn delete_role_if_unused(&self, role: &str) -> StoreResult<Option<u64>> {
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|u| u.role == role) {
            return Ok(None);
        }
        let before = tables.role_permissions.len();
        tables.role_permissions.retain(|rp| rp.role != role);
        Ok(Some((before - tables.role_permissions.len()) as u64))
    }

    async fn list_roles(&self) -> StoreResult<Vec<String>> {
        let roles: BTreeSet<String> = self
            .tables
            .read()
            .await
            .role_permissions
            .iter()
            .map(|rp| rp.role.clone())
            .collect();
        Ok(roles.into_iter().collect())
    }
}

#[async_trait]
impl UserStore for MemoryRepository {
    async fn exists_with_role(&self, role: &str) -> StoreResult<bool> {
        Ok(self.tables.read().await.users.iter().any(|u| u.role == role))
    }

    async fn list_user_roles(&self) -> StoreResult<Vec<String>> {
        let roles: BTreeSet<String> = self.tables.read().await.users.iter().map(|u| u.role.clone()).collect();
        Ok(roles.into_iter().collect())
    }

    async fn get_user(&self, id: i32) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.iter().find(|u| u.id == id).cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        Ok(self.tables.read().await.users.clone())
    }

    async fn count_users(&self) -> StoreResult<i64> {
        Ok(self.tables.read().await.users.len() as i64)
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<Option<User>> {
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|u| u.username == user.username) {
            return Ok(None);
        }
        tables.next_user_id += 1;
        let created = User {
            id: tables.next_user_id,
            username: user.username,
            password_hash: user.password_hash,
            display_name: user.display_name,
            role: user.role,
            created_at: Utc::now(),
        };
        tables.users.push(created.clone());
        Ok(Some(created))
    }

    async fn update_user_role(&self, id: i32, role: &str) -> StoreResult<Option<User>> {
        let mut tables = self.tables.write().await;
        Ok(tables.users.iter_mut().find(|u| u.id == id).map(|u| {
            u.role = role.to_string();
            u.clone()
        }))
    }

    async fn delete_user(&self, id: i32) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.users.len();
        tables.users.retain(|u| u.id != id);
        Ok(tables.users.len() < before)
    }
}

#[async_trait]
impl NewsStore for MemoryRepository {
    async fn list_news(&self, category: Option<String>, status: Option<String>) -> StoreResult<Vec<News>> {
        let mut items: Vec<News> = self
            .tables
            .read()
            .await
            .news
            .iter()
            .filter(|n| category.as_ref().is_none_or(|c| &n.category == c))
            .filter(|n| status.as_ref().is_none_or(|s| &n.status == s))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn get_news(&self, id: i32) -> StoreResult<Option<News>> {
        Ok(self.tables.read().await.news.iter().find(|n| n.id == id).cloned())
    }

    async fn create_news(&self, req: CreateNewsRequest) -> StoreResult<News> {
        let mut tables = self.tables.write().await;
        tables.next_news_id += 1;
        let now = Utc::now();
        let status = req.status.unwrap_or_else(|| "draft".to_string());
        let item = News {
            id: tables.next_news_id,
            sort_order: req.sort_order.unwrap_or(0),
            title: req.title,
            content: req.content,
            published_at: (status == "published").then_some(now),
            status,
            category: req.category.unwrap_or_else(|| "news".to_string()),
            created_at: now,
            updated_at: now,
        };
        tables.news.push(item.clone());
        Ok(item)
    }

    async fn update_news(&self, id: i32, req: UpdateNewsRequest) -> StoreResult<Option<News>> {
        let mut tables = self.tables.write().await;
        let Some(item) = tables.news.iter_mut().find(|n| n.id == id) else {
            return Ok(None);
        };
        let now = Utc::now();
        if let Some(title) = req.title {
            item.title = title;
        }
        if let Some(content) = req.content {
            item.content = content;
        }
        if let Some(category) = req.category {
            item.category = category;
        }
        if let Some(status) = req.status {
            if status == "published" && item.published_at.is_none() {
                item.published_at = Some(now);
            }
            item.status = status;
        }
        if let Some(order) = req.sort_order {
            item.sort_order = order;
        }
        item.updated_at = now;
        Ok(Some(item.clone()))
    }

    async fn delete_news(&self, id: i32) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        let before = tables.news.len();
        tables.news.retain(|n| n.id != id);
        Ok(tables.news.len() < before)
    }
}
