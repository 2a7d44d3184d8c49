use async_trait::async_trait;
use council_cms::{
    Authorizer, MemoryRepository, Role,
    authz::{AnyOf, BASELINE_PERMISSION},
    error::{RoleError, StoreError},
    models::{CreateNewsRequest, CreatePermissionRequest, News, NewUser, Permission, UpdateNewsRequest, User},
    repository::{NewsStore, PermissionCatalog, RepositoryState, RolePermissionStore, StoreResult, UserStore},
};
use std::{
    collections::BTreeSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

// --- Test Context ---

struct Ctx {
    memory: Arc<MemoryRepository>,
    authorizer: Authorizer,
}

impl Ctx {
    /// A fresh in-memory store whose catalog holds `keys`.
    async fn with_catalog(keys: &[&str]) -> Self {
        let memory = Arc::new(MemoryRepository::new());
        for key in keys {
            memory.create(permission(key)).await.unwrap();
        }
        let repo = memory.clone() as RepositoryState;
        Ctx {
            memory,
            authorizer: Authorizer::new(repo),
        }
    }

    async fn add_user(&self, username: &str, role: &str) -> i32 {
        self.memory
            .create_user(NewUser {
                username: username.to_string(),
                password_hash: "x".to_string(),
                display_name: username.to_string(),
                role: role.to_string(),
            })
            .await
            .unwrap()
            .unwrap()
            .id
    }
}

fn permission(key: &str) -> CreatePermissionRequest {
    CreatePermissionRequest {
        key: key.to_string(),
        label: key.to_uppercase(),
        group: None,
        sort_order: None,
    }
}

fn role(name: &str) -> Role {
    Role::parse(name).unwrap()
}

fn set(keys: &[&str]) -> BTreeSet<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

fn owned(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

/// FailingSeedRepository
///
/// Delegates everything to a `MemoryRepository`, except that `seed_catalog` fails
/// while `fail_seed` is set, the way a dropped connection would.
struct FailingSeedRepository {
    inner: MemoryRepository,
    fail_seed: AtomicBool,
}

#[async_trait]
impl PermissionCatalog for FailingSeedRepository {
    async fn list_all(&self) -> StoreResult<Vec<Permission>> {
        self.inner.list_all().await
    }
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.inner.exists(key).await
    }
    async fn create(&self, req: CreatePermissionRequest) -> StoreResult<Option<Permission>> {
        self.inner.create(req).await
    }
    async fn seed_catalog(
        &self,
        permissions: Vec<CreatePermissionRequest>,
        grants: &[(String, BTreeSet<String>)],
    ) -> StoreResult<Option<usize>> {
        if self.fail_seed.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.seed_catalog(permissions, grants).await
    }
    async fn delete(&self, key: &str) -> StoreResult<bool> {
        PermissionCatalog::delete(&self.inner, key).await
    }
}

#[async_trait]
impl RolePermissionStore for FailingSeedRepository {
    async fn list_for_role(&self, role: &str) -> StoreResult<Vec<String>> {
        self.inner.list_for_role(role).await
    }
    async fn replace_for_role(&self, role: &str, keys: &BTreeSet<String>) -> StoreResult<()> {
        self.inner.replace_for_role(role, keys).await
    }
    async fn create_role_if_absent(&self, role: &str, keys: &BTreeSet<String>) -> StoreResult<bool> {
        self.inner.create_role_if_absent(role, keys).await
    }
    async fn delete_role_if_unused(&self, role: &str) -> StoreResult<Option<u64>> {
        self.inner.delete_role_if_unused(role).await
    }
    async fn list_roles(&self) -> StoreResult<Vec<String>> {
        self.inner.list_roles().await
    }
}

#[async_trait]
impl UserStore for FailingSeedRepository {
    async fn exists_with_role(&self, role: &str) -> StoreResult<bool> {
        self.inner.exists_with_role(role).await
    }
    async fn list_user_roles(&self) -> StoreResult<Vec<String>> {
        self.inner.list_user_roles().await
    }
    async fn get_user(&self, id: i32) -> StoreResult<Option<User>> {
        self.inner.get_user(id).await
    }
    async fn list_users(&self) -> StoreResult<Vec<User>> {
        self.inner.list_users().await
    }
    async fn count_users(&self) -> StoreResult<i64> {
        self.inner.count_users().await
    }
    async fn create_user(&self, user: NewUser) -> StoreResult<Option<User>> {
        self.inner.create_user(user).await
    }
    async fn update_user_role(&self, id: i32, role: &str) -> StoreResult<Option<User>> {
        self.inner.update_user_role(id, role).await
    }
    async fn delete_user(&self, id: i32) -> StoreResult<bool> {
        self.inner.delete_user(id).await
    }
}

#[async_trait]
impl NewsStore for FailingSeedRepository {
    async fn list_news(&self, category: Option<String>, status: Option<String>) -> StoreResult<Vec<News>> {
        self.inner.list_news(category, status).await
    }
    async fn get_news(&self, id: i32) -> StoreResult<Option<News>> {
        self.inner.get_news(id).await
    }
    async fn create_news(&self, req: CreateNewsRequest) -> StoreResult<News> {
        self.inner.create_news(req).await
    }
    async fn update_news(&self, id: i32, req: UpdateNewsRequest) -> StoreResult<Option<News>> {
        self.inner.update_news(id, req).await
    }
    async fn delete_news(&self, id: i32) -> StoreResult<bool> {
        self.inner.delete_news(id).await
    }
}

// --- Resolution ---

#[tokio::test]
async fn test_role_without_rows_resolves_to_empty_set() {
    let ctx = Ctx::with_catalog(&["A", "B"]).await;

    for name in ["ghost", "Admin", "ADMIN", "editor"] {
        let resolved = ctx.authorizer.resolve_permissions(&role(name)).await.unwrap();
        assert!(resolved.is_empty(), "{name} should have no permissions");
    }
}

#[tokio::test]
async fn test_admin_resolves_to_current_catalog_without_lag() {
    let ctx = Ctx::with_catalog(&["A", "B"]).await;
    let admin = Role::admin();

    assert_eq!(ctx.authorizer.resolve_permissions(&admin).await.unwrap(), set(&["A", "B"]));

    ctx.memory.create(permission("C")).await.unwrap();
    assert_eq!(
        ctx.authorizer.resolve_permissions(&admin).await.unwrap(),
        set(&["A", "B", "C"])
    );

    ctx.authorizer.delete_permission("A").await.unwrap();
    assert_eq!(ctx.authorizer.resolve_permissions(&admin).await.unwrap(), set(&["B", "C"]));
}

#[tokio::test]
async fn test_duplicate_and_dangling_rows_are_tolerated_on_read() {
    let ctx = Ctx::with_catalog(&["A"]).await;
    ctx.memory.insert_raw_grant("legacy", "A").await;
    ctx.memory.insert_raw_grant("legacy", "A").await;
    ctx.memory.insert_raw_grant("legacy", "retired_key").await;

    let resolved = ctx.authorizer.resolve_permissions(&role("legacy")).await.unwrap();
    assert_eq!(resolved, set(&["A", "retired_key"]));
}

// --- Authorization (OR semantics) ---

#[tokio::test]
async fn test_authorize_matches_intersection_per_role() {
    let ctx = Ctx::with_catalog(&["A", "B", "C"]).await;
    ctx.authorizer
        .replace_role_permissions(&role("writer"), owned(&["A", "B"]))
        .await
        .unwrap();
    ctx.authorizer
        .replace_role_permissions(&role("reader"), owned(&["C"]))
        .await
        .unwrap();

    let cases: [(&str, &[&str], bool); 6] = [
        ("writer", &["A"], true),
        ("writer", &["C"], false),
        ("writer", &["C", "B"], true),
        ("reader", &["C"], true),
        ("reader", &["A", "B"], false),
        ("nobody", &["A", "B", "C"], false),
    ];

    for (name, required, expected) in cases {
        let r = role(name);
        let held = ctx.authorizer.resolve_permissions(&r).await.unwrap();
        let required = AnyOf::new(required.iter().copied());
        assert_eq!(required.is_satisfied_by(&held), expected);
        assert_eq!(
            ctx.authorizer.authorize(&r, &required).await.unwrap(),
            expected,
            "authorize({name}, {:?})",
            required.keys()
        );
    }
}

#[tokio::test]
async fn test_non_admin_authorize_performs_exactly_one_lookup() {
    let ctx = Ctx::with_catalog(&["A"]).await;
    ctx.memory.insert_raw_grant("editor", "A").await;
    let before = ctx.memory.role_lookup_count();

    ctx.authorizer
        .authorize(&role("editor"), &AnyOf::new(["A", "B"]))
        .await
        .unwrap();

    assert_eq!(ctx.memory.role_lookup_count(), before + 1);
}

// --- Role lifecycle ---

#[tokio::test]
async fn test_replace_then_list_returns_exactly_new_keys() {
    let ctx = Ctx::with_catalog(&["A", "B", "C", "D"]).await;
    ctx.memory.insert_raw_grant("editor", "A").await;
    ctx.memory.insert_raw_grant("editor", "A").await;
    ctx.memory.insert_raw_grant("editor", "D").await;

    ctx.authorizer
        .replace_role_permissions(&role("editor"), owned(&["C", "B", "C"]))
        .await
        .unwrap();

    let listed: BTreeSet<String> = ctx.memory.list_for_role("editor").await.unwrap().into_iter().collect();
    assert_eq!(listed, set(&["B", "C"]));

    // Replacing with nothing empties the role.
    ctx.authorizer
        .replace_role_permissions(&role("editor"), Vec::new())
        .await
        .unwrap();
    assert!(ctx.memory.list_for_role("editor").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_replace_rejects_unknown_keys_and_keeps_old_set() {
    let ctx = Ctx::with_catalog(&["A"]).await;
    ctx.authorizer
        .replace_role_permissions(&role("editor"), owned(&["A"]))
        .await
        .unwrap();

    let err = ctx
        .authorizer
        .replace_role_permissions(&role("editor"), owned(&["A", "nope"]))
        .await
        .unwrap_err();

    assert!(matches!(err, RoleError::UnknownPermissions(ref keys) if keys == &owned(&["nope"])));
    assert_eq!(ctx.memory.list_for_role("editor").await.unwrap(), owned(&["A"]));
}

#[tokio::test]
async fn test_admin_permission_set_cannot_be_replaced() {
    let ctx = Ctx::with_catalog(&["A"]).await;
    let err = ctx
        .authorizer
        .replace_role_permissions(&Role::admin(), owned(&["A"]))
        .await
        .unwrap_err();
    assert!(matches!(err, RoleError::AdminProtected));
    assert!(ctx.memory.list_for_role("admin").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deleting_admin_always_fails() {
    let ctx = Ctx::with_catalog(&[]).await;
    assert!(matches!(
        ctx.authorizer.delete_role(&Role::admin()).await,
        Err(RoleError::AdminProtected)
    ));

    // Still refused with users and legacy rows present.
    ctx.add_user("root", "admin").await;
    ctx.memory.insert_raw_grant("admin", "A").await;
    assert!(matches!(
        ctx.authorizer.delete_role(&Role::admin()).await,
        Err(RoleError::AdminProtected)
    ));
}

#[tokio::test]
async fn test_role_in_use_cannot_be_deleted_until_users_move() {
    let ctx = Ctx::with_catalog(&["A"]).await;
    ctx.authorizer
        .replace_role_permissions(&role("editor"), owned(&["A"]))
        .await
        .unwrap();
    let user_id = ctx.add_user("alice", "editor").await;

    assert!(matches!(
        ctx.authorizer.delete_role(&role("editor")).await,
        Err(RoleError::InUse(ref r)) if r == "editor"
    ));
    assert_eq!(ctx.memory.list_for_role("editor").await.unwrap(), owned(&["A"]));

    ctx.memory.update_user_role(user_id, "viewer").await.unwrap();

    assert_eq!(ctx.authorizer.delete_role(&role("editor")).await.unwrap(), 1);
    assert!(ctx.memory.list_for_role("editor").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deleting_permission_cascades_to_every_role() {
    let ctx = Ctx::with_catalog(&["A", "B"]).await;
    for name in ["editor", "reviewer"] {
        ctx.authorizer
            .replace_role_permissions(&role(name), owned(&["A", "B"]))
            .await
            .unwrap();
    }

    assert!(ctx.authorizer.delete_permission("A").await.unwrap());

    assert!(!ctx.memory.exists("A").await.unwrap());
    for name in ["editor", "reviewer"] {
        let resolved = ctx.authorizer.resolve_permissions(&role(name)).await.unwrap();
        assert_eq!(resolved, set(&["B"]));
    }
    assert!(!ctx.authorizer.delete_permission("A").await.unwrap());
}

#[tokio::test]
async fn test_create_role_refuses_existing_roles() {
    let ctx = Ctx::with_catalog(&["A"]).await;
    ctx.add_user("bob", "support").await;

    for name in ["admin", "support"] {
        assert!(matches!(
            ctx.authorizer.create_role(&role(name), Vec::new()).await,
            Err(RoleError::AlreadyExists(_))
        ));
    }
}

#[tokio::test]
async fn test_list_roles_unions_grants_users_and_admin() {
    let ctx = Ctx::with_catalog(&["A"]).await;
    ctx.authorizer
        .replace_role_permissions(&role("editor"), owned(&["A"]))
        .await
        .unwrap();
    ctx.add_user("carol", "support").await;

    let roles = ctx.authorizer.list_roles().await.unwrap();
    let names: Vec<&str> = roles.iter().map(|r| r.role.as_str()).collect();
    assert_eq!(names, vec!["admin", "editor", "support"]);

    let support = roles.iter().find(|r| r.role == "support").unwrap();
    assert!(support.in_use);
    assert!(support.permissions.is_empty());
    let admin = roles.iter().find(|r| r.role == "admin").unwrap();
    assert_eq!(admin.permissions, owned(&["A"]));
}

#[tokio::test]
async fn test_seed_defaults_only_into_empty_catalog() {
    let ctx = Ctx::with_catalog(&[]).await;

    let (count, roles) = ctx.authorizer.seed_defaults().await.unwrap();
    assert_eq!(count, 11);
    assert_eq!(roles, owned(&["editor", "web_editor", "viewer"]));
    assert!(ctx.memory.exists("manage_roles").await.unwrap());
    assert_eq!(ctx.memory.list_for_role("viewer").await.unwrap(), owned(&[BASELINE_PERMISSION]));

    assert!(matches!(
        ctx.authorizer.seed_defaults().await,
        Err(RoleError::CatalogNotEmpty)
    ));
}

// --- End-to-end scenarios ---

#[tokio::test]
async fn test_scenario_editor_and_admin_against_abc_catalog() {
    let ctx = Ctx::with_catalog(&["A", "B", "C"]).await;
    ctx.authorizer
        .replace_role_permissions(&role("editor"), owned(&["A"]))
        .await
        .unwrap();
    let editor = role("editor");

    assert!(!ctx.authorizer.authorize(&editor, &AnyOf::new(["B"])).await.unwrap());
    assert!(ctx.authorizer.authorize(&editor, &AnyOf::new(["A", "B"])).await.unwrap());

    assert!(ctx.memory.list_for_role("admin").await.unwrap().is_empty());
    let before = ctx.memory.role_lookup_count();
    assert!(ctx.authorizer.authorize(&Role::admin(), &AnyOf::new(["C"])).await.unwrap());
    // Admin short-circuits: no grant-table lookup.
    assert_eq!(ctx.memory.role_lookup_count(), before);
}

#[tokio::test]
async fn test_scenario_intern_created_empty_gets_baseline() {
    let ctx = Ctx::with_catalog(&["A", "B", "C"]).await;
    let intern = role("intern");
    assert!(!ctx.authorizer.role_exists(&intern).await.unwrap());

    let granted = ctx.authorizer.create_role(&intern, Vec::new()).await.unwrap();

    assert_eq!(granted, set(&[BASELINE_PERMISSION]));
    assert!(!ctx.memory.list_for_role("intern").await.unwrap().is_empty());
    assert!(ctx.authorizer.role_exists(&intern).await.unwrap());
}

// --- Concurrency and failure atomicity ---

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_create_role_admits_exactly_one() {
    for round in 0..50 {
        let ctx = Ctx::with_catalog(&["A", "B"]).await;
        let name = format!("intern{round}");

        let (first, second) = {
            let (a, b) = (ctx.authorizer.clone(), ctx.authorizer.clone());
            let (ra, rb) = (role(&name), role(&name));
            let ta = tokio::spawn(async move { a.create_role(&ra, owned(&["A"])).await });
            let tb = tokio::spawn(async move { b.create_role(&rb, owned(&["B"])).await });
            (ta.await.unwrap(), tb.await.unwrap())
        };

        let winner = match (first, second) {
            (Ok(keys), Err(RoleError::AlreadyExists(_))) | (Err(RoleError::AlreadyExists(_)), Ok(keys)) => keys,
            other => panic!("expected exactly one successful create, got {other:?}"),
        };
        let stored: BTreeSet<String> = ctx.memory.list_for_role(&name).await.unwrap().into_iter().collect();
        assert_eq!(stored, winner);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_replaces_leave_one_whole_set() {
    let ctx = Ctx::with_catalog(&["A", "B", "C", "D"]).await;
    let editor = role("editor");

    for _ in 0..50 {
        let (a, b) = (ctx.authorizer.clone(), ctx.authorizer.clone());
        let (ra, rb) = (editor.clone(), editor.clone());
        let ta = tokio::spawn(async move { a.replace_role_permissions(&ra, owned(&["A", "B"])).await });
        let tb = tokio::spawn(async move { b.replace_role_permissions(&rb, owned(&["C", "D"])).await });
        ta.await.unwrap().unwrap();
        tb.await.unwrap().unwrap();

        let stored = ctx.authorizer.resolve_permissions(&editor).await.unwrap();
        assert!(stored == set(&["A", "B"]) || stored == set(&["C", "D"]), "merged set {stored:?}");
    }
}

#[tokio::test]
async fn test_failed_seed_writes_nothing_and_can_be_retried() {
    let store = Arc::new(FailingSeedRepository {
        inner: MemoryRepository::new(),
        fail_seed: AtomicBool::new(true),
    });
    let authorizer = Authorizer::new(store.clone() as RepositoryState);

    assert!(matches!(authorizer.seed_defaults().await, Err(RoleError::Store(_))));
    assert!(store.list_all().await.unwrap().is_empty());
    assert!(store.list_roles().await.unwrap().is_empty());

    store.fail_seed.store(false, Ordering::SeqCst);
    let (count, roles) = authorizer.seed_defaults().await.unwrap();
    assert_eq!(count, 11);
    assert_eq!(roles, owned(&["editor", "web_editor", "viewer"]));
    assert_eq!(store.list_roles().await.unwrap(), owned(&["editor", "viewer", "web_editor"]));
}

#[tokio::test]
async fn test_seed_catalog_refuses_populated_catalog_without_writing_grants() {
    let ctx = Ctx::with_catalog(&["A"]).await;
    let grants = vec![("editor".to_string(), set(&["A"]))];

    assert_eq!(ctx.memory.seed_catalog(vec![permission("B")], &grants).await.unwrap(), None);
    assert!(!ctx.memory.exists("B").await.unwrap());
    assert!(ctx.memory.list_for_role("editor").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_role_if_unused_reports_in_use() {
    let ctx = Ctx::with_catalog(&["A"]).await;
    ctx.memory.replace_for_role("editor", &set(&["A"])).await.unwrap();
    ctx.add_user("dave", "editor").await;

    assert_eq!(ctx.memory.delete_role_if_unused("editor").await.unwrap(), None);
    assert_eq!(ctx.memory.list_for_role("editor").await.unwrap(), owned(&["A"]));
    assert_eq!(ctx.memory.delete_role_if_unused("ghost").await.unwrap(), Some(0));
}
