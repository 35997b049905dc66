use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    PgPool, Postgres,
    query_builder::{QueryBuilder, Separated},
};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::models::{
    CreateNavMenuRequest, NavMenu, NewPage, NewUser, Page, Patch, Role, UpdateNavMenuRequest,
    UpdatePageRequest, UpdateUserRequest, User,
};

/// RepositoryError
///
/// Failures of the persistence collaborator. Only `Conflict` is something a client
/// can fix; everything else surfaces as an unexpected failure.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A unique column already holds the value being written.
    #[error("unique constraint violated on {field}")]
    Conflict { field: &'static str },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("persistence unavailable: {0}")]
    Unavailable(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Repository Trait
///
/// The persistence contract the pipeline and the route handlers rely on. The
/// request core only ever calls `list_roles` (at startup) and `find_user` (session
/// resolution); the rest is CRUD for the handlers.
///
/// **Send + Sync + async_trait** make `Arc<dyn Repository>` shareable across
/// request tasks.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Roles ---
    async fn list_roles(&self) -> RepositoryResult<Vec<Role>>;

    // --- Users ---
    async fn find_user(&self, id: i32) -> RepositoryResult<Option<User>>;
    async fn list_users(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<User>>;
    async fn insert_user(&self, user: NewUser) -> RepositoryResult<User>;
    // `None` when the user does not exist.
    async fn update_user(&self, id: i32, patch: UpdateUserRequest) -> RepositoryResult<Option<User>>;
    // `true` when a row was removed.
    async fn delete_user(&self, id: i32) -> RepositoryResult<bool>;

    // --- Pages ---
    async fn find_page(&self, id: i32) -> RepositoryResult<Option<Page>>;
    async fn list_pages(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Page>>;
    async fn insert_page(&self, page: NewPage) -> RepositoryResult<Page>;
    async fn update_page(&self, id: i32, patch: UpdatePageRequest) -> RepositoryResult<Option<Page>>;
    async fn delete_page(&self, id: i32) -> RepositoryResult<bool>;

    // --- Navigation menus ---
    async fn find_nav_menu(&self, id: i32) -> RepositoryResult<Option<NavMenu>>;
    async fn list_nav_menus(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<NavMenu>>;
    async fn insert_nav_menu(&self, menu: CreateNavMenuRequest) -> RepositoryResult<NavMenu>;
    async fn update_nav_menu(
        &self,
        id: i32,
        patch: UpdateNavMenuRequest,
    ) -> RepositoryResult<Option<NavMenu>>;
    async fn delete_nav_menu(&self, id: i32) -> RepositoryResult<bool>;
}

/// RepositoryState
///
/// The shared handle stored in the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str = "id, first_name, last_name, email, role_id";
const PAGE_COLUMNS: &str = "id, title, content, slug, creator, status, created_at, updated_at";
const NAV_MENU_COLUMNS: &str = "id, name, hierarchy";

/// PostgresRepository
///
/// The `Repository` backed by PostgreSQL through a `PgPool`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Maps a unique-violation on `field` to `Conflict`, anything else to `Database`.
fn write_error(err: sqlx::Error, field: &'static str) -> RepositoryError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            RepositoryError::Conflict { field }
        }
        _ => RepositoryError::Database(err),
    }
}

// Adds `column = <value>` (or `column = NULL`) to an UPDATE's SET list.
fn push_patch(
    set: &mut Separated<'_, '_, Postgres, &'static str>,
    column: &'static str,
    patch: Patch<String>,
) {
    match patch {
        Patch::Absent => {}
        Patch::Null => {
            set.push(format!("{column} = NULL"));
        }
        Patch::Value(value) => {
            set.push(format!("{column} = ")).push_bind_unseparated(value);
        }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn list_roles(&self) -> RepositoryResult<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>("SELECT id, name, permissions FROM role ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(roles)
    }

    async fn find_user(&self, id: i32) -> RepositoryResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn list_users(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn insert_user(&self, user: NewUser) -> RepositoryResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (first_name, last_name, email, role_id) VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        ))
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.email)
        .bind(user.role_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, "email"))
    }

    /// update_user
    ///
    /// Builds the SET list from the present patch fields only. An empty patch is a
    /// plain read.
    async fn update_user(&self, id: i32, patch: UpdateUserRequest) -> RepositoryResult<Option<User>> {
        if patch.first_name.is_absent() && patch.last_name.is_absent() && patch.email.is_absent() {
            return self.find_user(id).await;
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET ");
        {
            let mut set = builder.separated(", ");
            push_patch(&mut set, "first_name", patch.first_name);
            push_patch(&mut set, "last_name", patch.last_name);
            push_patch(&mut set, "email", patch.email);
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(format!(" RETURNING {USER_COLUMNS}"));

        builder
            .build_query_as::<User>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| write_error(e, "email"))
    }

    async fn delete_user(&self, id: i32) -> RepositoryResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_page(&self, id: i32) -> RepositoryResult<Option<Page>> {
        let page = sqlx::query_as::<_, Page>(&format!(
            "SELECT {PAGE_COLUMNS} FROM page WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(page)
    }

    async fn list_pages(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Page>> {
        let pages = sqlx::query_as::<_, Page>(&format!(
            "SELECT {PAGE_COLUMNS} FROM page ORDER BY id LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(pages)
    }

    async fn insert_page(&self, page: NewPage) -> RepositoryResult<Page> {
        sqlx::query_as::<_, Page>(&format!(
            "INSERT INTO page (title, content, slug, creator, status) VALUES ($1, $2, $3, $4, $5) RETURNING {PAGE_COLUMNS}"
        ))
        .bind(page.title)
        .bind(page.content)
        .bind(page.slug)
        .bind(page.creator)
        .bind(page.status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| write_error(e, "slug"))
    }

    async fn update_page(&self, id: i32, patch: UpdatePageRequest) -> RepositoryResult<Option<Page>> {
        if patch.title.is_absent()
            && patch.content.is_absent()
            && patch.slug.is_absent()
            && patch.status.is_absent()
        {
            return self.find_page(id).await;
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE page SET ");
        {
            let mut set = builder.separated(", ");
            push_patch(&mut set, "title", patch.title);
            push_patch(&mut set, "content", patch.content);
            push_patch(&mut set, "slug", patch.slug);
            push_patch(&mut set, "status", patch.status);
            set.push("updated_at = NOW()");
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(format!(" RETURNING {PAGE_COLUMNS}"));

        builder
            .build_query_as::<Page>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| write_error(e, "slug"))
    }

    async fn delete_page(&self, id: i32) -> RepositoryResult<bool> {
        let result = sqlx::query("DELETE FROM page WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_nav_menu(&self, id: i32) -> RepositoryResult<Option<NavMenu>> {
        let menu = sqlx::query_as::<_, NavMenu>(&format!(
            "SELECT {NAV_MENU_COLUMNS} FROM nav_menu WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(menu)
    }

    async fn list_nav_menus(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<NavMenu>> {
        let menus = sqlx::query_as::<_, NavMenu>(&format!(
            "SELECT {NAV_MENU_COLUMNS} FROM nav_menu ORDER BY id LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(menus)
    }

    async fn insert_nav_menu(&self, menu: CreateNavMenuRequest) -> RepositoryResult<NavMenu> {
        let menu = sqlx::query_as::<_, NavMenu>(&format!(
            "INSERT INTO nav_menu (name, hierarchy) VALUES ($1, $2) RETURNING {NAV_MENU_COLUMNS}"
        ))
        .bind(menu.name)
        .bind(menu.hierarchy)
        .fetch_one(&self.pool)
        .await?;
        Ok(menu)
    }

    async fn update_nav_menu(
        &self,
        id: i32,
        patch: UpdateNavMenuRequest,
    ) -> RepositoryResult<Option<NavMenu>> {
        if patch.name.is_absent() && patch.hierarchy.is_absent() {
            return self.find_nav_menu(id).await;
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE nav_menu SET ");
        {
            let mut set = builder.separated(", ");
            push_patch(&mut set, "name", patch.name);
            push_patch(&mut set, "hierarchy", patch.hierarchy);
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(format!(" RETURNING {NAV_MENU_COLUMNS}"));

        let menu = builder
            .build_query_as::<NavMenu>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(menu)
    }

    async fn delete_nav_menu(&self, id: i32) -> RepositoryResult<bool> {
        let result = sqlx::query("DELETE FROM nav_menu WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// --- In-memory implementation ---

#[derive(Default)]
struct Tables {
    roles: Vec<Role>,
    users: BTreeMap<i32, User>,
    pages: BTreeMap<i32, Page>,
    nav_menus: BTreeMap<i32, NavMenu>,
}

fn next_id<T>(table: &BTreeMap<i32, T>) -> i32 {
    table.keys().next_back().map_or(1, |id| id + 1)
}

fn page_window<'a, T: Clone + 'a>(
    rows: impl Iterator<Item = &'a T>,
    limit: i64,
    offset: i64,
) -> Vec<T> {
    let offset = usize::try_from(offset).unwrap_or(usize::MAX);
    let limit = usize::try_from(limit).unwrap_or(0);
    rows.skip(offset).take(limit).cloned().collect()
}

/// MemoryRepository
///
/// A `Repository` held entirely in memory, seeded with the `admin`, `manager` and
/// `editor` roles (ids 1, 2 and 3). It enforces the same unique columns as the
/// schema. Used by the test suites and for running the API without a database.
///
/// `set_fail_writes(true)` makes every mutating call fail with `Unavailable`,
/// simulating a persistence outage mid-request.
pub struct MemoryRepository {
    tables: RwLock<Tables>,
    fail_writes: AtomicBool,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        let roles = [(1, "admin"), (2, "manager"), (3, "editor")]
            .into_iter()
            .map(|(id, name)| Role {
                id,
                name: name.to_string(),
                permissions: "{}".to_string(),
            })
            .collect();

        Self {
            tables: RwLock::new(Tables {
                roles,
                ..Tables::default()
            }),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Stores a user row as given, id included. Replaces any row with that id.
    pub async fn seed_user(&self, user: User) {
        self.tables.write().await.users.insert(user.id, user);
    }

    fn check_writable(&self) -> RepositoryResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(RepositoryError::Unavailable(
                "in-memory store rejected the write".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

fn email_taken(tables: &Tables, email: &str, except: Option<i32>) -> bool {
    tables
        .users
        .values()
        .any(|user| user.email == email && Some(user.id) != except)
}

fn slug_taken(tables: &Tables, slug: &str, except: Option<i32>) -> bool {
    tables
        .pages
        .values()
        .any(|page| page.slug == slug && Some(page.id) != except)
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn list_roles(&self) -> RepositoryResult<Vec<Role>> {
        Ok(self.tables.read().await.roles.clone())
    }

    async fn find_user(&self, id: i32) -> RepositoryResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn list_users(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(page_window(tables.users.values(), limit, offset))
    }

    async fn insert_user(&self, user: NewUser) -> RepositoryResult<User> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;

        if email_taken(&tables, &user.email, None) {
            return Err(RepositoryError::Conflict { field: "email" });
        }

        let row = User {
            id: next_id(&tables.users),
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            role_id: user.role_id,
        };
        tables.users.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_user(&self, id: i32, patch: UpdateUserRequest) -> RepositoryResult<Option<User>> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;

        if let Some(email) = patch.email.value() {
            if email_taken(&tables, email, Some(id)) {
                return Err(RepositoryError::Conflict { field: "email" });
            }
        }

        let Some(user) = tables.users.get_mut(&id) else {
            return Ok(None);
        };
        patch.first_name.apply(&mut user.first_name);
        patch.last_name.apply(&mut user.last_name);
        patch.email.apply(&mut user.email);
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: i32) -> RepositoryResult<bool> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;

        let removed = tables.users.remove(&id).is_some();
        if removed {
            // page.creator references users(id) ON DELETE CASCADE
            tables.pages.retain(|_, page| page.creator != id);
        }
        Ok(removed)
    }

    async fn find_page(&self, id: i32) -> RepositoryResult<Option<Page>> {
        Ok(self.tables.read().await.pages.get(&id).cloned())
    }

    async fn list_pages(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<Page>> {
        let tables = self.tables.read().await;
        Ok(page_window(tables.pages.values(), limit, offset))
    }

    async fn insert_page(&self, page: NewPage) -> RepositoryResult<Page> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;

        if slug_taken(&tables, &page.slug, None) {
            return Err(RepositoryError::Conflict { field: "slug" });
        }

        let now = Utc::now();
        let row = Page {
            id: next_id(&tables.pages),
            title: page.title,
            content: page.content,
            slug: page.slug,
            creator: page.creator,
            status: page.status,
            created_at: now,
            updated_at: now,
        };
        tables.pages.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_page(&self, id: i32, patch: UpdatePageRequest) -> RepositoryResult<Option<Page>> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;

        if let Some(slug) = patch.slug.value() {
            if slug_taken(&tables, slug, Some(id)) {
                return Err(RepositoryError::Conflict { field: "slug" });
            }
        }

        let Some(page) = tables.pages.get_mut(&id) else {
            return Ok(None);
        };
        let changed = !(patch.title.is_absent()
            && patch.content.is_absent()
            && patch.slug.is_absent()
            && patch.status.is_absent());
        patch.title.apply(&mut page.title);
        patch.content.apply(&mut page.content);
        patch.slug.apply(&mut page.slug);
        patch.status.apply(&mut page.status);
        if changed {
            page.updated_at = Utc::now();
        }
        Ok(Some(page.clone()))
    }

    async fn delete_page(&self, id: i32) -> RepositoryResult<bool> {
        self.check_writable()?;
        Ok(self.tables.write().await.pages.remove(&id).is_some())
    }

    async fn find_nav_menu(&self, id: i32) -> RepositoryResult<Option<NavMenu>> {
        Ok(self.tables.read().await.nav_menus.get(&id).cloned())
    }

    async fn list_nav_menus(&self, limit: i64, offset: i64) -> RepositoryResult<Vec<NavMenu>> {
        let tables = self.tables.read().await;
        Ok(page_window(tables.nav_menus.values(), limit, offset))
    }

    async fn insert_nav_menu(&self, menu: CreateNavMenuRequest) -> RepositoryResult<NavMenu> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;

        let row = NavMenu {
            id: next_id(&tables.nav_menus),
            name: menu.name,
            hierarchy: menu.hierarchy,
        };
        tables.nav_menus.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_nav_menu(
        &self,
        id: i32,
        patch: UpdateNavMenuRequest,
    ) -> RepositoryResult<Option<NavMenu>> {
        self.check_writable()?;
        let mut tables = self.tables.write().await;

        let Some(menu) = tables.nav_menus.get_mut(&id) else {
            return Ok(None);
        };
        patch.name.apply(&mut menu.name);
        patch.hierarchy.apply_nullable(&mut menu.hierarchy);
        Ok(Some(menu.clone()))
    }

    async fn delete_nav_menu(&self, id: i32) -> RepositoryResult<bool> {
        self.check_writable()?;
        Ok(self.tables.write().await.nav_menus.remove(&id).is_some())
    }
}
