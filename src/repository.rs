use crate::error::{StoreError, conflict_message};
use crate::models::{
    Permissions, Publisher, PublisherFilter, PublisherPage, PublisherRequest, RESERVED_ROLE, Role,
    RoleRequest, UpdatePublisherRequest, User, UserRequest,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Postgres, query_builder::QueryBuilder, types::Json};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Repository Trait
///
/// The contract for every read and write against the `users`, `roles` and `publishers` tables.
/// Handlers, the authorization gate and the guard's extractors only ever see this trait, so the
/// Postgres implementation can be swapped for `MockRepository` in tests.
///
/// Every method reports failure through `StoreError`; callers decide how restrictive to be.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    // Newest first.
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    // `role`, when present, must name an existing role.
    async fn create_user(&self, id: Uuid, req: UserRequest) -> Result<User, StoreError>;
    async fn update_user(&self, id: Uuid, req: UserRequest) -> Result<User, StoreError>;
    async fn delete_user(&self, id: Uuid) -> Result<(), StoreError>;

    // --- Roles ---
    // Ordered by name.
    async fn list_roles(&self) -> Result<Vec<Role>, StoreError>;
    async fn get_role(&self, id: Uuid) -> Result<Option<Role>, StoreError>;
    async fn create_role(&self, req: RoleRequest) -> Result<Role, StoreError>;
    /// Renaming a role carries its users along to the new name. The reserved role is rejected.
    async fn update_role(&self, id: Uuid, req: RoleRequest) -> Result<Role, StoreError>;
    /// Users still pointing at a deleted role keep the dangling name and resolve to no
    /// permissions. The reserved role is rejected.
    async fn delete_role(&self, id: Uuid) -> Result<(), StoreError>;

    // --- Publishers ---
    async fn list_publishers(&self, filter: &PublisherFilter)
    -> Result<PublisherPage, StoreError>;
    async fn get_publisher(&self, id: Uuid) -> Result<Option<Publisher>, StoreError>;
    async fn create_publisher(&self, req: PublisherRequest) -> Result<Publisher, StoreError>;
    async fn update_publisher(
        &self,
        id: Uuid,
        req: UpdatePublisherRequest,
    ) -> Result<Publisher, StoreError>;
    async fn delete_publisher(&self, id: Uuid) -> Result<(), StoreError>;
    // Distinct, non-empty categories currently in use (list page filter options).
    async fn publisher_categories(&self) -> Result<Vec<String>, StoreError>;
}

/// RepositoryState
///
/// The shared handle to the persistence layer stored in `AppState`.
pub type RepositoryState = Arc<dyn Repository>;

// --- Store Boundary Checks (shared by every implementation) ---

/// The reserved role can never be modified or deleted.
pub fn ensure_role_mutable(existing: &Role) -> Result<(), StoreError> {
    if existing.is_reserved() {
        return Err(StoreError::ReservedRole(existing.name.clone()));
    }
    Ok(())
}

/// No other role may take the reserved name.
pub fn ensure_role_name_allowed(name: &str) -> Result<(), StoreError> {
    if name == RESERVED_ROLE {
        return Err(StoreError::ReservedRole(name.to_string()));
    }
    Ok(())
}

/// A user's role must name an existing role when it is written.
pub fn ensure_role_reference(role: Option<&str>, roles: &[Role]) -> Result<(), StoreError> {
    match role {
        Some(name) if !roles.iter().any(|r| r.name == name) => {
            Err(StoreError::UnknownRole(name.to_string()))
        }
        _ => Ok(()),
    }
}

/// Escapes LIKE wildcards so the search term matches literally.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

const USER_COLUMNS: &str = "id, email, role, created_at";
// Rows written without a flags document read back with no permissions.
const ROLE_COLUMNS: &str =
    "id, name, description, COALESCE(permissions, '{}'::jsonb) AS permissions, created_at";
const PUBLISHER_COLUMNS: &str = r#"
    id, name, description, category, city, location, place_name, street_name, state, zip_code,
    website_url, instagram_url, twitter_url, facebook_url, contact_name, contact_email,
    contact_phone, COALESCE(tags, '{}') AS tags, logo_url, COALESCE(status, 'active') AS status,
    COALESCE(events_count, 0) AS events_count, COALESCE(articles_count, 0) AS articles_count,
    created_at
"#;

/// PostgresRepository
///
/// The `Repository` implementation backed by the hosted Postgres database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn role_exists(&self, name: &str) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM roles WHERE name = $1)")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn ensure_role_exists(&self, role: Option<&str>) -> Result<(), StoreError> {
        if let Some(name) = role {
            if !self.role_exists(name).await? {
                return Err(StoreError::UnknownRole(name.to_string()));
            }
        }
        Ok(())
    }

    /// push_publisher_filters
    ///
    /// Appends the WHERE conditions of a listing. Every value goes through `push_bind`. The base
    /// query must already end in a WHERE clause.
    fn push_publisher_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &PublisherFilter) {
        if let Some(term) = filter.search_term() {
            let pattern = like_pattern(&term);
            builder.push(" AND (name ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR description ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR contact_name ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }
        if let Some(category) = filter.category_filter() {
            builder.push(" AND category = ");
            builder.push_bind(category.to_string());
        }
        if let Some(status) = filter.status_filter() {
            builder.push(" AND COALESCE(status, 'active') = ");
            builder.push_bind(status);
        }
        if let Some(from) = filter.created_from() {
            builder.push(" AND created_at >= ");
            builder.push_bind(from);
        }
        if let Some(before) = filter.created_before() {
            builder.push(" AND created_at < ");
            builder.push_bind(before);
        }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- USERS ---

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, id: Uuid, req: UserRequest) -> Result<User, StoreError> {
        let role = req.normalized_role();
        self.ensure_role_exists(role.as_deref()).await?;

        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, email, role) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(&req.email)
        .bind(role)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_user(&self, id: Uuid, req: UserRequest) -> Result<User, StoreError> {
        let role = req.normalized_role();
        self.ensure_role_exists(role.as_deref()).await?;

        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET email = $2, role = $3 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(&req.email)
        .bind(role)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        match result.rows_affected() {
            0 => Err(StoreError::NotFound),
            _ => Ok(()),
        }
    }

    // --- ROLES ---

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        let roles = sqlx::query_as::<_, Role>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles ORDER BY name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }

    async fn get_role(&self, id: Uuid) -> Result<Option<Role>, StoreError> {
        let role = sqlx::query_as::<_, Role>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(role)
    }

    async fn create_role(&self, req: RoleRequest) -> Result<Role, StoreError> {
        ensure_role_name_allowed(&req.name)?;

        let role = sqlx::query_as::<_, Role>(&format!(
            "INSERT INTO roles (id, name, description, permissions) VALUES ($1, $2, $3, $4) \
             RETURNING {ROLE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&req.name)
        .bind(&req.description)
        .bind(Json(req.permissions))
        .fetch_one(&self.pool)
        .await?;
        Ok(role)
    }

    /// update_role
    ///
    /// Runs in a transaction so the rename of the role and of its users' references commit
    /// together. The existing row is locked before the reserved-role check.
    async fn update_role(&self, id: Uuid, req: RoleRequest) -> Result<Role, StoreError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, Role>(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;

        ensure_role_mutable(&existing)?;
        ensure_role_name_allowed(&req.name)?;

        let updated = sqlx::query_as::<_, Role>(&format!(
            "UPDATE roles SET name = $2, description = $3, permissions = $4 WHERE id = $1 \
             RETURNING {ROLE_COLUMNS}"
        ))
        .bind(id)
        .bind(&req.name)
        .bind(&req.description)
        .bind(Json(req.permissions))
        .fetch_one(&mut *tx)
        .await?;

        if existing.name != updated.name {
            sqlx::query("UPDATE users SET role = $2 WHERE role = $1")
                .bind(&existing.name)
                .bind(&updated.name)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_role(&self, id: Uuid) -> Result<(), StoreError> {
        let existing = self.get_role(id).await?.ok_or(StoreError::NotFound)?;
        ensure_role_mutable(&existing)?;

        // The name guard repeats the reserved check inside the statement itself.
        let result = sqlx::query("DELETE FROM roles WHERE id = $1 AND name <> $2")
            .bind(id)
            .bind(RESERVED_ROLE)
            .execute(&self.pool)
            .await?;
        match result.rows_affected() {
            0 => Err(StoreError::NotFound),
            _ => Ok(()),
        }
    }

    // --- PUBLISHERS ---

    /// list_publishers
    ///
    /// Two queries sharing the same filter clause: a COUNT for the pagination metadata and the
    /// page itself, newest first.
    async fn list_publishers(
        &self,
        filter: &PublisherFilter,
    ) -> Result<PublisherPage, StoreError> {
        let mut count: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM publishers WHERE 1 = 1");
        Self::push_publisher_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {PUBLISHER_COLUMNS} FROM publishers WHERE 1 = 1"));
        Self::push_publisher_filters(&mut builder, filter);
        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(i64::from(filter.per_page()));
        builder.push(" OFFSET ");
        builder.push_bind(filter.offset() as i64);

        let items = builder
            .build_query_as::<Publisher>()
            .fetch_all(&self.pool)
            .await?;

        Ok(PublisherPage::new(items, filter, total.max(0) as u64))
    }

    async fn get_publisher(&self, id: Uuid) -> Result<Option<Publisher>, StoreError> {
        let publisher = sqlx::query_as::<_, Publisher>(&format!(
            "SELECT {PUBLISHER_COLUMNS} FROM publishers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(publisher)
    }

    async fn create_publisher(&self, req: PublisherRequest) -> Result<Publisher, StoreError> {
        let publisher = sqlx::query_as::<_, Publisher>(&format!(
            r#"INSERT INTO publishers (
                id, name, description, category, city, location, place_name, street_name,
                state, zip_code, website_url, instagram_url, twitter_url, facebook_url,
                contact_name, contact_email, contact_phone, tags, logo_url, status
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19, 'active'
            ) RETURNING {PUBLISHER_COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(&req.name)
        .bind(&req.description)
        .bind(&req.category)
        .bind(&req.city)
        .bind(&req.location)
        .bind(&req.place_name)
        .bind(&req.street_name)
        .bind(&req.state)
        .bind(&req.zip_code)
        .bind(&req.website_url)
        .bind(&req.instagram_url)
        .bind(&req.twitter_url)
        .bind(&req.facebook_url)
        .bind(&req.contact_name)
        .bind(&req.contact_email)
        .bind(&req.contact_phone)
        .bind(&req.tags)
        .bind(&req.logo_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(publisher)
    }

    /// update_publisher
    ///
    /// Partial update. The row stays locked from the read to the write, so concurrent edits of
    /// different fields both land.
    async fn update_publisher(
        &self,
        id: Uuid,
        req: UpdatePublisherRequest,
    ) -> Result<Publisher, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut publisher = sqlx::query_as::<_, Publisher>(&format!(
            "SELECT {PUBLISHER_COLUMNS} FROM publishers WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;
        req.apply(&mut publisher);

        let updated = sqlx::query_as::<_, Publisher>(&format!(
            r#"UPDATE publishers SET
                name = $2, description = $3, category = $4, city = $5, location = $6,
                place_name = $7, street_name = $8, state = $9, zip_code = $10,
                website_url = $11, instagram_url = $12, twitter_url = $13, facebook_url = $14,
                contact_name = $15, contact_email = $16, contact_phone = $17, tags = $18,
                logo_url = $19, status = $20
            WHERE id = $1
            RETURNING {PUBLISHER_COLUMNS}"#
        ))
        .bind(id)
        .bind(&publisher.name)
        .bind(&publisher.description)
        .bind(&publisher.category)
        .bind(&publisher.city)
        .bind(&publisher.location)
        .bind(&publisher.place_name)
        .bind(&publisher.street_name)
        .bind(&publisher.state)
        .bind(&publisher.zip_code)
        .bind(&publisher.website_url)
        .bind(&publisher.instagram_url)
        .bind(&publisher.twitter_url)
        .bind(&publisher.facebook_url)
        .bind(&publisher.contact_name)
        .bind(&publisher.contact_email)
        .bind(&publisher.contact_phone)
        .bind(&publisher.tags)
        .bind(&publisher.logo_url)
        .bind(publisher.status.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn delete_publisher(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM publishers WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        match result.rows_affected() {
            0 => Err(StoreError::NotFound),
            _ => Ok(()),
        }
    }

    async fn publisher_categories(&self) -> Result<Vec<String>, StoreError> {
        let categories: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT category FROM publishers \
             WHERE category IS NOT NULL AND category <> '' ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(categories)
    }
}

// --- In-Memory Implementation ---

#[derive(Default)]
struct MockTables {
    users: Vec<User>,
    roles: Vec<Role>,
    publishers: Vec<Publisher>,
}

/// MockRepository
///
/// An in-memory `Repository` used by the test suite and for running the console without a
/// database. It applies the same boundary checks as `PostgresRepository`. `failing_users` and
/// `failing_roles` make the corresponding reads fail, to exercise the restrictive paths.
#[derive(Default)]
pub struct MockRepository {
    tables: RwLock<MockTables>,
    pub failing_users: bool,
    pub failing_roles: bool,
}

impl MockRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(mut self, users: Vec<User>) -> Self {
        self.tables.get_mut().users = users;
        self
    }

    pub fn with_roles(mut self, roles: Vec<Role>) -> Self {
        self.tables.get_mut().roles = roles;
        self
    }

    pub fn with_publishers(mut self, publishers: Vec<Publisher>) -> Self {
        self.tables.get_mut().publishers = publishers;
        self
    }

    pub fn failing_users(mut self) -> Self {
        self.failing_users = true;
        self
    }

    pub fn failing_roles(mut self) -> Self {
        self.failing_roles = true;
        self
    }

    fn check_users(&self) -> Result<(), StoreError> {
        if self.failing_users {
            return Err(StoreError::Database("simulated users failure".to_string()));
        }
        Ok(())
    }

    fn check_roles(&self) -> Result<(), StoreError> {
        if self.failing_roles {
            return Err(StoreError::Database("simulated roles failure".to_string()));
        }
        Ok(())
    }
}

/// Convenience constructor for seeded roles.
pub fn role(name: &str, user_management: bool, role_management: bool) -> Role {
    Role {
        id: Uuid::new_v4(),
        name: name.to_string(),
        description: None,
        permissions: Permissions {
            user_management,
            role_management,
        },
        created_at: Utc::now(),
    }
}

#[async_trait]
impl Repository for MockRepository {
    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.check_users()?;
        let mut users = self.tables.read().await.users.clone();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.check_users()?;
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.check_users()?;
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.email == email).cloned())
    }

    async fn create_user(&self, id: Uuid, req: UserRequest) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        let role = req.normalized_role();
        ensure_role_reference(role.as_deref(), &tables.roles)?;
        if tables.users.iter().any(|u| u.id == id || u.email == req.email) {
            return Err(StoreError::Conflict(
                conflict_message(Some("users_email_key")).to_string(),
            ));
        }
        let user = User {
            id,
            email: req.email,
            role,
            created_at: Utc::now(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn update_user(&self, id: Uuid, req: UserRequest) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        let role = req.normalized_role();
        ensure_role_reference(role.as_deref(), &tables.roles)?;
        let user = tables
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(StoreError::NotFound)?;
        user.email = req.email;
        user.role = role;
        Ok(user.clone())
    }

    async fn delete_user(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.users.len();
        tables.users.retain(|u| u.id != id);
        if tables.users.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        self.check_roles()?;
        let mut roles = self.tables.read().await.roles.clone();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn get_role(&self, id: Uuid) -> Result<Option<Role>, StoreError> {
        self.check_roles()?;
        let tables = self.tables.read().await;
        Ok(tables.roles.iter().find(|r| r.id == id).cloned())
    }

    async fn create_role(&self, req: RoleRequest) -> Result<Role, StoreError> {
        ensure_role_name_allowed(&req.name)?;
        let mut tables = self.tables.write().await;
        if tables.roles.iter().any(|r| r.name == req.name) {
            return Err(StoreError::Conflict(
                conflict_message(Some("roles_name_key")).to_string(),
            ));
        }
        let role = Role {
            id: Uuid::new_v4(),
            name: req.name,
            description: req.description,
            permissions: req.permissions,
            created_at: Utc::now(),
        };
        tables.roles.push(role.clone());
        Ok(role)
    }

    async fn update_role(&self, id: Uuid, req: RoleRequest) -> Result<Role, StoreError> {
        let mut tables = self.tables.write().await;
        let existing = tables
            .roles
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(StoreError::NotFound)?;
        ensure_role_mutable(&existing)?;
        ensure_role_name_allowed(&req.name)?;
        if tables.roles.iter().any(|r| r.id != id && r.name == req.name) {
            return Err(StoreError::Conflict(
                conflict_message(Some("roles_name_key")).to_string(),
            ));
        }

        if existing.name != req.name {
            for user in tables
                .users
                .iter_mut()
                .filter(|u| u.role.as_deref() == Some(existing.name.as_str()))
            {
                user.role = Some(req.name.clone());
            }
        }

        let role = tables
            .roles
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound)?;
        role.name = req.name;
        role.description = req.description;
        role.permissions = req.permissions;
        Ok(role.clone())
    }

    async fn delete_role(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let existing = tables
            .roles
            .iter()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound)?;
        ensure_role_mutable(existing)?;
        tables.roles.retain(|r| r.id != id);
        Ok(())
    }

    async fn list_publishers(
        &self,
        filter: &PublisherFilter,
    ) -> Result<PublisherPage, StoreError> {
        let tables = self.tables.read().await;
        let mut matching: Vec<Publisher> = tables
            .publishers
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.per_page() as usize)
            .collect();
        Ok(PublisherPage::new(items, filter, total))
    }

    async fn get_publisher(&self, id: Uuid) -> Result<Option<Publisher>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.publishers.iter().find(|p| p.id == id).cloned())
    }

    async fn create_publisher(&self, req: PublisherRequest) -> Result<Publisher, StoreError> {
        let publisher = Publisher {
            id: Uuid::new_v4(),
            name: req.name,
            description: req.description,
            category: req.category,
            city: req.city,
            location: req.location,
            place_name: req.place_name,
            street_name: req.street_name,
            state: req.state,
            zip_code: req.zip_code,
            website_url: req.website_url,
            instagram_url: req.instagram_url,
            twitter_url: req.twitter_url,
            facebook_url: req.facebook_url,
            contact_name: req.contact_name,
            contact_email: req.contact_email,
            contact_phone: req.contact_phone,
            tags: req.tags,
            logo_url: req.logo_url,
            created_at: Utc::now(),
            ..Publisher::default()
        };
        self.tables.write().await.publishers.push(publisher.clone());
        Ok(publisher)
    }

    async fn update_publisher(
        &self,
        id: Uuid,
        req: UpdatePublisherRequest,
    ) -> Result<Publisher, StoreError> {
        let mut tables = self.tables.write().await;
        let publisher = tables
            .publishers
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(StoreError::NotFound)?;
        req.apply(publisher);
        Ok(publisher.clone())
    }

    async fn delete_publisher(&self, id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.publishers.len();
        tables.publishers.retain(|p| p.id != id);
        if tables.publishers.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn publisher_categories(&self) -> Result<Vec<String>, StoreError> {
        let tables = self.tables.read().await;
        let mut categories: Vec<String> = tables
            .publishers
            .iter()
            .filter_map(|p| p.category.clone())
            .filter(|c| !c.is_empty())
            .collect();
        categories.sort();
        categories.dedup();
        Ok(categories)
    }
}
