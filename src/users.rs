//! User directory: plain CRUD over the `users` table, served next to the dynamic API on
//! the same pool. Deletes are soft; a deleted user no longer lists, loads or blocks its email.

use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::LazyLock;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+$").expect("email pattern compiles"));

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /users` and `PUT /users/:id`. On update, absent fields keep their value.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UserInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Validated fields for a new or updated user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserFields {
    pub name: String,
    pub email: String,
}

impl UserFields {
    pub fn for_create(input: UserInput) -> Result<Self, AppError> {
        Self::validated(input.name.unwrap_or_default(), input.email.unwrap_or_default())
    }

    /// Applies `input` over the stored user.
    pub fn for_update(current: &User, input: UserInput) -> Result<Self, AppError> {
        Self::validated(
            input.name.unwrap_or_else(|| current.name.clone()),
            input.email.unwrap_or_else(|| current.email.clone()),
        )
    }

    fn validated(name: String, email: String) -> Result<Self, AppError> {
        let name = name.trim().to_string();
        let email = email.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("name is required".into()));
        }
        if !EMAIL.is_match(&email) {
            return Err(AppError::Validation("email must look like name@host".into()));
        }
        Ok(UserFields { name, email })
    }
}

/// Persistence for users. Email uniqueness among active users is enforced by the store
/// and surfaces as `AppError::Conflict`.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, fields: UserFields) -> Result<User, AppError>;
    async fn list(&self) -> Result<Vec<User>, AppError>;
    async fn get(&self, id: i64) -> Result<Option<User>, AppError>;
    /// Returns None when no active user has this id.
    async fn update(&self, id: i64, fields: UserFields) -> Result<Option<User>, AppError>;
    /// Returns false when no active user has this id.
    async fn soft_delete(&self, id: i64) -> Result<bool, AppError>;
}

pub struct UserDirectory {
    store: std::sync::Arc<dyn UserStore>,
}

impl UserDirectory {
    pub fn new(store: std::sync::Arc<dyn UserStore>) -> Self {
        UserDirectory { store }
    }

    pub async fn create(&self, input: UserInput) -> Result<User, AppError> {
        let user = self.store.create(UserFields::for_create(input)?).await?;
        tracing::info!(id = user.id, "user created");
        Ok(user)
    }

    pub async fn list(&self) -> Result<Vec<User>, AppError> {
        self.store.list().await
    }

    pub async fn get(&self, id: i64) -> Result<User, AppError> {
        self.store.get(id).await?.ok_or_else(|| not_found(id))
    }

    pub async fn update(&self, id: i64, input: UserInput) -> Result<User, AppError> {
        let current = self.get(id).await?;
        let fields = UserFields::for_update(&current, input)?;
        self.store.update(id, fields).await?.ok_or_else(|| not_found(id))
    }

    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        if self.store.soft_delete(id).await? {
            tracing::info!(id, "user deleted");
            Ok(())
        } else {
            Err(not_found(id))
        }
    }
}

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("user {}", id))
}

const USER_COLUMNS: &str = "id, name, email, created_at, updated_at";

/// `users` in the configured schema.
pub struct PgUserStore {
    pool: PgPool,
    table: String,
}

impl PgUserStore {
    pub fn new(pool: PgPool, schema: &str) -> Self {
        PgUserStore {
            pool,
            table: crate::store::qualified_table(schema, crate::store::USERS_TABLE),
        }
    }
}

fn email_conflict(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("23505") {
            return AppError::Conflict("a user with this email already exists".into());
        }
    }
    AppError::Db(err)
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn create(&self, fields: UserFields) -> Result<User, AppError> {
        let sql = format!(
            "INSERT INTO {} (name, email) VALUES ($1, $2) RETURNING {}",
            self.table, USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&fields.name)
            .bind(&fields.email)
            .fetch_one(&self.pool)
            .await
            .map_err(email_conflict)
    }

    async fn list(&self) -> Result<Vec<User>, AppError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE deleted_at IS NULL ORDER BY id",
            USER_COLUMNS, self.table
        );
        let rows: Vec<User> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows)
    }

    async fn get(&self, id: i64) -> Result<Option<User>, AppError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1 AND deleted_at IS NULL",
            USER_COLUMNS, self.table
        );
        let row: Option<User> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row)
    }

    async fn update(&self, id: i64, fields: UserFields) -> Result<Option<User>, AppError> {
        let sql = format!(
            "UPDATE {} SET name = $2, email = $3, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {}",
            self.table, USER_COLUMNS
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(&fields.name)
            .bind(&fields.email)
            .fetch_optional(&self.pool)
            .await
            .map_err(email_conflict)
    }

    async fn soft_delete(&self, id: i64) -> Result<bool, AppError> {
        let sql = format!(
            "UPDATE {} SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
            self.table
        );
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}
