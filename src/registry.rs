//! Service registry: registration (validate, normalize, persist) and lookup by
//! `(method, path)` over non-deleted definitions.

use crate::error::AppError;
use async_trait::async_trait;
use axum::http::Method;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::LazyLock;
use uuid::Uuid;

/// Paths the router serves itself and which therefore cannot host a service.
const RESERVED_PATHS: &[&str] = &["/", "/register"];

static ROUTE_PATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^/[^\s?#]*$").expect("route pattern compiles"));

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ServiceDefinition {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub method: String,
    pub path: String,
    pub sql: String,
    pub param_keys: Vec<String>,
    pub param_types: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A parameter list as sent by clients: a JSON-array string, or the array itself.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum ParamList {
    Encoded(String),
    List(Vec<String>),
}

impl Default for ParamList {
    fn default() -> Self {
        ParamList::List(Vec::new())
    }
}

impl ParamList {
    fn parse(&self, field: &str) -> Result<Vec<String>, AppError> {
        match self {
            ParamList::List(items) => Ok(items.clone()),
            ParamList::Encoded(s) if s.trim().is_empty() => Ok(Vec::new()),
            ParamList::Encoded(s) => serde_json::from_str::<Vec<String>>(s)
                .map_err(|_| AppError::Validation(format!("{} must be a JSON array of strings", field))),
        }
    }
}

/// Body of `POST /register`.
#[derive(Clone, Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    pub path: String,
    pub sql: String,
    #[serde(default)]
    pub param_keys: ParamList,
    #[serde(default)]
    pub param_types: ParamList,
}

/// A validated, normalized definition ready to persist.
#[derive(Clone, Debug, PartialEq)]
pub struct NewService {
    pub name: String,
    pub description: Option<String>,
    pub method: String,
    pub path: String,
    pub sql: String,
    pub param_keys: Vec<String>,
    pub param_types: Vec<String>,
}

impl NewService {
    pub fn from_request(req: RegisterRequest) -> Result<Self, AppError> {
        let param_keys = req.param_keys.parse("param_keys")?;
        let param_types = req.param_types.parse("param_types")?;
        if param_keys.len() != param_types.len() {
            return Err(AppError::Validation(format!(
                "param_keys has {} entries but param_types has {}",
                param_keys.len(),
                param_types.len()
            )));
        }
        if param_keys.iter().any(|k| k.trim().is_empty()) {
            return Err(AppError::Validation("param_keys must not contain empty names".into()));
        }

        let name = req.name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("name is required".into()));
        }
        if req.sql.trim().is_empty() {
            return Err(AppError::Validation("sql is required".into()));
        }

        let method = normalize_method(req.method.as_deref().unwrap_or("GET"))?;
        let path = normalize_path(&req.path);
        validate_path(&path)?;

        Ok(NewService {
            name,
            description: req.description.filter(|d| !d.trim().is_empty()),
            method,
            path,
            sql: req.sql,
            param_keys,
            param_types,
        })
    }
}

/// Uppercases and checks the token is a valid HTTP method.
pub fn normalize_method(method: &str) -> Result<String, AppError> {
    let upper = method.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return Err(AppError::Validation("method is required".into()));
    }
    Method::from_bytes(upper.as_bytes())
        .map_err(|_| AppError::Validation(format!("invalid HTTP method: {}", method)))?;
    Ok(upper)
}

pub fn normalize_path(path: &str) -> String {
    let path = path.trim();
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

fn validate_path(path: &str) -> Result<(), AppError> {
    if !ROUTE_PATH.is_match(path) {
        return Err(AppError::Validation(format!("invalid path: {}", path)));
    }
    if RESERVED_PATHS.contains(&path) {
        return Err(AppError::Validation(format!("path is reserved: {}", path)));
    }
    Ok(())
}

/// Persistence for service definitions. Uniqueness of name and `(method, path)` among
/// non-deleted rows is enforced by the store and surfaces as `AppError::Conflict`.
#[async_trait]
pub trait ServiceStore: Send + Sync {
    async fn insert(&self, service: NewService) -> Result<ServiceDefinition, AppError>;
    async fn find_active(&self, method: &str, path: &str) -> Result<Option<ServiceDefinition>, AppError>;
    async fn list_active(&self) -> Result<Vec<ServiceDefinition>, AppError>;
    /// Returns false when no active definition has this id.
    async fn soft_delete(&self, id: Uuid) -> Result<bool, AppError>;
    async fn ping(&self) -> Result<(), AppError>;
}

pub struct Registry {
    store: std::sync::Arc<dyn ServiceStore>,
}

impl Registry {
    pub fn new(store: std::sync::Arc<dyn ServiceStore>) -> Self {
        Registry { store }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<ServiceDefinition, AppError> {
        let service = NewService::from_request(req)?;
        let saved = self.store.insert(service).await?;
        tracing::info!(id = %saved.id, name = %saved.name, method = %saved.method, path = %saved.path, "service registered");
        Ok(saved)
    }

    pub async fn lookup(&self, method: &str, path: &str) -> Result<ServiceDefinition, AppError> {
        let method = method.to_ascii_uppercase();
        let path = normalize_path(path);
        self.store
            .find_active(&method, &path)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no service registered for {} {}", method, path)))
    }

    pub async fn list(&self) -> Result<Vec<ServiceDefinition>, AppError> {
        self.store.list_active().await
    }

    pub async fn retire(&self, id: Uuid) -> Result<(), AppError> {
        if self.store.soft_delete(id).await? {
            tracing::info!(%id, "service retired");
            Ok(())
        } else {
            Err(AppError::NotFound(format!("service {}", id)))
        }
    }

    pub async fn ping(&self) -> Result<(), AppError> {
        self.store.ping().await
    }
}

#[derive(sqlx::FromRow)]
struct ServiceRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    method: String,
    path: String,
    sql: String,
    param_keys: Vec<String>,
    param_types: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<ServiceRow> for ServiceDefinition {
    fn from(r: ServiceRow) -> Self {
        ServiceDefinition {
            id: r.id,
            name: r.name,
            description: r.description,
            method: r.method,
            path: r.path,
            sql: r.sql,
            param_keys: r.param_keys,
            param_types: r.param_types,
            created_at: r.created_at,
            updated_at: r.updated_at,
            deleted_at: r.deleted_at,
        }
    }
}

const SERVICE_COLUMNS: &str =
    "id, name, description, method, path, sql, param_keys, param_types, created_at, updated_at, deleted_at";

/// `api_services` in the configured schema.
pub struct PgServiceStore {
    pool: PgPool,
    table: String,
}

impl PgServiceStore {
    pub fn new(pool: PgPool, schema: &str) -> Self {
        PgServiceStore {
            pool,
            table: crate::store::qualified_table(schema, crate::store::SERVICES_TABLE),
        }
    }
}

fn conflict_from(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().as_deref() == Some("23505") {
            let what = match db.constraint() {
                Some(c) if c.ends_with("name_key") => "a service with this name already exists",
                _ => "a service is already registered for this method and path",
            };
            return AppError::Conflict(what.into());
        }
    }
    AppError::Db(err)
}

#[async_trait]
impl ServiceStore for PgServiceStore {
    async fn insert(&self, s: NewService) -> Result<ServiceDefinition, AppError> {
        let sql = format!(
            "INSERT INTO {} (id, name, description, method, path, sql, param_keys, param_types) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            self.table, SERVICE_COLUMNS
        );
        let row: ServiceRow = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(&s.name)
            .bind(&s.description)
            .bind(&s.method)
            .bind(&s.path)
            .bind(&s.sql)
            .bind(&s.param_keys)
            .bind(&s.param_types)
            .fetch_one(&self.pool)
            .await
            .map_err(conflict_from)?;
        Ok(row.into())
    }

    async fn find_active(&self, method: &str, path: &str) -> Result<Option<ServiceDefinition>, AppError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE method = $1 AND path = $2 AND deleted_at IS NULL",
            SERVICE_COLUMNS, self.table
        );
        let row: Option<ServiceRow> = sqlx::query_as(&sql)
            .bind(method)
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn list_active(&self) -> Result<Vec<ServiceDefinition>, AppError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE deleted_at IS NULL ORDER BY created_at, name",
            SERVICE_COLUMNS, self.table
        );
        let rows: Vec<ServiceRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool, AppError> {
        let sql = format!(
            "UPDATE {} SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
            self.table
        );
        let result = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }
}
