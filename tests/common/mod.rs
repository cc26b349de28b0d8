//! In-memory stores for driving the router without a database.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use querygate::{
    app, AppError, AppState, ArgValue, AuditRecord, AuditSink, FetchedRows, NewService, QueryLimits, QueryStore,
    ServiceDefinition, ServiceStore, StoreError, User, UserFields, UserStore,
};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryServices(Mutex<Vec<ServiceDefinition>>);

impl MemoryServices {
    pub fn active(&self) -> Vec<ServiceDefinition> {
        self.0.lock().unwrap().iter().filter(|r| r.deleted_at.is_none()).cloned().collect()
    }
}

#[async_trait]
impl ServiceStore for MemoryServices {
    async fn insert(&self, s: NewService) -> Result<ServiceDefinition, AppError> {
        let mut rows = self.0.lock().unwrap();
        let active = rows.iter().filter(|r| r.deleted_at.is_none());
        for r in active {
            if r.name == s.name {
                return Err(AppError::Conflict("a service with this name already exists".into()));
            }
            if r.method == s.method && r.path == s.path {
                return Err(AppError::Conflict(
                    "a service is already registered for this method and path".into(),
                ));
            }
        }
        let now = Utc::now();
        let def = ServiceDefinition {
            id: Uuid::new_v4(),
            name: s.name,
            description: s.description,
            method: s.method,
            path: s.path,
            sql: s.sql,
            param_keys: s.param_keys,
            param_types: s.param_types,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        rows.push(def.clone());
        Ok(def)
    }

    async fn find_active(&self, method: &str, path: &str) -> Result<Option<ServiceDefinition>, AppError> {
        Ok(self
            .0
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.deleted_at.is_none() && r.method == method && r.path == path)
            .cloned())
    }

    async fn list_active(&self) -> Result<Vec<ServiceDefinition>, AppError> {
        Ok(self.0.lock().unwrap().iter().filter(|r| r.deleted_at.is_none()).cloned().collect())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool, AppError> {
        let mut rows = self.0.lock().unwrap();
        match rows.iter_mut().find(|r| r.id == id && r.deleted_at.is_none()) {
            Some(r) => {
                r.deleted_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

/// A canned table: every call returns `rows`, optionally after `delay`.
#[derive(Default)]
pub struct CannedQueries {
    pub rows: Vec<Value>,
    pub delay: Option<Duration>,
    pub fault: Option<String>,
    pub calls: Mutex<Vec<(String, Vec<ArgValue>)>>,
}

impl CannedQueries {
    pub fn returning(rows: Vec<Value>) -> Self {
        CannedQueries { rows, ..Default::default() }
    }

    pub fn calls(&self) -> Vec<(String, Vec<ArgValue>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryStore for CannedQueries {
    async fn fetch(
        &self,
        sql: &str,
        args: &[ArgValue],
        row_cap: usize,
        _deadline: Duration,
    ) -> Result<FetchedRows, StoreError> {
        self.calls.lock().unwrap().push((sql.to_string(), args.to_vec()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(fault) = &self.fault {
            return Err(StoreError::Fault(fault.clone()));
        }
        Ok(FetchedRows {
            rows: self.rows.iter().take(row_cap).cloned().collect(),
            total: self.rows.len() as u64,
        })
    }
}

#[derive(Default)]
pub struct MemoryAudits {
    pub records: Mutex<Vec<AuditRecord>>,
    pub failing: bool,
}

impl MemoryAudits {
    pub fn failing() -> Self {
        MemoryAudits { failing: true, ..Default::default() }
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAudits {
    async fn append(&self, record: &AuditRecord) -> Result<(), AppError> {
        if self.failing {
            return Err(AppError::Db(sqlx::Error::PoolTimedOut));
        }
        let mut records = self.records.lock().unwrap();
        let mut stored = record.clone();
        stored.id = Some(records.len() as i64 + 1);
        records.push(stored);
        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<AuditRecord>, AppError> {
        Ok(self.records.lock().unwrap().iter().rev().take(limit as usize).cloned().collect())
    }
}

/// Users keyed by sequential id; `deleted` rows are kept but hidden.
#[derive(Default)]
pub struct MemoryUsers(Mutex<Vec<(User, bool)>>);

impl MemoryUsers {
    fn email_taken(rows: &[(User, bool)], email: &str, except: Option<i64>) -> bool {
        rows.iter()
            .any(|(u, deleted)| !deleted && u.email == email && Some(u.id) != except)
    }
}

#[async_trait]
impl UserStore for MemoryUsers {
    async fn create(&self, fields: UserFields) -> Result<User, AppError> {
        let mut rows = self.0.lock().unwrap();
        if Self::email_taken(&rows, &fields.email, None) {
            return Err(AppError::Conflict("a user with this email already exists".into()));
        }
        let now = Utc::now();
        let user = User {
            id: rows.len() as i64 + 1,
            name: fields.name,
            email: fields.email,
            created_at: now,
            updated_at: now,
        };
        rows.push((user.clone(), false));
        Ok(user)
    }

    async fn list(&self) -> Result<Vec<User>, AppError> {
        Ok(self.0.lock().unwrap().iter().filter(|(_, d)| !d).map(|(u, _)| u.clone()).collect())
    }

    async fn get(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self
            .0
            .lock()
            .unwrap()
            .iter()
            .find(|(u, d)| !d && u.id == id)
            .map(|(u, _)| u.clone()))
    }

    async fn update(&self, id: i64, fields: UserFields) -> Result<Option<User>, AppError> {
        let mut rows = self.0.lock().unwrap();
        if Self::email_taken(&rows, &fields.email, Some(id)) {
            return Err(AppError::Conflict("a user with this email already exists".into()));
        }
        Ok(rows.iter_mut().find(|(u, d)| !d && u.id == id).map(|(u, _)| {
            u.name = fields.name;
            u.email = fields.email;
            u.updated_at = Utc::now();
            u.clone()
        }))
    }

    async fn soft_delete(&self, id: i64) -> Result<bool, AppError> {
        let mut rows = self.0.lock().unwrap();
        match rows.iter_mut().find(|(u, d)| !*d && u.id == id) {
            Some((_, deleted)) => {
                *deleted = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

pub struct TestApp {
    pub router: axum::Router,
    pub services: Arc<MemoryServices>,
    pub queries: Arc<CannedQueries>,
    pub audits: Arc<MemoryAudits>,
    pub users: Arc<MemoryUsers>,
}

impl TestApp {
    pub fn new(queries: CannedQueries, limits: QueryLimits) -> Self {
        Self::with_audits(queries, MemoryAudits::default(), limits)
    }

    pub fn with_audits(queries: CannedQueries, audits: MemoryAudits, limits: QueryLimits) -> Self {
        let services = Arc::new(MemoryServices::default());
        let queries = Arc::new(queries);
        let audits = Arc::new(audits);
        let users = Arc::new(MemoryUsers::default());
        let state = AppState::new(services.clone(), queries.clone(), audits.clone(), users.clone(), limits);
        TestApp {
            router: app(state),
            services,
            queries,
            audits,
            users,
        }
    }

    pub async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(v) => builder
                .header("content-type", "application/json")
                .body(Body::from(v.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Sends `request` as built and returns status, headers and the raw body.
    pub async fn send_raw(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, bytes.to_vec())
    }

    pub async fn register(&self, payload: Value) -> (StatusCode, Value) {
        self.send("POST", "/api/v1/dynamic/register", Some(payload)).await
    }
}
