//! Audit trail of dynamic executions. One append-only record per attempt; write
//! failures are logged and swallowed.

use crate::error::AppError;
use crate::executor::QueryResult;
use crate::sql::{serialize_args, ArgValue};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct AuditRecord {
    /// Assigned by the store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub path: String,
    pub method: String,
    pub client_ip: String,
    pub sql: String,
    /// JSON array of the bound arguments.
    pub args: String,
    pub duration_ms: i64,
    pub row_count: i64,
    pub truncated: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    /// A record for an attempt that has not bound or run anything yet.
    pub fn attempt(path: &str, method: &str, client_ip: &str, sql: &str) -> Self {
        AuditRecord {
            id: None,
            path: path.to_string(),
            method: method.to_string(),
            client_ip: client_ip.to_string(),
            sql: sql.to_string(),
            args: "[]".into(),
            duration_ms: 0,
            row_count: 0,
            truncated: false,
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_args(&mut self, args: &[ArgValue]) {
        self.args = serialize_args(args);
    }

    pub fn with_duration(&mut self, duration: Duration) {
        self.duration_ms = duration.as_millis() as i64;
    }

    pub fn with_result(&mut self, result: &QueryResult) {
        self.with_duration(result.duration);
        self.row_count = result.row_count as i64;
        self.truncated = result.truncated;
    }

    pub fn with_error(&mut self, err: &AppError) {
        self.error = Some(err.to_string());
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> Result<(), AppError>;
    /// Newest first.
    async fn recent(&self, limit: u32) -> Result<Vec<AuditRecord>, AppError>;
}

pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        AuditLogger { sink }
    }

    /// Best effort: a failed write never reaches the caller.
    pub async fn record(&self, record: AuditRecord) {
        if let Err(e) = self.sink.append(&record).await {
            tracing::error!(
                error = %e,
                path = %record.path,
                method = %record.method,
                "audit write failed"
            );
        }
    }

    pub async fn recent(&self, limit: u32) -> Result<Vec<AuditRecord>, AppError> {
        self.sink.recent(limit).await
    }
}

/// `audits` in the configured schema.
pub struct PgAuditSink {
    pool: PgPool,
    table: String,
}

impl PgAuditSink {
    pub fn new(pool: PgPool, schema: &str) -> Self {
        PgAuditSink {
            pool,
            table: crate::store::qualified_table(schema, crate::store::AUDITS_TABLE),
        }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn append(&self, r: &AuditRecord) -> Result<(), AppError> {
        let sql = format!(
            "INSERT INTO {} (path, method, client_ip, sql, args, duration_ms, row_count, truncated, error, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            self.table
        );
        sqlx::query(&sql)
            .bind(&r.path)
            .bind(&r.method)
            .bind(&r.client_ip)
            .bind(&r.sql)
            .bind(&r.args)
            .bind(r.duration_ms)
            .bind(r.row_count)
            .bind(r.truncated)
            .bind(&r.error)
            .bind(r.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<AuditRecord>, AppError> {
        let sql = format!(
            "SELECT id, path, method, client_ip, sql, args, duration_ms, row_count, truncated, error, created_at \
             FROM {} ORDER BY id DESC LIMIT $1",
            self.table
        );
        let rows: Vec<AuditRecord> = sqlx::query_as(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}
