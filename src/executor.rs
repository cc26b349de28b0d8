//! Query executor: runs a bound statement under a deadline and row cap.

use crate::error::AppError;
use crate::settings::QueryLimits;
use crate::sql::{bind_all, numbered_placeholders, row_to_json, ArgValue};
use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// SQLSTATE for a statement cancelled by `statement_timeout`.
const QUERY_CANCELED: &str = "57014";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("statement cancelled at deadline")]
    Timeout,
    #[error("{0}")]
    Fault(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(QUERY_CANCELED) => StoreError::Timeout,
            _ => StoreError::Fault(err.to_string()),
        }
    }
}

/// Rows as fetched from the store. `rows` holds at most the requested cap;
/// `total` counts every row the statement produced.
#[derive(Debug, Default)]
pub struct FetchedRows {
    pub rows: Vec<Value>,
    pub total: u64,
}

/// The relational store behind dynamic execution. Implementations must stop
/// work when the returned future is dropped.
#[async_trait]
pub trait QueryStore: Send + Sync {
    async fn fetch(
        &self,
        sql: &str,
        args: &[ArgValue],
        row_cap: usize,
        deadline: Duration,
    ) -> Result<FetchedRows, StoreError>;
}

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub rows: Vec<Value>,
    pub row_count: u64,
    pub truncated: bool,
    pub duration: Duration,
}

pub struct QueryExecutor {
    store: Arc<dyn QueryStore>,
    limits: QueryLimits,
}

impl QueryExecutor {
    pub fn new(store: Arc<dyn QueryStore>, limits: QueryLimits) -> Self {
        QueryExecutor { store, limits }
    }

    /// Execute with the configured deadline and row cap.
    pub async fn execute(&self, sql: &str, args: &[ArgValue]) -> Result<QueryResult, AppError> {
        self.execute_with(sql, args, self.limits.deadline, self.limits.row_cap).await
    }

    /// The store future is dropped when the deadline passes, which cancels the in-flight query.
    pub async fn execute_with(
        &self,
        sql: &str,
        args: &[ArgValue],
        deadline: Duration,
        row_cap: usize,
    ) -> Result<QueryResult, AppError> {
        let deadline_ms = deadline.as_millis() as u64;
        let start = Instant::now();
        tracing::debug!(sql = %sql, args = ?args, deadline_ms, row_cap, "executing dynamic statement");

        let fetched = match tokio::time::timeout(deadline, self.store.fetch(sql, args, row_cap, deadline)).await {
            Err(_elapsed) => return Err(AppError::Timeout { deadline_ms }),
            Ok(Err(StoreError::Timeout)) => return Err(AppError::Timeout { deadline_ms }),
            Ok(Err(StoreError::Fault(msg))) => return Err(AppError::Execution(msg)),
            Ok(Ok(fetched)) => fetched,
        };

        let mut rows = fetched.rows;
        let row_count = fetched.total.max(rows.len() as u64);
        let truncated = row_count > row_cap as u64;
        rows.truncate(row_cap);

        Ok(QueryResult {
            rows,
            row_count,
            truncated,
            duration: start.elapsed(),
        })
    }
}

/// `statement_timeout` is an int4 number of milliseconds; zero would disable it.
fn statement_timeout_ms(deadline: Duration) -> u128 {
    deadline.as_millis().clamp(1, i32::MAX as u128)
}

/// Runs each statement in its own transaction with `statement_timeout` set to the
/// deadline, so the server aborts the statement even if the client has gone away.
pub struct PgQueryStore {
    pool: PgPool,
}

impl PgQueryStore {
    pub fn new(pool: PgPool) -> Self {
        PgQueryStore { pool }
    }
}

#[async_trait]
impl QueryStore for PgQueryStore {
    async fn fetch(
        &self,
        sql: &str,
        args: &[ArgValue],
        row_cap: usize,
        deadline: Duration,
    ) -> Result<FetchedRows, StoreError> {
        let sql = numbered_placeholders(sql);
        let timeout_ms = statement_timeout_ms(deadline);

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("SET LOCAL statement_timeout = {}", timeout_ms))
            .execute(&mut *tx)
            .await?;

        let mut out = FetchedRows::default();
        {
            let query = bind_all(sqlx::query(sql.as_ref()), args);
            let mut stream = query.fetch(&mut *tx);
            while let Some(row) = stream.try_next().await? {
                out.total += 1;
                if out.rows.len() < row_cap {
                    out.rows.push(row_to_json(&row));
                }
            }
        }
        tx.commit().await?;
        Ok(out)
    }
}
