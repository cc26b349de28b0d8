//! Dynamic service handlers: registration and execution.
//!
//! Execution flow: registry lookup, policy check, parameter binding, execution,
//! audit. Every attempt that gets past the lookup leaves one audit record.

use crate::audit::AuditRecord;
use crate::binder::{bind_arguments, RawParams};
use crate::error::AppError;
use crate::policy::{classify, Verdict};
use crate::registry::{normalize_path, RegisterRequest, ServiceDefinition};
use crate::response::{created, success};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, RawQuery, State};
use axum::http::{HeaderMap, Method};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Instant;

/// POST /api/v1/dynamic/register
pub async fn register(State(state): State<AppState>, body: Bytes) -> Result<impl IntoResponse, AppError> {
    let req: RegisterRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!(error = %e, "rejecting registration payload");
        AppError::Validation(
            "invalid registration payload: expected name, path and sql strings with optional \
             method, description, param_keys and param_types"
                .into(),
        )
    })?;
    let service = state.registry.register(req).await?;
    Ok(created("service registered", service))
}

#[derive(Debug, Serialize)]
pub struct ExecutionData {
    pub rows: Vec<serde_json::Value>,
    pub rows_returned: usize,
    pub row_count: u64,
    pub truncated: bool,
    pub duration_ms: u64,
}

/// ANY /api/v1/dynamic/*path
pub async fn execute(
    State(state): State<AppState>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    body: Bytes,
) -> Result<Response, AppError> {
    let path = normalize_path(&path);
    let service = state.registry.lookup(method.as_str(), &path).await?;
    let client_ip = client_addr(&headers, peer.map(|ConnectInfo(addr)| addr));

    let mut record = AuditRecord::attempt(&service.path, &service.method, &client_ip, &service.sql);
    let outcome = run(&state, &service, &method, query.as_deref(), &body, &mut record).await;
    if let Err(e) = &outcome {
        record.with_error(e);
    }
    state.audit.record(record).await;

    let data = outcome?;
    let message = if data.truncated {
        format!("query succeeded; result limited to {} rows", data.rows_returned)
    } else {
        "query succeeded".to_string()
    };
    Ok(success(message, data).into_response())
}

async fn run(
    state: &AppState,
    service: &ServiceDefinition,
    method: &Method,
    query: Option<&str>,
    body: &[u8],
    record: &mut AuditRecord,
) -> Result<ExecutionData, AppError> {
    if let Verdict::Denied(statement_type) = classify(&service.sql) {
        tracing::warn!(
            path = %service.path,
            method = %service.method,
            sql = %service.sql,
            statement_type = %statement_type,
            "blocked non-read-only dynamic statement"
        );
        return Err(AppError::PolicyDenied { statement_type });
    }

    let raw = if service.param_keys.is_empty() {
        RawParams::default()
    } else {
        RawParams::from_request(method, query, body)?
    };
    let args = bind_arguments(&service.param_keys, &service.param_types, &raw)?;
    record.with_args(&args);

    tracing::info!(path = %service.path, method = %service.method, sql = %service.sql, args = ?args, "executing dynamic service");
    let start = Instant::now();
    let result = match state.executor.execute(&service.sql, &args).await {
        Ok(result) => result,
        Err(e) => {
            record.with_duration(start.elapsed());
            if let AppError::Timeout { deadline_ms } = &e {
                tracing::warn!(path = %service.path, deadline_ms, "dynamic statement timed out");
            }
            return Err(e);
        }
    };
    record.with_result(&result);

    Ok(ExecutionData {
        rows_returned: result.rows.len(),
        row_count: result.row_count,
        truncated: result.truncated,
        duration_ms: result.duration.as_millis() as u64,
        rows: result.rows,
    })
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer.
pub fn client_addr(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
    };
    header("x-forwarded-for")
        .or_else(|| header("x-real-ip"))
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".into())
}
