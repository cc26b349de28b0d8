//! Typed errors and HTTP mapping.

use crate::response::ApiResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Business code for a statement blocked by the read-only policy.
pub const CODE_POLICY_DENIED: i32 = 1;
/// Business code for a statement aborted at its deadline.
pub const CODE_TIMEOUT: i32 = 2;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("missing parameter: {0}")]
    MissingParameter(String),
    #[error("parameter '{key}' cannot be converted to '{expected}': {value:?}")]
    TypeCoercion {
        key: String,
        expected: String,
        value: String,
    },
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("statement type {statement_type:?} is not permitted")]
    PolicyDenied { statement_type: String },
    #[error("query exceeded its deadline of {deadline_ms}ms")]
    Timeout { deadline_ms: u64 },
    #[error("execution: {0}")]
    Execution(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("internal: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status and stable business code.
    pub fn status_and_code(&self) -> (StatusCode, i32) {
        match self {
            AppError::PolicyDenied { .. } => (StatusCode::OK, CODE_POLICY_DENIED),
            AppError::Timeout { .. } => (StatusCode::OK, CODE_TIMEOUT),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, 40000),
            AppError::MissingParameter(_) => (StatusCode::BAD_REQUEST, 40001),
            AppError::TypeCoercion { .. } => (StatusCode::BAD_REQUEST, 40002),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, 40003),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, 40400),
            AppError::Conflict(_) => (StatusCode::CONFLICT, 40900),
            AppError::Execution(_) => (StatusCode::INTERNAL_SERVER_ERROR, 50000),
            AppError::Db(sqlx::Error::RowNotFound) => (StatusCode::NOT_FOUND, 40400),
            AppError::Db(_) => (StatusCode::INTERNAL_SERVER_ERROR, 50001),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, 50002),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::Conflict(_) => "conflict",
            AppError::NotFound(_) => "not_found",
            AppError::MissingParameter(_) => "missing_parameter",
            AppError::TypeCoercion { .. } => "type_coercion",
            AppError::BadRequest(_) => "bad_request",
            AppError::PolicyDenied { .. } => "policy_denied",
            AppError::Timeout { .. } => "timeout",
            AppError::Execution(_) => "execution_error",
            AppError::Db(_) => "database_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Caller-facing message. Storage and driver diagnostics stay in the logs.
    fn public_message(&self) -> String {
        match self {
            AppError::Execution(_) => "query execution failed".into(),
            AppError::Db(sqlx::Error::RowNotFound) => "not found".into(),
            AppError::Db(_) => "storage failure".into(),
            AppError::Internal(_) => "service definition is misconfigured".into(),
            AppError::PolicyDenied { .. } => format!(
                "only read-only statements ({}) may be executed; the statement was blocked",
                crate::policy::READ_ONLY_KEYWORDS.join(", ")
            ),
            AppError::Timeout { .. } => "query timed out and was cancelled".into(),
            other => other.to_string(),
        }
    }

    fn details(&self) -> serde_json::Value {
        let kind = self.kind();
        match self {
            AppError::MissingParameter(key) => json!({ "kind": kind, "key": key }),
            AppError::TypeCoercion { key, expected, value } => json!({
                "kind": kind,
                "key": key,
                "expected_type": expected,
                "value": value,
            }),
            AppError::PolicyDenied { statement_type } => json!({
                "kind": kind,
                "sql_statement_type": statement_type,
            }),
            AppError::Timeout { deadline_ms } => json!({ "kind": kind, "deadline_ms": deadline_ms }),
            _ => json!({ "kind": kind }),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code, "request failed");
        }
        let body = ApiResponse {
            code,
            message: self.public_message(),
            data: self.details(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declined_operations_ride_on_http_ok() {
        let denied = AppError::PolicyDenied { statement_type: "DELETE".into() };
        assert_eq!(denied.status_and_code(), (StatusCode::OK, CODE_POLICY_DENIED));
        let timeout = AppError::Timeout { deadline_ms: 5 };
        assert_eq!(timeout.status_and_code(), (StatusCode::OK, CODE_TIMEOUT));
    }

    #[test]
    fn driver_diagnostics_are_not_echoed() {
        let err = AppError::Execution("relation \"secret_table\" does not exist".into());
        assert_eq!(err.public_message(), "query execution failed");
        assert_eq!(err.details()["kind"], "execution_error");
    }

    #[test]
    fn coercion_details_name_the_parameter() {
        let err = AppError::TypeCoercion {
            key: "id".into(),
            expected: "int".into(),
            value: "abc".into(),
        };
        let details = err.details();
        assert_eq!(details["key"], "id");
        assert_eq!(details["expected_type"], "int");
        assert_eq!(details["value"], "abc");
        assert_eq!(err.status_and_code().0, StatusCode::BAD_REQUEST);
    }
}
