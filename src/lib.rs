//! Querygate: named HTTP endpoints backed by parameterized, read-only SQL templates.

pub mod audit;
pub mod binder;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod policy;
pub mod registry;
pub mod response;
pub mod routes;
pub mod settings;
pub mod sql;
pub mod state;
pub mod store;
pub mod users;

pub use audit::{AuditLogger, AuditRecord, AuditSink, PgAuditSink};
pub use binder::{bind_arguments, RawParams, RawValue};
pub use error::AppError;
pub use executor::{FetchedRows, PgQueryStore, QueryExecutor, QueryResult, QueryStore, StoreError};
pub use policy::{classify, Verdict};
pub use registry::{NewService, PgServiceStore, RegisterRequest, Registry, ServiceDefinition, ServiceStore};
pub use response::ApiResponse;
pub use routes::app;
pub use settings::{AppConfig, QueryLimits};
pub use sql::ArgValue;
pub use state::AppState;
pub use store::{ensure_database_exists, ensure_sys_tables};
pub use users::{PgUserStore, User, UserDirectory, UserFields, UserInput, UserStore};
