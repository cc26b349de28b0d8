//! Shared application state for all routes. Built once at startup around one store pool.

use crate::audit::{AuditLogger, AuditSink, PgAuditSink};
use crate::executor::{PgQueryStore, QueryExecutor, QueryStore};
use crate::registry::{PgServiceStore, Registry, ServiceStore};
use crate::settings::QueryLimits;
use crate::users::{PgUserStore, UserDirectory, UserStore};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub executor: Arc<QueryExecutor>,
    pub audit: Arc<AuditLogger>,
    pub users: Arc<UserDirectory>,
}

impl AppState {
    pub fn new(
        services: Arc<dyn ServiceStore>,
        queries: Arc<dyn QueryStore>,
        audits: Arc<dyn AuditSink>,
        users: Arc<dyn UserStore>,
        limits: QueryLimits,
    ) -> Self {
        AppState {
            registry: Arc::new(Registry::new(services)),
            executor: Arc::new(QueryExecutor::new(queries, limits)),
            audit: Arc::new(AuditLogger::new(audits)),
            users: Arc::new(UserDirectory::new(users)),
        }
    }

    /// Every component shares the same pool.
    pub fn postgres(pool: PgPool, schema: &str, limits: QueryLimits) -> Self {
        Self::new(
            Arc::new(PgServiceStore::new(pool.clone(), schema)),
            Arc::new(PgQueryStore::new(pool.clone())),
            Arc::new(PgAuditSink::new(pool.clone(), schema)),
            Arc::new(PgUserStore::new(pool, schema)),
            limits,
        )
    }
}
