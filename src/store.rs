//! Database bootstrap: create the target database if needed and the registry, audit and
//! user tables. All of them live in the schema named by `QUERYGATE_SCHEMA` (default `querygate`).

use crate::error::AppError;
use sqlx::ConnectOptions;
use sqlx::PgPool;
use std::str::FromStr;

pub const SERVICES_TABLE: &str = "api_services";
pub const AUDITS_TABLE: &str = "audits";
pub const USERS_TABLE: &str = "users";

/// Schema-qualified table name (e.g. "querygate.api_services").
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", schema, table)
}

/// Idempotent DDL for `api_services`, `audits` and `users`. `schema` must already be a validated identifier.
pub async fn ensure_sys_tables(pool: &PgPool, schema: &str) -> Result<(), AppError> {
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
        .execute(pool)
        .await?;

    let services = qualified_table(schema, SERVICES_TABLE);
    let services_ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            method TEXT NOT NULL,
            path TEXT NOT NULL,
            sql TEXT NOT NULL,
            param_keys TEXT[] NOT NULL DEFAULT '{{}}',
            param_types TEXT[] NOT NULL DEFAULT '{{}}',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            deleted_at TIMESTAMPTZ,
            CONSTRAINT {}_param_arity CHECK (cardinality(param_keys) = cardinality(param_types))
        )
        "#,
        services, SERVICES_TABLE
    );
    sqlx::query(&services_ddl).execute(pool).await?;
    sqlx::query(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {t}_name_key ON {q} (name) WHERE deleted_at IS NULL",
        t = SERVICES_TABLE,
        q = services
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {t}_route_key ON {q} (method, path) WHERE deleted_at IS NULL",
        t = SERVICES_TABLE,
        q = services
    ))
    .execute(pool)
    .await?;

    let audits = qualified_table(schema, AUDITS_TABLE);
    let audits_ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            id BIGSERIAL PRIMARY KEY,
            path TEXT NOT NULL,
            method TEXT NOT NULL,
            client_ip TEXT NOT NULL,
            sql TEXT NOT NULL,
            args TEXT NOT NULL,
            duration_ms BIGINT NOT NULL,
            row_count BIGINT NOT NULL,
            truncated BOOLEAN NOT NULL DEFAULT FALSE,
            error TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        audits
    );
    sqlx::query(&audits_ddl).execute(pool).await?;
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS {t}_path_idx ON {q} (path)",
        t = AUDITS_TABLE,
        q = audits
    ))
    .execute(pool)
    .await?;

    let users = qualified_table(schema, USERS_TABLE);
    let users_ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {} (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            deleted_at TIMESTAMPTZ
        )
        "#,
        users
    );
    sqlx::query(&users_ddl).execute(pool).await?;
    sqlx::query(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {t}_email_key ON {q} (email) WHERE deleted_at IS NULL",
        t = USERS_TABLE,
        q = users
    ))
    .execute(pool)
    .await?;

    Ok(())
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| AppError::Validation(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), AppError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| AppError::Validation("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let (db_name, query) = match path_and_query.split_once('?') {
        Some((name, q)) => (name.trim(), Some(q)),
        None => (path_and_query.trim(), None),
    };
    let base = url.get(..path_start).unwrap_or(url);
    let admin_url = match query {
        Some(q) => format!("{}postgres?{}", base, q),
        None => format!("{}postgres", base),
    };
    Ok((admin_url, db_name.to_string()))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
