//! Process settings from environment variables (optionally seeded from `.env`).

use crate::error::AppError;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

pub const DEFAULT_ROW_CAP: usize = 1000;
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(5);
pub const DEFAULT_SCHEMA: &str = "querygate";
/// Longest deadline Postgres accepts for `statement_timeout` (int4 milliseconds).
pub const MAX_DEADLINE: Duration = Duration::from_millis(i32::MAX as u64);

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("identifier pattern compiles"));

/// Bounds applied to every dynamic execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueryLimits {
    pub row_cap: usize,
    pub deadline: Duration,
}

impl Default for QueryLimits {
    fn default() -> Self {
        QueryLimits {
            row_cap: DEFAULT_ROW_CAP,
            deadline: DEFAULT_DEADLINE,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    /// Schema holding `api_services` and `audits`.
    pub schema: String,
    pub max_connections: u32,
    pub limits: QueryLimits,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = match get("DATABASE_URL") {
            Some(url) => url,
            None => {
                let user = get("DB_USER").unwrap_or_else(|| "postgres".into());
                let pass = get("DB_PASS").unwrap_or_default();
                let host = get("DB_HOST").unwrap_or_else(|| "localhost".into());
                let port = get("DB_PORT").unwrap_or_else(|| "5432".into());
                let name = get("DB_NAME").unwrap_or_else(|| DEFAULT_SCHEMA.into());
                let auth = if pass.is_empty() { user } else { format!("{}:{}", user, pass) };
                format!("postgres://{}@{}:{}/{}", auth, host, port, name)
            }
        };

        let bind_addr = get("BIND_ADDR").unwrap_or_else(|| {
            let port = get("APP_PORT").unwrap_or_else(|| "8080".into());
            format!("0.0.0.0:{}", port)
        });

        let schema = get("QUERYGATE_SCHEMA").unwrap_or_else(|| DEFAULT_SCHEMA.into());
        validate_identifier(&schema)?;

        let max_connections = positive(&get, "DB_MAX_CONNECTIONS")
            .and_then(|n| match u32::try_from(n) {
                Ok(n) => Some(n),
                Err(_) => {
                    tracing::warn!(value = n, "DB_MAX_CONNECTIONS out of range; using default");
                    None
                }
            })
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);

        let row_cap = positive(&get, "DYNAMIC_MAX_ROWS")
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_ROW_CAP);
        let deadline = positive(&get, "DYNAMIC_QUERY_TIMEOUT_MS")
            .map(Duration::from_millis)
            .or_else(|| positive(&get, "DYNAMIC_QUERY_TIMEOUT_SECONDS").map(Duration::from_secs))
            .unwrap_or(DEFAULT_DEADLINE);
        let deadline = if deadline > MAX_DEADLINE {
            tracing::warn!(
                requested_ms = deadline.as_millis() as u64,
                max_ms = MAX_DEADLINE.as_millis() as u64,
                "query deadline above the Postgres limit; clamping"
            );
            MAX_DEADLINE
        } else {
            deadline
        };

        Ok(AppConfig {
            database_url,
            bind_addr,
            schema,
            max_connections,
            limits: QueryLimits { row_cap, deadline },
        })
    }
}

/// Reads a positive integer override; anything else keeps the default.
fn positive<G>(get: &G, key: &str) -> Option<u64>
where
    G: Fn(&str) -> Option<String>,
{
    let raw = get(key)?;
    match raw.parse::<u64>() {
        Ok(n) if n > 0 => Some(n),
        _ => {
            tracing::warn!(key, value = %raw, "ignoring invalid override; using default");
            None
        }
    }
}

/// Schema names are interpolated into DDL, so only plain identifiers are accepted.
pub fn validate_identifier(name: &str) -> Result<(), AppError> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(AppError::Validation(format!("invalid schema name: {}", name)))
    }
}
