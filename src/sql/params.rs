//! Typed argument values produced by the binder and bound to sqlx queries.

use serde::Serialize;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;

/// One coerced argument, in placeholder order.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArgValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

/// Bind every argument with its own Postgres type, in order.
pub fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    args: &'q [ArgValue],
) -> Query<'q, Postgres, PgArguments> {
    for arg in args {
        query = match arg {
            ArgValue::Int(n) => query.bind(*n),
            ArgValue::Float(n) => query.bind(*n),
            ArgValue::Bool(b) => query.bind(*b),
            ArgValue::Text(s) => query.bind(s.as_str()),
        };
    }
    query
}

/// JSON text of the argument list, as stored in audit records.
pub fn serialize_args(args: &[ArgValue]) -> String {
    serde_json::to_string(args).unwrap_or_else(|_| "[]".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_serialize_as_plain_json_values() {
        let args = vec![
            ArgValue::Int(7),
            ArgValue::Float(2.5),
            ArgValue::Bool(true),
            ArgValue::Text("x".into()),
        ];
        assert_eq!(serialize_args(&args), r#"[7,2.5,true,"x"]"#);
        assert_eq!(serialize_args(&[]), "[]");
    }
}
