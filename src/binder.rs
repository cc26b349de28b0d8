//! Parameter binding: pull declared keys out of a request and coerce them to their
//! declared types, in declared order.

use crate::error::AppError;
use crate::sql::ArgValue;
use axum::http::Method;
use serde_json::Value;
use std::collections::HashMap;

/// A request parameter as decoded from the query string or JSON body.
#[derive(Clone, Debug, PartialEq)]
pub enum RawValue {
    String(String),
    Number(serde_json::Number),
    Boolean(bool),
    Null,
}

impl RawValue {
    /// Nested arrays and objects arrive as their compact JSON text.
    pub fn from_json(v: Value) -> Self {
        match v {
            Value::String(s) => RawValue::String(s),
            Value::Number(n) => RawValue::Number(n),
            Value::Bool(b) => RawValue::Boolean(b),
            Value::Null => RawValue::Null,
            nested @ (Value::Array(_) | Value::Object(_)) => RawValue::String(nested.to_string()),
        }
    }

    /// Text form fed to type coercion. Numbers keep every digit and never use exponents.
    pub fn canonical_text(&self) -> String {
        match self {
            RawValue::String(s) => s.clone(),
            RawValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    i.to_string()
                } else if let Some(u) = n.as_u64() {
                    u.to_string()
                } else if let Some(f) = n.as_f64() {
                    // f64 Display is shortest round-trip and never scientific.
                    f.to_string()
                } else {
                    n.to_string()
                }
            }
            RawValue::Boolean(b) => b.to_string(),
            RawValue::Null => "null".into(),
        }
    }
}

/// Raw parameter source for one request.
#[derive(Clone, Debug, Default)]
pub struct RawParams(HashMap<String, RawValue>);

impl RawParams {
    /// Query-string parameters; when a key repeats, the first value wins.
    pub fn from_query(query: Option<&str>) -> Result<Self, AppError> {
        let mut map = HashMap::new();
        let Some(query) = query.filter(|q| !q.is_empty()) else {
            return Ok(RawParams(map));
        };
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
            .map_err(|e| {
                tracing::debug!(error = %e, "rejecting malformed query string");
                AppError::BadRequest("malformed query string".into())
            })?;
        for (key, value) in pairs {
            map.entry(key).or_insert(RawValue::String(value));
        }
        Ok(RawParams(map))
    }

    /// Top-level members of a JSON object body. An empty body is an empty source.
    pub fn from_json_body(body: &[u8]) -> Result<Self, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(RawParams::default());
        }
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| {
                tracing::debug!(error = %e, "rejecting malformed request body");
                AppError::BadRequest("request body is not valid JSON".into())
            })?;
        match value {
            Value::Object(obj) => Ok(RawParams(
                obj.into_iter().map(|(k, v)| (k, RawValue::from_json(v))).collect(),
            )),
            _ => Err(AppError::BadRequest("request body must be a JSON object".into())),
        }
    }

    /// Body-bearing methods read the JSON body; everything else reads the query string.
    pub fn from_request(method: &Method, query: Option<&str>, body: &[u8]) -> Result<Self, AppError> {
        if carries_body(method) {
            Self::from_json_body(body)
        } else {
            Self::from_query(query)
        }
    }

    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.0.get(key)
    }
}

fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamType {
    Int,
    Float,
    Bool,
    String,
}

impl ParamType {
    /// `None` for empty or unrecognized declarations.
    pub fn from_declared(declared: &str) -> Option<Self> {
        match declared.trim().to_ascii_lowercase().as_str() {
            "int" | "int64" => Some(ParamType::Int),
            "float" | "float64" => Some(ParamType::Float),
            "bool" => Some(ParamType::Bool),
            "string" => Some(ParamType::String),
            _ => None,
        }
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Some(true),
        "0" | "f" | "false" => Some(false),
        _ => None,
    }
}

/// Coerce one raw value to its declared type.
pub fn coerce(key: &str, declared: &str, raw: &RawValue) -> Result<ArgValue, AppError> {
    let text = raw.canonical_text();
    let mismatch = || AppError::TypeCoercion {
        key: key.to_string(),
        expected: declared.trim().to_ascii_lowercase(),
        value: text.clone(),
    };
    let ty = ParamType::from_declared(declared).unwrap_or_else(|| {
        tracing::warn!(key, declared_type = %declared, "unknown parameter type; binding as string");
        ParamType::String
    });
    match ty {
        ParamType::Int => text.parse::<i64>().map(ArgValue::Int).map_err(|_| mismatch()),
        ParamType::Float => text.parse::<f64>().map(ArgValue::Float).map_err(|_| mismatch()),
        ParamType::Bool => parse_bool(&text).map(ArgValue::Bool).ok_or_else(mismatch),
        ParamType::String => Ok(ArgValue::Text(text)),
    }
}

/// Build the argument list for a template. Position `i` always holds the value of
/// `keys[i]`; the request's own key order is never consulted.
pub fn bind_arguments(keys: &[String], types: &[String], raw: &RawParams) -> Result<Vec<ArgValue>, AppError> {
    if keys.len() != types.len() {
        return Err(AppError::Internal(format!(
            "{} parameter keys but {} parameter types",
            keys.len(),
            types.len()
        )));
    }
    keys.iter()
        .zip(types)
        .map(|(key, declared)| {
            let value = raw
                .get(key)
                .ok_or_else(|| AppError::MissingParameter(key.clone()))?;
            coerce(key, declared, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn body(v: Value) -> RawParams {
        RawParams::from_json_body(v.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn numbers_render_without_exponent_or_precision_loss() {
        let n = |v: Value| RawValue::from_json(v).canonical_text();
        assert_eq!(n(json!(42)), "42");
        assert_eq!(n(json!(-7)), "-7");
        assert_eq!(n(json!(18446744073709551615u64)), "18446744073709551615");
        assert_eq!(n(json!(1.5)), "1.5");
        assert_eq!(n(json!(1e21)), "1000000000000000000000");
        assert_eq!(n(json!(0.0000001)), "0.0000001");
        assert_eq!(n(json!(3.0)), "3");
    }

    #[test]
    fn booleans_strings_and_nested_values_render_as_text() {
        assert_eq!(RawValue::from_json(json!(true)).canonical_text(), "true");
        assert_eq!(RawValue::from_json(json!("abc")).canonical_text(), "abc");
        assert_eq!(RawValue::from_json(json!([1, 2])).canonical_text(), "[1,2]");
        assert_eq!(RawValue::Null.canonical_text(), "null");
    }

    #[test]
    fn declared_types_coerce() {
        let s = |v: &str| RawValue::String(v.into());
        assert_eq!(coerce("a", "int", &s("12")).unwrap(), ArgValue::Int(12));
        assert_eq!(coerce("a", "INT64", &s("-3")).unwrap(), ArgValue::Int(-3));
        assert_eq!(coerce("a", "float", &s("2.25")).unwrap(), ArgValue::Float(2.25));
        assert_eq!(coerce("a", "float64", &s("4")).unwrap(), ArgValue::Float(4.0));
        assert_eq!(coerce("a", "string", &s("x y")).unwrap(), ArgValue::Text("x y".into()));
        assert_eq!(
            coerce("a", "int", &RawValue::from_json(json!(5.0))).unwrap(),
            ArgValue::Int(5)
        );
    }

    #[test]
    fn bool_accepts_the_short_and_long_forms() {
        for (text, expected) in [
            ("1", true),
            ("0", false),
            ("t", true),
            ("F", false),
            ("TRUE", true),
            ("False", false),
        ] {
            let got = coerce("flag", "bool", &RawValue::String(text.into())).unwrap();
            assert_eq!(got, ArgValue::Bool(expected), "{}", text);
        }
        assert!(coerce("flag", "bool", &RawValue::String("yes".into())).is_err());
        assert_eq!(
            coerce("flag", "bool", &RawValue::Boolean(false)).unwrap(),
            ArgValue::Bool(false)
        );
    }

    #[test]
    fn unknown_or_empty_types_bind_as_text() {
        let raw = RawValue::from_json(json!(10));
        assert_eq!(coerce("a", "uuid", &raw).unwrap(), ArgValue::Text("10".into()));
        assert_eq!(coerce("a", "", &raw).unwrap(), ArgValue::Text("10".into()));
    }

    #[test]
    fn failed_coercion_reports_key_type_and_value() {
        let err = coerce("id", "Int", &RawValue::String("abc".into())).unwrap_err();
        match err {
            AppError::TypeCoercion { key, expected, value } => {
                assert_eq!(key, "id");
                assert_eq!(expected, "int");
                assert_eq!(value, "abc");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn argument_order_follows_declaration_not_body() {
        let keys = strings(&["a", "b"]);
        let types = strings(&["int", "string"]);
        let raw = body(json!({ "b": "second", "a": 1 }));
        let args = bind_arguments(&keys, &types, &raw).unwrap();
        assert_eq!(args, vec![ArgValue::Int(1), ArgValue::Text("second".into())]);

        let reversed = strings(&["b", "a"]);
        let reversed_types = strings(&["string", "int"]);
        let args = bind_arguments(&reversed, &reversed_types, &raw).unwrap();
        assert_eq!(args, vec![ArgValue::Text("second".into()), ArgValue::Int(1)]);
    }

    #[test]
    fn missing_key_aborts_binding() {
        let raw = body(json!({ "a": 1 }));
        let err = bind_arguments(&strings(&["a", "b"]), &strings(&["int", "int"]), &raw).unwrap_err();
        assert!(matches!(err, AppError::MissingParameter(k) if k == "b"));
    }

    #[test]
    fn one_bad_value_fails_the_whole_list() {
        let raw = body(json!({ "a": 1, "b": "nope" }));
        let err = bind_arguments(&strings(&["a", "b"]), &strings(&["int", "int"]), &raw).unwrap_err();
        assert!(matches!(err, AppError::TypeCoercion { .. }));
    }

    #[test]
    fn mismatched_lists_are_rejected() {
        let err = bind_arguments(&strings(&["a"]), &[], &RawParams::default()).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn query_string_keeps_first_value() {
        let raw = RawParams::from_query(Some("id=1&id=2&name=a%20b")).unwrap();
        assert_eq!(raw.get("id"), Some(&RawValue::String("1".into())));
        assert_eq!(raw.get("name"), Some(&RawValue::String("a b".into())));
        assert!(RawParams::from_query(None).unwrap().get("id").is_none());
    }

    #[test]
    fn body_must_be_an_object() {
        assert!(RawParams::from_json_body(b"").unwrap().get("x").is_none());
        assert!(matches!(
            RawParams::from_json_body(b"[1,2]"),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            RawParams::from_json_body(b"{not json"),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn source_depends_on_method() {
        let from_get = RawParams::from_request(&Method::GET, Some("id=1"), br#"{"id": 2}"#).unwrap();
        assert_eq!(from_get.get("id"), Some(&RawValue::String("1".into())));
        let from_post = RawParams::from_request(&Method::POST, Some("id=1"), br#"{"id": 2}"#).unwrap();
        assert_eq!(from_post.get("id"), Some(&RawValue::Number(2.into())));
        let from_head = RawParams::from_request(&Method::HEAD, Some("id=3"), b"").unwrap();
        assert_eq!(from_head.get("id"), Some(&RawValue::String("3".into())));
    }
}
