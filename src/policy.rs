//! Read-only statement policy.
//!
//! A lexical allowlist on the leading keyword of a template. It does not parse SQL:
//! comments, chained statements and data-modifying CTEs are not inspected.

/// Leading keywords a template may start with.
pub const READ_ONLY_KEYWORDS: &[&str] = &["SELECT", "WITH", "EXPLAIN", "DESCRIBE", "DESC"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    /// Carries the detected leading token, uppercased.
    Denied(String),
}

pub fn classify(sql: &str) -> Verdict {
    let upper = sql.trim().to_uppercase();
    let keyword: String = upper.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    if READ_ONLY_KEYWORDS.contains(&keyword.as_str()) {
        return Verdict::Allowed;
    }
    let token = upper.split_whitespace().next().unwrap_or_default();
    Verdict::Denied(token.to_string())
}
