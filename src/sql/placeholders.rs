//! Rewrites `?` positional markers into Postgres `$n` placeholders.

use std::borrow::Cow;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scan {
    Code,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
    BlockComment,
    DollarQuoted,
}

/// The `$tag$` delimiter opening at `start`, if any. `$$` has an empty tag.
fn dollar_tag(chars: &[char], start: usize) -> Option<&[char]> {
    let rest = chars.get(start + 1..)?;
    let len = rest.iter().position(|c| *c == '$')?;
    let tag = &rest[..len];
    let valid = match tag.first() {
        None => true,
        Some(first) => {
            (first.is_alphabetic() || *first == '_') && tag.iter().all(|c| c.is_alphanumeric() || *c == '_')
        }
    };
    valid.then(|| &chars[start..start + len + 2])
}

/// Numbers every `?` outside literals (including dollar-quoted bodies), quoted identifiers
/// and comments, left to right.
/// Templates that already use `$n` placeholders are returned untouched.
pub fn numbered_placeholders(sql: &str) -> Cow<'_, str> {
    let chars: Vec<char> = sql.chars().collect();
    let mut markers = Vec::new();
    let mut state = Scan::Code;
    let mut delimiter: &[char] = &[];
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let after_word = i > 0 && (chars[i - 1].is_alphanumeric() || chars[i - 1] == '_');
        match state {
            Scan::Code => match c {
                '\'' => state = Scan::SingleQuoted,
                '"' => state = Scan::DoubleQuoted,
                '-' if next == Some('-') => {
                    state = Scan::LineComment;
                    i += 1;
                }
                '/' if next == Some('*') => {
                    state = Scan::BlockComment;
                    i += 1;
                }
                '$' if next.is_some_and(|n| n.is_ascii_digit()) => return Cow::Borrowed(sql),
                '$' if !after_word => {
                    if let Some(tag) = dollar_tag(&chars, i) {
                        delimiter = tag;
                        state = Scan::DollarQuoted;
                        i += tag.len() - 1;
                    }
                }
                '?' => markers.push(i),
                _ => {}
            },
            Scan::SingleQuoted if c == '\'' => state = Scan::Code,
            Scan::DoubleQuoted if c == '"' => state = Scan::Code,
            Scan::LineComment if c == '\n' => state = Scan::Code,
            Scan::BlockComment if c == '*' && next == Some('/') => {
                state = Scan::Code;
                i += 1;
            }
            Scan::DollarQuoted if chars[i..].starts_with(delimiter) => {
                state = Scan::Code;
                i += delimiter.len() - 1;
            }
            _ => {}
        }
        i += 1;
    }

    if markers.is_empty() {
        return Cow::Borrowed(sql);
    }

    let mut out = String::with_capacity(sql.len() + markers.len() * 2);
    let mut n = 0;
    for (idx, c) in chars.iter().enumerate() {
        if markers.get(n) == Some(&idx) {
            n += 1;
            out.push('$');
            out.push_str(&n.to_string());
        } else {
            out.push(*c);
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_are_numbered_in_order() {
        assert_eq!(
            numbered_placeholders("SELECT * FROM t WHERE x = ? AND y = ?"),
            "SELECT * FROM t WHERE x = $1 AND y = $2"
        );
    }

    #[test]
    fn literals_identifiers_and_comments_are_skipped() {
        let sql = "SELECT '?', \"a?b\" FROM t -- why?\nWHERE x = ? /* or ? */ AND y = 'it''s?' AND z = ?";
        assert_eq!(
            numbered_placeholders(sql),
            "SELECT '?', \"a?b\" FROM t -- why?\nWHERE x = $1 /* or ? */ AND y = 'it''s?' AND z = $2"
        );
    }

    #[test]
    fn dollar_quoted_bodies_are_skipped() {
        assert_eq!(
            numbered_placeholders("SELECT $$why?$$, $fn$ a ? b $fn$ FROM t WHERE x = ?"),
            "SELECT $$why?$$, $fn$ a ? b $fn$ FROM t WHERE x = $1"
        );
        assert_eq!(
            numbered_placeholders("SELECT $a$ $b$ ? $b$ $a$, ?"),
            "SELECT $a$ $b$ ? $b$ $a$, $1"
        );
        assert_eq!(numbered_placeholders("SELECT cost$usd$ FROM t WHERE x = ?"), "SELECT cost$usd$ FROM t WHERE x = $1");
    }

    #[test]
    fn numbered_templates_pass_through() {
        let sql = "SELECT * FROM t WHERE x = $1 AND doc ? 'k'";
        assert!(matches!(numbered_placeholders(sql), Cow::Borrowed(_)));
    }

    #[test]
    fn templates_without_markers_are_borrowed() {
        assert!(matches!(numbered_placeholders("SELECT 1"), Cow::Borrowed(_)));
    }
}
