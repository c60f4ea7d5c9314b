//! Comparison and membership

use super::value::Value;
use crate::error::{Result, ScriptError};
use crate::lexer::TokenKind;
use std::cmp::Ordering;

/// Evaluate one comparison between two values.
///
/// A string compared against a non-string is never equal, never ordered,
/// and `!=` between them is false as well.
pub fn compare(op: TokenKind, left: &Value, right: &Value) -> Result<bool> {
    if op == TokenKind::In {
        return contains(right, left);
    }
    let left_str = matches!(left, Value::Str(_));
    let right_str = matches!(right, Value::Str(_));
    if left_str != right_str {
        return Ok(false);
    }

    match op {
        TokenKind::EqEq => Ok(left.deep_eq(right)),
        TokenKind::NotEq => Ok(!left.deep_eq(right)),
        TokenKind::Lt | TokenKind::Gt | TokenKind::LtEq | TokenKind::GtEq => {
            let ordering = order(left, right)?;
            Ok(match op {
                TokenKind::Lt => ordering == Ordering::Less,
                TokenKind::Gt => ordering == Ordering::Greater,
                TokenKind::LtEq => ordering != Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
        other => Err(ScriptError::syntax(format!("{other:?} is not a comparison"))),
    }
}

fn order(left: &Value, right: &Value) -> Result<Ordering> {
    if let (Value::Str(a), Value::Str(b)) = (left, right) {
        return Ok(a.cmp(b));
    }
    match (left.as_number(), right.as_number()) {
        (Some((a, _)), Some((b, _))) => Ok(a.cmp(&b)),
        _ => Err(ScriptError::value(format!(
            "{} and {} cannot be ordered",
            left.type_name(),
            right.type_name()
        ))),
    }
}

/// `needle in container`
pub fn contains(container: &Value, needle: &Value) -> Result<bool> {
    match container {
        Value::List(items) => Ok(items.borrow().iter().any(|item| item.deep_eq(needle))),
        Value::Map(entries) => Ok(entries.borrow().iter().any(|(key, _)| key.deep_eq(needle))),
        Value::Str(haystack) => match needle {
            Value::Str(part) => Ok(haystack.contains(part.as_ref())),
            // Any element found as a substring
            Value::List(parts) => Ok(parts
                .borrow()
                .iter()
                .any(|part| matches!(part, Value::Str(s) if haystack.contains(s.as_ref())))),
            other => Err(ScriptError::value(format!(
                "cannot search a string for {}",
                other.type_name()
            ))),
        },
        other => Err(ScriptError::value(format!(
            "'in' needs a list, map or str on the right, not {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use TokenKind::*;

    #[test]
    fn test_numeric_comparisons() {
        assert!(compare(Lt, &Value::int(1), &Value::int(2)).unwrap());
        assert!(compare(GtEq, &Value::int(2), &Value::int(2)).unwrap());
        assert!(compare(EqEq, &Value::int(2), &Value::Bool(false)).is_ok());
    }

    #[test]
    fn test_string_against_other_kind_is_false() {
        for op in [EqEq, NotEq, Lt, Gt, LtEq, GtEq] {
            assert!(!compare(op, &Value::str("1"), &Value::int(1)).unwrap());
        }
    }

    #[test]
    fn test_string_ordering() {
        assert!(compare(Lt, &Value::str("abc"), &Value::str("abd")).unwrap());
    }

    #[test]
    fn test_ordering_lists_is_value_error() {
        let list = Value::list(vec![]);
        let err = compare(Lt, &list, &list).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Value);
    }

    #[test]
    fn test_membership() {
        let list = Value::list(vec![Value::list(vec![Value::int(1)]), Value::str("x")]);
        assert!(compare(In, &Value::list(vec![Value::int(1)]), &list).unwrap());
        assert!(compare(In, &Value::str("ell"), &Value::str("hello")).unwrap());
        let parts = Value::list(vec![Value::str("zz"), Value::str("lo")]);
        assert!(compare(In, &parts, &Value::str("hello")).unwrap());
        let map = Value::map(vec![(Value::str("k"), Value::int(1))]);
        assert!(compare(In, &Value::str("k"), &map).unwrap());
        assert!(!compare(In, &Value::int(1), &map).unwrap());
    }
}
