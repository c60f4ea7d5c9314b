//! Indexing: `xs[i]`, `xs[[i, j]]`, `m[key]`, `s[i]`

use super::value::Value;
use crate::error::{Result, ScriptError};

/// Resolve a possibly negative index against `len`
pub fn normalize(index: i64, len: usize) -> Result<usize> {
    let resolved = if index < 0 { len as i64 + index } else { index };
    if resolved < 0 || resolved >= len as i64 {
        return Err(ScriptError::index_out_of_range(index, len));
    }
    Ok(resolved as usize)
}

fn indices(key: &Value, len: usize) -> Result<Vec<usize>> {
    match key {
        Value::List(keys) => keys
            .borrow()
            .iter()
            .map(|k| normalize(k.as_index()?, len))
            .collect(),
        single => Ok(vec![normalize(single.as_index()?, len)?]),
    }
}

/// Read `container[key]`
pub fn get(container: &Value, key: &Value) -> Result<Value> {
    match container {
        Value::List(items) => {
            let items = items.borrow();
            let selected = indices(key, items.len())?;
            if matches!(key, Value::List(_)) {
                Ok(Value::list(selected.iter().map(|&i| items[i].clone()).collect()))
            } else {
                Ok(items[selected[0]].clone())
            }
        }
        Value::Str(text) => {
            let chars: Vec<char> = text.chars().collect();
            let selected = indices(key, chars.len())?;
            Ok(Value::from(selected.iter().map(|&i| chars[i]).collect::<String>()))
        }
        Value::Map(entries) => entries
            .borrow()
            .iter()
            .find(|(k, _)| k.deep_eq(key))
            .map(|(_, v)| v.clone())
            .ok_or_else(|| ScriptError::value(format!("key does not exist: {}", key.repr()))),
        other => Err(ScriptError::value(format!("{} cannot be indexed", other.type_name()))),
    }
}

/// Write `container[key] = value`.
///
/// Lists and maps change in place. Strings are immutable values, so the
/// updated string is returned for the caller to store back.
pub fn set(container: &Value, key: &Value, value: Value) -> Result<Option<Value>> {
    match container {
        // Keys may alias the container: resolve them before borrowing it mutably
        Value::List(items) => {
            container.ensure_storable(&value)?;
            let selected = indices(key, items.borrow().len())?;
            let mut items = items.borrow_mut()?;
            for i in selected {
                items[i] = value.clone();
            }
            Ok(None)
        }
        Value::Map(entries) => {
            container.ensure_storable(&value)?;
            let found = entries.borrow().iter().position(|(k, _)| k.deep_eq(key));
            match found {
                Some(i) => entries.borrow_mut()?[i].1 = value,
                None => {
                    let key = key.deep_clone();
                    entries.borrow_mut()?.push((key, value));
                }
            }
            Ok(None)
        }
        Value::Str(text) => {
            let Value::Str(replacement) = &value else {
                return Err(ScriptError::value(format!(
                    "only a str can be stored into a str, not {}",
                    value.type_name()
                )));
            };
            let mut chars: Vec<String> = text.chars().map(String::from).collect();
            for i in indices(key, chars.len())? {
                chars[i] = replacement.to_string();
            }
            Ok(Some(Value::from(chars.concat())))
        }
        other => Err(ScriptError::value(format!(
            "{} does not support item assignment",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn list() -> Value {
        Value::list((1..=4).map(Value::int).collect())
    }

    #[test]
    fn test_negative_index() {
        assert_eq!(get(&list(), &Value::int(-1)).unwrap(), Value::int(4));
        assert_eq!(get(&Value::str("abc"), &Value::int(-3)).unwrap(), Value::str("a"));
    }

    #[test]
    fn test_out_of_range() {
        let err = get(&list(), &Value::int(4)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::OutOfRange);
        assert_eq!(normalize(-5, 4).unwrap_err().kind, ErrorKind::OutOfRange);
    }

    #[test]
    fn test_multi_index() {
        let key = Value::list(vec![Value::int(0), Value::int(-1)]);
        assert_eq!(
            get(&list(), &key).unwrap(),
            Value::list(vec![Value::int(1), Value::int(4)])
        );
    }

    #[test]
    fn test_map_access_and_insert() {
        let map = Value::map(vec![]);
        set(&map, &Value::str("a"), Value::int(1)).unwrap();
        set(&map, &Value::str("a"), Value::int(2)).unwrap();
        assert_eq!(get(&map, &Value::str("a")).unwrap(), Value::int(2));
        assert_eq!(get(&map, &Value::str("b")).unwrap_err().kind, ErrorKind::Value);
    }

    #[test]
    fn test_string_assignment_returns_new_string() {
        let s = Value::str("cat");
        let updated = set(&s, &Value::int(0), Value::str("b")).unwrap();
        assert_eq!(updated, Some(Value::str("bat")));
        assert_eq!(s, Value::str("cat"));
    }

    #[test]
    fn test_key_aliasing_the_container() {
        let xs = Value::list(vec![Value::int(1), Value::int(0)]);
        set(&xs, &xs, Value::int(5)).unwrap();
        assert_eq!(xs, Value::list(vec![Value::int(5), Value::int(5)]));

        let map = Value::map(vec![]);
        set(&map, &map, Value::int(1)).unwrap();
        assert_eq!(get(&map, &Value::map(vec![])).unwrap(), Value::int(1));
    }

    #[test]
    fn test_container_cannot_hold_itself() {
        let xs = list();
        let err = set(&xs, &Value::int(0), xs.clone()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Value);
        let outer = Value::list(vec![xs.clone()]);
        assert_eq!(set(&xs, &Value::int(0), outer).unwrap_err().kind, ErrorKind::Value);
        set(&xs, &Value::int(0), xs.deep_clone()).unwrap();

        let map = Value::map(vec![]);
        let err = set(&map, &Value::str("self"), map.clone()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Value);
    }

    #[test]
    fn test_frozen_list_refuses_assignment() {
        let frozen = list().freeze();
        let err = set(&frozen, &Value::int(0), Value::int(9)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Value);
    }
}
