//! Native methods on str, list and map values
//!
//! Each kind has a table keyed by method name. Lookups return the native
//! bound to its receiver, ready to be called like any other function.

use super::function::{Function, NativeCall, NativeFn, Param};
use super::index::normalize;
use super::value::{Kind, ListRef, MapRef, Value};
use crate::error::{Result, ScriptError};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;
use std::thread::LocalKey;

type MethodTable = HashMap<&'static str, Rc<Function>>;

fn table(entries: Vec<(&'static str, Vec<Param>, NativeFn)>) -> MethodTable {
    entries
        .into_iter()
        .map(|(name, params, f)| (name, Rc::new(Function::native(name, params, f))))
        .collect()
}

thread_local! {
    static STR_METHODS: MethodTable = table(str_methods());
    static LIST_METHODS: MethodTable = table(list_methods());
    static MAP_METHODS: MethodTable = table(map_methods());
}

/// Method `name` of `receiver`, bound to it
pub fn lookup(receiver: &Value, name: &str) -> Option<Rc<Function>> {
    let methods: &'static LocalKey<MethodTable> = match receiver.kind() {
        Kind::Str => &STR_METHODS,
        Kind::List => &LIST_METHODS,
        Kind::Map => &MAP_METHODS,
        _ => return None,
    };
    methods.with(|methods| methods.get(name).map(|f| f.bind(receiver.clone())))
}

fn req(name: &str) -> Param {
    Param::required(name)
}

fn opt(name: &str, default: Value) -> Param {
    Param::optional(name, default)
}

fn rest(name: &str) -> Param {
    Param::variadic(name)
}

fn this_list(call: &NativeCall<'_>) -> Result<ListRef> {
    match call.receiver()? {
        Value::List(list) => Ok(list.clone()),
        other => Err(ScriptError::value(format!("expected list, got {}", other.type_name()))),
    }
}

fn this_map(call: &NativeCall<'_>) -> Result<MapRef> {
    match call.receiver()? {
        Value::Map(map) => Ok(map.clone()),
        other => Err(ScriptError::value(format!("expected map, got {}", other.type_name()))),
    }
}

fn this_str(call: &NativeCall<'_>) -> Result<Rc<str>> {
    match call.receiver()? {
        Value::Str(s) => Ok(s.clone()),
        other => Err(ScriptError::value(format!("expected str, got {}", other.type_name()))),
    }
}

fn str_arg(call: &NativeCall<'_>, index: usize) -> Result<Rc<str>> {
    match call.arg(index) {
        Value::Str(s) => Ok(s),
        other => Err(ScriptError::value(format!(
            "argument {} must be a str, not {}",
            index + 1,
            other.type_name()
        ))),
    }
}

fn rest_arg(call: &NativeCall<'_>, index: usize) -> Vec<Value> {
    match call.arg(index) {
        Value::List(list) => list.borrow().clone(),
        other => vec![other],
    }
}

/// Values about to be stored into the receiver
fn storable(call: &NativeCall<'_>, index: usize) -> Result<Vec<Value>> {
    let values = rest_arg(call, index);
    let receiver = call.receiver()?;
    for value in &values {
        receiver.ensure_storable(value)?;
    }
    Ok(values)
}

/// Validate a `(start, length)` window over `len` items
fn window(start: i64, length: i64, len: usize) -> Result<(usize, usize)> {
    let from = if start < 0 { len as i64 + start } else { start };
    if from < 0 || from > len as i64 {
        return Err(ScriptError::index_out_of_range(start, len));
    }
    let to = from.checked_add(length).filter(|&to| length >= 0 && to <= len as i64);
    let Some(to) = to else {
        return Err(ScriptError::out_of_range(format!(
            "length {length} from {from} exceeds length {len}"
        )));
    };
    Ok((from as usize, to as usize))
}

// ============================================================================
// List
// ============================================================================

fn list_methods() -> Vec<(&'static str, Vec<Param>, NativeFn)> {
    vec![
        ("pushBack", vec![rest("values")], list_push_back),
        ("pushFront", vec![rest("values")], list_push_front),
        ("insert", vec![req("index"), rest("values")], list_insert),
        ("index", vec![req("value"), opt("start", Value::int(0))], list_index),
        ("indexLast", vec![req("value")], list_index_last),
        ("sub", vec![req("start"), req("length")], list_sub),
        ("removeAt", vec![req("index")], list_remove_at),
        ("remove", vec![req("value"), opt("start", Value::int(0))], list_remove),
        ("removeLast", vec![req("value")], list_remove_last),
        ("removeAll", vec![req("value")], list_remove_all),
        ("removeRange", vec![req("start"), req("length")], list_remove_range),
        ("reverse", vec![], list_reverse),
        ("sort", vec![opt("desc", Value::Bool(false))], list_sort),
        ("unique", vec![], list_unique),
        ("clear", vec![], list_clear),
    ]
}

fn list_push_back(call: &mut NativeCall<'_>) -> Result<Value> {
    let list = this_list(call)?;
    let values = storable(call, 0)?;
    list.borrow_mut()?.extend(values);
    Ok(Value::None)
}

fn list_push_front(call: &mut NativeCall<'_>) -> Result<Value> {
    let list = this_list(call)?;
    let values = storable(call, 0)?;
    list.borrow_mut()?.splice(0..0, values);
    Ok(Value::None)
}

fn list_insert(call: &mut NativeCall<'_>) -> Result<Value> {
    let list = this_list(call)?;
    let values = storable(call, 1)?;
    let index = call.arg(0).as_index()?;
    let mut items = list.borrow_mut()?;
    let at = if index == items.len() as i64 {
        items.len()
    } else {
        normalize(index, items.len())?
    };
    items.splice(at..at, values);
    Ok(Value::None)
}

fn list_index(call: &mut NativeCall<'_>) -> Result<Value> {
    let list = this_list(call)?;
    let items = list.borrow();
    let needle = call.arg(0);
    let start = call.arg(1).as_index()?.max(0) as usize;
    let found = items
        .iter()
        .enumerate()
        .skip(start)
        .find(|(_, item)| item.deep_eq(&needle))
        .map_or(-1, |(i, _)| i as i64);
    Ok(Value::int(found))
}

fn list_index_last(call: &mut NativeCall<'_>) -> Result<Value> {
    let list = this_list(call)?;
    let needle = call.arg(0);
    let found = list
        .borrow()
        .iter()
        .rposition(|item| item.deep_eq(&needle))
        .map_or(-1, |i| i as i64);
    Ok(Value::int(found))
}

fn list_sub(call: &mut NativeCall<'_>) -> Result<Value> {
    let list = this_list(call)?;
    let items = list.borrow();
    let (from, to) = window(call.arg(0).as_index()?, call.arg(1).as_index()?, items.len())?;
    Ok(Value::list(items[from..to].to_vec()))
}

fn list_remove_at(call: &mut NativeCall<'_>) -> Result<Value> {
    let list = this_list(call)?;
    let mut items = list.borrow_mut()?;
    let at = normalize(call.arg(0).as_index()?, items.len())?;
    Ok(items.remove(at))
}

// The needle may be the receiver itself, so matches are found under a
// shared borrow before the list is borrowed mutably.

fn list_remove(call: &mut NativeCall<'_>) -> Result<Value> {
    let list = this_list(call)?;
    let needle = call.arg(0);
    let start = call.arg(1).as_index()?.max(0) as usize;
    let found = list
        .borrow()
        .iter()
        .enumerate()
        .skip(start)
        .find(|(_, item)| item.deep_eq(&needle))
        .map(|(i, _)| i);
    if let Some(i) = found {
        list.borrow_mut()?.remove(i);
    }
    Ok(Value::Bool(found.is_some()))
}

fn list_remove_last(call: &mut NativeCall<'_>) -> Result<Value> {
    let list = this_list(call)?;
    let needle = call.arg(0);
    let found = list.borrow().iter().rposition(|item| item.deep_eq(&needle));
    if let Some(i) = found {
        list.borrow_mut()?.remove(i);
    }
    Ok(Value::Bool(found.is_some()))
}

fn list_remove_all(call: &mut NativeCall<'_>) -> Result<Value> {
    let list = this_list(call)?;
    let needle = call.arg(0);
    let keep: Vec<bool> = list.borrow().iter().map(|item| !item.deep_eq(&needle)).collect();
    let removed = keep.iter().filter(|&&kept| !kept).count();
    if removed > 0 {
        let mut flags = keep.into_iter();
        list.borrow_mut()?.retain(|_| flags.next().unwrap_or(true));
    }
    Ok(Value::int(removed as i64))
}

fn list_remove_range(call: &mut NativeCall<'_>) -> Result<Value> {
    let list = this_list(call)?;
    let mut items = list.borrow_mut()?;
    let (from, to) = window(call.arg(0).as_index()?, call.arg(1).as_index()?, items.len())?;
    items.drain(from..to);
    Ok(Value::None)
}

fn list_reverse(call: &mut NativeCall<'_>) -> Result<Value> {
    let list = this_list(call)?;
    list.borrow_mut()?.reverse();
    Ok(Value::None)
}

fn sort_order(a: &Value, b: &Value) -> Result<Ordering> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(x.cmp(y)),
        _ => match (a.as_number(), b.as_number()) {
            (Some((x, _)), Some((y, _))) => Ok(x.cmp(&y)),
            _ => Err(ScriptError::value(format!(
                "cannot sort {} with {}",
                a.type_name(),
                b.type_name()
            ))),
        },
    }
}

fn list_sort(call: &mut NativeCall<'_>) -> Result<Value> {
    let list = this_list(call)?;
    let descending = call.arg(0).is_true();
    let mut items = list.borrow_mut()?;
    // Validate first so sort_by never sees an error
    if let Some(first) = items.first() {
        for item in items.iter() {
            sort_order(first, item)?;
        }
    }
    items.sort_by(|a, b| sort_order(a, b).unwrap_or(Ordering::Equal));
    if descending {
        items.reverse();
    }
    Ok(Value::None)
}

fn list_unique(call: &mut NativeCall<'_>) -> Result<Value> {
    let list = this_list(call)?;
    let mut kept: Vec<Value> = Vec::new();
    for item in list.borrow().iter() {
        if !kept.iter().any(|k| k.deep_eq(item)) {
            kept.push(item.clone());
        }
    }
    *list.borrow_mut()? = kept;
    Ok(Value::None)
}

fn list_clear(call: &mut NativeCall<'_>) -> Result<Value> {
    let list = this_list(call)?;
    list.borrow_mut()?.clear();
    Ok(Value::None)
}

// ============================================================================
// Map
// ============================================================================

fn map_methods() -> Vec<(&'static str, Vec<Param>, NativeFn)> {
    vec![
        ("keys", vec![], map_keys),
        ("values", vec![], map_values),
        ("removeKey", vec![req("key")], map_remove_key),
    ]
}

fn map_keys(call: &mut NativeCall<'_>) -> Result<Value> {
    let map = this_map(call)?;
    let keys = map.borrow().iter().map(|(k, _)| k.clone()).collect();
    Ok(Value::list(keys))
}

fn map_values(call: &mut NativeCall<'_>) -> Result<Value> {
    let map = this_map(call)?;
    let values = map.borrow().iter().map(|(_, v)| v.clone()).collect();
    Ok(Value::list(values))
}

fn map_remove_key(call: &mut NativeCall<'_>) -> Result<Value> {
    let map = this_map(call)?;
    let key = call.arg(0);
    let at = map
        .borrow()
        .iter()
        .position(|(k, _)| k.deep_eq(&key))
        .ok_or_else(|| ScriptError::value(format!("key does not exist: {}", key.repr())))?;
    Ok(map.borrow_mut()?.remove(at).1)
}

// ============================================================================
// Str
// ============================================================================

fn str_methods() -> Vec<(&'static str, Vec<Param>, NativeFn)> {
    vec![
        ("isLower", vec![], str_is_lower),
        ("isUpper", vec![], str_is_upper),
        ("lower", vec![], str_lower),
        ("upper", vec![], str_upper),
        ("trim", vec![], str_trim),
        ("trimLeft", vec![], str_trim_left),
        ("trimRight", vec![], str_trim_right),
        ("sub", vec![req("start"), req("length")], str_sub),
        ("index", vec![req("sub"), opt("start", Value::int(0))], str_index),
        ("indexLast", vec![req("sub")], str_index_last),
        ("split", vec![req("sep")], str_split),
        ("hasPrefix", vec![req("prefix")], str_has_prefix),
        ("hasSuffix", vec![req("suffix")], str_has_suffix),
        (
            "replace",
            vec![req("old"), req("new"), opt("count", Value::int(1))],
            str_replace,
        ),
        ("replaceAll", vec![req("old"), req("new")], str_replace_all),
    ]
}

fn str_is_lower(call: &mut NativeCall<'_>) -> Result<Value> {
    let s = this_str(call)?;
    Ok(Value::Bool(s.to_lowercase() == *s))
}

fn str_is_upper(call: &mut NativeCall<'_>) -> Result<Value> {
    let s = this_str(call)?;
    Ok(Value::Bool(s.to_uppercase() == *s))
}

fn str_lower(call: &mut NativeCall<'_>) -> Result<Value> {
    Ok(Value::from(this_str(call)?.to_lowercase()))
}

fn str_upper(call: &mut NativeCall<'_>) -> Result<Value> {
    Ok(Value::from(this_str(call)?.to_uppercase()))
}

fn str_trim(call: &mut NativeCall<'_>) -> Result<Value> {
    Ok(Value::str(this_str(call)?.trim()))
}

fn str_trim_left(call: &mut NativeCall<'_>) -> Result<Value> {
    Ok(Value::str(this_str(call)?.trim_start()))
}

fn str_trim_right(call: &mut NativeCall<'_>) -> Result<Value> {
    Ok(Value::str(this_str(call)?.trim_end()))
}

fn str_sub(call: &mut NativeCall<'_>) -> Result<Value> {
    let s = this_str(call)?;
    let chars: Vec<char> = s.chars().collect();
    let (from, to) = window(call.arg(0).as_index()?, call.arg(1).as_index()?, chars.len())?;
    Ok(Value::from(chars[from..to].iter().collect::<String>()))
}

/// Character index of a byte offset
fn char_index(s: &str, byte: usize) -> i64 {
    s[..byte].chars().count() as i64
}

fn str_index(call: &mut NativeCall<'_>) -> Result<Value> {
    let s = this_str(call)?;
    let needle = str_arg(call, 0)?;
    let start = call.arg(1).as_index()?.max(0) as usize;
    let offset = if start == 0 {
        Some(0)
    } else {
        s.char_indices().nth(start).map(|(byte, _)| byte)
    };
    let Some(offset) = offset else {
        return Ok(Value::int(-1));
    };
    let found = s[offset..]
        .find(needle.as_ref())
        .map_or(-1, |byte| char_index(&s, offset + byte));
    Ok(Value::int(found))
}

fn str_index_last(call: &mut NativeCall<'_>) -> Result<Value> {
    let s = this_str(call)?;
    let needle = str_arg(call, 0)?;
    let found = s
        .rfind(needle.as_ref())
        .map_or(-1, |byte| char_index(&s, byte));
    Ok(Value::int(found))
}

fn str_split(call: &mut NativeCall<'_>) -> Result<Value> {
    let s = this_str(call)?;
    let sep = str_arg(call, 0)?;
    let parts = if sep.is_empty() {
        s.chars().map(|c| Value::from(c.to_string())).collect()
    } else {
        s.split(sep.as_ref()).map(Value::str).collect()
    };
    Ok(Value::list(parts))
}

fn str_has_prefix(call: &mut NativeCall<'_>) -> Result<Value> {
    let s = this_str(call)?;
    Ok(Value::Bool(s.starts_with(str_arg(call, 0)?.as_ref())))
}

fn str_has_suffix(call: &mut NativeCall<'_>) -> Result<Value> {
    let s = this_str(call)?;
    Ok(Value::Bool(s.ends_with(str_arg(call, 0)?.as_ref())))
}

fn str_replace(call: &mut NativeCall<'_>) -> Result<Value> {
    let s = this_str(call)?;
    let (old, new) = (str_arg(call, 0)?, str_arg(call, 1)?);
    let count = call.arg(2).as_index()?;
    if count < 0 {
        return Ok(Value::from(s.replace(old.as_ref(), &new)));
    }
    Ok(Value::from(s.replacen(old.as_ref(), &new, count as usize)))
}

fn str_replace_all(call: &mut NativeCall<'_>) -> Result<Value> {
    let s = this_str(call)?;
    let (old, new) = (str_arg(call, 0)?, str_arg(call, 1)?);
    Ok(Value::from(s.replace(old.as_ref(), &new)))
}
