//! Default natives

use super::function::{Function, NativeCall, NativeFn, Param};
use super::number;
use super::value::Value;
use crate::error::{Result, ScriptError};
use bigdecimal::{BigDecimal, Zero};
use std::io::{BufRead, Write};
use std::rc::Rc;

/// Longest list `range` will build
const MAX_RANGE_LEN: usize = 10_000_000;

/// Natives registered in every interpreter
pub fn defaults() -> Vec<Rc<Function>> {
    let natives: Vec<(&str, Vec<Param>, NativeFn)> = vec![
        ("print", vec![Param::variadic("values")], print),
        ("println", vec![Param::variadic("values")], println),
        ("input", vec![Param::optional("prompt", Value::str(""))], input),
        ("len", vec![Param::required("object")], len),
        (
            "range",
            vec![
                Param::required("start"),
                Param::required("to"),
                Param::optional("step", Value::int(1)),
            ],
            range,
        ),
        ("string", vec![Param::required("object")], string),
        ("int", vec![Param::required("object")], int),
        ("float", vec![Param::required("object")], float),
        ("type", vec![Param::required("object")], type_of),
        ("panic", vec![Param::required("message")], panic),
        ("immut", vec![Param::required("value")], immut),
        (
            "append",
            vec![Param::required("list"), Param::variadic("values")],
            append,
        ),
    ];
    natives
        .into_iter()
        .map(|(name, params, f)| Rc::new(Function::native(name, params, f)))
        .collect()
}

/// Parameters `arg1..argN` for natives registered by arity
pub fn positional_params(arity: usize) -> Vec<Param> {
    (1..=arity).map(|i| Param::required(&format!("arg{i}"))).collect()
}

fn io_error(e: std::io::Error) -> ScriptError {
    ScriptError::plain(format!("IO error: {e}"))
}

fn joined(values: &Value) -> String {
    match values {
        Value::List(items) => items
            .borrow()
            .iter()
            .map(Value::to_string)
            .collect::<Vec<_>>()
            .join(" "),
        other => other.to_string(),
    }
}

fn print(call: &mut NativeCall<'_>) -> Result<Value> {
    let text = joined(&call.arg(0));
    write!(call.out, "{text}").map_err(io_error)?;
    call.out.flush().map_err(io_error)?;
    Ok(Value::None)
}

fn println(call: &mut NativeCall<'_>) -> Result<Value> {
    let text = joined(&call.arg(0));
    writeln!(call.out, "{text}").map_err(io_error)?;
    Ok(Value::None)
}

fn input(call: &mut NativeCall<'_>) -> Result<Value> {
    write!(call.out, "{}", call.arg(0)).map_err(io_error)?;
    call.out.flush().map_err(io_error)?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line).map_err(io_error)?;
    Ok(Value::str(line.trim_end_matches(['\r', '\n'])))
}

fn len(call: &mut NativeCall<'_>) -> Result<Value> {
    let n = match call.arg(0) {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.borrow().len(),
        Value::Map(entries) => entries.borrow().len(),
        other => {
            return Err(ScriptError::value(format!("{} has no length", other.type_name())));
        }
    };
    Ok(Value::int(n as i64))
}

fn numeric_arg(call: &NativeCall<'_>, index: usize, name: &str) -> Result<(BigDecimal, bool)> {
    match call.arg(index) {
        value @ (Value::Int(_) | Value::Float(_)) => value
            .as_number()
            .ok_or_else(|| ScriptError::value(format!("'{name}' must be numeric"))),
        other => Err(ScriptError::value(format!(
            "'{name}' must be numeric, not {}",
            other.type_name()
        ))),
    }
}

/// Inclusive range; counts down when `start > to`
fn range(call: &mut NativeCall<'_>) -> Result<Value> {
    let (start, start_float) = numeric_arg(call, 0, "start")?;
    let (to, to_float) = numeric_arg(call, 1, "to")?;
    let (step, step_float) = numeric_arg(call, 2, "step")?;
    let float = start_float || to_float || step_float;
    if step <= BigDecimal::zero() {
        return Ok(Value::list(Vec::new()));
    }

    let ascending = start <= to;
    let mut items = Vec::new();
    let mut current = start;
    while (ascending && current <= to) || (!ascending && current >= to) {
        if items.len() >= MAX_RANGE_LEN {
            return Err(ScriptError::memory(format!(
                "range is longer than {MAX_RANGE_LEN} elements"
            )));
        }
        items.push(Value::number(current.clone(), float));
        current = if ascending { &current + &step } else { &current - &step };
    }
    Ok(Value::list(items))
}

fn string(call: &mut NativeCall<'_>) -> Result<Value> {
    Ok(Value::from(call.arg(0).to_string()))
}

fn parse_number(text: &str) -> Result<BigDecimal> {
    number::parse(text.trim())
        .ok_or_else(|| ScriptError::value(format!("invalid number: {text:?}")))
}

fn int(call: &mut NativeCall<'_>) -> Result<Value> {
    let n = match call.arg(0) {
        Value::Str(s) => parse_number(&s)?,
        value => value
            .as_number()
            .map(|(n, _)| n)
            .ok_or_else(|| ScriptError::value(format!("cannot convert {} to int", value.type_name())))?,
    };
    Ok(Value::Int(number::truncate(&n)))
}

fn float(call: &mut NativeCall<'_>) -> Result<Value> {
    let n = match call.arg(0) {
        Value::Str(s) => parse_number(&s)?,
        value => value
            .as_number()
            .map(|(n, _)| n)
            .ok_or_else(|| ScriptError::value(format!("cannot convert {} to float", value.type_name())))?,
    };
    Ok(Value::Float(n))
}

fn type_of(call: &mut NativeCall<'_>) -> Result<Value> {
    Ok(Value::str(call.arg(0).type_name()))
}

fn panic(call: &mut NativeCall<'_>) -> Result<Value> {
    Err(ScriptError::plain(call.arg(0).to_string()))
}

fn immut(call: &mut NativeCall<'_>) -> Result<Value> {
    Ok(call.arg(0).freeze())
}

fn append(call: &mut NativeCall<'_>) -> Result<Value> {
    let Value::List(list) = call.arg(0) else {
        return Err(ScriptError::value(format!(
            "append needs a list, not {}",
            call.arg(0).type_name()
        )));
    };
    let mut items = list.borrow().clone();
    if let Value::List(values) = call.arg(1) {
        items.extend(values.borrow().iter().cloned());
    }
    Ok(Value::list(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn run(name: &str, args: Vec<Value>) -> (Result<Value>, String) {
        let natives = defaults();
        let function = natives.iter().find(|f| f.name == name).expect("native exists");
        let super::super::function::Body::Native(f) = &function.body else {
            panic!("native expected")
        };
        let mut out = Vec::new();
        let result = f(&mut NativeCall {
            args,
            this: None,
            out: &mut out,
        });
        (result, String::from_utf8(out).unwrap_or_default())
    }

    fn ints(items: &[i64]) -> Value {
        Value::list(items.iter().map(|n| Value::int(*n)).collect())
    }

    #[test]
    fn test_print_joins_with_spaces() {
        let (_, out) = run("println", vec![Value::list(vec![Value::int(1), Value::str("a")])]);
        assert_eq!(out, "1 a\n");
        let (_, out) = run("print", vec![Value::list(vec![Value::str("x")])]);
        assert_eq!(out, "x");
    }

    #[test]
    fn test_range_is_inclusive() {
        let (result, _) = run("range", vec![Value::int(1), Value::int(4), Value::int(1)]);
        assert_eq!(result.unwrap(), ints(&[1, 2, 3, 4]));
        let (result, _) = run("range", vec![Value::int(5), Value::int(1), Value::int(2)]);
        assert_eq!(result.unwrap(), ints(&[5, 3, 1]));
        let (result, _) = run("range", vec![Value::int(1), Value::int(3), Value::int(0)]);
        assert_eq!(result.unwrap(), ints(&[]));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(run("int", vec![Value::str(" 42 ")]).0.unwrap(), Value::int(42));
        assert_eq!(run("int", vec![Value::str("x")]).0.unwrap_err().kind, ErrorKind::Value);
        assert_eq!(run("float", vec![Value::int(2)]).0.unwrap().to_string(), "2.0");
        assert_eq!(run("string", vec![ints(&[1])]).0.unwrap(), Value::str("[1]"));
        assert_eq!(run("type", vec![Value::None]).0.unwrap(), Value::str("none"));
    }

    #[test]
    fn test_len_and_append() {
        assert_eq!(run("len", vec![Value::str("héllo")]).0.unwrap(), Value::int(5));
        assert_eq!(run("len", vec![Value::int(1)]).0.unwrap_err().kind, ErrorKind::Value);
        let original = ints(&[1]);
        let appended = run("append", vec![original.clone(), ints(&[2, 3])]).0.unwrap();
        assert_eq!(appended, ints(&[1, 2, 3]));
        assert_eq!(original, ints(&[1]));
    }

    #[test]
    fn test_panic_is_plain_error() {
        let err = run("panic", vec![Value::str("boom")]).0.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Plain);
        assert_eq!(err.message(), "boom");
    }
}
