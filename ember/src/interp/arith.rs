//! Arithmetic engine
//!
//! Expressions are reduced over a flat operand/operator list: find the
//! left-most operator of the highest precedence class still present,
//! apply it to its two neighbours, splice the result back, repeat.

use super::number;
use super::value::Value;
use crate::error::{Result, ScriptError};
use crate::lexer::{Position, TokenKind};
use bigdecimal::Zero;

/// Largest shift amount accepted by `<<` and `>>`
const MAX_SHIFT: i64 = 65_536;

pub fn symbol(op: TokenKind) -> &'static str {
    use TokenKind::*;
    match op {
        Plus => "+",
        Minus => "-",
        Star => "*",
        Slash => "/",
        SlashSlash => "//",
        Percent => "%",
        StarStar => "**",
        Shl => "<<",
        Shr => ">>",
        Amp => "&",
        Pipe => "|",
        Caret => "^",
        _ => "?",
    }
}

/// Reduce operands and operators to a single value
pub fn reduce(
    mut operands: Vec<Value>,
    mut operators: Vec<(TokenKind, Position)>,
    digits: i64,
) -> Result<Value> {
    if operands.len() != operators.len() + 1 {
        return Err(ScriptError::syntax("operator is missing an operand"));
    }
    while let Some(top) = operators.iter().filter_map(|(op, _)| op.precedence()).max() {
        let Some(index) = operators
            .iter()
            .position(|(op, _)| op.precedence() == Some(top))
        else {
            break;
        };
        let (op, pos) = operators.remove(index);
        let right = operands.remove(index + 1);
        operands[index] = apply(op, &operands[index], &right, digits).map_err(|e| e.at(&pos))?;
    }
    operands
        .pop()
        .ok_or_else(|| ScriptError::syntax("value is expected"))
}

/// Apply one binary operator, broadcasting over lists
pub fn apply(op: TokenKind, left: &Value, right: &Value, digits: i64) -> Result<Value> {
    match (left, right) {
        (Value::List(a), Value::List(b)) => {
            // Snapshot both sides before broadcasting
            let a = a.borrow().clone();
            let b = b.borrow().clone();
            if a.is_empty() {
                return Ok(right.clone());
            }
            if b.is_empty() {
                return Ok(left.clone());
            }
            let items = if a.len() == b.len() {
                a.iter()
                    .zip(b.iter())
                    .map(|(x, y)| apply(op, x, y, digits))
                    .collect::<Result<Vec<_>>>()?
            } else if a.len() == 1 {
                b.iter()
                    .map(|y| apply(op, &a[0], y, digits))
                    .collect::<Result<Vec<_>>>()?
            } else if b.len() == 1 {
                a.iter()
                    .map(|x| apply(op, x, &b[0], digits))
                    .collect::<Result<Vec<_>>>()?
            } else {
                return Err(ScriptError::arithmetic(format!(
                    "list lengths do not match for '{}': {} and {}",
                    symbol(op),
                    a.len(),
                    b.len()
                )));
            };
            Ok(Value::list(items))
        }
        (Value::List(a), scalar) => {
            let a = a.borrow().clone();
            let items = a
                .iter()
                .map(|x| apply(op, x, scalar, digits))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::list(items))
        }
        (scalar, Value::List(b)) => {
            let b = b.borrow().clone();
            let items = b
                .iter()
                .map(|y| apply(op, scalar, y, digits))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::list(items))
        }
        (Value::Str(a), Value::Str(b)) => {
            if op == TokenKind::Plus {
                Ok(Value::from(format!("{a}{b}")))
            } else {
                Err(ScriptError::arithmetic(format!(
                    "'{}' is not supported between strings",
                    symbol(op)
                )))
            }
        }
        _ => numeric(op, left, right, digits),
    }
}

fn incompatible(op: TokenKind, left: &Value, right: &Value) -> ScriptError {
    ScriptError::arithmetic(format!(
        "'{}' is not supported between {} and {}",
        symbol(op),
        left.type_name(),
        right.type_name()
    ))
}

fn shift_amount(n: &bigdecimal::BigDecimal) -> Result<usize> {
    let shift = number::to_i64(&number::truncate(n))
        .ok_or_else(|| ScriptError::arithmetic("shift amount is too large"))?;
    if shift < 0 {
        return Err(ScriptError::arithmetic(format!("negative shift amount: {shift}")));
    }
    if shift > MAX_SHIFT {
        return Err(ScriptError::arithmetic(format!("shift amount is too large: {shift}")));
    }
    Ok(shift as usize)
}

fn numeric(op: TokenKind, left: &Value, right: &Value, digits: i64) -> Result<Value> {
    let (Some((a, a_float)), Some((b, b_float))) = (left.as_number(), right.as_number()) else {
        return Err(incompatible(op, left, right));
    };
    let float = a_float || b_float;

    use TokenKind::*;
    let value = match op {
        Plus => Value::number(&a + &b, float),
        Minus => Value::number(&a - &b, float),
        Star => Value::number(&a * &b, float),
        Slash => Value::Float(number::divide(&a, &b, digits)?),
        SlashSlash => {
            if b.is_zero() {
                return Err(ScriptError::divide_by_zero());
            }
            Value::number(number::truncate(&(&a / &b)), float)
        }
        Percent => {
            if b.is_zero() {
                return Err(ScriptError::divide_by_zero());
            }
            Value::number(&a % &b, float)
        }
        StarStar => {
            let negative_exponent = b < bigdecimal::BigDecimal::zero();
            Value::number(number::pow(&a, &b, digits)?, float || negative_exponent)
        }
        Shl | Shr => {
            let shift = shift_amount(&b)?;
            let n = number::to_bigint(&a);
            let shifted = if op == Shl { n << shift } else { n >> shift };
            Value::number(number::from_bigint(shifted), float)
        }
        Amp | Pipe | Caret => {
            let (x, y) = (number::to_bigint(&a), number::to_bigint(&b));
            let result = match op {
                Amp => &x & &y,
                Pipe => &x | &y,
                _ => &x ^ &y,
            };
            Value::number(number::from_bigint(result), float)
        }
        _ => return Err(incompatible(op, left, right)),
    };
    Ok(value)
}

/// Unary minus, broadcast over lists
pub fn negate(value: &Value) -> Result<Value> {
    match value {
        Value::Int(n) => Ok(Value::Int(-n.clone())),
        Value::Float(n) => Ok(Value::Float(-n.clone())),
        Value::Bool(b) => Ok(Value::int(-i64::from(*b))),
        Value::List(list) => {
            let items = list.borrow().clone();
            Ok(Value::list(
                items.iter().map(negate).collect::<Result<Vec<_>>>()?,
            ))
        }
        other => Err(ScriptError::arithmetic(format!(
            "cannot negate {}",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn int_list(items: &[i64]) -> Value {
        Value::list(items.iter().map(|n| Value::int(*n)).collect())
    }

    fn pos() -> Position {
        Position::new("t", 1, 1)
    }

    fn eval(operands: &[i64], operators: &[TokenKind]) -> Result<Value> {
        reduce(
            operands.iter().map(|n| Value::int(*n)).collect(),
            operators.iter().map(|op| (*op, pos())).collect(),
            16,
        )
    }

    #[test]
    fn test_precedence_classes() {
        use TokenKind::*;
        assert_eq!(eval(&[2, 3, 4], &[Plus, Star]).unwrap(), Value::int(14));
        assert_eq!(eval(&[2, 3, 5], &[StarStar, Percent]).unwrap(), Value::int(3));
        assert_eq!(
            eval(&[1, 2, 3, 4, 2], &[Plus, Star, Minus, Slash]).unwrap(),
            Value::int(5)
        );
    }

    #[test]
    fn test_left_associative_within_class() {
        use TokenKind::*;
        assert_eq!(eval(&[10, 4, 3], &[Minus, Minus]).unwrap(), Value::int(3));
        assert_eq!(eval(&[100, 10, 5], &[Slash, Slash]).unwrap().to_string(), "2.0");
    }

    #[test]
    fn test_result_typing() {
        use TokenKind::*;
        let half = apply(Slash, &Value::int(1), &Value::int(2), 16).unwrap();
        assert_eq!(half.kind(), crate::interp::Kind::Float);
        let sum = apply(Plus, &Value::int(1), &Value::int(2), 16).unwrap();
        assert_eq!(sum.kind(), crate::interp::Kind::Int);
        let floor = apply(SlashSlash, &Value::int(7), &Value::int(2), 16).unwrap();
        assert_eq!(floor, Value::int(3));
    }

    #[test]
    fn test_divide_by_zero_kinds() {
        use TokenKind::*;
        for op in [Slash, Percent, SlashSlash] {
            let err = apply(op, &Value::int(5), &Value::int(0), 16).unwrap_err();
            assert_eq!(err.kind, ErrorKind::DivideByZero);
        }
    }

    #[test]
    fn test_singleton_broadcast() {
        let result = apply(TokenKind::Plus, &int_list(&[1, 2, 3]), &int_list(&[10]), 16).unwrap();
        assert_eq!(result, int_list(&[11, 12, 13]));
    }

    #[test]
    fn test_length_mismatch() {
        let err = apply(TokenKind::Plus, &int_list(&[1, 2]), &int_list(&[1, 2, 3]), 16).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Arithmetic);
    }

    #[test]
    fn test_empty_list_yields_other_operand() {
        let other = int_list(&[4, 5]);
        assert_eq!(apply(TokenKind::Star, &int_list(&[]), &other, 16).unwrap(), other);
    }

    #[test]
    fn test_scalar_broadcast_is_commutative() {
        use TokenKind::*;
        let list = Value::list(vec![Value::int(1), int_list(&[2, 3])]);
        for op in [Plus, Star] {
            let left = apply(op, &Value::int(3), &list, 16).unwrap();
            let right = apply(op, &list, &Value::int(3), 16).unwrap();
            assert_eq!(left, right);
        }
    }

    #[test]
    fn test_broadcast_is_directional() {
        use TokenKind::*;
        let list = int_list(&[10, 20]);
        assert_eq!(apply(Minus, &Value::int(1), &list, 16).unwrap(), int_list(&[-9, -19]));
        assert_eq!(apply(Minus, &list, &Value::int(1), 16).unwrap(), int_list(&[9, 19]));
    }

    #[test]
    fn test_strings() {
        let joined = apply(TokenKind::Plus, &Value::str("ab"), &Value::str("cd"), 16).unwrap();
        assert_eq!(joined, Value::str("abcd"));
        let err = apply(TokenKind::Star, &Value::str("ab"), &Value::str("cd"), 16).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Arithmetic);
        let err = apply(TokenKind::Plus, &Value::str("ab"), &Value::int(1), 16).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Arithmetic);
    }

    #[test]
    fn test_bool_coercion_and_invalid_operands() {
        let sum = apply(TokenKind::Plus, &Value::Bool(true), &Value::int(1), 16).unwrap();
        assert_eq!(sum, Value::int(2));
        let map = Value::map(vec![]);
        let err = apply(TokenKind::Plus, &map, &Value::int(1), 16).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Arithmetic);
    }

    #[test]
    fn test_shifts_and_bits() {
        use TokenKind::*;
        assert_eq!(apply(Shl, &Value::int(1), &Value::int(10), 16).unwrap(), Value::int(1024));
        assert_eq!(apply(Shr, &Value::int(1024), &Value::int(3), 16).unwrap(), Value::int(128));
        assert_eq!(apply(Caret, &Value::int(6), &Value::int(3), 16).unwrap(), Value::int(5));
        let err = apply(Shl, &Value::int(1), &Value::int(-1), 16).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Arithmetic);
    }

    #[test]
    fn test_negative_power_is_float() {
        let v = apply(TokenKind::StarStar, &Value::int(2), &Value::int(-1), 16).unwrap();
        assert_eq!(v.to_string(), "0.5");
    }
}
