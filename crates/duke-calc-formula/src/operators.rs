//! Operator algebra over [`Value`]
//!
//! Every operator is total: bad operands produce error values, never faults.
//! Operands are expected to be materialized already; a `Reference` reaching
//! this module is a `#VALUE!`.

use std::cmp::Ordering;

use duke_calc_core::CellError;

use crate::ast::{BinaryOperator, UnaryOperator};
use crate::value::{ArrayValue, Value};

/// Apply a binary operator, broadcasting over arrays
pub fn binary_op(op: BinaryOperator, left: &Value, right: &Value) -> Value {
    match (left, right) {
        (Value::Array(l), Value::Array(r)) => broadcast(op, l, r),
        (Value::Array(l), r) => broadcast(op, l, &ArrayValue::scalar(r.clone())),
        (l, Value::Array(r)) => broadcast(op, &ArrayValue::scalar(l.clone()), r),
        (l, r) => scalar_binary_op(op, l, r),
    }
}

/// Apply a unary operator, element-wise over arrays
pub fn unary_op(op: UnaryOperator, operand: &Value) -> Value {
    match operand {
        Value::Array(arr) => Value::Array(arr.map(|v| unary_op(op, v))),
        Value::Error(e) => Value::Error(*e),
        v => match to_number(v) {
            Ok(n) => match op {
                UnaryOperator::Negate => Value::Number(-n),
                UnaryOperator::Percent => Value::Number(n / 100.0),
            },
            Err(e) => Value::Error(e),
        },
    }
}

/// Numeric coercion used by arithmetic
pub fn to_number(value: &Value) -> Result<f64, CellError> {
    match value {
        Value::Error(e) => Err(*e),
        Value::Array(_) | Value::Reference(_) => Err(CellError::Value),
        Value::Pending(_) => Err(CellError::Calc),
        v => v.as_number().ok_or(CellError::Value),
    }
}

/// Text coercion used by `&`
pub fn to_text(value: &Value) -> Result<String, CellError> {
    match value {
        Value::Error(e) => Err(*e),
        Value::Pending(_) => Err(CellError::Calc),
        v => v
            .as_text()
            .map(|s| s.into_owned())
            .ok_or(CellError::Value),
    }
}

/// Result shape when combining two arrays
///
/// A dimension of 1 stretches to match the other side. Where neither side
/// can stretch the result takes the larger size, and cells outside the
/// smaller operand become `#N/A`.
fn broadcast(op: BinaryOperator, left: &ArrayValue, right: &ArrayValue) -> Value {
    if left.is_empty() || right.is_empty() {
        return Value::Error(CellError::Value);
    }

    let rows = left.rows().max(right.rows());
    let cols = left.cols().max(right.cols());
    let mut data = Vec::with_capacity(rows * cols);

    for r in 0..rows {
        for c in 0..cols {
            let value = match (element(left, r, c), element(right, r, c)) {
                (Some(l), Some(r)) => scalar_binary_op(op, l, r),
                _ => Value::Error(CellError::Na),
            };
            data.push(value);
        }
    }

    ArrayValue::new(rows, cols, data).map_or(Value::Error(CellError::Value), Value::Array)
}

fn element(arr: &ArrayValue, row: usize, col: usize) -> Option<&Value> {
    let r = if arr.rows() == 1 { 0 } else { row };
    let c = if arr.cols() == 1 { 0 } else { col };
    arr.get(r, c)
}

fn scalar_binary_op(op: BinaryOperator, left: &Value, right: &Value) -> Value {
    // Propagate errors, left first
    if let Value::Error(e) = left {
        return Value::Error(*e);
    }
    if let Value::Error(e) = right {
        return Value::Error(*e);
    }
    if left.is_pending() || right.is_pending() {
        return Value::Error(CellError::Calc);
    }

    match op {
        BinaryOperator::Add
        | BinaryOperator::Subtract
        | BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::Power => {
            let l = match to_number(left) {
                Ok(n) => n,
                Err(e) => return Value::Error(e),
            };
            let r = match to_number(right) {
                Ok(n) => n,
                Err(e) => return Value::Error(e),
            };
            arithmetic(op, l, r)
        }

        BinaryOperator::Concat => match (to_text(left), to_text(right)) {
            (Ok(l), Ok(r)) => Value::text(l + &r),
            (Err(e), _) | (_, Err(e)) => Value::Error(e),
        },

        BinaryOperator::Equal => compare(left, right).map_or_else(Value::Error, |o| Value::Boolean(o == Ordering::Equal)),
        BinaryOperator::NotEqual => compare(left, right).map_or_else(Value::Error, |o| Value::Boolean(o != Ordering::Equal)),
        BinaryOperator::LessThan => compare(left, right).map_or_else(Value::Error, |o| Value::Boolean(o == Ordering::Less)),
        BinaryOperator::LessEqual => compare(left, right).map_or_else(Value::Error, |o| Value::Boolean(o != Ordering::Greater)),
        BinaryOperator::GreaterThan => compare(left, right).map_or_else(Value::Error, |o| Value::Boolean(o == Ordering::Greater)),
        BinaryOperator::GreaterEqual => compare(left, right).map_or_else(Value::Error, |o| Value::Boolean(o != Ordering::Less)),

        // Reference operators need the interpreter
        BinaryOperator::Range | BinaryOperator::Intersect => Value::Error(CellError::Value),
    }
}

fn arithmetic(op: BinaryOperator, l: f64, r: f64) -> Value {
    let result = match op {
        BinaryOperator::Add => l + r,
        BinaryOperator::Subtract => l - r,
        BinaryOperator::Multiply => l * r,
        BinaryOperator::Divide => {
            if r == 0.0 {
                return Value::Error(CellError::Div0);
            }
            l / r
        }
        BinaryOperator::Power => {
            if l == 0.0 && r == 0.0 {
                return Value::Error(CellError::Num);
            }
            if l == 0.0 && r < 0.0 {
                return Value::Error(CellError::Div0);
            }
            l.powf(r)
        }
        _ => return Value::Error(CellError::Value),
    };

    if result.is_finite() {
        Value::Number(result)
    } else {
        Value::Error(CellError::Num)
    }
}

/// Comparison used by `= <> < <= > >=`
///
/// Blank compares as 0, "" or FALSE depending on the other side. Mixed types
/// follow [`compare_for_sort`]: Number < Boolean < Text. Text compares
/// case-insensitively.
fn compare(left: &Value, right: &Value) -> Result<Ordering, CellError> {
    let (left, right) = match (left, right) {
        (Value::Blank, Value::Blank) => return Ok(Ordering::Equal),
        (Value::Blank, r) => (blank_like(r), r.clone()),
        (l, Value::Blank) => (l.clone(), blank_like(l)),
        (l, r) => (l.clone(), r.clone()),
    };

    match (&left, &right) {
        (Value::Number(l), Value::Number(r)) => Ok(l.partial_cmp(r).unwrap_or(Ordering::Equal)),
        (Value::Text(l), Value::Text(r)) => Ok(compare_text(l.as_str(), r.as_str())),
        (Value::Boolean(l), Value::Boolean(r)) => Ok(l.cmp(r)),
        (Value::Number(_) | Value::Boolean(_) | Value::Text(_), Value::Number(_) | Value::Boolean(_) | Value::Text(_)) => {
            Ok(compare_for_sort(&left, &right))
        }
        _ => Err(CellError::Value),
    }
}

fn blank_like(other: &Value) -> Value {
    match other {
        Value::Text(_) => Value::text(""),
        Value::Boolean(_) => Value::Boolean(false),
        _ => Value::Number(0.0),
    }
}

fn compare_text(l: &str, r: &str) -> Ordering {
    l.to_lowercase().cmp(&r.to_lowercase())
}

/// Total order across all value types, for sorting
///
/// Blank < Number < Boolean < Text < Error. Arrays order by their top-left
/// element; references and pending values sort last.
pub fn compare_for_sort(left: &Value, right: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Blank => 0,
            Value::Number(_) => 1,
            Value::Boolean(_) => 2,
            Value::Text(_) => 3,
            Value::Error(_) => 4,
            Value::Array(_) | Value::Reference(_) | Value::Pending(_) => 5,
        }
    }

    match (left, right) {
        (Value::Array(l), Value::Array(r)) => match (l.top_left(), r.top_left()) {
            (Some(l), Some(r)) => compare_for_sort(l, r),
            (l, r) => l.is_some().cmp(&r.is_some()),
        },
        (Value::Array(l), r) => l.top_left().map_or(Ordering::Less, |l| compare_for_sort(l, r)),
        (l, Value::Array(r)) => r.top_left().map_or(Ordering::Greater, |r| compare_for_sort(l, r)),
        (Value::Number(l), Value::Number(r)) => l.total_cmp(r),
        (Value::Boolean(l), Value::Boolean(r)) => l.cmp(r),
        (Value::Text(l), Value::Text(r)) => compare_text(l.as_str(), r.as_str()),
        (Value::Error(l), Value::Error(r)) => l.code().cmp(&r.code()),
        (l, r) => rank(l).cmp(&rank(r)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn num(n: f64) -> Value {
        Value::Number(n)
    }

    fn row(values: &[f64]) -> Value {
        Value::Array(ArrayValue::from_rows(vec![values.iter().map(|n| num(*n)).collect()]))
    }

    fn column(values: &[f64]) -> Value {
        Value::Array(ArrayValue::from_rows(values.iter().map(|n| vec![num(*n)]).collect()))
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(binary_op(BinaryOperator::Add, &num(1.0), &num(2.0)), num(3.0));
        assert_eq!(binary_op(BinaryOperator::Subtract, &Value::Blank, &num(2.0)), num(-2.0));
        assert_eq!(binary_op(BinaryOperator::Multiply, &Value::text("3"), &Value::Boolean(true)), num(3.0));
        assert_eq!(binary_op(BinaryOperator::Power, &num(2.0), &num(10.0)), num(1024.0));
        assert_eq!(
            binary_op(BinaryOperator::Add, &Value::text("abc"), &num(1.0)),
            Value::Error(CellError::Value)
        );
    }

    #[test]
    fn test_numeric_domain_errors() {
        assert_eq!(binary_op(BinaryOperator::Divide, &num(1.0), &num(0.0)), Value::Error(CellError::Div0));
        assert_eq!(binary_op(BinaryOperator::Divide, &num(1.0), &Value::Blank), Value::Error(CellError::Div0));
        assert_eq!(binary_op(BinaryOperator::Power, &num(-8.0), &num(0.5)), Value::Error(CellError::Num));
        assert_eq!(binary_op(BinaryOperator::Power, &num(0.0), &num(0.0)), Value::Error(CellError::Num));
        assert_eq!(binary_op(BinaryOperator::Power, &num(0.0), &num(-1.0)), Value::Error(CellError::Div0));
        assert_eq!(binary_op(BinaryOperator::Multiply, &num(1e308), &num(10.0)), Value::Error(CellError::Num));
    }

    #[test]
    fn test_errors_propagate_left_first() {
        let na = Value::Error(CellError::Na);
        let div = Value::Error(CellError::Div0);
        assert_eq!(binary_op(BinaryOperator::Add, &na, &div), na);
        assert_eq!(binary_op(BinaryOperator::Concat, &Value::text("a"), &div), div);
        assert_eq!(binary_op(BinaryOperator::Equal, &num(1.0), &na), na);
        assert_eq!(unary_op(UnaryOperator::Negate, &div), div);
    }

    #[test]
    fn test_concat() {
        assert_eq!(binary_op(BinaryOperator::Concat, &Value::text("a"), &num(1.5)), Value::text("a1.5"));
        assert_eq!(binary_op(BinaryOperator::Concat, &Value::Boolean(true), &Value::Blank), Value::text("TRUE"));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(binary_op(BinaryOperator::Equal, &Value::text("ABC"), &Value::text("abc")), Value::Boolean(true));
        assert_eq!(binary_op(BinaryOperator::LessThan, &num(5.0), &Value::text("1")), Value::Boolean(true));
        assert_eq!(binary_op(BinaryOperator::GreaterThan, &Value::Boolean(false), &Value::text("z")), Value::Boolean(false));
        assert_eq!(binary_op(BinaryOperator::GreaterThan, &Value::Boolean(true), &Value::text("z")), Value::Boolean(false));
        assert_eq!(binary_op(BinaryOperator::GreaterThan, &Value::text("a"), &Value::Boolean(true)), Value::Boolean(true));
        assert_eq!(binary_op(BinaryOperator::LessThan, &num(99.0), &Value::Boolean(false)), Value::Boolean(true));
        assert_eq!(binary_op(BinaryOperator::Equal, &Value::Blank, &num(0.0)), Value::Boolean(true));
        assert_eq!(binary_op(BinaryOperator::Equal, &Value::Blank, &Value::text("")), Value::Boolean(true));
        assert_eq!(binary_op(BinaryOperator::NotEqual, &Value::Blank, &Value::Boolean(false)), Value::Boolean(false));
        assert_eq!(binary_op(BinaryOperator::GreaterEqual, &num(2.0), &num(2.0)), Value::Boolean(true));
    }

    #[test]
    fn test_unary() {
        assert_eq!(unary_op(UnaryOperator::Negate, &Value::text("4")), num(-4.0));
        assert_eq!(unary_op(UnaryOperator::Percent, &num(50.0)), num(0.5));
        assert_eq!(unary_op(UnaryOperator::Negate, &row(&[1.0, -2.0])), row(&[-1.0, 2.0]));
    }

    #[test]
    fn test_broadcast_scalar_and_vectors() {
        assert_eq!(binary_op(BinaryOperator::Multiply, &row(&[1.0, 2.0, 3.0]), &num(2.0)), row(&[2.0, 4.0, 6.0]));

        // row x column -> full grid
        let grid = binary_op(BinaryOperator::Add, &row(&[1.0, 2.0]), &column(&[10.0, 20.0]));
        assert_eq!(
            grid,
            Value::Array(ArrayValue::from_rows(vec![vec![num(11.0), num(12.0)], vec![num(21.0), num(22.0)]]))
        );
    }

    #[test]
    fn test_broadcast_mismatch_fills_na() {
        let result = binary_op(BinaryOperator::Add, &row(&[1.0, 2.0, 3.0]), &row(&[1.0, 1.0]));
        assert_eq!(
            result,
            Value::Array(ArrayValue::from_rows(vec![vec![num(2.0), num(3.0), Value::Error(CellError::Na)]]))
        );

        let empty = Value::Array(ArrayValue::from_rows(Vec::new()));
        assert_eq!(binary_op(BinaryOperator::Add, &empty, &num(1.0)), Value::Error(CellError::Value));
    }

    #[test]
    fn test_sort_order() {
        let mut values = vec![
            Value::Error(CellError::Na),
            Value::text("b"),
            Value::Boolean(true),
            num(10.0),
            Value::Blank,
            Value::text("A"),
            num(-1.0),
            Value::Boolean(false),
        ];
        values.sort_by(compare_for_sort);
        assert_eq!(
            values,
            vec![
                Value::Blank,
                num(-1.0),
                num(10.0),
                Value::Boolean(false),
                Value::Boolean(true),
                Value::text("A"),
                Value::text("b"),
                Value::Error(CellError::Na),
            ]
        );
    }
}
