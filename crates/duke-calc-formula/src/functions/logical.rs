//! Logical functions

use duke_calc_core::CellError;

use super::{arg, FunctionContext};
use crate::value::Value;

/// IF(condition, [value_if_true], [value_if_false])
///
/// A missing `value_if_true` gives TRUE; a missing `value_if_false` gives
/// FALSE.
pub fn fn_if(args: &[Value], _ctx: &FunctionContext) -> Value {
    let condition = match arg(args, 0) {
        Value::Error(e) => return Value::Error(*e),
        v => match v.as_bool() {
            Some(b) => b,
            None => return Value::Error(CellError::Value),
        },
    };

    if condition {
        args.get(1).cloned().unwrap_or(Value::Boolean(true))
    } else {
        args.get(2).cloned().unwrap_or(Value::Boolean(false))
    }
}

/// Logical values an AND/OR sees
///
/// Text inside arrays is skipped; direct text must read TRUE or FALSE.
fn collect_bools(args: &[Value]) -> Result<Vec<bool>, CellError> {
    let mut bools = Vec::new();
    for arg in args {
        match arg {
            Value::Array(arr) => {
                for v in arr.iter() {
                    match v {
                        Value::Boolean(b) => bools.push(*b),
                        Value::Number(n) => bools.push(*n != 0.0),
                        Value::Error(e) => return Err(*e),
                        _ => {}
                    }
                }
            }
            Value::Error(e) => return Err(*e),
            Value::Blank => {}
            v => bools.push(v.as_bool().ok_or(CellError::Value)?),
        }
    }

    if bools.is_empty() {
        return Err(CellError::Value);
    }
    Ok(bools)
}

/// AND function
pub fn fn_and(args: &[Value], _ctx: &FunctionContext) -> Value {
    match collect_bools(args) {
        Ok(bools) => Value::Boolean(bools.into_iter().all(|b| b)),
        Err(e) => Value::Error(e),
    }
}

/// OR function
pub fn fn_or(args: &[Value], _ctx: &FunctionContext) -> Value {
    match collect_bools(args) {
        Ok(bools) => Value::Boolean(bools.into_iter().any(|b| b)),
        Err(e) => Value::Error(e),
    }
}

/// NOT function
pub fn fn_not(args: &[Value], _ctx: &FunctionContext) -> Value {
    match arg(args, 0) {
        Value::Error(e) => Value::Error(*e),
        v => v.as_bool().map_or(Value::Error(CellError::Value), |b| Value::Boolean(!b)),
    }
}

/// IFERROR(value, value_if_error)
///
/// Arrays are checked element by element.
pub fn fn_iferror(args: &[Value], _ctx: &FunctionContext) -> Value {
    replace_errors(args, |_| true)
}

/// IFNA(value, value_if_na)
pub fn fn_ifna(args: &[Value], _ctx: &FunctionContext) -> Value {
    replace_errors(args, |e| e == CellError::Na)
}

fn replace_errors(args: &[Value], matches: impl Fn(CellError) -> bool) -> Value {
    let fallback = arg(args, 1);
    let replace = |v: &Value| match v {
        Value::Error(e) if matches(*e) => fallback.clone(),
        v => v.clone(),
    };

    match arg(args, 0) {
        Value::Array(arr) => Value::Array(arr.map(replace)),
        v => replace(v),
    }
}

/// TRUE()
pub fn fn_true(_args: &[Value], _ctx: &FunctionContext) -> Value {
    Value::Boolean(true)
}

/// FALSE()
pub fn fn_false(_args: &[Value], _ctx: &FunctionContext) -> Value {
    Value::Boolean(false)
}
