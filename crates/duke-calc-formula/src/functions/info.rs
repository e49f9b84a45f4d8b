//! Information functions

use duke_calc_core::CellError;

use super::{arg, FunctionContext};
use crate::value::Value;

/// Apply a type test, element-wise over arrays
fn test_value(args: &[Value], test: impl Fn(&Value) -> bool) -> Value {
    match arg(args, 0) {
        Value::Array(arr) => Value::Array(arr.map(|v| Value::Boolean(test(v)))),
        v => Value::Boolean(test(v)),
    }
}

/// ISBLANK(value)
pub fn fn_isblank(args: &[Value], _ctx: &FunctionContext) -> Value {
    test_value(args, Value::is_blank)
}

/// ISNUMBER(value)
pub fn fn_isnumber(args: &[Value], _ctx: &FunctionContext) -> Value {
    test_value(args, |v| matches!(v, Value::Number(_)))
}

/// ISTEXT(value)
pub fn fn_istext(args: &[Value], _ctx: &FunctionContext) -> Value {
    test_value(args, |v| matches!(v, Value::Text(_)))
}

/// ISLOGICAL(value)
pub fn fn_islogical(args: &[Value], _ctx: &FunctionContext) -> Value {
    test_value(args, |v| matches!(v, Value::Boolean(_)))
}

/// ISERROR(value)
pub fn fn_iserror(args: &[Value], _ctx: &FunctionContext) -> Value {
    test_value(args, Value::is_error)
}

/// ISERR(value) - any error except #N/A
pub fn fn_iserr(args: &[Value], _ctx: &FunctionContext) -> Value {
    test_value(args, |v| matches!(v, Value::Error(e) if *e != CellError::Na))
}

/// ISNA(value)
pub fn fn_isna(args: &[Value], _ctx: &FunctionContext) -> Value {
    test_value(args, |v| matches!(v, Value::Error(CellError::Na)))
}

/// NA()
pub fn fn_na(_args: &[Value], _ctx: &FunctionContext) -> Value {
    Value::Error(CellError::Na)
}

/// ERROR.TYPE(error_val)
pub fn fn_error_type(args: &[Value], _ctx: &FunctionContext) -> Value {
    match arg(args, 0) {
        Value::Error(e) => Value::Number(e.type_number() as f64),
        _ => Value::Error(CellError::Na),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ArrayValue;
    use pretty_assertions::assert_eq;

    fn ctx() -> FunctionContext {
        FunctionContext::default()
    }

    #[test]
    fn test_type_checks() {
        assert_eq!(fn_isblank(&[Value::Blank], &ctx()), Value::Boolean(true));
        assert_eq!(fn_isblank(&[Value::text("")], &ctx()), Value::Boolean(false));
        assert_eq!(fn_isnumber(&[Value::Number(1.0)], &ctx()), Value::Boolean(true));
        assert_eq!(fn_isnumber(&[Value::text("1")], &ctx()), Value::Boolean(false));
        assert_eq!(fn_istext(&[Value::text("1")], &ctx()), Value::Boolean(true));
        assert_eq!(fn_islogical(&[Value::Boolean(false)], &ctx()), Value::Boolean(true));
    }

    #[test]
    fn test_error_checks() {
        let na = [Value::Error(CellError::Na)];
        let div0 = [Value::Error(CellError::Div0)];
        assert_eq!(fn_iserror(&na, &ctx()), Value::Boolean(true));
        assert_eq!(fn_iserr(&na, &ctx()), Value::Boolean(false));
        assert_eq!(fn_iserr(&div0, &ctx()), Value::Boolean(true));
        assert_eq!(fn_isna(&na, &ctx()), Value::Boolean(true));
        assert_eq!(fn_isna(&div0, &ctx()), Value::Boolean(false));
    }

    #[test]
    fn test_error_type() {
        assert_eq!(fn_error_type(&[Value::Error(CellError::Div0)], &ctx()), Value::Number(2.0));
        assert_eq!(fn_error_type(&[Value::Error(CellError::Na)], &ctx()), Value::Number(7.0));
        assert_eq!(fn_error_type(&[Value::Number(1.0)], &ctx()), Value::Error(CellError::Na));
        assert_eq!(fn_na(&[], &ctx()), Value::Error(CellError::Na));
    }

    #[test]
    fn test_checks_map_over_arrays() {
        let arr = Value::Array(ArrayValue::from_rows(vec![vec![Value::Blank, Value::Number(1.0)]]));
        let expected = Value::Array(ArrayValue::from_rows(vec![vec![Value::Boolean(true), Value::Boolean(false)]]));
        assert_eq!(fn_isblank(&[arr], &ctx()), expected);
    }
}
