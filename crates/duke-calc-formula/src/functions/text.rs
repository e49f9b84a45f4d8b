//! Text functions

use duke_calc_core::CellError;

use super::{arg, flatten, number_arg, FunctionContext};
use crate::operators::to_text;
use crate::value::Value;

fn text_arg(args: &[Value], index: usize) -> Result<String, CellError> {
    to_text(arg(args, index))
}

/// Optional character count, defaulting to 1
fn count_arg(args: &[Value], index: usize) -> Result<usize, CellError> {
    if args.len() <= index {
        return Ok(1);
    }
    let n = number_arg(args, index)?;
    if n < 0.0 {
        return Err(CellError::Value);
    }
    Ok(n.trunc() as usize)
}

/// LEN(text) - number of characters
pub fn fn_len(args: &[Value], _ctx: &FunctionContext) -> Value {
    match text_arg(args, 0) {
        Ok(s) => Value::Number(s.chars().count() as f64),
        Err(e) => Value::Error(e),
    }
}

/// LEFT(text, [num_chars])
pub fn fn_left(args: &[Value], _ctx: &FunctionContext) -> Value {
    match (text_arg(args, 0), count_arg(args, 1)) {
        (Ok(s), Ok(n)) => Value::text(s.chars().take(n).collect::<String>()),
        (Err(e), _) | (_, Err(e)) => Value::Error(e),
    }
}

/// RIGHT(text, [num_chars])
pub fn fn_right(args: &[Value], _ctx: &FunctionContext) -> Value {
    match (text_arg(args, 0), count_arg(args, 1)) {
        (Ok(s), Ok(n)) => {
            let len = s.chars().count();
            Value::text(s.chars().skip(len.saturating_sub(n)).collect::<String>())
        }
        (Err(e), _) | (_, Err(e)) => Value::Error(e),
    }
}

/// MID(text, start_num, num_chars)
pub fn fn_mid(args: &[Value], _ctx: &FunctionContext) -> Value {
    let s = match text_arg(args, 0) {
        Ok(s) => s,
        Err(e) => return Value::Error(e),
    };
    let start = match number_arg(args, 1) {
        Ok(n) if n >= 1.0 => n.trunc() as usize,
        Ok(_) => return Value::Error(CellError::Value),
        Err(e) => return Value::Error(e),
    };
    let count = match count_arg(args, 2) {
        Ok(n) => n,
        Err(e) => return Value::Error(e),
    };

    Value::text(s.chars().skip(start - 1).take(count).collect::<String>())
}

/// UPPER(text)
pub fn fn_upper(args: &[Value], _ctx: &FunctionContext) -> Value {
    text_arg(args, 0).map_or_else(Value::Error, |s| Value::text(s.to_uppercase()))
}

/// LOWER(text)
pub fn fn_lower(args: &[Value], _ctx: &FunctionContext) -> Value {
    text_arg(args, 0).map_or_else(Value::Error, |s| Value::text(s.to_lowercase()))
}

/// TRIM(text) - strips leading and trailing spaces and collapses inner runs
pub fn fn_trim(args: &[Value], _ctx: &FunctionContext) -> Value {
    text_arg(args, 0).map_or_else(Value::Error, |s| {
        Value::text(s.split(' ').filter(|w| !w.is_empty()).collect::<Vec<_>>().join(" "))
    })
}

/// CONCATENATE(text1, ...)
pub fn fn_concatenate(args: &[Value], _ctx: &FunctionContext) -> Value {
    let mut out = String::new();
    for v in args {
        match to_text(v) {
            Ok(s) => out.push_str(&s),
            Err(e) => return Value::Error(e),
        }
    }
    Value::text(out)
}

/// CONCAT(text1, ...) - like CONCATENATE, but also joins ranges
pub fn fn_concat(args: &[Value], _ctx: &FunctionContext) -> Value {
    let mut out = String::new();
    for v in flatten(args) {
        match to_text(v) {
            Ok(s) => out.push_str(&s),
            Err(e) => return Value::Error(e),
        }
    }
    Value::text(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ArrayValue;
    use pretty_assertions::assert_eq;

    fn ctx() -> FunctionContext {
        FunctionContext::default()
    }

    fn text(s: &str) -> Value {
        Value::text(s)
    }

    #[test]
    fn test_len() {
        assert_eq!(fn_len(&[text("héllo")], &ctx()), Value::Number(5.0));
        assert_eq!(fn_len(&[Value::Number(12.5)], &ctx()), Value::Number(4.0));
        assert_eq!(fn_len(&[Value::Blank], &ctx()), Value::Number(0.0));
    }

    #[test]
    fn test_left_right_mid() {
        assert_eq!(fn_left(&[text("Hello")], &ctx()), text("H"));
        assert_eq!(fn_left(&[text("Hello"), Value::Number(3.0)], &ctx()), text("Hel"));
        assert_eq!(fn_right(&[text("Hello"), Value::Number(2.0)], &ctx()), text("lo"));
        assert_eq!(fn_right(&[text("Hi"), Value::Number(9.0)], &ctx()), text("Hi"));
        assert_eq!(
            fn_left(&[text("Hello"), Value::Number(-1.0)], &ctx()),
            Value::Error(CellError::Value)
        );
        assert_eq!(
            fn_mid(&[text("Hello"), Value::Number(2.0), Value::Number(3.0)], &ctx()),
            text("ell")
        );
        assert_eq!(
            fn_mid(&[text("Hello"), Value::Number(0.0), Value::Number(3.0)], &ctx()),
            Value::Error(CellError::Value)
        );
        assert_eq!(
            fn_mid(&[text("Hello"), Value::Number(9.0), Value::Number(3.0)], &ctx()),
            text("")
        );
    }

    #[test]
    fn test_case_and_trim() {
        assert_eq!(fn_upper(&[text("abc")], &ctx()), text("ABC"));
        assert_eq!(fn_lower(&[text("ABC")], &ctx()), text("abc"));
        assert_eq!(fn_trim(&[text("  a   b  ")], &ctx()), text("a b"));
    }

    #[test]
    fn test_concat() {
        assert_eq!(
            fn_concatenate(&[text("a"), Value::Number(1.0), Value::Boolean(true)], &ctx()),
            text("a1TRUE")
        );
        let range = Value::Array(ArrayValue::from_rows(vec![vec![text("x"), text("y")], vec![Value::Blank, text("z")]]));
        assert_eq!(fn_concat(&[range, text("!")], &ctx()), text("xyz!"));
        assert_eq!(
            fn_concat(&[text("a"), Value::Error(CellError::Ref)], &ctx()),
            Value::Error(CellError::Ref)
        );
    }
}
