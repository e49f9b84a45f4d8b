//! Math functions

use duke_calc_core::CellError;
use rand::Rng;

use super::{arg, flatten, number_arg, FunctionContext};
use crate::ast::BinaryOperator;
use crate::operators::binary_op;
use crate::value::{parse_number, Value};

/// Numbers an aggregate sees
///
/// Direct arguments are coerced (`SUM("3", TRUE)` is 4) and fail with
/// `#VALUE!` when they cannot be. Inside arrays and ranges only real numbers
/// count; text, booleans and blanks are skipped. Errors anywhere propagate.
fn collect_numbers(args: &[Value]) -> Result<Vec<f64>, CellError> {
    let mut numbers = Vec::new();
    for arg in args {
        match arg {
            Value::Array(arr) => {
                for v in arr.iter() {
                    match v {
                        Value::Number(n) => numbers.push(*n),
                        Value::Error(e) => return Err(*e),
                        _ => {} // Ignore non-numeric
                    }
                }
            }
            Value::Error(e) => return Err(*e),
            Value::Blank => {}
            v => match v.as_number() {
                Some(n) => numbers.push(n),
                None => return Err(CellError::Value),
            },
        }
    }
    Ok(numbers)
}

/// SUM function
pub fn fn_sum(args: &[Value], _ctx: &FunctionContext) -> Value {
    match collect_numbers(args) {
        Ok(numbers) => Value::Number(numbers.iter().sum()),
        Err(e) => Value::Error(e),
    }
}

/// AVERAGE function
pub fn fn_average(args: &[Value], _ctx: &FunctionContext) -> Value {
    match collect_numbers(args) {
        Ok(numbers) if numbers.is_empty() => Value::Error(CellError::Div0),
        Ok(numbers) => Value::Number(numbers.iter().sum::<f64>() / numbers.len() as f64),
        Err(e) => Value::Error(e),
    }
}

/// MIN function
pub fn fn_min(args: &[Value], _ctx: &FunctionContext) -> Value {
    match collect_numbers(args) {
        Ok(numbers) => Value::Number(numbers.into_iter().reduce(f64::min).unwrap_or(0.0)),
        Err(e) => Value::Error(e),
    }
}

/// MAX function
pub fn fn_max(args: &[Value], _ctx: &FunctionContext) -> Value {
    match collect_numbers(args) {
        Ok(numbers) => Value::Number(numbers.into_iter().reduce(f64::max).unwrap_or(0.0)),
        Err(e) => Value::Error(e),
    }
}

/// PRODUCT function
pub fn fn_product(args: &[Value], _ctx: &FunctionContext) -> Value {
    match collect_numbers(args) {
        Ok(numbers) if numbers.is_empty() => Value::Number(0.0),
        Ok(numbers) => Value::Number(numbers.iter().product()),
        Err(e) => Value::Error(e),
    }
}

/// COUNT function
///
/// Counts numbers; never fails.
pub fn fn_count(args: &[Value], _ctx: &FunctionContext) -> Value {
    let mut count = 0;
    for arg in args {
        match arg {
            Value::Array(arr) => count += arr.iter().filter(|v| matches!(v, Value::Number(_))).count(),
            Value::Number(_) | Value::Boolean(_) => count += 1,
            Value::Text(s) if parse_number(s.as_str()).is_some() => count += 1,
            _ => {} // Don't count non-numeric
        }
    }
    Value::Number(count as f64)
}

/// COUNTA function
///
/// Counts everything that is not blank, errors included.
pub fn fn_counta(args: &[Value], _ctx: &FunctionContext) -> Value {
    let count = flatten(args).filter(|v| !v.is_blank()).count();
    Value::Number(count as f64)
}

/// ABS(number)
pub fn fn_abs(args: &[Value], _ctx: &FunctionContext) -> Value {
    unary(args, f64::abs)
}

/// ROUND(number, num_digits)
///
/// Rounds half away from zero.
pub fn fn_round(args: &[Value], _ctx: &FunctionContext) -> Value {
    let (number, digits) = match (number_arg(args, 0), number_arg(args, 1)) {
        (Ok(n), Ok(d)) => (n, d.trunc() as i32),
        (Err(e), _) | (_, Err(e)) => return Value::Error(e),
    };

    let multiplier = 10_f64.powi(digits);
    let result = if number >= 0.0 {
        (number * multiplier + 0.5).floor() / multiplier
    } else {
        (number * multiplier - 0.5).ceil() / multiplier
    };
    finite(result)
}

/// INT(number) - rounds toward negative infinity
pub fn fn_int(args: &[Value], _ctx: &FunctionContext) -> Value {
    unary(args, f64::floor)
}

/// MOD(number, divisor)
///
/// The result has the sign of the divisor.
pub fn fn_mod(args: &[Value], _ctx: &FunctionContext) -> Value {
    let (number, divisor) = match (number_arg(args, 0), number_arg(args, 1)) {
        (Ok(n), Ok(d)) => (n, d),
        (Err(e), _) | (_, Err(e)) => return Value::Error(e),
    };

    if divisor == 0.0 {
        return Value::Error(CellError::Div0);
    }
    finite(number - divisor * (number / divisor).floor())
}

/// POWER(number, power)
pub fn fn_power(args: &[Value], _ctx: &FunctionContext) -> Value {
    binary_op(BinaryOperator::Power, arg(args, 0), arg(args, 1))
}

/// SQRT(number)
pub fn fn_sqrt(args: &[Value], _ctx: &FunctionContext) -> Value {
    match number_arg(args, 0) {
        Ok(n) if n < 0.0 => Value::Error(CellError::Num),
        Ok(n) => Value::Number(n.sqrt()),
        Err(e) => Value::Error(e),
    }
}

/// SIGN(number)
pub fn fn_sign(args: &[Value], _ctx: &FunctionContext) -> Value {
    unary(args, |n| {
        if n > 0.0 {
            1.0
        } else if n < 0.0 {
            -1.0
        } else {
            0.0
        }
    })
}

/// PI()
pub fn fn_pi(_args: &[Value], _ctx: &FunctionContext) -> Value {
    Value::Number(std::f64::consts::PI)
}

/// RAND() - uniform in [0, 1)
pub fn fn_rand(_args: &[Value], _ctx: &FunctionContext) -> Value {
    Value::Number(rand::thread_rng().gen::<f64>())
}

/// RANDBETWEEN(bottom, top) - random integer, both ends inclusive
pub fn fn_randbetween(args: &[Value], _ctx: &FunctionContext) -> Value {
    let (bottom, top) = match (number_arg(args, 0), number_arg(args, 1)) {
        (Ok(b), Ok(t)) => (b.ceil() as i64, t.floor() as i64),
        (Err(e), _) | (_, Err(e)) => return Value::Error(e),
    };

    if bottom > top {
        return Value::Error(CellError::Num);
    }
    Value::Number(rand::thread_rng().gen_range(bottom..=top) as f64)
}

fn unary(args: &[Value], f: impl Fn(f64) -> f64) -> Value {
    match number_arg(args, 0) {
        Ok(n) => finite(f(n)),
        Err(e) => Value::Error(e),
    }
}

fn finite(n: f64) -> Value {
    if n.is_finite() {
        Value::Number(n)
    } else {
        Value::Error(CellError::Num)
    }
}
