//! Lookup and reference functions

use duke_calc_core::{CellError, CellRange};

use super::{number_arg, FunctionContext};
use crate::value::{ArrayValue, ReferenceValue, Value};

/// ROWS function
pub fn fn_rows(args: &[Value], _ctx: &FunctionContext) -> Value {
    match args.first() {
        Some(Value::Reference(r)) => Value::Number(r.range.row_count() as f64),
        Some(Value::Array(arr)) => Value::Number(arr.rows() as f64),
        Some(_) => Value::Number(1.0),
        None => Value::Error(CellError::Na),
    }
}

/// COLUMNS function
pub fn fn_columns(args: &[Value], _ctx: &FunctionContext) -> Value {
    match args.first() {
        Some(Value::Reference(r)) => Value::Number(r.range.col_count() as f64),
        Some(Value::Array(arr)) => Value::Number(arr.cols() as f64),
        Some(_) => Value::Number(1.0),
        None => Value::Error(CellError::Na),
    }
}

/// ROW function
///
/// Without an argument, the row of the calling cell.
pub fn fn_row(args: &[Value], ctx: &FunctionContext) -> Value {
    match args.first() {
        None | Some(Value::Blank) => Value::Number(ctx.row as f64 + 1.0),
        Some(Value::Reference(r)) => Value::Number(r.range.start.row as f64 + 1.0),
        Some(_) => Value::Error(CellError::Value),
    }
}

/// COLUMN function
pub fn fn_column(args: &[Value], ctx: &FunctionContext) -> Value {
    match args.first() {
        None | Some(Value::Blank) => Value::Number(ctx.col as f64 + 1.0),
        Some(Value::Reference(r)) => Value::Number(r.range.start.col as f64 + 1.0),
        Some(_) => Value::Error(CellError::Value),
    }
}

/// INDEX function
///
/// `INDEX(area, row, [col])`. A zero row or column selects the whole column
/// or row. On a reference the result is a reference too.
pub fn fn_index(args: &[Value], _ctx: &FunctionContext) -> Value {
    let (rows, cols) = match args.first() {
        Some(Value::Reference(r)) => (r.range.row_count() as usize, r.range.col_count() as usize),
        Some(Value::Array(arr)) => (arr.rows(), arr.cols()),
        _ => return Value::Error(CellError::Value),
    };
    if rows == 0 || cols == 0 {
        return Value::Error(CellError::Ref);
    }

    let mut row = match number_arg(args, 1) {
        Ok(n) => n.trunc(),
        Err(e) => return Value::Error(e),
    };
    let mut col = match number_arg(args, 2) {
        Ok(n) => n.trunc(),
        Err(e) => return Value::Error(e),
    };

    // INDEX(A1:C1, 2) walks along the only row
    if args.len() < 3 && rows == 1 && cols > 1 {
        col = row;
        row = 1.0;
    }
    if args.len() < 3 && cols == 1 && col == 0.0 {
        col = 1.0;
    }

    if row < 0.0 || col < 0.0 {
        return Value::Error(CellError::Value);
    }
    if row > rows as f64 || col > cols as f64 {
        return Value::Error(CellError::Ref);
    }

    // 0 means "all"
    let (r0, r1) = if row == 0.0 { (0, rows - 1) } else { (row as usize - 1, row as usize - 1) };
    let (c0, c1) = if col == 0.0 { (0, cols - 1) } else { (col as usize - 1, col as usize - 1) };

    match &args[0] {
        Value::Reference(r) => {
            let start = r.range.start;
            let sub = CellRange::from_indices(
                start.row + r0 as u32,
                start.col + c0 as u16,
                start.row + r1 as u32,
                start.col + c1 as u16,
            );
            Value::Reference(ReferenceValue::new(r.unit_id.clone(), r.sheet_id.clone(), sub))
        }
        Value::Array(arr) => {
            if r0 == r1 && c0 == c1 {
                return arr.get(r0, c0).cloned().unwrap_or(Value::Error(CellError::Ref));
            }
            let data = (r0..=r1)
                .flat_map(|r| (c0..=c1).map(move |c| (r, c)))
                .map(|(r, c)| arr.get(r, c).cloned().unwrap_or(Value::Error(CellError::Ref)))
                .collect();
            ArrayValue::new(r1 - r0 + 1, c1 - c0 + 1, data).map_or(Value::Error(CellError::Ref), Value::Array)
        }
        _ => Value::Error(CellError::Value),
    }
}

/// CHOOSE function
pub fn fn_choose(args: &[Value], _ctx: &FunctionContext) -> Value {
    let index = match number_arg(args, 0) {
        Ok(n) => n.trunc(),
        Err(e) => return Value::Error(e),
    };

    if index < 1.0 || index >= args.len() as f64 {
        return Value::Error(CellError::Value);
    }
    args[index as usize].clone()
}
