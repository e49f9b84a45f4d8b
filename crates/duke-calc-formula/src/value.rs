//! Evaluation values
//!
//! [`Value`] is what every AST node evaluates to. Values are immutable:
//! operators and functions always build new ones, and arrays share their
//! backing storage.

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use duke_calc_core::{CellError, CellRange, CellValue, SharedString, SheetId, UnitId, UnitRange};
use futures::future::{BoxFuture, FutureExt, Shared};

/// Value produced by evaluating a formula node
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(SharedString),
    Boolean(bool),
    /// Empty cell or omitted argument
    Blank,
    Array(ArrayValue),
    Error(CellError),
    /// A bound range, read from the snapshot only when needed
    Reference(ReferenceValue),
    /// Result of an executor that has not finished yet
    Pending(AsyncValue),
}

/// Discriminator for [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Number,
    Text,
    Boolean,
    Blank,
    Array,
    Error,
    Reference,
    Pending,
}

impl Value {
    pub fn text<S: AsRef<str>>(s: S) -> Self {
        Value::Text(SharedString::new(s))
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Number(_) => ValueType::Number,
            Value::Text(_) => ValueType::Text,
            Value::Boolean(_) => ValueType::Boolean,
            Value::Blank => ValueType::Blank,
            Value::Array(_) => ValueType::Array,
            Value::Error(_) => ValueType::Error,
            Value::Reference(_) => ValueType::Reference,
            Value::Pending(_) => ValueType::Pending,
        }
    }

    /// Numeric view with spreadsheet coercions
    ///
    /// Booleans become 1/0, blank becomes 0 and numeric text is parsed.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Blank => Some(0.0),
            Value::Text(s) => parse_number(s.as_str()),
            _ => None,
        }
    }

    /// Text view; blank is the empty string
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Text(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Number(n) => Some(Cow::Owned(format_number(*n))),
            Value::Boolean(true) => Some(Cow::Borrowed("TRUE")),
            Value::Boolean(false) => Some(Cow::Borrowed("FALSE")),
            Value::Blank => Some(Cow::Borrowed("")),
            _ => None,
        }
    }

    /// Logical view; text must read `TRUE` or `FALSE`
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            Value::Number(n) => Some(*n != 0.0),
            Value::Blank => Some(false),
            Value::Text(s) => {
                let s = s.as_str().trim();
                if s.eq_ignore_ascii_case("TRUE") {
                    Some(true)
                } else if s.eq_ignore_ascii_case("FALSE") {
                    Some(false)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// The error kind, if this is an error
    pub fn error(&self) -> Option<CellError> {
        match self {
            Value::Error(e) => Some(*e),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Value::Blank)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Value::Pending(_))
    }

    /// Convert to a storable cell value
    ///
    /// Arrays collapse to their top-left element. References and pending
    /// values cannot be stored and become `#VALUE!` / `#CALC!`.
    pub fn to_cell_value(&self) -> CellValue {
        match self {
            Value::Number(n) => CellValue::Number(*n),
            Value::Text(s) => CellValue::String(s.clone()),
            Value::Boolean(b) => CellValue::Boolean(*b),
            Value::Blank => CellValue::Empty,
            Value::Error(e) => CellValue::Error(*e),
            Value::Array(a) => a
                .top_left()
                .map_or(CellValue::Empty, Value::to_cell_value),
            Value::Reference(_) => CellValue::Error(CellError::Value),
            Value::Pending(_) => CellValue::Error(CellError::Calc),
        }
    }
}

impl From<CellValue> for Value {
    fn from(value: CellValue) -> Self {
        match value {
            CellValue::Empty => Value::Blank,
            CellValue::Boolean(b) => Value::Boolean(b),
            CellValue::Number(n) => Value::Number(n),
            CellValue::String(s) => Value::Text(s),
            CellValue::Error(e) => Value::Error(e),
        }
    }
}

impl From<&CellValue> for Value {
    fn from(value: &CellValue) -> Self {
        value.clone().into()
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

impl From<CellError> for Value {
    fn from(e: CellError) -> Self {
        Value::Error(e)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Error(e) => f.write_str(e.as_str()),
            Value::Array(a) => {
                f.write_str("{")?;
                for r in 0..a.rows() {
                    if r > 0 {
                        f.write_str(";")?;
                    }
                    for c in 0..a.cols() {
                        if c > 0 {
                            f.write_str(",")?;
                        }
                        match a.get(r, c) {
                            Some(Value::Text(s)) => write!(f, "\"{}\"", s.as_str().replace('"', "\"\""))?,
                            Some(v) => write!(f, "{}", v)?,
                            None => {}
                        }
                    }
                }
                f.write_str("}")
            }
            Value::Reference(r) => write!(f, "{}", r),
            Value::Pending(p) => write!(f, "<pending #{}>", p.id()),
            other => f.write_str(other.as_text().as_deref().unwrap_or_default()),
        }
    }
}

/// Parse numeric text the way a cell entry would be read
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Some(pct) = s.strip_suffix('%') {
        return pct.trim().parse::<f64>().ok().map(|n| n / 100.0);
    }
    // Rust accepts "inf"/"NaN"; cells never do
    if s.bytes().any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E') {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Render a number for text contexts (concatenation, LEN, ...)
pub fn format_number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    // 15 significant digits, trailing zeros trimmed
    let formatted = format!("{:.*e}", 14, n);
    match formatted.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            if (-10..15).contains(&exp) {
                let value: f64 = formatted.parse().unwrap_or(n);
                let decimals = (14 - exp).clamp(0, 20) as usize;
                let s = format!("{:.*}", decimals, value);
                trim_fraction(&s)
            } else {
                format!("{}E{}{:02}", trim_fraction(mantissa), if exp < 0 { '-' } else { '+' }, exp.abs())
            }
        }
        None => formatted,
    }
}

fn trim_fraction(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

/// An immutable rows x cols grid of values
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    rows: usize,
    cols: usize,
    data: Arc<[Value]>,
}

impl ArrayValue {
    /// Build from row-major data; `None` if the length does not match
    pub fn new(rows: usize, cols: usize, data: Vec<Value>) -> Option<Self> {
        (data.len() == rows * cols).then(|| Self {
            rows,
            cols,
            data: data.into(),
        })
    }

    /// Build from nested rows; short rows are padded with `#N/A`
    pub fn from_rows(rows: Vec<Vec<Value>>) -> Self {
        let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
        let n_rows = rows.len();
        let mut data = Vec::with_capacity(n_rows * cols);
        for mut row in rows {
            row.resize(cols, Value::Error(CellError::Na));
            data.extend(row);
        }
        Self {
            rows: n_rows,
            cols,
            data: data.into(),
        }
    }

    /// A 1x1 array
    pub fn scalar(value: Value) -> Self {
        Self {
            rows: 1,
            cols: 1,
            data: vec![value].into(),
        }
    }

    /// Every cell set to the same value
    pub fn filled(rows: usize, cols: usize, value: Value) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols].into(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&Value> {
        if row < self.rows && col < self.cols {
            self.data.get(row * self.cols + col)
        } else {
            None
        }
    }

    pub fn top_left(&self) -> Option<&Value> {
        self.data.first()
    }

    /// Values in row-major order
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.data.iter()
    }

    /// One row as a slice
    pub fn row(&self, row: usize) -> Option<&[Value]> {
        (row < self.rows).then(|| &self.data[row * self.cols..(row + 1) * self.cols])
    }

    /// Element-wise transform into a new array of the same shape
    pub fn map<F: FnMut(&Value) -> Value>(&self, f: F) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(f).collect(),
        }
    }
}

/// A range bound to a concrete unit and sheet
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceValue {
    pub unit_id: UnitId,
    pub sheet_id: SheetId,
    pub range: CellRange,
}

impl ReferenceValue {
    pub fn new<U: Into<UnitId>, S: Into<SheetId>>(unit_id: U, sheet_id: S, range: CellRange) -> Self {
        Self {
            unit_id: unit_id.into(),
            sheet_id: sheet_id.into(),
            range,
        }
    }

    pub fn same_sheet(&self, other: &ReferenceValue) -> bool {
        self.unit_id == other.unit_id && self.sheet_id == other.sheet_id
    }

    pub fn is_single_cell(&self) -> bool {
        self.range.is_single()
    }

    pub fn to_unit_range(&self) -> UnitRange {
        UnitRange::new(self.unit_id.clone(), self.sheet_id.clone(), self.range)
    }
}

impl fmt::Display for ReferenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]{}!{}", self.unit_id, self.sheet_id, self.range)
    }
}

static NEXT_ASYNC_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a value that an executor is still computing
///
/// The future is shared, so clones of the handle all observe the same
/// result and the work runs once.
#[derive(Clone)]
pub struct AsyncValue {
    id: u64,
    future: Shared<BoxFuture<'static, Value>>,
}

impl AsyncValue {
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Value> + Send + 'static,
    {
        Self {
            id: NEXT_ASYNC_ID.fetch_add(1, Ordering::Relaxed),
            future: future.boxed().shared(),
        }
    }

    /// A handle that is already resolved
    pub fn ready(value: Value) -> Self {
        Self::new(futures::future::ready(value))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The result, if the future has already completed
    pub fn peek(&self) -> Option<Value> {
        self.future.peek().cloned()
    }

    /// Wait for the result
    pub fn resolve(&self) -> Shared<BoxFuture<'static, Value>> {
        self.future.clone()
    }
}

impl fmt::Debug for AsyncValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncValue")
            .field("id", &self.id)
            .field("ready", &self.future.peek().is_some())
            .finish()
    }
}

impl PartialEq for AsyncValue {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
