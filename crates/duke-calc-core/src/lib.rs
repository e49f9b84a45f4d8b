//! # duke-calc-core
//!
//! Core data structures for the duke-calc formula engine.
//!
//! This crate provides the snapshot types that formulas are evaluated against:
//! - [`CellValue`] / [`CellError`] - Stored values and the spreadsheet error kinds
//! - [`CellAddress`] and [`CellRange`] - Cell addressing and normalized ranges
//! - [`UnitRange`] - A range bound to a unit (workbook) and sheet
//! - [`Workbook`], [`Worksheet`] - Sparse sheets, sheet names and defined names
//! - [`UnitData`] - Every loaded unit, keyed by id
//!
//! ## Example
//!
//! ```rust
//! use duke_calc_core::{CellValue, UnitData, Workbook, Worksheet};
//!
//! let mut book = Workbook::new("book1");
//! let sheet = book.add_sheet(Worksheet::new("sheet1", "Sheet1")).unwrap();
//!
//! // Using string addresses
//! sheet.set_value("A1", 42.0).unwrap();
//! sheet.set_formula("B1", "=A1*2").unwrap();
//!
//! // Or using row/column indices (0-based)
//! sheet.set_value_at(1, 0, "Hello");
//!
//! let data: UnitData = std::iter::once(book).collect();
//! assert_eq!(data.value("book1", "sheet1", 0, 0), Some(CellValue::Number(42.0)));
//! ```

pub mod cell;
pub mod error;
pub mod range;
pub mod unit_data;
pub mod workbook;
pub mod worksheet;

// Re-exports for convenience
pub use cell::{
    CellAddress, CellData, CellError, CellMatrix, CellRange, CellValue, FormulaDataItem,
    SharedString,
};
pub use error::{Error, Result};
pub use range::{SheetId, UnitCell, UnitId, UnitRange};
pub use unit_data::{UnitData, UnitSheetNameMap};
pub use workbook::{DefinedName, Workbook};
pub use worksheet::{ColumnInfo, RowInfo, Worksheet};

/// Maximum number of rows in a worksheet (Excel limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet (Excel limit)
pub const MAX_COLS: u16 = 16_384;
