//! Cell-related types
//!
//! - [`CellAddress`] / [`CellRange`] - positions and normalized blocks
//! - [`CellValue`] / [`CellError`] - stored values and the error taxonomy
//! - [`CellData`] / [`FormulaDataItem`] - a cell's content
//! - [`CellMatrix`] - sparse storage keyed by position

mod address;
mod data;
mod matrix;
mod value;

pub use address::{CellAddress, CellRange};
pub use data::{CellData, FormulaDataItem};
pub use matrix::CellMatrix;
pub use value::{CellError, CellValue, SharedString};
