//! Formula error types
//!
//! Expected failures (bad arguments, broken references, division by zero)
//! are carried as [`CellError`](duke_calc_core::CellError) values and never
//! show up here. [`FormulaError`] is for internal faults, which the
//! recalculation engine catches per cell and reports as `#CALC!`.

use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Faults raised by the interpreter outside the value domain
#[derive(Debug, Error)]
pub enum FormulaError {
    /// A cell was evaluated as a formula cell without a formula index
    #[error("no formula index attached to the interpreter")]
    MissingIndex,

    /// The cell has no indexed formula
    #[error("no formula at {0}")]
    NotAFormula(String),
}
