//! # duke-calc
//!
//! A spreadsheet formula engine with incremental recalculation.
//!
//! duke-calc evaluates formulas against a snapshot of workbooks ("units") and
//! recalculates only what a change can affect.
//!
//! ## Features
//!
//! - A1 references across sheets and workbooks, ranges, unions and
//!   intersections
//! - Defined names, shared formulas and spilling array results
//! - Pluggable functions, including ones that answer asynchronously
//! - Dirty tracking with circular reference detection
//! - Generations that supersede stale passes
//!
//! ## Example
//!
//! ```rust
//! use duke_calc::prelude::*;
//!
//! let mut book = Workbook::new("book1");
//! book.add_sheet(Worksheet::new("sheet1", "Sheet1")).unwrap();
//!
//! let mut engine = FormulaEngine::new(FunctionRegistry::with_builtins());
//! engine.load(FormulaDatasetConfig {
//!     all_unit_data: Some(std::iter::once(book).collect()),
//!     ..Default::default()
//! });
//!
//! let value = engine.evaluate_formula("=ROWS(C2:F3)", "book1", "sheet1", 0, 0);
//! assert_eq!(value, Value::Number(2.0));
//! ```

pub mod calculation;
pub mod prelude;

// Re-export calculation types
pub use calculation::{
    CalculationOptions, CalculationOutcome, CalculationResult, CalculationStats, FormulaEngine,
};

// Re-export core types
pub use duke_calc_core::{
    CellAddress, CellData, CellError, CellMatrix, CellRange, CellValue, DefinedName, Error,
    FormulaDataItem, Result, SheetId, UnitCell, UnitData, UnitId, UnitRange, UnitSheetNameMap,
    Workbook, Worksheet,
};

// Re-export formula types
pub use duke_calc_formula::{
    parse_formula, tokenize, ArgumentRule, ArgumentRules, AsyncValue, CurrentConfig, FeatureDependency,
    FormulaDatasetConfig, FormulaError, FormulaResult, FunctionContext, FunctionDef, FunctionRegistry,
    Generation, GenerationCounter, Interpreter, Node, OtherFormulaItem, OtherFormulaKey, RuntimeContext,
    Value,
};

// Lower-level access to the formula pipeline
pub use duke_calc_formula as formula;
