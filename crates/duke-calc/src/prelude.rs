//! Prelude module - common imports for duke-calc users
//!
//! ```rust
//! use duke_calc::prelude::*;
//! ```

pub use crate::{
    // Calculation types
    CalculationOptions,
    CalculationOutcome,
    CalculationResult,
    CalculationStats,
    CellAddress,
    CellData,
    // Cell types
    CellError,
    CellRange,
    CellValue,
    DefinedName,
    // Error types
    Error,
    FeatureDependency,
    FormulaDataItem,
    // Configuration
    FormulaDatasetConfig,
    // Main types
    FormulaEngine,
    FormulaError,
    // Functions
    FunctionDef,
    FunctionRegistry,
    OtherFormulaItem,
    Result,
    UnitCell,
    UnitData,
    UnitRange,
    Value,
    Workbook,
    Worksheet,
};
