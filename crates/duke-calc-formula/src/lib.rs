//! # duke-calc-formula
//!
//! Formula language and recalculation machinery for duke-calc.
//!
//! This crate provides:
//! - A bracket-aware lexer (text → token tree)
//! - A precedence-climbing parser (token tree → AST)
//! - The [`Value`] model and operator algebra (coercion, broadcasting, ordering)
//! - A function registry with built-in functions
//! - Sync and async interpreters
//! - Shared-formula expansion, dependency tracking and dirty propagation
//!
//! ## Example
//!
//! ```rust
//! use duke_calc_core::{UnitData, Workbook, Worksheet};
//! use duke_calc_formula::{parse_formula, FunctionRegistry, Interpreter, RuntimeContext, Value};
//!
//! let mut book = Workbook::new("book1");
//! book.add_sheet(Worksheet::new("sheet1", "Sheet1")).unwrap();
//! let data: UnitData = std::iter::once(book).collect();
//!
//! let registry = FunctionRegistry::with_builtins();
//! let mut interpreter = Interpreter::new(&registry, &data, RuntimeContext::new("book1", "sheet1"));
//! let value = interpreter.evaluate_sync(&parse_formula("=ROWS(C2:F3)"));
//! assert_eq!(value, Value::Number(2.0));
//! ```

use std::collections::{HashMap, HashSet};

pub mod ast;
pub mod config;
pub mod dependency;
pub mod error;
pub mod functions;
pub mod interpreter;
pub mod lexer;
pub mod operators;
pub mod parser;
pub mod reference;
pub mod runtime;
pub mod shared;
pub mod value;

/// HashMap with the ahash hasher
pub type FastMap<K, V> = HashMap<K, V, ahash::RandomState>;

/// HashSet with the ahash hasher
pub type FastSet<T> = HashSet<T, ahash::RandomState>;

pub use ast::{BinaryOperator, Literal, Node, NodeId, NodeKind, Span, UnaryOperator};
pub use config::{CurrentConfig, FeatureDependency, FormulaDatasetConfig, OtherFormulaItem};
pub use dependency::{
    DirtyInputs, DirtyTracker, FeatureKey, FormulaAnalyzer, FormulaEntry, FormulaIndex, OtherFormulaKey,
    RecalcPlan,
};
pub use error::{FormulaError, FormulaResult};
pub use functions::{ArgumentRule, ArgumentRules, FunctionContext, FunctionDef, FunctionRegistry};
pub use interpreter::{Interpreter, PassState};
pub use lexer::{tokenize, LexTree, Lexer, LexerOptions};
pub use parser::{parse_formula, Parser};
pub use reference::{NoResolver, ReferenceResolver};
pub use runtime::{Generation, GenerationCounter, RuntimeContext};
pub use shared::{expand_shared_formulas, shift_formula};
pub use value::{ArrayValue, AsyncValue, ReferenceValue, Value, ValueType};
