//! Function registry and built-in functions

pub mod date;
pub mod info;
pub mod logical;
pub mod lookup;
pub mod math;
pub mod text;

use std::fmt;
use std::sync::Arc;

use duke_calc_core::{CellError, SheetId, UnitId};

use crate::runtime::RuntimeContext;
use crate::value::Value;
use crate::FastMap;

/// Function implementation signature
///
/// Executors receive arguments already prepared according to the
/// definition's [`ArgumentRules`]. They must not keep state between calls.
pub type Executor = Arc<dyn Fn(&[Value], &FunctionContext) -> Value + Send + Sync>;

/// How the interpreter prepares one argument before dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentRule {
    /// Materialized value of any shape
    Any,
    /// Single value; a 1x1 array is unwrapped, larger arrays are `#VALUE!`
    Scalar,
    /// Coerced to a number, else `#VALUE!`
    Number,
    /// Must evaluate to a reference, else `#VALUE!`
    Reference,
    /// A reference or array is passed as is; scalars become 1x1 arrays
    ReferenceOrArray,
    /// Like `Any`, but errors are passed in instead of short-circuiting
    Raw,
}

/// Argument rules for a whole function
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentRules {
    /// Same rule for every argument
    Uniform(ArgumentRule),
    /// One rule per position; the last rule repeats for trailing arguments
    PerArgument(Vec<ArgumentRule>),
}

impl Default for ArgumentRules {
    fn default() -> Self {
        ArgumentRules::Uniform(ArgumentRule::Any)
    }
}

impl ArgumentRules {
    /// Rule for the argument at `index`
    pub fn rule(&self, index: usize) -> ArgumentRule {
        match self {
            ArgumentRules::Uniform(rule) => *rule,
            ArgumentRules::PerArgument(rules) => rules
                .get(index)
                .or_else(|| rules.last())
                .copied()
                .unwrap_or(ArgumentRule::Any),
        }
    }
}

/// Function definition
#[derive(Clone)]
pub struct FunctionDef {
    /// Function name (uppercase)
    pub name: String,
    /// Minimum arguments
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    pub arguments: ArgumentRules,
    /// Is volatile (recalculates every pass)
    pub volatile: bool,
    pub executor: Executor,
}

impl FunctionDef {
    pub fn new<F>(name: &str, min_args: usize, max_args: Option<usize>, executor: F) -> Self
    where
        F: Fn(&[Value], &FunctionContext) -> Value + Send + Sync + 'static,
    {
        Self {
            name: name.to_uppercase(),
            min_args,
            max_args,
            arguments: ArgumentRules::default(),
            volatile: false,
            executor: Arc::new(executor),
        }
    }

    pub fn with_arguments(mut self, arguments: ArgumentRules) -> Self {
        self.arguments = arguments;
        self
    }

    /// Shorthand for [`ArgumentRules::PerArgument`]
    pub fn with_rules(self, rules: &[ArgumentRule]) -> Self {
        self.with_arguments(ArgumentRules::PerArgument(rules.to_vec()))
    }

    pub fn volatile(mut self) -> Self {
        self.volatile = true;
        self
    }

    /// Does this function take `count` arguments
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.map_or(true, |max| count <= max)
    }

    pub fn call(&self, args: &[Value], ctx: &FunctionContext) -> Value {
        (self.executor)(args, ctx)
    }
}

impl fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDef")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .field("arguments", &self.arguments)
            .field("volatile", &self.volatile)
            .finish_non_exhaustive()
    }
}

/// What an executor may know about the call site
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionContext {
    pub row: u32,
    pub col: u16,
    pub sheet_id: SheetId,
    pub unit_id: UnitId,
    pub row_count: u32,
    pub column_count: u16,
}

impl From<&RuntimeContext> for FunctionContext {
    fn from(ctx: &RuntimeContext) -> Self {
        Self {
            row: ctx.current_row,
            col: ctx.current_col,
            sheet_id: ctx.current_sheet_id.clone(),
            unit_id: ctx.current_unit_id.clone(),
            row_count: ctx.row_count,
            column_count: ctx.column_count,
        }
    }
}

/// Function registry
///
/// Passed explicitly to every interpreter; there is no global instance.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: FastMap<String, FunctionDef>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry").field("functions", &names).finish()
    }
}

impl FunctionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with all built-in functions
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();

        registry.register_lookup_functions();
        registry.register_math_functions();
        registry.register_logical_functions();
        registry.register_info_functions();
        registry.register_text_functions();
        registry.register_date_functions();

        registry
    }

    /// Look up a function by name
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(&name.to_uppercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn is_volatile(&self, name: &str) -> bool {
        self.get(name).map_or(false, |def| def.volatile)
    }

    /// Register a function, replacing any earlier one with the same name
    pub fn register(&mut self, def: FunctionDef) {
        self.functions.insert(def.name.to_uppercase(), def);
    }

    pub fn register_all<I: IntoIterator<Item = FunctionDef>>(&mut self, defs: I) {
        for def in defs {
            self.register(def);
        }
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    fn register_lookup_functions(&mut self) {
        use ArgumentRule::*;

        self.register(FunctionDef::new("ROWS", 1, Some(1), lookup::fn_rows).with_rules(&[ReferenceOrArray]));
        self.register(
            FunctionDef::new("COLUMNS", 1, Some(1), lookup::fn_columns).with_rules(&[ReferenceOrArray]),
        );
        self.register(FunctionDef::new("ROW", 0, Some(1), lookup::fn_row).with_rules(&[Reference]));
        self.register(FunctionDef::new("COLUMN", 0, Some(1), lookup::fn_column).with_rules(&[Reference]));

        // INDEX keeps its first argument as a reference so the result can be one
        self.register(
            FunctionDef::new("INDEX", 2, Some(3), lookup::fn_index).with_rules(&[ReferenceOrArray, Number]),
        );

        // CHOOSE returns its picked argument untouched, errors included
        self.register(FunctionDef::new("CHOOSE", 2, None, lookup::fn_choose).with_rules(&[Number, Raw]));
    }

    fn register_math_functions(&mut self) {
        use ArgumentRule::*;

        self.register(FunctionDef::new("SUM", 1, None, math::fn_sum));
        self.register(FunctionDef::new("AVERAGE", 1, None, math::fn_average));
        self.register(FunctionDef::new("MIN", 1, None, math::fn_min));
        self.register(FunctionDef::new("MAX", 1, None, math::fn_max));
        self.register(FunctionDef::new("COUNT", 1, None, math::fn_count).with_rules(&[Raw]));
        self.register(FunctionDef::new("COUNTA", 1, None, math::fn_counta).with_rules(&[Raw]));
        self.register(FunctionDef::new("PRODUCT", 1, None, math::fn_product));

        self.register(FunctionDef::new("ABS", 1, Some(1), math::fn_abs).with_rules(&[Number]));
        self.register(FunctionDef::new("ROUND", 2, Some(2), math::fn_round).with_rules(&[Number]));
        self.register(FunctionDef::new("INT", 1, Some(1), math::fn_int).with_rules(&[Number]));
        self.register(FunctionDef::new("MOD", 2, Some(2), math::fn_mod).with_rules(&[Number]));
        self.register(FunctionDef::new("POWER", 2, Some(2), math::fn_power).with_rules(&[Number]));
        self.register(FunctionDef::new("SQRT", 1, Some(1), math::fn_sqrt).with_rules(&[Number]));
        self.register(FunctionDef::new("SIGN", 1, Some(1), math::fn_sign).with_rules(&[Number]));
        self.register(FunctionDef::new("PI", 0, Some(0), math::fn_pi));

        // RAND (volatile)
        self.register(FunctionDef::new("RAND", 0, Some(0), math::fn_rand).volatile());

        // RANDBETWEEN (volatile)
        self.register(
            FunctionDef::new("RANDBETWEEN", 2, Some(2), math::fn_randbetween)
                .with_rules(&[Number])
                .volatile(),
        );
    }

    fn register_logical_functions(&mut self) {
        use ArgumentRule::*;

        // Only the condition short-circuits on error; the branches are lazy
        // in spirit and passed through as they are
        self.register(FunctionDef::new("IF", 1, Some(3), logical::fn_if).with_rules(&[Scalar, Raw]));
        self.register(FunctionDef::new("AND", 1, None, logical::fn_and));
        self.register(FunctionDef::new("OR", 1, None, logical::fn_or));
        self.register(FunctionDef::new("NOT", 1, Some(1), logical::fn_not).with_rules(&[Scalar]));
        self.register(FunctionDef::new("IFERROR", 2, Some(2), logical::fn_iferror).with_rules(&[Raw]));
        self.register(FunctionDef::new("IFNA", 2, Some(2), logical::fn_ifna).with_rules(&[Raw]));
        self.register(FunctionDef::new("TRUE", 0, Some(0), logical::fn_true));
        self.register(FunctionDef::new("FALSE", 0, Some(0), logical::fn_false));
    }

    fn register_info_functions(&mut self) {
        use ArgumentRule::*;

        self.register(FunctionDef::new("ISBLANK", 1, Some(1), info::fn_isblank).with_rules(&[Raw]));
        self.register(FunctionDef::new("ISNUMBER", 1, Some(1), info::fn_isnumber).with_rules(&[Raw]));
        self.register(FunctionDef::new("ISTEXT", 1, Some(1), info::fn_istext).with_rules(&[Raw]));
        self.register(FunctionDef::new("ISLOGICAL", 1, Some(1), info::fn_islogical).with_rules(&[Raw]));
        self.register(FunctionDef::new("ISERROR", 1, Some(1), info::fn_iserror).with_rules(&[Raw]));
        self.register(FunctionDef::new("ISERR", 1, Some(1), info::fn_iserr).with_rules(&[Raw]));
        self.register(FunctionDef::new("ISNA", 1, Some(1), info::fn_isna).with_rules(&[Raw]));
        self.register(FunctionDef::new("NA", 0, Some(0), info::fn_na));
        self.register(FunctionDef::new("ERROR.TYPE", 1, Some(1), info::fn_error_type).with_rules(&[Raw]));
    }

    fn register_text_functions(&mut self) {
        use ArgumentRule::*;

        self.register(FunctionDef::new("LEN", 1, Some(1), text::fn_len).with_rules(&[Scalar]));
        self.register(FunctionDef::new("LEFT", 1, Some(2), text::fn_left).with_rules(&[Scalar, Number]));
        self.register(FunctionDef::new("RIGHT", 1, Some(2), text::fn_right).with_rules(&[Scalar, Number]));
        self.register(FunctionDef::new("MID", 3, Some(3), text::fn_mid).with_rules(&[Scalar, Number]));
        self.register(FunctionDef::new("UPPER", 1, Some(1), text::fn_upper).with_rules(&[Scalar]));
        self.register(FunctionDef::new("LOWER", 1, Some(1), text::fn_lower).with_rules(&[Scalar]));
        self.register(FunctionDef::new("TRIM", 1, Some(1), text::fn_trim).with_rules(&[Scalar]));
        self.register(
            FunctionDef::new("CONCATENATE", 1, None, text::fn_concatenate).with_rules(&[Scalar]),
        );
        self.register(FunctionDef::new("CONCAT", 1, None, text::fn_concat));
    }

    fn register_date_functions(&mut self) {
        // NOW (volatile)
        self.register(FunctionDef::new("NOW", 0, Some(0), date::fn_now).volatile());

        // TODAY (volatile)
        self.register(FunctionDef::new("TODAY", 0, Some(0), date::fn_today).volatile());
    }
}

/// Walk every value in the arguments, descending into arrays
pub(crate) fn flatten(args: &[Value]) -> impl Iterator<Item = &Value> + '_ {
    args.iter().flat_map(|arg| -> Box<dyn Iterator<Item = &Value> + '_> {
        match arg {
            Value::Array(arr) => Box::new(arr.iter()),
            v => Box::new(std::iter::once(v)),
        }
    })
}

/// Argument at `index`, Blank when omitted
pub(crate) fn arg<'a>(args: &'a [Value], index: usize) -> &'a Value {
    args.get(index).unwrap_or(&Value::Blank)
}

pub(crate) fn number_arg(args: &[Value], index: usize) -> Result<f64, CellError> {
    crate::operators::to_number(arg(args, index))
}
