//! Formula interpreter
//!
//! Walks an AST against an immutable [`UnitData`] snapshot. References stay
//! lazy until a consumer needs their values. Within a calculation pass the
//! interpreter also owns the [`PassState`]: values computed so far, spilled
//! arrays and the set of cells still waiting to be recalculated. Reading a
//! dirty cell evaluates it on the spot.
//!
//! Two entry points share one tree walk:
//!
//! - [`Interpreter::evaluate_sync`] treats a pending executor result as
//!   `#CALC!`.
//! - [`Interpreter::evaluate_async`] repeats the walk. Each attempt records
//!   the pending handles it met; they are awaited together, their results
//!   memoized by `(cell, NodeId)`, and the walk runs again until nothing is
//!   pending. Finished function calls are never executed twice.

use std::mem;
use std::sync::Arc;

use duke_calc_core::{
    CellError, CellRange, CellValue, UnitCell, UnitData, UnitId, UnitSheetNameMap, MAX_COLS, MAX_ROWS,
};
use futures::future::join_all;

use crate::ast::{BinaryOperator, Literal, Node, NodeId, NodeKind};
use crate::dependency::FormulaIndex;
use crate::error::{FormulaError, FormulaResult};
use crate::functions::{ArgumentRule, FunctionContext, FunctionRegistry};
use crate::operators::{binary_op, to_number, unary_op};
use crate::parser::Parser;
use crate::runtime::RuntimeContext;
use crate::value::{ArrayValue, AsyncValue, ReferenceValue, Value};
use crate::{FastMap, FastSet};

/// Memo key for function results in async mode
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MemoKey {
    cell: UnitCell,
    node: NodeId,
}

/// Everything a calculation pass has learned so far
#[derive(Debug, Default)]
pub struct PassState {
    /// Formula results of this pass; arrays are kept whole at their anchor
    results: FastMap<UnitCell, Value>,
    /// Spilled array values, per covered cell
    spilled: FastMap<UnitCell, Value>,
    /// Spill range per anchor
    anchors: FastMap<UnitCell, CellRange>,
    /// Anchors that spilled (or stopped spilling) during this pass
    changed_anchors: FastSet<UnitCell>,
    /// Formula cells still to be evaluated
    dirty: FastSet<UnitCell>,
    /// Cells under evaluation right now
    in_progress: FastSet<UnitCell>,
    /// Cells on a circular reference
    cycles: FastSet<UnitCell>,
    spill_arrays: bool,
}

impl PassState {
    pub fn new() -> Self {
        Self {
            spill_arrays: true,
            ..Default::default()
        }
    }

    /// Whether multi-cell results spill into neighbouring cells
    pub fn with_spill_arrays(mut self, spill_arrays: bool) -> Self {
        self.spill_arrays = spill_arrays;
        self
    }

    /// Seed an array that spilled in an earlier pass
    pub fn add_previous_spill<I>(&mut self, anchor: UnitCell, range: CellRange, values: I)
    where
        I: IntoIterator<Item = (u32, u16, CellValue)>,
    {
        for (row, col, value) in values {
            if range.contains(row, col) {
                let cell = UnitCell::new(anchor.unit_id.clone(), anchor.sheet_id.clone(), row, col);
                self.spilled.insert(cell, Value::from(value));
            }
        }
        self.anchors.insert(anchor, range);
    }

    pub fn mark_dirty<I: IntoIterator<Item = UnitCell>>(&mut self, cells: I) {
        self.dirty.extend(cells);
    }

    /// Flag a cell as part of a cycle; it reads as `#CYCLE!`
    pub fn mark_cycle(&mut self, cell: UnitCell) {
        self.dirty.remove(&cell);
        self.results.insert(cell.clone(), Value::Error(CellError::Cycle));
        self.cycles.insert(cell);
    }

    /// Forget a cell's result so it is evaluated again
    pub fn invalidate(&mut self, cell: &UnitCell) {
        if self.cycles.contains(cell) {
            return;
        }
        self.results.remove(cell);
        self.dirty.insert(cell.clone());
    }

    pub fn is_dirty(&self, cell: &UnitCell) -> bool {
        self.dirty.contains(cell)
    }

    pub fn result(&self, cell: &UnitCell) -> Option<&Value> {
        self.results.get(cell)
    }

    pub fn results(&self) -> impl Iterator<Item = (&UnitCell, &Value)> + '_ {
        self.results.iter()
    }

    /// Current spill range of an anchor
    pub fn spill_range(&self, anchor: &UnitCell) -> Option<&CellRange> {
        self.anchors.get(anchor)
    }

    pub fn spilled_value(&self, cell: &UnitCell) -> Option<&Value> {
        self.spilled.get(cell)
    }

    /// Anchors whose spill changed this pass
    pub fn changed_anchors(&self) -> impl Iterator<Item = &UnitCell> + '_ {
        self.changed_anchors.iter()
    }

    /// Record a formula result, spilling arrays when enabled
    ///
    /// A spill that would cover a non-empty cell, another formula or another
    /// array's spill leaves `#SPILL!` at the anchor instead.
    pub(crate) fn store(
        &mut self,
        anchor: UnitCell,
        value: Value,
        data: &UnitData,
        formulas: Option<&FormulaIndex>,
    ) {
        if let Some(old) = self.anchors.remove(&anchor) {
            for (row, col) in old.cells() {
                self.spilled
                    .remove(&UnitCell::new(anchor.unit_id.clone(), anchor.sheet_id.clone(), row, col));
            }
            self.changed_anchors.insert(anchor.clone());
        }

        let value = match value {
            Value::Array(arr) if self.spill_arrays && arr.len() > 1 => {
                match self.spill_range_for(&anchor, &arr, data, formulas) {
                    Some(range) => {
                        for ((row, col), v) in range.cells().zip(arr.iter()) {
                            let cell = UnitCell::new(anchor.unit_id.clone(), anchor.sheet_id.clone(), row, col);
                            self.spilled.insert(cell, v.clone());
                        }
                        self.anchors.insert(anchor.clone(), range);
                        self.changed_anchors.insert(anchor.clone());
                        Value::Array(arr)
                    }
                    None => {
                        log::warn!("array result at {} is blocked and cannot spill", anchor);
                        Value::Error(CellError::Spill)
                    }
                }
            }
            v => v,
        };

        self.dirty.remove(&anchor);
        self.results.insert(anchor, value);
    }

    fn spill_range_for(
        &self,
        anchor: &UnitCell,
        arr: &ArrayValue,
        data: &UnitData,
        formulas: Option<&FormulaIndex>,
    ) -> Option<CellRange> {
        let last_row = anchor.row as u64 + arr.rows() as u64 - 1;
        let last_col = anchor.col as u64 + arr.cols() as u64 - 1;
        if last_row >= MAX_ROWS as u64 || last_col >= MAX_COLS as u64 {
            return None;
        }
        let range = CellRange::from_indices(anchor.row, anchor.col, last_row as u32, last_col as u16);

        let blocked = range.cells().any(|(row, col)| {
            if row == anchor.row && col == anchor.col {
                return false;
            }
            let cell = UnitCell::new(anchor.unit_id.clone(), anchor.sheet_id.clone(), row, col);
            let occupied = data
                .cell(&anchor.unit_id, &anchor.sheet_id, row, col)
                .map_or(false, |c| !c.is_empty());
            let formula = formulas.map_or(false, |f| f.get(&cell).is_some());
            let other_spill = self.anchors.iter().any(|(other, r)| {
                other != anchor
                    && other.unit_id == anchor.unit_id
                    && other.sheet_id == anchor.sheet_id
                    && r.contains(row, col)
            });
            occupied || formula || other_spill
        });

        (!blocked).then_some(range)
    }

    /// A dirty anchor whose spill covers `cell`
    fn dirty_anchor_covering(&self, cell: &UnitCell) -> Option<UnitCell> {
        self.anchors
            .iter()
            .find(|(anchor, range)| {
                anchor.unit_id == cell.unit_id
                    && anchor.sheet_id == cell.sheet_id
                    && range.contains(cell.row, cell.col)
                    && self.dirty.contains(*anchor)
            })
            .map(|(anchor, _)| anchor.clone())
    }
}

/// Formula interpreter
pub struct Interpreter<'a> {
    registry: &'a FunctionRegistry,
    data: &'a UnitData,
    context: RuntimeContext,
    formulas: Option<&'a FormulaIndex>,
    pass: PassState,
    sheet_names: UnitSheetNameMap,
    /// Parsed defined names by (unit, scope, NAME)
    names: FastMap<(UnitId, Option<String>, String), Arc<Node>>,
    names_in_progress: FastSet<(UnitId, Option<String>, String)>,
    async_mode: bool,
    memo: FastMap<MemoKey, Value>,
    outstanding: Vec<(MemoKey, AsyncValue)>,
    /// Context at the start of the running top-level evaluation
    entry: Option<RuntimeContext>,
}

impl<'a> Interpreter<'a> {
    pub fn new(registry: &'a FunctionRegistry, data: &'a UnitData, context: RuntimeContext) -> Self {
        Self {
            registry,
            data,
            context,
            formulas: None,
            pass: PassState::new(),
            sheet_names: data.sheet_name_map(),
            names: FastMap::default(),
            names_in_progress: FastSet::default(),
            async_mode: false,
            memo: FastMap::default(),
            outstanding: Vec::new(),
            entry: None,
        }
    }

    /// Formulas that dirty cells are evaluated from
    pub fn with_formulas(mut self, formulas: &'a FormulaIndex) -> Self {
        self.formulas = Some(formulas);
        self
    }

    pub fn with_pass(mut self, pass: PassState) -> Self {
        self.pass = pass;
        self
    }

    /// Sheet names used when parsing defined names
    pub fn with_sheet_names(mut self, sheet_names: UnitSheetNameMap) -> Self {
        self.sheet_names = sheet_names;
        self
    }

    pub fn context(&self) -> &RuntimeContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut RuntimeContext {
        &mut self.context
    }

    pub fn pass(&self) -> &PassState {
        &self.pass
    }

    pub fn pass_mut(&mut self) -> &mut PassState {
        &mut self.pass
    }

    pub fn into_pass(self) -> PassState {
        self.pass
    }

    /// Forget per-cell bookkeeping after an evaluation was cut short
    ///
    /// Puts the current cell back where the interrupted evaluation started.
    pub fn reset_cell_state(&mut self) {
        if let Some(context) = self.entry.take() {
            self.context = context;
        }
        self.pass.in_progress.clear();
        self.names_in_progress.clear();
        self.outstanding.clear();
        self.memo.clear();
        self.async_mode = false;
    }

    /// Record a result for a formula cell without evaluating it
    pub fn record_result(&mut self, cell: &UnitCell, value: Value) {
        self.pass.store(cell.clone(), value, self.data, self.formulas);
    }

    // === Entry points ===

    /// Evaluate a node; pending executor results become `#CALC!`
    pub fn evaluate_sync(&mut self, node: &Node) -> Value {
        self.entry = Some(self.context.clone());
        self.async_mode = false;
        let value = self.eval_value(node);
        self.entry = None;
        settle(value)
    }

    /// Evaluate a node, waiting for pending executor results
    pub async fn evaluate_async(&mut self, node: &Node) -> Value {
        self.run_async(|this| this.eval_value(node)).await
    }

    /// Evaluate the formula of a dirty cell and record its result
    ///
    /// Returns the stored result if the cell was already computed this pass,
    /// for instance on demand by another cell.
    pub fn evaluate_cell(&mut self, cell: &UnitCell) -> FormulaResult<Value> {
        self.check_formula(cell)?;
        self.entry = Some(self.context.clone());
        self.async_mode = false;
        let value = settle(self.cell_attempt(cell));
        self.entry = None;
        self.finish_cell(cell, value.clone());
        Ok(value)
    }

    /// Async counterpart of [`Interpreter::evaluate_cell`]
    pub async fn evaluate_cell_async(&mut self, cell: &UnitCell) -> FormulaResult<Value> {
        self.check_formula(cell)?;
        let value = self.run_async(|this| this.cell_attempt(cell)).await;
        self.finish_cell(cell, value.clone());
        Ok(value)
    }

    fn check_formula(&self, cell: &UnitCell) -> FormulaResult<()> {
        let formulas = self
            .formulas
            .ok_or(FormulaError::MissingIndex)?;
        if formulas.get(cell).is_none() {
            return Err(FormulaError::NotAFormula(cell.to_string()));
        }
        Ok(())
    }

    fn cell_attempt(&mut self, cell: &UnitCell) -> Value {
        match self.pass.results.get(cell) {
            Some(v) => v.clone(),
            None => self.evaluate_dependency(cell),
        }
    }

    fn finish_cell(&mut self, cell: &UnitCell, value: Value) {
        if !self.pass.results.contains_key(cell) {
            self.pass.store(cell.clone(), value, self.data, self.formulas);
        }
    }

    async fn run_async<F>(&mut self, mut attempt: F) -> Value
    where
        F: FnMut(&mut Self) -> Value,
    {
        self.entry = Some(self.context.clone());
        self.async_mode = true;
        let mut rounds = 0usize;

        let result = loop {
            self.outstanding.clear();
            let value = attempt(self);
            if self.outstanding.is_empty() {
                break settle(value);
            }

            rounds += 1;
            let waiting = mem::take(&mut self.outstanding);
            log::trace!("round {}: waiting on {} pending values", rounds, waiting.len());

            let resolved = join_all(waiting.iter().map(|(_, handle)| handle.resolve())).await;
            for ((key, _), value) in waiting.into_iter().zip(resolved) {
                self.memo.insert(key, value);
            }

            if !self.context.generation.is_current() {
                log::trace!(
                    "generation {} superseded after {} rounds",
                    self.context.generation.value(),
                    rounds
                );
                break Value::Error(CellError::Calc);
            }
        };

        self.async_mode = false;
        self.memo.clear();
        self.entry = None;
        result
    }

    // === Tree walk ===

    /// Evaluate and materialize references
    fn eval_value(&mut self, node: &Node) -> Value {
        let value = self.eval(node);
        self.materialize(value)
    }

    fn eval(&mut self, node: &Node) -> Value {
        match &node.kind {
            NodeKind::Literal(lit) => match lit {
                Literal::Number(n) => Value::Number(*n),
                Literal::Text(s) => Value::Text(s.clone()),
                Literal::Boolean(b) => Value::Boolean(*b),
                Literal::Error(e) => Value::Error(*e),
            },

            NodeKind::Reference {
                unit_id,
                sheet_id,
                range,
            } => Value::Reference(ReferenceValue::new(
                unit_id.clone().unwrap_or_else(|| self.context.current_unit_id.clone()),
                sheet_id.clone().unwrap_or_else(|| self.context.current_sheet_id.clone()),
                *range,
            )),

            NodeKind::Name(name) => self.eval_name(name),

            NodeKind::UnaryOp { op, operand } => {
                let value = self.eval_value(operand);
                if value.is_pending() {
                    return value;
                }
                unary_op(*op, &value)
            }

            NodeKind::BinaryOp { op, left, right } => match op {
                BinaryOperator::Range | BinaryOperator::Intersect => {
                    let l = self.eval(left);
                    let r = self.eval(right);
                    reference_op(*op, l, r)
                }
                _ => {
                    let l = self.eval_value(left);
                    let r = self.eval_value(right);
                    if let Some(pending) = first_pending([&l, &r]) {
                        return pending;
                    }
                    binary_op(*op, &l, &r)
                }
            },

            NodeKind::FunctionCall { name, args } => self.call(node.id, name, args),

            NodeKind::ArrayLiteral(rows) => {
                let mut pending = None;
                let rows: Vec<Vec<Value>> = rows
                    .iter()
                    .map(|row| {
                        row.iter()
                            .map(|item| {
                                let v = match self.eval_value(item) {
                                    Value::Array(arr) => arr.top_left().cloned().unwrap_or(Value::Blank),
                                    v => v,
                                };
                                if v.is_pending() && pending.is_none() {
                                    pending = Some(v.clone());
                                }
                                v
                            })
                            .collect()
                    })
                    .collect();
                pending.unwrap_or_else(|| Value::Array(ArrayValue::from_rows(rows)))
            }

            NodeKind::Union(items) => {
                let values: Vec<Value> = items.iter().map(|item| self.eval_value(item)).collect();
                if let Some(pending) = first_pending(values.iter()) {
                    return pending;
                }
                let mut flat = Vec::new();
                for value in values {
                    match value {
                        Value::Error(e) => return Value::Error(e),
                        Value::Array(arr) => flat.extend(arr.iter().cloned()),
                        v => flat.push(v),
                    }
                }
                Value::Array(ArrayValue::from_rows(vec![flat]))
            }

            NodeKind::Missing => Value::Blank,

            NodeKind::Invalid { error, .. } => Value::Error(*error),
        }
    }

    fn call(&mut self, id: NodeId, name: &str, args: &[Node]) -> Value {
        let key = MemoKey {
            cell: self.context.current_cell(),
            node: id,
        };
        if self.async_mode {
            if let Some(v) = self.memo.get(&key) {
                if let Value::Pending(handle) = v {
                    self.outstanding.push((key.clone(), handle.clone()));
                }
                return v.clone();
            }
        }

        let registry = self.registry;
        let def = match registry.get(name) {
            Some(def) => def,
            None => return Value::Error(CellError::Name),
        };
        if !def.accepts(args.len()) {
            return Value::Error(CellError::Na);
        }

        let mut prepared = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let rule = def.arguments.rule(i);
            let value = match &arg.kind {
                NodeKind::Missing => Value::Blank,
                _ => self.eval(arg),
            };
            prepared.push((rule, self.prepare_argument(rule, value)));
        }

        if let Some(pending) = first_pending(prepared.iter().map(|(_, v)| v)) {
            return pending;
        }
        if let Some(error) = prepared.iter().find_map(|(rule, v)| match v {
            Value::Error(e) if *rule != ArgumentRule::Raw => Some(*e),
            _ => None,
        }) {
            return Value::Error(error);
        }

        let args: Vec<Value> = prepared.into_iter().map(|(_, v)| v).collect();
        let result = def.call(&args, &FunctionContext::from(&self.context));

        match result {
            Value::Pending(handle) if self.async_mode => {
                self.outstanding.push((key.clone(), handle.clone()));
                let value = Value::Pending(handle);
                self.memo.insert(key, value.clone());
                value
            }
            Value::Pending(_) => Value::Error(CellError::Calc),
            value => {
                if self.async_mode {
                    self.memo.insert(key, value.clone());
                }
                value
            }
        }
    }

    fn prepare_argument(&mut self, rule: ArgumentRule, value: Value) -> Value {
        if value.is_pending() {
            return value;
        }
        match rule {
            ArgumentRule::Reference => match value {
                Value::Reference(_) | Value::Error(_) => value,
                _ => Value::Error(CellError::Value),
            },
            ArgumentRule::ReferenceOrArray => match value {
                Value::Reference(_) | Value::Array(_) | Value::Error(_) => value,
                v => Value::Array(ArrayValue::scalar(v)),
            },
            ArgumentRule::Scalar => scalar(self.materialize(value)),
            ArgumentRule::Number => match scalar(self.materialize(value)) {
                v @ Value::Pending(_) => v,
                v => to_number(&v).map_or_else(Value::Error, Value::Number),
            },
            ArgumentRule::Any | ArgumentRule::Raw => self.materialize(value),
        }
    }

    fn eval_name(&mut self, name: &str) -> Value {
        let data = self.data;
        let unit_id = self.context.current_unit_id.clone();
        let def = match data
            .unit(&unit_id)
            .and_then(|book| book.defined_name(name, Some(self.context.current_sheet_id.as_str())))
        {
            Some(def) => def,
            None => return Value::Error(CellError::Name),
        };

        let key = (unit_id.clone(), def.scope.clone(), name.to_uppercase());
        if self.names_in_progress.contains(&key) {
            return Value::Error(CellError::Cycle);
        }

        let node = match self.names.get(&key) {
            Some(node) => node.clone(),
            None => {
                let node = Arc::new(
                    Parser::new(&self.sheet_names)
                        .with_unit(unit_id)
                        .parse_text(&def.formula_text()),
                );
                self.names.insert(key.clone(), node.clone());
                node
            }
        };

        self.names_in_progress.insert(key.clone());
        let value = self.eval(&node);
        self.names_in_progress.remove(&key);
        value
    }

    // === References ===

    /// Replace a reference with the values it covers
    fn materialize(&mut self, value: Value) -> Value {
        let reference = match value {
            Value::Reference(r) => r,
            v => return v,
        };

        let data = self.data;
        let sheet = match data.sheet(&reference.unit_id, &reference.sheet_id) {
            Some(sheet) => sheet,
            None => return Value::Error(CellError::Ref),
        };

        let range = if reference.range.is_full_columns() || reference.range.is_full_rows() {
            reference.range.clamp_spans(sheet.row_count(), sheet.column_count())
        } else {
            reference.range
        };

        if range.is_single() {
            return self.read_cell(&UnitCell::new(
                reference.unit_id,
                reference.sheet_id,
                range.start.row,
                range.start.col,
            ));
        }

        let mut pending = None;
        let mut data = Vec::with_capacity(range.cell_count() as usize);
        for (row, col) in range.cells() {
            let cell = UnitCell::new(reference.unit_id.clone(), reference.sheet_id.clone(), row, col);
            let v = self.read_cell(&cell);
            if v.is_pending() && pending.is_none() {
                pending = Some(v.clone());
            }
            data.push(v);
        }

        if let Some(pending) = pending {
            return pending;
        }
        ArrayValue::new(range.row_count() as usize, range.col_count() as usize, data)
            .map_or(Value::Error(CellError::Ref), Value::Array)
    }

    /// Current value of one cell as seen by this pass
    fn read_cell(&mut self, cell: &UnitCell) -> Value {
        if self.pass.cycles.contains(cell) {
            return Value::Error(CellError::Cycle);
        }
        if let Some(v) = self.pass.results.get(cell) {
            return top_left(v);
        }
        if self.pass.dirty.contains(cell) {
            return top_left(&self.evaluate_dependency(cell));
        }
        if let Some(anchor) = self.pass.dirty_anchor_covering(cell) {
            let anchor_value = self.evaluate_dependency(&anchor);
            if anchor_value.is_pending() {
                return anchor_value;
            }
        }
        if let Some(v) = self.pass.spilled.get(cell) {
            return v.clone();
        }

        self.data
            .value(&cell.unit_id, &cell.sheet_id, cell.row, cell.col)
            .map_or(Value::Blank, Value::from)
    }

    /// Evaluate a dirty formula cell with the context moved onto it
    fn evaluate_dependency(&mut self, cell: &UnitCell) -> Value {
        if self.pass.in_progress.contains(cell) {
            return Value::Error(CellError::Cycle);
        }
        let node = match self.formulas.and_then(|f| f.get(cell)) {
            Some(entry) => entry.node.clone(),
            None => {
                return self
                    .data
                    .value(&cell.unit_id, &cell.sheet_id, cell.row, cell.col)
                    .map_or(Value::Blank, Value::from)
            }
        };

        let (row_count, column_count) = self
            .data
            .sheet(&cell.unit_id, &cell.sheet_id)
            .map_or((MAX_ROWS, MAX_COLS), |s| (s.row_count(), s.column_count()));

        let saved = self.context.clone();
        self.context.set_current(
            cell.row,
            cell.col,
            row_count,
            column_count,
            cell.sheet_id.clone(),
            cell.unit_id.clone(),
        );
        self.pass.in_progress.insert(cell.clone());

        let value = self.eval_value(&node);

        self.pass.in_progress.remove(cell);
        self.context = saved;

        if value.is_pending() {
            return value;
        }
        self.pass.store(cell.clone(), value, self.data, self.formulas);
        self.pass.results.get(cell).cloned().unwrap_or(Value::Blank)
    }
}

/// `:` and intersection over two references
fn reference_op(op: BinaryOperator, left: Value, right: Value) -> Value {
    if let Some(pending) = first_pending([&left, &right]) {
        return pending;
    }
    let (l, r) = match (left, right) {
        (Value::Error(e), _) | (_, Value::Error(e)) => return Value::Error(e),
        (Value::Reference(l), Value::Reference(r)) => (l, r),
        _ => return Value::Error(CellError::Value),
    };

    match op {
        BinaryOperator::Range if l.same_sheet(&r) => {
            let range = l.range.bounding(&r.range);
            Value::Reference(ReferenceValue { range, ..l })
        }
        BinaryOperator::Range => Value::Error(CellError::Ref),
        _ => match l.same_sheet(&r).then(|| l.range.intersect(&r.range)).flatten() {
            Some(range) => Value::Reference(ReferenceValue { range, ..l }),
            None => Value::Error(CellError::Null),
        },
    }
}

fn first_pending<'v, I: IntoIterator<Item = &'v Value>>(values: I) -> Option<Value> {
    values.into_iter().find(|v| v.is_pending()).cloned()
}

/// 1x1 arrays unwrap; larger arrays are not scalars
fn scalar(value: Value) -> Value {
    match value {
        Value::Array(arr) if arr.len() == 1 => arr.top_left().cloned().unwrap_or(Value::Blank),
        Value::Array(_) => Value::Error(CellError::Value),
        v => v,
    }
}

fn top_left(value: &Value) -> Value {
    match value {
        Value::Array(arr) => arr.top_left().cloned().unwrap_or(Value::Blank),
        v => v.clone(),
    }
}

fn settle(value: Value) -> Value {
    match value {
        Value::Pending(_) | Value::Reference(_) => Value::Error(CellError::Calc),
        v => v,
    }
}
