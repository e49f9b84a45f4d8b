//! Recalculation engine
//!
//! [`FormulaEngine`] owns a loaded configuration and runs calculation passes
//! over it. A pass plans the dirty formulas, evaluates them in dependency
//! order, spills array results, evaluates other formulas and infers number
//! formats.
//!
//! # Example
//!
//! ```rust
//! use duke_calc::prelude::*;
//!
//! let mut book = Workbook::new("book1");
//! let sheet = book.add_sheet(Worksheet::new("sheet1", "Sheet1")).unwrap();
//! sheet.set_value("A1", 10.0).unwrap();
//! sheet.set_value("A2", 20.0).unwrap();
//! sheet.set_formula("A3", "=A1+A2").unwrap();
//!
//! let mut engine = FormulaEngine::new(FunctionRegistry::with_builtins());
//! engine.load(FormulaDatasetConfig {
//!     all_unit_data: Some(std::iter::once(book).collect()),
//!     force_calculate: true,
//!     ..Default::default()
//! });
//!
//! let result = engine.calculate().completed().unwrap();
//! assert_eq!(result.value("book1", "sheet1", 2, 0), Some(&CellValue::Number(30.0)));
//! assert_eq!(result.stats.cells_calculated, 1);
//! ```

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use duke_calc_core::{
    CellData, CellError, CellMatrix, CellValue, Error, Result, UnitCell, UnitData, UnitRange, MAX_COLS,
    MAX_ROWS,
};
use duke_calc_formula::config::{ArrayFormulaCellDataMap, ArrayFormulaRangeMap, NumberFormatMap, SheetMap};
use duke_calc_formula::{
    CurrentConfig, DirtyInputs, DirtyTracker, FastSet, FeatureKey, FormulaDatasetConfig, FormulaIndex,
    FormulaResult, FunctionDef, FunctionRegistry, Generation, GenerationCounter, Interpreter, Node, NodeKind,
    OtherFormulaKey, Parser, PassState, RecalcPlan, RuntimeContext, Value,
};
use futures::FutureExt;

/// Options for a calculation pass
#[derive(Debug, Clone)]
pub struct CalculationOptions {
    /// Include volatile functions in calculation (NOW, TODAY, RAND, etc.)
    pub calculate_volatile: bool,
    /// Let multi-cell results spill into the cells below and to the right
    pub spill_arrays: bool,
    /// Give results without a number format the format of the single cell
    /// their formula starts with
    pub infer_number_formats: bool,
}

impl Default for CalculationOptions {
    fn default() -> Self {
        Self {
            calculate_volatile: true,
            spill_arrays: true,
            infer_number_formats: true,
        }
    }
}

/// Statistics from a calculation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalculationStats {
    /// Total number of formula cells
    pub formula_count: usize,
    /// Number of cells calculated
    pub cells_calculated: usize,
    /// Number of cells on a circular reference
    pub circular_references: usize,
    /// Number of volatile formulas
    pub volatile_cells: usize,
    /// Number of results that are errors
    pub errors: usize,
}

/// Everything a completed pass produced
#[derive(Debug, Clone, Default)]
pub struct CalculationResult {
    /// Results of recalculated formula cells; arrays give their top-left value
    pub values: SheetMap<CellMatrix<CellValue>>,
    /// Spill range per anchor that spilled this pass
    pub array_ranges: ArrayFormulaRangeMap,
    /// Spilled values, per covered cell
    pub array_data: ArrayFormulaCellDataMap,
    /// Anchors whose earlier spill is gone
    pub cleared_arrays: Vec<UnitCell>,
    pub other_values: BTreeMap<OtherFormulaKey, Value>,
    /// Number formats inferred for results that had none
    pub number_formats: NumberFormatMap,
    /// Host features whose inputs changed
    pub dirty_features: Vec<FeatureKey>,
    pub stats: CalculationStats,
}

impl CalculationResult {
    pub fn value(&self, unit_id: &str, sheet_id: &str, row: u32, col: u16) -> Option<&CellValue> {
        self.values.get(unit_id)?.get(sheet_id)?.get(row, col)
    }

    /// Value spilled into a cell
    pub fn array_value(&self, unit_id: &str, sheet_id: &str, row: u32, col: u16) -> Option<&CellValue> {
        self.array_data.get(unit_id)?.get(sheet_id)?.get(row, col)
    }

    pub fn number_format(&self, unit_id: &str, sheet_id: &str, row: u32, col: u16) -> Option<&str> {
        self.number_formats
            .get(unit_id)?
            .get(sheet_id)?
            .get(row, col)
            .map(String::as_str)
    }

    /// Write calculated values back into a snapshot
    ///
    /// Only formula results are written; spilled values stay in
    /// [`CalculationResult::array_data`] so they never block a later spill.
    pub fn apply_to(&self, data: &mut UnitData) {
        for (unit_id, sheets) in &self.values {
            for (sheet_id, cells) in sheets {
                let sheet = match data.sheet_mut(unit_id, sheet_id) {
                    Some(sheet) => sheet,
                    None => {
                        log::debug!("skipping results for missing sheet {}/{}", unit_id, sheet_id);
                        continue;
                    }
                };
                for (row, col, value) in cells.iter() {
                    sheet.set_calculated_value(row, col, value.clone());
                }
            }
        }
    }
}

/// How a pass ended
#[derive(Debug, Clone)]
pub enum CalculationOutcome {
    Completed(CalculationResult),
    /// A newer generation was issued while the pass ran; its results are dropped
    Superseded { generation: u64 },
}

impl CalculationOutcome {
    pub fn completed(self) -> Option<CalculationResult> {
        match self {
            CalculationOutcome::Completed(result) => Some(result),
            CalculationOutcome::Superseded { .. } => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, CalculationOutcome::Superseded { .. })
    }
}

/// The recalculation engine
pub struct FormulaEngine {
    registry: FunctionRegistry,
    options: CalculationOptions,
    config: CurrentConfig,
    /// Parsed formulas of `config`
    index: FormulaIndex,
    generations: GenerationCounter,
    /// Where the host says evaluation currently is
    context: RuntimeContext,
}

impl FormulaEngine {
    pub fn new(registry: FunctionRegistry) -> Self {
        Self {
            registry,
            options: CalculationOptions::default(),
            config: CurrentConfig::default(),
            index: FormulaIndex::new(),
            generations: GenerationCounter::new(),
            context: RuntimeContext::default(),
        }
    }

    pub fn with_options(mut self, options: CalculationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &CalculationOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: CalculationOptions) {
        self.options = options;
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &CurrentConfig {
        &self.config
    }

    pub fn index(&self) -> &FormulaIndex {
        &self.index
    }

    /// The snapshot as of the last completed pass
    pub fn unit_data(&self) -> &UnitData {
        &self.config.unit_data
    }

    // === Configuration ===

    /// Replace the loaded configuration and re-index its formulas
    pub fn load(&mut self, config: FormulaDatasetConfig) {
        self.config = CurrentConfig::load(config);
        self.reindex();
    }

    /// Add or replace a function; formulas are re-indexed since volatility
    /// may have changed
    pub fn register_function(&mut self, def: FunctionDef) {
        self.registry.register(def);
        self.reindex();
    }

    /// Move the host cursor
    pub fn set_current<U: Into<String>, S: Into<String>>(
        &mut self,
        row: u32,
        col: u16,
        row_count: u32,
        column_count: u16,
        sheet_id: S,
        unit_id: U,
    ) {
        self.context
            .set_current(row, col, row_count, column_count, sheet_id, unit_id);
    }

    pub fn current(&self) -> &RuntimeContext {
        &self.context
    }

    /// A handle that can supersede passes from elsewhere
    pub fn generation_counter(&self) -> GenerationCounter {
        self.generations.clone()
    }

    /// Supersede every pass in flight
    pub fn invalidate(&self) -> Generation {
        let generation = self.generations.issue();
        log::debug!("invalidated; generation is now {}", generation.value());
        generation
    }

    /// Mark a range as changed since the last pass
    pub fn mark_dirty(&mut self, range: UnitRange) {
        self.config.dirty_ranges.push(range);
    }

    /// Replace one cell of the snapshot and mark it dirty
    pub fn set_cell(&mut self, cell: &UnitCell, data: CellData) -> Result<()> {
        let sheet = self
            .config
            .unit_data
            .sheet_mut(&cell.unit_id, &cell.sheet_id)
            .ok_or_else(|| Error::SheetNotFound(format!("{}/{}", cell.unit_id, cell.sheet_id)))?;
        let formula = data.formula.clone().filter(|f| f.has_text());
        sheet.set_cell_at(cell.row, cell.col, data);

        let formulas = self
            .config
            .formula_data
            .entry(cell.unit_id.clone())
            .or_default()
            .entry(cell.sheet_id.clone())
            .or_default();
        match formula {
            Some(item) => {
                formulas.insert(cell.row, cell.col, item);
            }
            None => {
                formulas.remove(cell.row, cell.col);
            }
        }

        self.config.dirty_ranges.push(cell.range());
        self.reindex();
        Ok(())
    }

    // === Calculation ===

    /// Run one pass with pending executor results turned into `#CALC!`
    pub fn calculate(&mut self) -> CalculationOutcome {
        let outcome = self.begin_pass().run();
        self.commit(&outcome);
        outcome
    }

    /// Run one pass, waiting for pending executor results
    pub async fn calculate_async(&mut self) -> CalculationOutcome {
        let outcome = self.begin_pass().run_async().await;
        self.commit(&outcome);
        outcome
    }

    /// Evaluate a formula that is not part of the snapshot
    pub fn evaluate_formula(&self, text: &str, unit_id: &str, sheet_id: &str, row: u32, col: u16) -> Value {
        let node = self.parse(text, unit_id);
        let mut interpreter = self.one_off(unit_id, sheet_id, row, col);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| interpreter.evaluate_sync(&node)));
        contain(&format_args!("formula {}", text), outcome.map(Ok)).unwrap_or(Value::Error(CellError::Calc))
    }

    /// Async counterpart of [`FormulaEngine::evaluate_formula`]
    pub async fn evaluate_formula_async(
        &self,
        text: &str,
        unit_id: &str,
        sheet_id: &str,
        row: u32,
        col: u16,
    ) -> Value {
        let node = self.parse(text, unit_id);
        let mut interpreter = self.one_off(unit_id, sheet_id, row, col);
        let outcome = AssertUnwindSafe(interpreter.evaluate_async(&node))
            .catch_unwind()
            .await;
        contain(&format_args!("formula {}", text), outcome.map(Ok)).unwrap_or(Value::Error(CellError::Calc))
    }

    /// Evaluate a formula at the host cursor
    pub fn evaluate_current(&self, text: &str) -> Value {
        let ctx = &self.context;
        self.evaluate_formula(
            text,
            &ctx.current_unit_id,
            &ctx.current_sheet_id,
            ctx.current_row,
            ctx.current_col,
        )
    }

    // === Internals ===

    fn reindex(&mut self) {
        self.index = FormulaIndex::build(&self.config, &self.registry);
    }

    fn parse(&self, text: &str, unit_id: &str) -> Node {
        Parser::new(&self.config.sheet_name_map)
            .with_unit(unit_id)
            .parse_text(text)
    }

    /// Pass state that knows the arrays spilled by earlier passes
    fn seeded_state(&self) -> PassState {
        let mut state = PassState::new().with_spill_arrays(self.options.spill_arrays);
        for (anchor, range) in self.config.array_ranges() {
            let values: Vec<(u32, u16, CellValue)> = self
                .config
                .array_cell_data(&anchor.unit_id, &anchor.sheet_id)
                .map(|data| {
                    data.iter_within(range.start.row, range.start.col, range.end.row, range.end.col)
                        .map(|(row, col, value)| (row, col, value.clone()))
                        .collect()
                })
                .unwrap_or_default();
            state.add_previous_spill(anchor, range, values);
        }
        state
    }

    fn one_off(&self, unit_id: &str, sheet_id: &str, row: u32, col: u16) -> Interpreter<'_> {
        let (row_count, column_count) = sheet_bounds(&self.config.unit_data, unit_id, sheet_id);
        let mut context = RuntimeContext::new(unit_id, sheet_id).with_generation(self.generations.current());
        context.set_current(row, col, row_count, column_count, sheet_id, unit_id);

        Interpreter::new(&self.registry, &self.config.unit_data, context)
            .with_formulas(&self.index)
            .with_pass(self.seeded_state())
            .with_sheet_names(self.config.sheet_name_map.clone())
    }

    fn begin_pass(&self) -> Pass<'_> {
        // Phase 1: Issue a generation
        let generation = self.generations.issue();

        // Phase 2: Plan
        let inputs = self.config.dirty_inputs(self.options.calculate_volatile);
        let plan = DirtyTracker::new(&self.index)
            .with_features(&self.config.feature_dependencies)
            .compute(&inputs);
        log::debug!(
            "pass {}: {} of {} formulas dirty",
            generation.value(),
            plan.cells.len() + plan.cycles.len(),
            self.index.len()
        );

        // Phase 3: Cycles read as #CYCLE! from the start
        let mut state = self.seeded_state();
        for cell in &plan.cycles {
            state.mark_cycle(cell.clone());
        }
        state.mark_dirty(plan.cells.iter().cloned());

        let context = self.context.clone().with_generation(generation.clone());
        let interpreter = Interpreter::new(&self.registry, &self.config.unit_data, context)
            .with_formulas(&self.index)
            .with_pass(state)
            .with_sheet_names(self.config.sheet_name_map.clone());

        Pass {
            config: &self.config,
            index: &self.index,
            options: &self.options,
            generation,
            plan,
            interpreter,
            respilled: Vec::new(),
        }
    }

    /// Fold a completed pass into the engine's own snapshot
    fn commit(&mut self, outcome: &CalculationOutcome) {
        let result = match outcome {
            CalculationOutcome::Completed(result) => result,
            CalculationOutcome::Superseded { .. } => return,
        };

        result.apply_to(&mut self.config.unit_data);

        let new_anchors: Vec<(UnitCell, duke_calc_core::CellRange)> = entries(&result.array_ranges)
            .map(|(cell, range)| (cell, *range))
            .collect();
        let arrays_changed = !new_anchors.is_empty() || !result.cleared_arrays.is_empty();

        for anchor in result.cleared_arrays.iter().chain(new_anchors.iter().map(|(a, _)| a)) {
            if let Some(old) = remove_cell(&mut self.config.array_formula_range, anchor) {
                for (row, col) in old.cells() {
                    let cell = UnitCell::new(anchor.unit_id.clone(), anchor.sheet_id.clone(), row, col);
                    remove_cell(&mut self.config.array_formula_cell_data, &cell);
                }
            }
        }
        for (anchor, range) in new_anchors {
            insert_cell(&mut self.config.array_formula_range, &anchor, range);
        }
        for (cell, value) in entries(&result.array_data) {
            insert_cell(&mut self.config.array_formula_cell_data, &cell, value.clone());
        }
        for (cell, format) in entries(&result.number_formats) {
            insert_cell(&mut self.config.numfmt_item_map, &cell, format.clone());
        }

        let config = &mut self.config;
        config.force_calculate = false;
        config.dirty_ranges.clear();
        config.dirty_name_map.clear();
        config.dirty_defined_name_map.clear();
        config.dirty_unit_feature_map.clear();
        config.dirty_unit_other_formula_map.clear();
        config.dirty_units.clear();

        if arrays_changed {
            self.reindex();
        }
    }
}

impl fmt::Debug for FormulaEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormulaEngine")
            .field("options", &self.options)
            .field("formulas", &self.index.len())
            .field("generation", &self.generations.current().value())
            .finish_non_exhaustive()
    }
}

/// One calculation pass over a borrowed engine
struct Pass<'e> {
    config: &'e CurrentConfig,
    index: &'e FormulaIndex,
    options: &'e CalculationOptions,
    generation: Generation,
    plan: RecalcPlan,
    interpreter: Interpreter<'e>,
    /// Cells evaluated again because a spill they read moved
    respilled: Vec<UnitCell>,
}

impl<'e> Pass<'e> {
    fn run(mut self) -> CalculationOutcome {
        // Phase 4: Evaluate in dependency order; arrays spill as they are stored
        for i in 0..self.plan.cells.len() {
            let cell = self.plan.cells[i].clone();
            self.evaluate_guarded(&cell);
            if !self.generation.is_current() {
                return self.superseded();
            }
        }

        // Phase 5: Readers of moved spills were ordered without them
        for cell in self.spill_readers() {
            self.evaluate_guarded(&cell);
            if !self.generation.is_current() {
                return self.superseded();
            }
        }

        // Phase 6: Other formulas, once each at their anchor
        let mut other_values = BTreeMap::new();
        for key in &self.plan.other_formulas {
            let entry = match self.index.get_other(key) {
                Some(entry) => entry,
                None => continue,
            };
            move_to(&mut self.interpreter, &self.config.unit_data, &entry.output);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.interpreter.evaluate_sync(&entry.node)));
            let site = format!("{}/{} formula {}", key.unit_id, key.sheet_id, key.formula_id);
            let value = contain(&site, outcome.map(Ok)).unwrap_or_else(|| {
                self.interpreter.reset_cell_state();
                Value::Error(CellError::Calc)
            });
            other_values.insert(key.clone(), value);
        }

        self.finish(other_values)
    }

    async fn run_async(mut self) -> CalculationOutcome {
        for i in 0..self.plan.cells.len() {
            let cell = self.plan.cells[i].clone();
            self.evaluate_guarded_async(&cell).await;
            if !self.generation.is_current() {
                return self.superseded();
            }
        }

        for cell in self.spill_readers() {
            self.evaluate_guarded_async(&cell).await;
            if !self.generation.is_current() {
                return self.superseded();
            }
        }

        let mut other_values = BTreeMap::new();
        for key in &self.plan.other_formulas {
            let entry = match self.index.get_other(key) {
                Some(entry) => entry,
                None => continue,
            };
            move_to(&mut self.interpreter, &self.config.unit_data, &entry.output);
            let outcome = AssertUnwindSafe(self.interpreter.evaluate_async(&entry.node))
                .catch_unwind()
                .await;
            let site = format!("{}/{} formula {}", key.unit_id, key.sheet_id, key.formula_id);
            let value = contain(&site, outcome.map(Ok)).unwrap_or_else(|| {
                self.interpreter.reset_cell_state();
                Value::Error(CellError::Calc)
            });
            other_values.insert(key.clone(), value);
        }

        self.finish(other_values)
    }

    fn evaluate_guarded(&mut self, cell: &UnitCell) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.interpreter.evaluate_cell(cell)));
        self.settle(cell, outcome);
    }

    async fn evaluate_guarded_async(&mut self, cell: &UnitCell) {
        let outcome = AssertUnwindSafe(self.interpreter.evaluate_cell_async(cell))
            .catch_unwind()
            .await;
        self.settle(cell, outcome);
    }

    fn settle(&mut self, cell: &UnitCell, outcome: std::thread::Result<FormulaResult<Value>>) {
        if contain(cell, outcome).is_none() {
            self.interpreter.reset_cell_state();
            self.interpreter.record_result(cell, Value::Error(CellError::Calc));
        }
    }

    /// Formulas reading cells whose spill appeared, grew, shrank or vanished
    ///
    /// The plan ordered them by the spill ranges known before the pass. Their
    /// results are dropped so they are evaluated again.
    fn spill_readers(&mut self) -> Vec<UnitCell> {
        let state = self.interpreter.pass();
        let mut moved: FastSet<UnitCell> = FastSet::default();
        let mut areas = Vec::new();
        for anchor in state.changed_anchors() {
            let now = state.spill_range(anchor).copied();
            let before = self.config.array_range(anchor);
            if now == before {
                continue;
            }
            moved.insert(anchor.clone());
            for range in now.iter().chain(before.iter()) {
                areas.push(UnitRange::new(anchor.unit_id.clone(), anchor.sheet_id.clone(), *range));
            }
        }
        if areas.is_empty() {
            return Vec::new();
        }

        let inputs = DirtyInputs {
            dirty_ranges: areas,
            excluded: self.config.excluded_cells.clone(),
            ..Default::default()
        };
        let readers: Vec<UnitCell> = DirtyTracker::new(self.index)
            .compute(&inputs)
            .cells
            .into_iter()
            .filter(|cell| !moved.contains(cell))
            .collect();

        let state = self.interpreter.pass_mut();
        for cell in &readers {
            state.invalidate(cell);
        }
        log::debug!("re-evaluating {} readers of {} moved spills", readers.len(), moved.len());

        self.respilled.extend(readers.iter().cloned());
        readers
    }

    fn superseded(&self) -> CalculationOutcome {
        log::debug!("pass {} superseded", self.generation.value());
        CalculationOutcome::Superseded {
            generation: self.generation.value(),
        }
    }

    fn finish(self, other_values: BTreeMap<OtherFormulaKey, Value>) -> CalculationOutcome {
        // A stale generation produces nothing
        if !self.generation.is_current() {
            return self.superseded();
        }

        let Pass {
            config,
            index,
            options,
            generation,
            plan,
            interpreter,
            respilled,
        } = self;
        let state = interpreter.into_pass();

        let mut seen: FastSet<&UnitCell> = FastSet::default();
        let calculated: Vec<&UnitCell> = plan
            .cells
            .iter()
            .chain(&respilled)
            .filter(|cell| seen.insert(*cell))
            .collect();

        let mut result = CalculationResult {
            other_values,
            dirty_features: plan.features.clone(),
            ..Default::default()
        };
        let mut errors = 0;

        for cell in plan.cycles.iter().chain(calculated.iter().copied()) {
            if let Some(value) = state.result(cell) {
                if value.is_error() {
                    errors += 1;
                }
                insert_cell(&mut result.values, cell, value.to_cell_value());
            }
        }

        let mut anchors: Vec<&UnitCell> = state.changed_anchors().collect();
        anchors.sort();
        for anchor in anchors {
            match state.spill_range(anchor) {
                Some(range) => {
                    insert_cell(&mut result.array_ranges, anchor, *range);
                    for (row, col) in range.cells() {
                        let cell = UnitCell::new(anchor.unit_id.clone(), anchor.sheet_id.clone(), row, col);
                        let value = state
                            .spilled_value(&cell)
                            .map_or(CellValue::Empty, Value::to_cell_value);
                        insert_cell(&mut result.array_data, &cell, value);
                    }
                }
                None => result.cleared_arrays.push(anchor.clone()),
            }
        }

        // Phase 7: Number formats follow the leading single-cell reference
        if options.infer_number_formats {
            for cell in calculated.iter().copied() {
                let computed = state.result(cell).map_or(false, |v| !v.is_error());
                if !computed || config.number_format(cell).is_some() {
                    continue;
                }
                let source = match index.get(cell).and_then(|e| leading_cell_reference(&e.node, cell)) {
                    Some(source) => source,
                    None => continue,
                };
                let format = get_cell(&result.number_formats, &source)
                    .map(String::as_str)
                    .or_else(|| config.number_format(&source))
                    .map(str::to_string);
                if let Some(format) = format {
                    insert_cell(&mut result.number_formats, cell, format);
                }
            }
        }

        result.stats = CalculationStats {
            formula_count: index.len(),
            cells_calculated: calculated.len(),
            circular_references: plan.cycles.len(),
            volatile_cells: if options.calculate_volatile {
                index.volatile_count()
            } else {
                0
            },
            errors,
        };
        log::debug!("pass {} completed: {:?}", generation.value(), result.stats);

        CalculationOutcome::Completed(result)
    }
}

/// Keep a faulted evaluation from escaping the boundary
///
/// Returns `None` after logging a [`duke_calc_formula::FormulaError`] or a
/// panic; the caller records `#CALC!`.
fn contain(
    site: &dyn fmt::Display,
    outcome: std::thread::Result<FormulaResult<Value>>,
) -> Option<Value> {
    match outcome {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            log::warn!("{}: {}", site, err);
            None
        }
        Err(payload) => {
            log::warn!("{}: evaluation panicked: {}", site, panic_message(payload.as_ref()));
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

fn sheet_bounds(data: &UnitData, unit_id: &str, sheet_id: &str) -> (u32, u16) {
    data.sheet(unit_id, sheet_id)
        .map_or((MAX_ROWS, MAX_COLS), |s| (s.row_count(), s.column_count()))
}

fn move_to(interpreter: &mut Interpreter<'_>, data: &UnitData, target: &UnitRange) {
    let (row_count, column_count) = sheet_bounds(data, &target.unit_id, &target.sheet_id);
    interpreter.context_mut().set_current(
        target.range.start.row,
        target.range.start.col,
        row_count,
        column_count,
        target.sheet_id.clone(),
        target.unit_id.clone(),
    );
}

/// The first reference of a formula, when it names one cell
fn leading_cell_reference(node: &Node, at: &UnitCell) -> Option<UnitCell> {
    let mut first = None;
    node.walk(&mut |n| {
        if first.is_none() && matches!(n.kind, NodeKind::Reference { .. }) {
            first = Some(n);
        }
    });

    match &first?.kind {
        NodeKind::Reference {
            unit_id,
            sheet_id,
            range,
        } if range.is_single() => Some(UnitCell::new(
            unit_id.clone().unwrap_or_else(|| at.unit_id.clone()),
            sheet_id.clone().unwrap_or_else(|| at.sheet_id.clone()),
            range.start.row,
            range.start.col,
        )),
        _ => None,
    }
}

// === Sheet map helpers ===

fn insert_cell<T>(map: &mut SheetMap<CellMatrix<T>>, cell: &UnitCell, value: T) {
    map.entry(cell.unit_id.clone())
        .or_default()
        .entry(cell.sheet_id.clone())
        .or_default()
        .insert(cell.row, cell.col, value);
}

fn get_cell<'m, T>(map: &'m SheetMap<CellMatrix<T>>, cell: &UnitCell) -> Option<&'m T> {
    map.get(&cell.unit_id)?.get(&cell.sheet_id)?.get(cell.row, cell.col)
}

fn remove_cell<T>(map: &mut SheetMap<CellMatrix<T>>, cell: &UnitCell) -> Option<T> {
    map.get_mut(&cell.unit_id)?
        .get_mut(&cell.sheet_id)?
        .remove(cell.row, cell.col)
}

fn entries<T>(map: &SheetMap<CellMatrix<T>>) -> impl Iterator<Item = (UnitCell, &T)> + '_ {
    map.iter().flat_map(|(unit, sheets)| {
        sheets.iter().flat_map(move |(sheet, cells)| {
            cells
                .iter()
                .map(move |(row, col, value)| (UnitCell::new(unit.clone(), sheet.clone(), row, col), value))
        })
    })
}
