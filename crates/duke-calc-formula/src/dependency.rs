//! Dependency tracking for formula calculation
//!
//! [`FormulaIndex`] records what every formula reads: ranges, defined names
//! and sheet names. [`DirtyTracker`] walks that index backwards from what
//! changed and produces a [`RecalcPlan`]: the formula cells to evaluate,
//! dependencies first, and the cells that sit on a cycle.

use std::collections::VecDeque;
use std::sync::Arc;

use duke_calc_core::{CellRange, SheetId, UnitCell, UnitData, UnitId, UnitRange, UnitSheetNameMap};

use crate::ast::{Node, NodeKind};
use crate::config::{CurrentConfig, FeatureDependency};
use crate::functions::FunctionRegistry;
use crate::lexer::{Lexer, TokenKind};
use crate::parser::Parser;
use crate::shared::expand_shared_formulas;
use crate::{FastMap, FastSet};

/// Key of a formula that is not stored in a cell
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OtherFormulaKey {
    pub unit_id: UnitId,
    pub sheet_id: SheetId,
    pub formula_id: String,
}

impl OtherFormulaKey {
    pub fn new<U: Into<UnitId>, S: Into<SheetId>, F: Into<String>>(unit_id: U, sheet_id: S, formula_id: F) -> Self {
        Self {
            unit_id: unit_id.into(),
            sheet_id: sheet_id.into(),
            formula_id: formula_id.into(),
        }
    }
}

/// Key of a host feature
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureKey {
    pub unit_id: UnitId,
    pub sheet_id: SheetId,
    pub feature_id: String,
}

impl FeatureKey {
    pub fn new<U: Into<UnitId>, S: Into<SheetId>, F: Into<String>>(unit_id: U, sheet_id: S, feature_id: F) -> Self {
        Self {
            unit_id: unit_id.into(),
            sheet_id: sheet_id.into(),
            feature_id: feature_id.into(),
        }
    }
}

/// One parsed formula and what it reads
#[derive(Debug, Clone)]
pub struct FormulaEntry {
    pub text: String,
    pub node: Arc<Node>,
    /// Ranges read, directly or through defined names
    pub references: Vec<UnitRange>,
    /// Defined names used (uppercase)
    pub names: Vec<String>,
    /// Sheet names written in the text (uppercase)
    pub sheet_names: Vec<String>,
    pub volatile: bool,
    /// Where the result lands: the cell, or the whole spill range
    pub output: UnitRange,
}

/// Builds [`FormulaEntry`] values for one data snapshot
pub struct FormulaAnalyzer<'a> {
    registry: &'a FunctionRegistry,
    data: &'a UnitData,
    sheet_names: &'a UnitSheetNameMap,
    lexer: Lexer,
}

impl<'a> FormulaAnalyzer<'a> {
    pub fn new(registry: &'a FunctionRegistry, data: &'a UnitData, sheet_names: &'a UnitSheetNameMap) -> Self {
        Self {
            registry,
            data,
            sheet_names,
            lexer: Lexer::default(),
        }
    }

    /// Parse `text` as written in `unit_id`/`sheet_id` and collect its inputs
    pub fn analyze(&self, text: &str, unit_id: &str, sheet_id: &str, output: UnitRange) -> FormulaEntry {
        let tree = self.lexer.tokenize(text);
        let mut sheet_names: Vec<String> = tree
            .tokens()
            .into_iter()
            .filter_map(|t| match &t.kind {
                TokenKind::Reference(r) => r.sheet.as_ref().map(|s| s.to_uppercase()),
                _ => None,
            })
            .collect();
        sheet_names.sort();
        sheet_names.dedup();

        let node = Parser::new(self.sheet_names)
            .with_unit(unit_id)
            .parse(&tree);

        let mut scan = Scan::default();
        self.scan(&node, unit_id, sheet_id, &mut scan);
        scan.names.sort();
        scan.names.dedup();

        FormulaEntry {
            text: text.to_string(),
            node: Arc::new(node),
            references: scan.references,
            names: scan.names,
            sheet_names,
            volatile: scan.volatile,
            output,
        }
    }

    fn scan(&self, node: &Node, unit_id: &str, sheet_id: &str, scan: &mut Scan) {
        node.walk(&mut |n: &Node| match &n.kind {
            NodeKind::Reference {
                unit_id: u,
                sheet_id: s,
                range,
            } => scan.references.push(UnitRange::new(
                u.clone().unwrap_or_else(|| unit_id.to_string()),
                s.clone().unwrap_or_else(|| sheet_id.to_string()),
                *range,
            )),
            NodeKind::FunctionCall { name, .. } => {
                scan.volatile |= self.registry.is_volatile(name);
            }
            NodeKind::Name(name) => scan.pending_names.push(name.clone()),
            _ => {}
        });

        // Defined names read whatever their definition reads
        while let Some(name) = scan.pending_names.pop() {
            let upper = name.to_uppercase();
            if !scan.visited.insert(upper.clone()) {
                continue;
            }
            scan.names.push(upper);

            let Some(def) = self
                .data
                .unit(unit_id)
                .and_then(|book| book.defined_name(&name, Some(sheet_id)))
            else {
                continue;
            };
            let body = Parser::new(self.sheet_names)
                .with_unit(unit_id)
                .parse_text(&def.formula_text());
            self.scan(&body, unit_id, sheet_id, scan);
        }
    }
}

#[derive(Default)]
struct Scan {
    references: Vec<UnitRange>,
    names: Vec<String>,
    pending_names: Vec<String>,
    visited: FastSet<String>,
    volatile: bool,
}

/// Every formula of a configuration, parsed and analyzed
#[derive(Debug, Clone, Default)]
pub struct FormulaIndex {
    cells: FastMap<UnitCell, FormulaEntry>,
    others: FastMap<OtherFormulaKey, FormulaEntry>,
}

impl FormulaIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the formulas of a loaded configuration
    ///
    /// Array formulas take the spill range recorded for them as output.
    pub fn build(config: &CurrentConfig, registry: &FunctionRegistry) -> Self {
        let analyzer = FormulaAnalyzer::new(registry, &config.unit_data, &config.sheet_name_map);
        let mut index = Self::new();

        for (cell, item) in config.formula_cells() {
            let output = match config.array_range(&cell) {
                Some(range) => UnitRange::new(cell.unit_id.clone(), cell.sheet_id.clone(), range),
                None => cell.range(),
            };
            let entry = analyzer.analyze(&item.formula, &cell.unit_id, &cell.sheet_id, output);
            index.insert(cell, entry);
        }

        for (key, item) in config.other_formulas() {
            let (row, col) = item.anchor();
            let output = UnitRange::cell(key.unit_id.clone(), key.sheet_id.clone(), row, col);
            let entry = analyzer.analyze(&item.formula, &key.unit_id, &key.sheet_id, output);
            index.others.insert(key, entry);
        }

        log::debug!(
            "indexed {} formula cells and {} other formulas",
            index.cells.len(),
            index.others.len()
        );
        index
    }

    /// Index the formulas stored in a snapshot
    pub fn from_data(data: &UnitData, registry: &FunctionRegistry) -> Self {
        let sheet_names = data.sheet_name_map();
        let analyzer = FormulaAnalyzer::new(registry, data, &sheet_names);
        let mut index = Self::new();

        for unit in data.units() {
            for sheet in unit.sheets() {
                for (row, col, item) in expand_shared_formulas(sheet.formula_cells()) {
                    if !item.has_text() {
                        continue;
                    }
                    let cell = UnitCell::new(unit.id(), sheet.id(), row, col);
                    let entry = analyzer.analyze(&item.formula, unit.id(), sheet.id(), cell.range());
                    index.insert(cell, entry);
                }
            }
        }
        index
    }

    pub fn insert(&mut self, cell: UnitCell, entry: FormulaEntry) {
        self.cells.insert(cell, entry);
    }

    pub fn insert_other(&mut self, key: OtherFormulaKey, entry: FormulaEntry) {
        self.others.insert(key, entry);
    }

    pub fn get(&self, cell: &UnitCell) -> Option<&FormulaEntry> {
        self.cells.get(cell)
    }

    pub fn get_other(&self, key: &OtherFormulaKey) -> Option<&FormulaEntry> {
        self.others.get(key)
    }

    pub fn contains(&self, cell: &UnitCell) -> bool {
        self.cells.contains_key(cell)
    }

    pub fn cells(&self) -> impl Iterator<Item = (&UnitCell, &FormulaEntry)> + '_ {
        self.cells.iter()
    }

    pub fn others(&self) -> impl Iterator<Item = (&OtherFormulaKey, &FormulaEntry)> + '_ {
        self.others.iter()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn volatile_count(&self) -> usize {
        self.cells.values().filter(|e| e.volatile).count()
    }
}

/// What changed since the last pass
#[derive(Debug, Clone, Default)]
pub struct DirtyInputs {
    pub dirty_ranges: Vec<UnitRange>,
    /// (unit, NAME) of changed defined names
    pub dirty_names: Vec<(UnitId, String)>,
    /// (unit, SHEET NAME) of sheets added, removed or renamed
    pub dirty_sheet_names: Vec<(UnitId, String)>,
    pub dirty_features: FastSet<FeatureKey>,
    pub dirty_other_formulas: FastSet<OtherFormulaKey>,
    /// Never recalculated
    pub excluded: FastSet<UnitCell>,
    pub force_calculate: bool,
    /// Seed volatile formulas
    pub calculate_volatile: bool,
}

/// Output of [`DirtyTracker::compute`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecalcPlan {
    /// Formula cells to evaluate, dependencies first
    pub cells: Vec<UnitCell>,
    pub other_formulas: Vec<OtherFormulaKey>,
    pub features: Vec<FeatureKey>,
    /// Cells on a circular reference, in evaluation order
    pub cycles: Vec<UnitCell>,
}

impl RecalcPlan {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && self.other_formulas.is_empty() && self.features.is_empty() && self.cycles.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Vertex {
    Cell(UnitCell),
    Other(OtherFormulaKey),
}

#[derive(Debug)]
enum Frontier {
    Range(UnitRange),
    Name(UnitId, String),
    SheetName(String),
}

type SheetKey = (UnitId, SheetId);

/// Finds what to recalculate after a change
///
/// Vertices are formulas. Reverse buckets map every sheet, defined name and
/// sheet name to the formulas that read it, so discovery only touches
/// formulas that can be affected.
pub struct DirtyTracker<'a> {
    vertices: Vec<Vertex>,
    entries: Vec<&'a FormulaEntry>,
    readers_by_sheet: FastMap<SheetKey, Vec<(usize, CellRange)>>,
    outputs_by_sheet: FastMap<SheetKey, Vec<(usize, CellRange)>>,
    readers_by_name: FastMap<(UnitId, String), Vec<usize>>,
    readers_by_sheet_name: FastMap<String, Vec<usize>>,
    features: Vec<&'a FeatureDependency>,
}

impl<'a> DirtyTracker<'a> {
    pub fn new(index: &'a FormulaIndex) -> Self {
        let mut pairs: Vec<(Vertex, &FormulaEntry)> = index
            .cells
            .iter()
            .map(|(cell, entry)| (Vertex::Cell(cell.clone()), entry))
            .chain(index.others.iter().map(|(key, entry)| (Vertex::Other(key.clone()), entry)))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));

        let mut tracker = Self {
            vertices: Vec::with_capacity(pairs.len()),
            entries: Vec::with_capacity(pairs.len()),
            readers_by_sheet: FastMap::default(),
            outputs_by_sheet: FastMap::default(),
            readers_by_name: FastMap::default(),
            readers_by_sheet_name: FastMap::default(),
            features: Vec::new(),
        };

        for (i, (vertex, entry)) in pairs.into_iter().enumerate() {
            let unit_id = match &vertex {
                Vertex::Cell(cell) => cell.unit_id.clone(),
                Vertex::Other(key) => key.unit_id.clone(),
            };
            for r in &entry.references {
                tracker
                    .readers_by_sheet
                    .entry((r.unit_id.clone(), r.sheet_id.clone()))
                    .or_default()
                    .push((i, r.range));
            }
            for name in &entry.names {
                tracker
                    .readers_by_name
                    .entry((unit_id.clone(), name.clone()))
                    .or_default()
                    .push(i);
            }
            for name in &entry.sheet_names {
                tracker.readers_by_sheet_name.entry(name.clone()).or_default().push(i);
            }
            if let Vertex::Cell(_) = vertex {
                let out = &entry.output;
                tracker
                    .outputs_by_sheet
                    .entry((out.unit_id.clone(), out.sheet_id.clone()))
                    .or_default()
                    .push((i, out.range));
            }
            tracker.vertices.push(vertex);
            tracker.entries.push(entry);
        }
        tracker
    }

    /// Host features whose dependencies are tracked too
    pub fn with_features(mut self, features: &'a [FeatureDependency]) -> Self {
        self.features = features.iter().collect();
        self
    }

    /// Discover every affected formula and order the result
    pub fn compute(&self, inputs: &DirtyInputs) -> RecalcPlan {
        let n = self.vertices.len();
        let mut discovered = vec![false; n];
        let mut feature_dirty = vec![false; self.features.len()];
        let mut frontier: VecDeque<Frontier> = VecDeque::new();

        let excluded = |v: usize| match &self.vertices[v] {
            Vertex::Cell(cell) => inputs.excluded.contains(cell),
            Vertex::Other(_) => false,
        };

        let discover = |v: usize, discovered: &mut Vec<bool>, frontier: &mut VecDeque<Frontier>| {
            if discovered[v] || excluded(v) {
                return;
            }
            discovered[v] = true;
            if let Vertex::Cell(_) = self.vertices[v] {
                frontier.push_back(Frontier::Range(self.entries[v].output.clone()));
            }
        };

        // === Seeds ===
        for v in 0..n {
            let seed = inputs.force_calculate
                || (inputs.calculate_volatile && self.entries[v].volatile)
                || matches!(&self.vertices[v], Vertex::Other(key) if inputs.dirty_other_formulas.contains(key));
            if seed {
                discover(v, &mut discovered, &mut frontier);
            }
        }
        for range in &inputs.dirty_ranges {
            frontier.push_back(Frontier::Range(range.clone()));
            // A formula cell inside a dirty range was itself edited
            for &(v, output) in self.outputs_in(range) {
                if output.overlaps(&range.range) {
                    discover(v, &mut discovered, &mut frontier);
                }
            }
        }
        for (unit, name) in &inputs.dirty_names {
            frontier.push_back(Frontier::Name(unit.clone(), name.clone()));
        }
        for (_, name) in &inputs.dirty_sheet_names {
            frontier.push_back(Frontier::SheetName(name.clone()));
        }
        for (f, feature) in self.features.iter().enumerate() {
            if inputs.dirty_features.contains(&feature.key()) {
                feature_dirty[f] = true;
                frontier.extend(feature.outputs.iter().cloned().map(Frontier::Range));
            }
        }

        // === Worklist ===
        while let Some(item) = frontier.pop_front() {
            match item {
                Frontier::Range(range) => {
                    let key = (range.unit_id.clone(), range.sheet_id.clone());
                    if let Some(readers) = self.readers_by_sheet.get(&key) {
                        for &(v, read) in readers {
                            if read.overlaps(&range.range) {
                                discover(v, &mut discovered, &mut frontier);
                            }
                        }
                    }
                    for (f, feature) in self.features.iter().enumerate() {
                        if !feature_dirty[f] && feature.dependencies.iter().any(|d| d.intersects(&range)) {
                            feature_dirty[f] = true;
                            frontier.extend(feature.outputs.iter().cloned().map(Frontier::Range));
                        }
                    }
                }
                Frontier::Name(unit, name) => {
                    if let Some(readers) = self.readers_by_name.get(&(unit, name)) {
                        for &v in readers {
                            discover(v, &mut discovered, &mut frontier);
                        }
                    }
                }
                Frontier::SheetName(name) => {
                    if let Some(readers) = self.readers_by_sheet_name.get(&name) {
                        for &v in readers {
                            discover(v, &mut discovered, &mut frontier);
                        }
                    }
                }
            }
        }

        // === Ordering ===
        let cells: Vec<usize> = (0..n)
            .filter(|&v| discovered[v] && matches!(self.vertices[v], Vertex::Cell(_)))
            .collect();
        let (order, cyclic) = self.order(&cells, &discovered);

        let mut plan = RecalcPlan::default();
        for v in order {
            if let Vertex::Cell(cell) = &self.vertices[v] {
                if cyclic[v] {
                    plan.cycles.push(cell.clone());
                } else {
                    plan.cells.push(cell.clone());
                }
            }
        }
        plan.other_formulas = (0..n)
            .filter(|&v| discovered[v])
            .filter_map(|v| match &self.vertices[v] {
                Vertex::Other(key) => Some(key.clone()),
                Vertex::Cell(_) => None,
            })
            .collect();
        plan.features = self
            .features
            .iter()
            .enumerate()
            .filter(|(f, _)| feature_dirty[*f])
            .map(|(_, feature)| feature.key())
            .collect();
        plan.features.sort();

        log::debug!(
            "recalc plan: {} cells, {} cycles, {} other formulas, {} features",
            plan.cells.len(),
            plan.cycles.len(),
            plan.other_formulas.len(),
            plan.features.len()
        );
        plan
    }

    fn outputs_in(&self, range: &UnitRange) -> &[(usize, CellRange)] {
        self.outputs_by_sheet
            .get(&(range.unit_id.clone(), range.sheet_id.clone()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Discovered formulas that `v` reads from
    fn edges(&self, v: usize, discovered: &[bool]) -> Vec<usize> {
        let mut targets: Vec<usize> = self.entries[v]
            .references
            .iter()
            .flat_map(|r| {
                self.outputs_in(r)
                    .iter()
                    .filter(move |(_, out)| out.overlaps(&r.range))
                    .map(|&(w, _)| w)
            })
            .filter(|&w| discovered[w])
            .collect();
        targets.sort_unstable();
        targets.dedup();
        targets
    }

    /// Tarjan's strongly connected components, iteratively
    ///
    /// An edge X -> Y means X reads Y, so components come out dependencies
    /// first. Returns the emission order and which vertices are cyclic (a
    /// component of more than one vertex, or a vertex reading itself).
    fn order(&self, roots: &[usize], discovered: &[bool]) -> (Vec<usize>, Vec<bool>) {
        let n = self.vertices.len();
        let mut index: Vec<Option<usize>> = vec![None; n];
        let mut lowlink = vec![0usize; n];
        let mut on_stack = vec![false; n];
        let mut stack: Vec<usize> = Vec::new();
        let mut edges: FastMap<usize, Vec<usize>> = FastMap::default();
        let mut next_index = 0usize;

        let mut order = Vec::with_capacity(roots.len());
        let mut cyclic = vec![false; n];

        for &root in roots {
            if index[root].is_some() {
                continue;
            }
            let mut call: Vec<(usize, usize)> = vec![(root, 0)];
            index[root] = Some(next_index);
            lowlink[root] = next_index;
            next_index += 1;
            stack.push(root);
            on_stack[root] = true;

            while let Some(&(v, edge)) = call.last() {
                let out = edges.entry(v).or_insert_with(|| self.edges(v, discovered));
                if edge < out.len() {
                    let w = out[edge];
                    if let Some(top) = call.last_mut() {
                        top.1 += 1;
                    }
                    match index[w] {
                        None => {
                            index[w] = Some(next_index);
                            lowlink[w] = next_index;
                            next_index += 1;
                            stack.push(w);
                            on_stack[w] = true;
                            call.push((w, 0));
                        }
                        Some(iw) if on_stack[w] => lowlink[v] = lowlink[v].min(iw),
                        Some(_) => {}
                    }
                    continue;
                }

                call.pop();
                if let Some(&(parent, _)) = call.last() {
                    lowlink[parent] = lowlink[parent].min(lowlink[v]);
                }
                if Some(lowlink[v]) != index[v] {
                    continue;
                }

                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                let self_loop = component.len() == 1 && edges.get(&v).map_or(false, |e| e.contains(&v));
                if component.len() > 1 || self_loop {
                    for &w in &component {
                        cyclic[w] = true;
                    }
                }
                component.sort_unstable();
                order.extend(component);
            }
        }

        (order, cyclic)
    }
}
