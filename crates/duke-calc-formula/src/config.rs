//! Load-time configuration
//!
//! [`FormulaDatasetConfig`] is what a host hands over before a calculation:
//! the data snapshot, the formulas, what changed since the last pass and a
//! few switches. [`CurrentConfig::load`] normalizes it into the form the
//! dependency tracker and the engine work from.

use duke_calc_core::{
    CellMatrix, CellRange, CellValue, FormulaDataItem, SheetId, UnitCell, UnitData, UnitId, UnitRange,
    UnitSheetNameMap,
};

use crate::dependency::{DirtyInputs, FeatureKey, OtherFormulaKey};
use crate::shared::expand_shared_formulas;
use crate::{FastMap, FastSet};

/// unit -> sheet -> T
pub type SheetMap<T> = FastMap<UnitId, FastMap<SheetId, T>>;

/// Formulas by cell
pub type FormulaDataMap = SheetMap<CellMatrix<FormulaDataItem>>;

/// Formulas that live outside cells (conditional formats, validations, ...)
pub type OtherFormulaDataMap = SheetMap<FastMap<String, OtherFormulaItem>>;

/// Spill range per array formula anchor
pub type ArrayFormulaRangeMap = SheetMap<CellMatrix<CellRange>>;

/// Values spilled by array formulas in an earlier pass
pub type ArrayFormulaCellDataMap = SheetMap<CellMatrix<CellValue>>;

/// unit -> sheet id -> sheet name, for sheets added, removed or renamed
pub type DirtyNameMap = FastMap<UnitId, FastMap<SheetId, String>>;

/// unit -> defined name -> new formula text (empty when removed)
pub type DirtyDefinedNameMap = FastMap<UnitId, FastMap<String, String>>;

/// unit -> sheet -> id -> dirty
pub type DirtyFlagMap = SheetMap<FastMap<String, bool>>;

/// Number format pattern per cell
pub type NumberFormatMap = SheetMap<CellMatrix<String>>;

/// Cells that must not be recalculated
pub type ExcludedCellMap = SheetMap<CellMatrix<bool>>;

/// A formula that is not stored in a cell
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OtherFormulaItem {
    pub formula: String,
    /// Ranges the formula applies to; it is evaluated relative to the
    /// top-left cell of the first one
    #[cfg_attr(feature = "serde", serde(default))]
    pub ranges: Vec<CellRange>,
}

impl OtherFormulaItem {
    pub fn new<S: Into<String>>(formula: S, ranges: Vec<CellRange>) -> Self {
        Self {
            formula: formula.into(),
            ranges,
        }
    }

    /// Position the formula is evaluated at
    pub fn anchor(&self) -> (u32, u16) {
        self.ranges
            .first()
            .map_or((0, 0), |r| (r.start.row, r.start.col))
    }
}

/// A host feature that reads some ranges and produces others
///
/// When any dependency changes the feature is reported dirty, and its
/// outputs count as changed for the formulas that read them.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureDependency {
    pub unit_id: UnitId,
    pub sheet_id: SheetId,
    pub feature_id: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub dependencies: Vec<UnitRange>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub outputs: Vec<UnitRange>,
}

impl FeatureDependency {
    pub fn key(&self) -> FeatureKey {
        FeatureKey::new(self.unit_id.clone(), self.sheet_id.clone(), self.feature_id.clone())
    }
}

/// Everything a host passes in before calculating
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FormulaDatasetConfig {
    /// Cell formulas; merged over the formulas stored in the snapshot
    pub formula_data: FormulaDataMap,
    pub other_formula_data: OtherFormulaDataMap,
    pub array_formula_range: ArrayFormulaRangeMap,
    pub array_formula_cell_data: ArrayFormulaCellDataMap,
    /// Recalculate every formula regardless of dirty state
    pub force_calculate: bool,
    pub dirty_ranges: Vec<UnitRange>,
    pub dirty_name_map: DirtyNameMap,
    pub dirty_defined_name_map: DirtyDefinedNameMap,
    pub dirty_unit_feature_map: DirtyFlagMap,
    pub dirty_unit_other_formula_map: DirtyFlagMap,
    pub feature_dependencies: Vec<FeatureDependency>,
    pub numfmt_item_map: NumberFormatMap,
    pub excluded_cell: Option<ExcludedCellMap>,
    pub all_unit_data: Option<UnitData>,
    pub unit_sheet_name_map: Option<UnitSheetNameMap>,
}

/// A loaded, normalized configuration
#[derive(Debug, Clone, Default)]
pub struct CurrentConfig {
    /// Every cell formula with its own text (shared formulas expanded)
    pub formula_data: FormulaDataMap,
    pub other_formula_data: OtherFormulaDataMap,
    pub array_formula_range: ArrayFormulaRangeMap,
    pub array_formula_cell_data: ArrayFormulaCellDataMap,
    pub force_calculate: bool,
    pub dirty_ranges: Vec<UnitRange>,
    pub dirty_name_map: DirtyNameMap,
    pub dirty_defined_name_map: DirtyDefinedNameMap,
    pub dirty_unit_feature_map: DirtyFlagMap,
    pub dirty_unit_other_formula_map: DirtyFlagMap,
    pub feature_dependencies: Vec<FeatureDependency>,
    pub numfmt_item_map: NumberFormatMap,
    pub excluded_cells: FastSet<UnitCell>,
    pub unit_data: UnitData,
    pub sheet_name_map: UnitSheetNameMap,
    /// Units touched by the dirty inputs, sorted
    pub dirty_units: Vec<UnitId>,
}

impl CurrentConfig {
    /// Normalize a host configuration
    pub fn load(config: FormulaDatasetConfig) -> Self {
        let mut unit_data = config.all_unit_data.unwrap_or_default();
        apply_defined_names(&mut unit_data, &config.dirty_defined_name_map);

        let sheet_name_map = match config.unit_sheet_name_map {
            Some(mut map) => {
                map.extend(&unit_data.sheet_name_map());
                map
            }
            None => unit_data.sheet_name_map(),
        };

        let formula_data = merge_formulas(&unit_data, config.formula_data);

        let excluded_cells = config
            .excluded_cell
            .iter()
            .flat_map(|map| cells_of(map))
            .filter(|(_, excluded)| **excluded)
            .map(|(cell, _)| cell)
            .collect();

        let mut current = Self {
            formula_data,
            other_formula_data: config.other_formula_data,
            array_formula_range: config.array_formula_range,
            array_formula_cell_data: config.array_formula_cell_data,
            force_calculate: config.force_calculate,
            dirty_ranges: config.dirty_ranges,
            dirty_name_map: config.dirty_name_map,
            dirty_defined_name_map: config.dirty_defined_name_map,
            dirty_unit_feature_map: config.dirty_unit_feature_map,
            dirty_unit_other_formula_map: config.dirty_unit_other_formula_map,
            feature_dependencies: config.feature_dependencies,
            numfmt_item_map: config.numfmt_item_map,
            excluded_cells,
            unit_data,
            sheet_name_map,
            dirty_units: Vec::new(),
        };
        current.dirty_units = current.collect_dirty_units();

        log::debug!(
            "loaded {} formula cells, {} dirty ranges, {} dirty units",
            current.formula_count(),
            current.dirty_ranges.len(),
            current.dirty_units.len()
        );
        current
    }

    pub fn formula_count(&self) -> usize {
        self.formula_data
            .values()
            .flat_map(|sheets| sheets.values())
            .map(CellMatrix::len)
            .sum()
    }

    /// Cell formulas as (cell, item), sorted by unit, sheet and position
    pub fn formula_cells(&self) -> Vec<(UnitCell, &FormulaDataItem)> {
        let mut cells: Vec<_> = cells_of(&self.formula_data).collect();
        cells.sort_by(|a, b| a.0.cmp(&b.0));
        cells
    }

    /// Other formulas, sorted by key
    pub fn other_formulas(&self) -> Vec<(OtherFormulaKey, &OtherFormulaItem)> {
        let mut items: Vec<_> = self
            .other_formula_data
            .iter()
            .flat_map(|(unit, sheets)| {
                sheets.iter().flat_map(move |(sheet, items)| {
                    items
                        .iter()
                        .map(move |(id, item)| (OtherFormulaKey::new(unit.clone(), sheet.clone(), id.clone()), item))
                })
            })
            .collect();
        items.sort_by(|a, b| a.0.cmp(&b.0));
        items
    }

    /// Spill range recorded for an anchor in an earlier pass
    pub fn array_range(&self, cell: &UnitCell) -> Option<CellRange> {
        self.array_formula_range
            .get(&cell.unit_id)?
            .get(&cell.sheet_id)?
            .get(cell.row, cell.col)
            .copied()
    }

    /// Previous spills as (anchor, range)
    pub fn array_ranges(&self) -> impl Iterator<Item = (UnitCell, CellRange)> + '_ {
        cells_of(&self.array_formula_range).map(|(cell, range)| (cell, *range))
    }

    /// Values spilled into one sheet in an earlier pass
    pub fn array_cell_data(&self, unit_id: &str, sheet_id: &str) -> Option<&CellMatrix<CellValue>> {
        self.array_formula_cell_data.get(unit_id)?.get(sheet_id)
    }

    pub fn number_format(&self, cell: &UnitCell) -> Option<&str> {
        self.numfmt_item_map
            .get(&cell.unit_id)?
            .get(&cell.sheet_id)?
            .get(cell.row, cell.col)
            .map(String::as_str)
    }

    /// Dirty state in the form the tracker consumes
    pub fn dirty_inputs(&self, calculate_volatile: bool) -> DirtyInputs {
        let mut inputs = DirtyInputs {
            dirty_ranges: self.dirty_ranges.clone(),
            excluded: self.excluded_cells.clone(),
            force_calculate: self.force_calculate,
            calculate_volatile,
            ..Default::default()
        };

        for (unit, names) in &self.dirty_name_map {
            for name in names.values() {
                inputs.dirty_sheet_names.push((unit.clone(), name.to_uppercase()));
            }
        }
        for (unit, names) in &self.dirty_defined_name_map {
            for name in names.keys() {
                inputs.dirty_names.push((unit.clone(), name.to_uppercase()));
            }
        }
        for (key, dirty) in flags_of(&self.dirty_unit_feature_map) {
            if dirty {
                inputs.dirty_features.insert(FeatureKey::new(key.0, key.1, key.2));
            }
        }
        for (key, dirty) in flags_of(&self.dirty_unit_other_formula_map) {
            if dirty {
                inputs
                    .dirty_other_formulas
                    .insert(OtherFormulaKey::new(key.0, key.1, key.2));
            }
        }

        inputs.dirty_sheet_names.sort();
        inputs.dirty_names.sort();
        inputs
    }

    fn collect_dirty_units(&self) -> Vec<UnitId> {
        let mut units: FastSet<UnitId> = FastSet::default();
        if self.force_calculate {
            units.extend(self.unit_data.units().map(|u| u.id().to_string()));
            units.extend(self.formula_data.keys().cloned());
        }
        units.extend(self.dirty_ranges.iter().map(|r| r.unit_id.clone()));
        units.extend(self.dirty_name_map.keys().cloned());
        units.extend(self.dirty_defined_name_map.keys().cloned());
        units.extend(self.dirty_unit_feature_map.keys().cloned());
        units.extend(self.dirty_unit_other_formula_map.keys().cloned());

        let mut units: Vec<_> = units.into_iter().collect();
        units.sort();
        units
    }
}

/// Snapshot formulas, overridden by configured ones, shared formulas expanded
fn merge_formulas(data: &UnitData, configured: FormulaDataMap) -> FormulaDataMap {
    let mut merged: FormulaDataMap = FastMap::default();

    for unit in data.units() {
        for sheet in unit.sheets() {
            let cells: CellMatrix<FormulaDataItem> =
                sheet.formula_cells().map(|(r, c, f)| (r, c, f.clone())).collect();
            if !cells.is_empty() {
                merged
                    .entry(unit.id().to_string())
                    .or_default()
                    .insert(sheet.id().to_string(), cells);
            }
        }
    }

    for (unit, sheets) in configured {
        for (sheet, cells) in sheets {
            let target = merged.entry(unit.clone()).or_default().entry(sheet).or_default();
            for (row, col, item) in cells.iter() {
                target.insert(row, col, item.clone());
            }
        }
    }

    for sheets in merged.values_mut() {
        for cells in sheets.values_mut() {
            *cells = expand_shared_formulas(cells.iter())
                .into_iter()
                .filter(|(_, _, item)| item.has_text())
                .collect();
        }
    }
    merged
}

/// Write changed defined names into the snapshot
fn apply_defined_names(data: &mut UnitData, names: &DirtyDefinedNameMap) {
    for (unit_id, names) in names {
        let Some(book) = data.unit_mut(unit_id) else {
            continue;
        };
        for (name, text) in names {
            if text.trim().is_empty() {
                continue;
            }
            if let Err(e) = book.define_name(duke_calc_core::DefinedName::new(name.clone(), text.clone())) {
                log::warn!("ignoring defined name {} in {}: {}", name, unit_id, e);
            }
        }
    }
}

fn cells_of<T>(map: &SheetMap<CellMatrix<T>>) -> impl Iterator<Item = (UnitCell, &T)> + '_ {
    map.iter().flat_map(|(unit, sheets)| {
        sheets.iter().flat_map(move |(sheet, cells)| {
            cells
                .iter()
                .map(move |(row, col, v)| (UnitCell::new(unit.clone(), sheet.clone(), row, col), v))
        })
    })
}

fn flags_of(map: &DirtyFlagMap) -> impl Iterator<Item = ((UnitId, SheetId, String), bool)> + '_ {
    map.iter().flat_map(|(unit, sheets)| {
        sheets.iter().flat_map(move |(sheet, flags)| {
            flags
                .iter()
                .map(move |(id, dirty)| ((unit.clone(), sheet.clone(), id.clone()), *dirty))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use duke_calc_core::{Workbook, Worksheet};
    use pretty_assertions::assert_eq;

    fn snapshot() -> UnitData {
        let mut sheet = Worksheet::new("s1", "Sheet1");
        sheet.set_value_at(0, 0, 1.0);
        sheet.set_formula_at(0, 1, FormulaDataItem::shared("=A1*2", "f1"));
        sheet.set_formula_at(1, 1, FormulaDataItem::occurrence("f1", 0, 1));
        let mut book = Workbook::new("u1");
        book.add_sheet(sheet).unwrap();
        std::iter::once(book).collect()
    }

    #[test]
    fn test_load_expands_snapshot_formulas() {
        let config = CurrentConfig::load(FormulaDatasetConfig {
            all_unit_data: Some(snapshot()),
            ..Default::default()
        });

        let texts: Vec<(String, String)> = config
            .formula_cells()
            .into_iter()
            .map(|(cell, item)| (cell.to_string(), item.formula.clone()))
            .collect();
        assert_eq!(
            texts,
            vec![
                ("[u1]s1!B1".to_string(), "=A1*2".to_string()),
                ("[u1]s1!B2".to_string(), "=A2*2".to_string()),
            ]
        );
        assert_eq!(config.sheet_name_map.sheet_id("u1", "sheet1"), Some("s1"));
    }

    #[test]
    fn test_configured_formulas_override() {
        let mut formulas = CellMatrix::new();
        formulas.insert(0, 1, FormulaDataItem::new("=A1+100"));
        let mut sheets = FastMap::default();
        sheets.insert("s1".to_string(), formulas);
        let mut formula_data: FormulaDataMap = FastMap::default();
        formula_data.insert("u1".to_string(), sheets);

        let config = CurrentConfig::load(FormulaDatasetConfig {
            all_unit_data: Some(snapshot()),
            formula_data,
            ..Default::default()
        });
        let cells = config.formula_cells();
        assert_eq!(cells[0].1.formula, "=A1+100");
        // the occurrence lost its origin and is dropped
        assert_eq!(cells.len(), 1);
    }

    #[test]
    fn test_dirty_inputs() {
        let mut names = FastMap::default();
        names.insert("s2".to_string(), "Totals".to_string());
        let mut dirty_name_map: DirtyNameMap = FastMap::default();
        dirty_name_map.insert("u1".to_string(), names);

        let mut excluded = CellMatrix::new();
        excluded.insert(3, 3, true);
        excluded.insert(4, 4, false);
        let mut sheets = FastMap::default();
        sheets.insert("s1".to_string(), excluded);
        let mut excluded_cell: ExcludedCellMap = FastMap::default();
        excluded_cell.insert("u1".to_string(), sheets);

        let config = CurrentConfig::load(FormulaDatasetConfig {
            dirty_ranges: vec![UnitRange::cell("u1", "s1", 0, 0)],
            dirty_name_map,
            excluded_cell: Some(excluded_cell),
            ..Default::default()
        });

        let inputs = config.dirty_inputs(true);
        assert_eq!(inputs.dirty_sheet_names, vec![("u1".to_string(), "TOTALS".to_string())]);
        assert_eq!(inputs.excluded.len(), 1);
        assert!(inputs.excluded.contains(&UnitCell::new("u1", "s1", 3, 3)));
        assert!(inputs.calculate_volatile);
        assert_eq!(config.dirty_units, vec!["u1".to_string()]);
    }

    #[test]
    fn test_dirty_defined_names_update_snapshot() {
        let mut names = FastMap::default();
        names.insert("Rate".to_string(), "=0.25".to_string());
        let mut dirty_defined_name_map: DirtyDefinedNameMap = FastMap::default();
        dirty_defined_name_map.insert("u1".to_string(), names);

        let config = CurrentConfig::load(FormulaDatasetConfig {
            all_unit_data: Some(snapshot()),
            dirty_defined_name_map,
            ..Default::default()
        });
        let book = config.unit_data.unit("u1").unwrap();
        assert_eq!(book.defined_name("RATE", None).unwrap().refers_to, "=0.25");
        assert_eq!(config.dirty_inputs(false).dirty_names, vec![("u1".to_string(), "RATE".to_string())]);
    }
}
