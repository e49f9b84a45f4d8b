//! Worksheet type

use std::collections::BTreeMap;

use crate::cell::{CellAddress, CellData, CellMatrix, CellValue, FormulaDataItem};
use crate::error::Result;
use crate::range::SheetId;
use crate::{MAX_COLS, MAX_ROWS};

/// Default bounds of a freshly created sheet
pub const DEFAULT_ROW_COUNT: u32 = 1000;
pub const DEFAULT_COLUMN_COUNT: u16 = 20;

/// Row metadata
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RowInfo {
    /// Custom height (None = default)
    pub height: Option<f64>,
    pub hidden: bool,
}

/// Column metadata
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColumnInfo {
    /// Custom width (None = default)
    pub width: Option<f64>,
    pub hidden: bool,
}

/// One sheet of a workbook
///
/// Cells are stored sparsely. `row_count`/`column_count` are the sheet's
/// logical bounds; they grow when a cell is written outside them.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Worksheet {
    id: SheetId,
    name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    cells: CellMatrix<CellData>,
    row_count: u32,
    column_count: u16,
    #[cfg_attr(feature = "serde", serde(default))]
    row_data: BTreeMap<u32, RowInfo>,
    #[cfg_attr(feature = "serde", serde(default))]
    column_data: BTreeMap<u16, ColumnInfo>,
}

impl Worksheet {
    /// Create an empty sheet with default bounds
    pub fn new<I: Into<SheetId>, S: Into<String>>(id: I, name: S) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            cells: CellMatrix::new(),
            row_count: DEFAULT_ROW_COUNT,
            column_count: DEFAULT_COLUMN_COUNT,
            row_data: BTreeMap::new(),
            column_data: BTreeMap::new(),
        }
    }

    /// Set the logical bounds
    pub fn with_size(mut self, row_count: u32, column_count: u16) -> Self {
        self.row_count = row_count.clamp(1, MAX_ROWS);
        self.column_count = column_count.clamp(1, MAX_COLS);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name<S: Into<String>>(&mut self, name: S) {
        self.name = name.into();
    }

    pub fn row_count(&self) -> u32 {
        self.row_count
    }

    pub fn column_count(&self) -> u16 {
        self.column_count
    }

    // === Cell Access ===

    pub fn cell_at(&self, row: u32, col: u16) -> Option<&CellData> {
        self.cells.get(row, col)
    }

    pub fn cell_at_mut(&mut self, row: u32, col: u16) -> Option<&mut CellData> {
        self.cells.get_mut(row, col)
    }

    /// Stored value of a cell, blank when absent
    pub fn value_at(&self, row: u32, col: u16) -> CellValue {
        self.cells
            .get(row, col)
            .map(CellData::value_or_empty)
            .unwrap_or_default()
    }

    /// All stored cells in row-major order
    pub fn cells(&self) -> &CellMatrix<CellData> {
        &self.cells
    }

    /// Formula cells in row-major order
    pub fn formula_cells(&self) -> impl Iterator<Item = (u32, u16, &FormulaDataItem)> + '_ {
        self.cells
            .iter()
            .filter_map(|(row, col, data)| data.formula.as_ref().map(|f| (row, col, f)))
    }

    /// Replace a cell's content
    pub fn set_cell_at(&mut self, row: u32, col: u16, data: CellData) {
        self.grow_to(row, col);
        if data.is_empty() {
            self.cells.remove(row, col);
        } else {
            self.cells.insert(row, col, data);
        }
    }

    /// Set a plain value, dropping any formula
    pub fn set_value_at<V: Into<CellValue>>(&mut self, row: u32, col: u16, value: V) {
        self.set_cell_at(row, col, CellData::with_value(value));
    }

    /// Set a plain value by A1 address
    pub fn set_value<V: Into<CellValue>>(&mut self, address: &str, value: V) -> Result<()> {
        let addr = CellAddress::parse(address)?;
        self.set_value_at(addr.row, addr.col, value);
        Ok(())
    }

    /// Set a formula, keeping any previously calculated value
    pub fn set_formula_at(&mut self, row: u32, col: u16, formula: FormulaDataItem) {
        self.grow_to(row, col);
        let value = self.cells.get(row, col).and_then(|d| d.value.clone());
        self.cells.insert(
            row,
            col,
            CellData {
                value,
                formula: Some(formula),
            },
        );
    }

    /// Set formula text by A1 address
    pub fn set_formula(&mut self, address: &str, formula: &str) -> Result<()> {
        let addr = CellAddress::parse(address)?;
        self.set_formula_at(addr.row, addr.col, FormulaDataItem::new(formula));
        Ok(())
    }

    /// Store a calculated result without touching the formula
    pub fn set_calculated_value(&mut self, row: u32, col: u16, value: CellValue) {
        self.grow_to(row, col);
        match self.cells.get_mut(row, col) {
            Some(data) => data.value = Some(value),
            None => {
                self.cells.insert(row, col, CellData::with_value(value));
            }
        }
    }

    /// Drop a cell's content
    pub fn clear_cell(&mut self, row: u32, col: u16) -> Option<CellData> {
        self.cells.remove(row, col)
    }

    fn grow_to(&mut self, row: u32, col: u16) {
        self.row_count = self.row_count.max(row.saturating_add(1));
        self.column_count = self.column_count.max(col.saturating_add(1));
    }

    // === Row / column metadata ===

    pub fn row_info(&self, row: u32) -> Option<&RowInfo> {
        self.row_data.get(&row)
    }

    pub fn column_info(&self, col: u16) -> Option<&ColumnInfo> {
        self.column_data.get(&col)
    }

    pub fn set_row_info(&mut self, row: u32, info: RowInfo) {
        self.row_data.insert(row, info);
    }

    pub fn set_column_info(&mut self, col: u16, info: ColumnInfo) {
        self.column_data.insert(col, info);
    }

    pub fn is_row_hidden(&self, row: u32) -> bool {
        self.row_data.get(&row).map_or(false, |r| r.hidden)
    }

    pub fn is_column_hidden(&self, col: u16) -> bool {
        self.column_data.get(&col).map_or(false, |c| c.hidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_values_and_formulas() {
        let mut sheet = Worksheet::new("s1", "Sheet1").with_size(10, 5);
        sheet.set_value("A1", 10.0).unwrap();
        sheet.set_formula("B1", "=A1*2").unwrap();

        assert_eq!(sheet.value_at(0, 0), CellValue::Number(10.0));
        assert_eq!(sheet.value_at(0, 1), CellValue::Empty);
        assert_eq!(sheet.value_at(9, 4), CellValue::Empty);

        let formulas: Vec<_> = sheet.formula_cells().map(|(r, c, f)| (r, c, f.formula.clone())).collect();
        assert_eq!(formulas, vec![(0, 1, "=A1*2".to_string())]);
    }

    #[test]
    fn test_calculated_value_keeps_formula() {
        let mut sheet = Worksheet::new("s1", "Sheet1");
        sheet.set_formula("C3", "=1+1").unwrap();
        sheet.set_calculated_value(2, 2, CellValue::Number(2.0));

        let cell = sheet.cell_at(2, 2).unwrap();
        assert!(cell.is_formula());
        assert_eq!(cell.value, Some(CellValue::Number(2.0)));
    }

    #[test]
    fn test_writes_grow_bounds() {
        let mut sheet = Worksheet::new("s1", "Sheet1").with_size(2, 2);
        sheet.set_value_at(7, 9, 1.0);
        assert_eq!(sheet.row_count(), 8);
        assert_eq!(sheet.column_count(), 10);
    }

    #[test]
    fn test_row_and_column_metadata() {
        let mut sheet = Worksheet::new("s1", "Sheet1");
        sheet.set_row_info(
            3,
            RowInfo {
                height: Some(30.0),
                hidden: true,
            },
        );
        sheet.set_column_info(1, ColumnInfo::default());

        assert!(sheet.is_row_hidden(3));
        assert!(!sheet.is_column_hidden(1));
        assert_eq!(sheet.row_info(3).and_then(|r| r.height), Some(30.0));
    }
}
