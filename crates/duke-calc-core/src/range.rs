//! Ranges bound to a unit and sheet

use crate::cell::{CellAddress, CellRange};
use std::fmt;

/// Workbook identifier
pub type UnitId = String;

/// Sheet identifier (stable across renames)
pub type SheetId = String;

/// A normalized cell range inside one sheet of one unit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnitRange {
    pub unit_id: UnitId,
    pub sheet_id: SheetId,
    pub range: CellRange,
}

impl UnitRange {
    pub fn new<U: Into<UnitId>, S: Into<SheetId>>(unit_id: U, sheet_id: S, range: CellRange) -> Self {
        Self {
            unit_id: unit_id.into(),
            sheet_id: sheet_id.into(),
            range,
        }
    }

    /// A one-cell range
    pub fn cell<U: Into<UnitId>, S: Into<SheetId>>(unit_id: U, sheet_id: S, row: u32, col: u16) -> Self {
        Self::new(unit_id, sheet_id, CellRange::from_indices(row, col, row, col))
    }

    /// Same unit and sheet
    pub fn same_sheet(&self, other: &UnitRange) -> bool {
        self.unit_id == other.unit_id && self.sheet_id == other.sheet_id
    }

    /// Same sheet and overlapping cells
    pub fn intersects(&self, other: &UnitRange) -> bool {
        self.same_sheet(other) && self.range.overlaps(&other.range)
    }

    pub fn contains(&self, unit_id: &str, sheet_id: &str, row: u32, col: u16) -> bool {
        self.unit_id == unit_id && self.sheet_id == sheet_id && self.range.contains(row, col)
    }
}

impl fmt::Display for UnitRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]{}!{}", self.unit_id, self.sheet_id, self.range)
    }
}

/// One cell position inside one sheet of one unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnitCell {
    pub unit_id: UnitId,
    pub sheet_id: SheetId,
    pub row: u32,
    pub col: u16,
}

impl UnitCell {
    pub fn new<U: Into<UnitId>, S: Into<SheetId>>(unit_id: U, sheet_id: S, row: u32, col: u16) -> Self {
        Self {
            unit_id: unit_id.into(),
            sheet_id: sheet_id.into(),
            row,
            col,
        }
    }

    /// The one-cell range at this position
    pub fn range(&self) -> UnitRange {
        UnitRange::cell(self.unit_id.clone(), self.sheet_id.clone(), self.row, self.col)
    }

    pub fn is_in(&self, range: &UnitRange) -> bool {
        range.contains(&self.unit_id, &self.sheet_id, self.row, self.col)
    }
}

impl fmt::Display for UnitCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}]{}!{}{}",
            self.unit_id,
            self.sheet_id,
            CellAddress::column_to_letters(self.col),
            self.row + 1
        )
    }
}
