//! The data snapshot read by formula evaluation
//!
//! A [`UnitData`] holds every loaded workbook keyed by unit id. A
//! recalculation pass only ever reads it; results are written back
//! afterwards, once the pass is known to be current.

use std::collections::HashMap;

use crate::cell::{CellData, CellValue};
use crate::range::{SheetId, UnitId};
use crate::workbook::Workbook;
use crate::worksheet::Worksheet;

type FastMap<K, V> = HashMap<K, V, ahash::RandomState>;

/// All loaded workbooks
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct UnitData {
    units: FastMap<UnitId, Workbook>,
}

impl UnitData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a workbook
    pub fn insert(&mut self, workbook: Workbook) -> Option<Workbook> {
        self.units.insert(workbook.id().to_string(), workbook)
    }

    pub fn unit(&self, unit_id: &str) -> Option<&Workbook> {
        self.units.get(unit_id)
    }

    pub fn unit_mut(&mut self, unit_id: &str) -> Option<&mut Workbook> {
        self.units.get_mut(unit_id)
    }

    pub fn units(&self) -> impl Iterator<Item = &Workbook> + '_ {
        self.units.values()
    }

    pub fn sheet(&self, unit_id: &str, sheet_id: &str) -> Option<&Worksheet> {
        self.unit(unit_id)?.sheet(sheet_id)
    }

    pub fn sheet_mut(&mut self, unit_id: &str, sheet_id: &str) -> Option<&mut Worksheet> {
        self.unit_mut(unit_id)?.sheet_mut(sheet_id)
    }

    pub fn cell(&self, unit_id: &str, sheet_id: &str, row: u32, col: u16) -> Option<&CellData> {
        self.sheet(unit_id, sheet_id)?.cell_at(row, col)
    }

    /// Stored value of a cell; `None` when the unit or sheet does not exist
    pub fn value(&self, unit_id: &str, sheet_id: &str, row: u32, col: u16) -> Option<CellValue> {
        self.sheet(unit_id, sheet_id).map(|s| s.value_at(row, col))
    }

    /// Name -> id tables for every loaded unit
    pub fn sheet_name_map(&self) -> UnitSheetNameMap {
        let mut map = UnitSheetNameMap::default();
        for unit in self.units.values() {
            map.insert_unit_name(unit.name(), unit.id());
            for sheet in unit.sheets() {
                map.insert(unit.id(), sheet.name(), sheet.id());
            }
        }
        map
    }
}

impl FromIterator<Workbook> for UnitData {
    fn from_iter<I: IntoIterator<Item = Workbook>>(iter: I) -> Self {
        let mut data = UnitData::new();
        for wb in iter {
            data.insert(wb);
        }
        data
    }
}

/// Sheet-name and unit-name lookup tables used to bind qualified references
///
/// `sheets[unit_id][sheet_name] = sheet_id`. Lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnitSheetNameMap {
    #[cfg_attr(feature = "serde", serde(default))]
    sheets: FastMap<UnitId, FastMap<String, SheetId>>,
    #[cfg_attr(feature = "serde", serde(default))]
    units: FastMap<String, UnitId>,
}

impl UnitSheetNameMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<U: Into<UnitId>, N: AsRef<str>, S: Into<SheetId>>(
        &mut self,
        unit_id: U,
        sheet_name: N,
        sheet_id: S,
    ) {
        self.sheets
            .entry(unit_id.into())
            .or_default()
            .insert(sheet_name.as_ref().to_uppercase(), sheet_id.into());
    }

    /// Register a workbook display name for `[Book]` qualifiers
    pub fn insert_unit_name<N: AsRef<str>, U: Into<UnitId>>(&mut self, name: N, unit_id: U) {
        self.units.insert(name.as_ref().to_uppercase(), unit_id.into());
    }

    /// Forget a sheet name, e.g. after a rename or removal
    pub fn remove(&mut self, unit_id: &str, sheet_name: &str) -> Option<SheetId> {
        self.sheets
            .get_mut(unit_id)?
            .remove(&sheet_name.to_uppercase())
    }

    pub fn sheet_id(&self, unit_id: &str, sheet_name: &str) -> Option<&str> {
        self.sheets
            .get(unit_id)?
            .get(&sheet_name.to_uppercase())
            .map(String::as_str)
    }

    /// Resolve a workbook name, falling back to treating it as an id
    pub fn unit_id<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        self.units
            .get(&name.to_uppercase())
            .map(String::as_str)
            .or_else(|| self.sheets.contains_key(name).then_some(name))
    }

    /// Merge another map into this one, overwriting duplicates
    pub fn extend(&mut self, other: &UnitSheetNameMap) {
        for (unit, sheets) in &other.sheets {
            let entry = self.sheets.entry(unit.clone()).or_default();
            for (name, id) in sheets {
                entry.insert(name.clone(), id.clone());
            }
        }
        for (name, id) in &other.units {
            self.units.insert(name.clone(), id.clone());
        }
    }
}
