//! Sparse row-major matrix
//!
//! Used for everything keyed by cell position: cell contents, formula maps,
//! number formats, spilled array values, excluded-cell sets.
//!
//! Structure: `BTreeMap<row, BTreeMap<col, T>>`, so iteration is always in
//! row-then-column order and serializes to `{ "row": { "col": value } }`.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct CellMatrix<T> {
    rows: BTreeMap<u32, BTreeMap<u16, T>>,
}

impl<T> Default for CellMatrix<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl<T> CellMatrix<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, row: u32, col: u16) -> Option<&T> {
        self.rows.get(&row)?.get(&col)
    }

    pub fn get_mut(&mut self, row: u32, col: u16) -> Option<&mut T> {
        self.rows.get_mut(&row)?.get_mut(&col)
    }

    /// Insert a value, returning the previous one
    pub fn insert(&mut self, row: u32, col: u16, value: T) -> Option<T> {
        self.rows.entry(row).or_default().insert(col, value)
    }

    pub fn remove(&mut self, row: u32, col: u16) -> Option<T> {
        let cols = self.rows.get_mut(&row)?;
        let removed = cols.remove(&col);
        if cols.is_empty() {
            self.rows.remove(&row);
        }
        removed
    }

    pub fn contains(&self, row: u32, col: u16) -> bool {
        self.get(row, col).is_some()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Entries in row-major order
    pub fn iter(&self) -> impl Iterator<Item = (u32, u16, &T)> + '_ {
        self.rows
            .iter()
            .flat_map(|(&row, cols)| cols.iter().map(move |(&col, v)| (row, col, v)))
    }

    /// Entries whose position lies inside the given bounds (inclusive)
    pub fn iter_within(
        &self,
        start_row: u32,
        start_col: u16,
        end_row: u32,
        end_col: u16,
    ) -> impl Iterator<Item = (u32, u16, &T)> + '_ {
        self.rows
            .range(start_row..=end_row)
            .flat_map(move |(&row, cols)| {
                cols.range(start_col..=end_col)
                    .map(move |(&col, v)| (row, col, v))
            })
    }

    /// Highest (row, col) with an entry, if any
    pub fn extent(&self) -> Option<(u32, u16)> {
        let last_row = *self.rows.keys().next_back()?;
        let last_col = self
            .rows
            .values()
            .filter_map(|cols| cols.keys().next_back().copied())
            .max()?;
        Some((last_row, last_col))
    }
}

impl<T> FromIterator<(u32, u16, T)> for CellMatrix<T> {
    fn from_iter<I: IntoIterator<Item = (u32, u16, T)>>(iter: I) -> Self {
        let mut matrix = CellMatrix::new();
        for (row, col, value) in iter {
            matrix.insert(row, col, value);
        }
        matrix
    }
}
