//! Pass-scoped runtime context
//!
//! Each calculation pass owns one [`RuntimeContext`]. It holds the cell being
//! evaluated and the [`Generation`] the pass was started under.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use duke_calc_core::{SheetId, UnitCell, UnitId};

/// Shared source of generation numbers
///
/// Issuing a new generation makes every earlier one stale. Clones share the
/// same counter.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter(Arc<AtomicU64>);

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation, superseding all earlier ones
    pub fn issue(&self) -> Generation {
        let value = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        Generation {
            value,
            counter: self.clone(),
        }
    }

    /// The latest generation
    pub fn current(&self) -> Generation {
        Generation {
            value: self.0.load(Ordering::SeqCst),
            counter: self.clone(),
        }
    }
}

/// A generation number tied to its counter
#[derive(Debug, Clone)]
pub struct Generation {
    value: u64,
    counter: GenerationCounter,
}

impl Generation {
    pub fn value(&self) -> u64 {
        self.value
    }

    /// False once a newer generation has been issued
    pub fn is_current(&self) -> bool {
        self.counter.0.load(Ordering::SeqCst) == self.value
    }
}

impl Default for Generation {
    fn default() -> Self {
        GenerationCounter::new().current()
    }
}

/// Where evaluation currently is
#[derive(Debug, Clone, Default)]
pub struct RuntimeContext {
    pub current_row: u32,
    pub current_col: u16,
    pub current_sheet_id: SheetId,
    pub current_unit_id: UnitId,
    /// Bounds of the current sheet
    pub row_count: u32,
    pub column_count: u16,
    pub generation: Generation,
}

impl RuntimeContext {
    pub fn new<U: Into<UnitId>, S: Into<SheetId>>(unit_id: U, sheet_id: S) -> Self {
        Self {
            current_unit_id: unit_id.into(),
            current_sheet_id: sheet_id.into(),
            row_count: duke_calc_core::MAX_ROWS,
            column_count: duke_calc_core::MAX_COLS,
            ..Default::default()
        }
    }

    pub fn with_generation(mut self, generation: Generation) -> Self {
        self.generation = generation;
        self
    }

    /// Move to another cell
    pub fn set_current<U: Into<UnitId>, S: Into<SheetId>>(
        &mut self,
        row: u32,
        col: u16,
        row_count: u32,
        column_count: u16,
        sheet_id: S,
        unit_id: U,
    ) {
        self.current_row = row;
        self.current_col = col;
        self.row_count = row_count;
        self.column_count = column_count;
        self.current_sheet_id = sheet_id.into();
        self.current_unit_id = unit_id.into();
    }

    pub fn current_cell(&self) -> UnitCell {
        UnitCell::new(
            self.current_unit_id.clone(),
            self.current_sheet_id.clone(),
            self.current_row,
            self.current_col,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_supersede() {
        let counter = GenerationCounter::new();
        let first = counter.issue();
        assert!(first.is_current());

        let second = counter.issue();
        assert!(!first.is_current());
        assert!(second.is_current());
        assert_eq!(counter.current().value(), second.value());
    }

    #[test]
    fn test_set_current() {
        let mut ctx = RuntimeContext::new("u1", "s1");
        ctx.set_current(4, 2, 100, 10, "s2", "u2");
        assert_eq!(ctx.current_cell(), UnitCell::new("u2", "s2", 4, 2));
        assert_eq!((ctx.row_count, ctx.column_count), (100, 10));
    }
}
