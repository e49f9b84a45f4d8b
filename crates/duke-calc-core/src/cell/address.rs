//! Cell addresses and normalized rectangular ranges

use crate::error::{Error, Result};
use crate::{MAX_COLS, MAX_ROWS};
use std::fmt;
use std::str::FromStr;

/// A single cell position (e.g. `A1`, `$B$2`)
///
/// Rows and columns are 0-based. The `$` markers are kept so that shared
/// formulas can tell which parts of a reference move when the formula is
/// reused at another position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellAddress {
    /// Row index (0-based)
    pub row: u32,
    /// Column index (0-based, A=0)
    pub col: u16,
    /// `$` before the row number
    #[cfg_attr(feature = "serde", serde(default))]
    pub row_absolute: bool,
    /// `$` before the column letters
    #[cfg_attr(feature = "serde", serde(default))]
    pub col_absolute: bool,
}

impl CellAddress {
    /// Create a relative address
    pub fn new(row: u32, col: u16) -> Self {
        Self {
            row,
            col,
            row_absolute: false,
            col_absolute: false,
        }
    }

    /// Create an address with explicit `$` flags
    pub fn with_absolute(row: u32, col: u16, row_absolute: bool, col_absolute: bool) -> Self {
        Self {
            row,
            col,
            row_absolute,
            col_absolute,
        }
    }

    /// Parse A1 notation (`B7`, `$B$7`, `b$7`)
    ///
    /// ```
    /// use duke_calc_core::CellAddress;
    ///
    /// let addr = CellAddress::parse("$C5").unwrap();
    /// assert_eq!((addr.row, addr.col), (4, 2));
    /// assert!(addr.col_absolute && !addr.row_absolute);
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let bytes = s.as_bytes();
        let mut pos = 0;

        let col_absolute = bytes.first() == Some(&b'$');
        if col_absolute {
            pos += 1;
        }

        let letters_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
            pos += 1;
        }
        if pos == letters_start {
            return Err(Error::InvalidAddress(format!("no column letters in '{}'", s)));
        }
        let col = Self::letters_to_column(&s[letters_start..pos])?;

        let row_absolute = bytes.get(pos) == Some(&b'$');
        if row_absolute {
            pos += 1;
        }

        let row = Self::parse_row_number(&s[pos..])
            .ok_or_else(|| Error::InvalidAddress(format!("invalid row number in '{}'", s)))?;

        Ok(Self {
            row,
            col,
            row_absolute,
            col_absolute,
        })
    }

    /// Parse a 1-based row number into a 0-based index
    pub fn parse_row_number(digits: &str) -> Option<u32> {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let row: u32 = digits.parse().ok()?;
        if row == 0 || row > MAX_ROWS {
            return None;
        }
        Some(row - 1)
    }

    /// Column index to letters (0 = A, 26 = AA)
    pub fn column_to_letters(col: u16) -> String {
        let mut letters = Vec::new();
        let mut n = col as u32 + 1;
        while n > 0 {
            n -= 1;
            letters.push(b'A' + (n % 26) as u8);
            n /= 26;
        }
        letters.reverse();
        String::from_utf8(letters).unwrap_or_default()
    }

    /// Letters to column index (case-insensitive)
    pub fn letters_to_column(letters: &str) -> Result<u16> {
        if letters.is_empty() || letters.len() > 3 {
            return Err(Error::InvalidAddress(format!(
                "invalid column letters '{}'",
                letters
            )));
        }

        let mut col: u32 = 0;
        for c in letters.chars() {
            if !c.is_ascii_alphabetic() {
                return Err(Error::InvalidAddress(format!(
                    "invalid column letter '{}'",
                    c
                )));
            }
            col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        }

        let col = col - 1;
        if col >= MAX_COLS as u32 {
            return Err(Error::ColumnOutOfBounds(col, MAX_COLS - 1));
        }
        Ok(col as u16)
    }

    /// Move the relative parts of this address by a row/column delta
    ///
    /// Absolute parts stay put. Returns `None` when the result falls off the grid.
    pub fn offset(&self, row_delta: i64, col_delta: i64) -> Option<Self> {
        let row = if self.row_absolute {
            self.row as i64
        } else {
            self.row as i64 + row_delta
        };
        let col = if self.col_absolute {
            self.col as i64
        } else {
            self.col as i64 + col_delta
        };

        if row < 0 || row >= MAX_ROWS as i64 || col < 0 || col >= MAX_COLS as i64 {
            return None;
        }

        Some(Self {
            row: row as u32,
            col: col as u16,
            ..*self
        })
    }

    /// A1 rendering including `$` markers
    pub fn to_a1_string(&self) -> String {
        format!(
            "{}{}{}{}",
            if self.col_absolute { "$" } else { "" },
            Self::column_to_letters(self.col),
            if self.row_absolute { "$" } else { "" },
            self.row + 1
        )
    }

    /// Same position with the `$` markers dropped
    pub fn position(&self) -> (u32, u16) {
        (self.row, self.col)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1_string())
    }
}

impl FromStr for CellAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A rectangular block of cells
///
/// Always normalized: `start` is the top-left corner and `end` the
/// bottom-right one, whatever order the corners were given in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "RawRange"))]
pub struct CellRange {
    /// Top-left corner
    pub start: CellAddress,
    /// Bottom-right corner
    pub end: CellAddress,
}

#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct RawRange {
    start: CellAddress,
    end: CellAddress,
}

#[cfg(feature = "serde")]
impl From<RawRange> for CellRange {
    fn from(raw: RawRange) -> Self {
        CellRange::new(raw.start, raw.end)
    }
}

impl CellRange {
    /// Create a range from two corners in any order
    pub fn new(a: CellAddress, b: CellAddress) -> Self {
        let (top, bottom) = if a.row <= b.row { (a, b) } else { (b, a) };
        let (left, right) = if a.col <= b.col { (a, b) } else { (b, a) };

        Self {
            start: CellAddress::with_absolute(
                top.row,
                left.col,
                top.row_absolute,
                left.col_absolute,
            ),
            end: CellAddress::with_absolute(
                bottom.row,
                right.col,
                bottom.row_absolute,
                right.col_absolute,
            ),
        }
    }

    /// Create a range from raw indices
    pub fn from_indices(start_row: u32, start_col: u16, end_row: u32, end_col: u16) -> Self {
        Self::new(
            CellAddress::new(start_row, start_col),
            CellAddress::new(end_row, end_col),
        )
    }

    /// A one-cell range
    pub fn single(addr: CellAddress) -> Self {
        Self {
            start: addr,
            end: addr,
        }
    }

    /// Whole columns, e.g. `B:D`
    pub fn full_columns(start_col: u16, end_col: u16) -> Self {
        Self::from_indices(0, start_col, MAX_ROWS - 1, end_col)
    }

    /// Whole rows, e.g. `3:5`
    pub fn full_rows(start_row: u32, end_row: u32) -> Self {
        Self::from_indices(start_row, 0, end_row, MAX_COLS - 1)
    }

    /// Parse `A1:B10` or a single `C3`
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().split_once(':') {
            Some((a, b)) => Ok(Self::new(CellAddress::parse(a)?, CellAddress::parse(b)?)),
            None => Ok(Self::single(CellAddress::parse(s)?)),
        }
    }

    /// Does the range cover every row of its columns
    pub fn is_full_columns(&self) -> bool {
        self.start.row == 0 && self.end.row == MAX_ROWS - 1
    }

    /// Does the range cover every column of its rows
    pub fn is_full_rows(&self) -> bool {
        self.start.col == 0 && self.end.col == MAX_COLS - 1
    }

    /// Is this a single cell
    pub fn is_single(&self) -> bool {
        self.start.position() == self.end.position()
    }

    pub fn contains(&self, row: u32, col: u16) -> bool {
        row >= self.start.row && row <= self.end.row && col >= self.start.col && col <= self.end.col
    }

    pub fn row_count(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    pub fn col_count(&self) -> u16 {
        self.end.col - self.start.col + 1
    }

    pub fn cell_count(&self) -> u64 {
        self.row_count() as u64 * self.col_count() as u64
    }

    pub fn overlaps(&self, other: &CellRange) -> bool {
        self.start.row <= other.end.row
            && other.start.row <= self.end.row
            && self.start.col <= other.end.col
            && other.start.col <= self.end.col
    }

    /// Overlapping block of two ranges
    pub fn intersect(&self, other: &CellRange) -> Option<CellRange> {
        self.overlaps(other).then(|| {
            CellRange::from_indices(
                self.start.row.max(other.start.row),
                self.start.col.max(other.start.col),
                self.end.row.min(other.end.row),
                self.end.col.min(other.end.col),
            )
        })
    }

    /// Smallest range covering both
    pub fn bounding(&self, other: &CellRange) -> CellRange {
        CellRange::from_indices(
            self.start.row.min(other.start.row),
            self.start.col.min(other.start.col),
            self.end.row.max(other.end.row),
            self.end.col.max(other.end.col),
        )
    }

    /// Trim whole-row/whole-column spans to a sheet's used bounds
    ///
    /// Ordinary ranges are returned unchanged so their shape is preserved.
    pub fn clamp_spans(&self, row_count: u32, col_count: u16) -> CellRange {
        let mut clamped = *self;
        if self.is_full_columns() {
            clamped.end.row = row_count.max(1) - 1;
        }
        if self.is_full_rows() {
            clamped.end.col = col_count.max(1) - 1;
        }
        clamped
    }

    /// Every position in the range, row by row
    pub fn cells(&self) -> impl Iterator<Item = (u32, u16)> + '_ {
        (self.start.row..=self.end.row)
            .flat_map(move |row| (self.start.col..=self.end.col).map(move |col| (row, col)))
    }

    /// A1 rendering (`A1:B2`, or `C3` for a single cell)
    pub fn to_a1_string(&self) -> String {
        if self.start == self.end {
            self.start.to_a1_string()
        } else {
            format!("{}:{}", self.start.to_a1_string(), self.end.to_a1_string())
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1_string())
    }
}

impl FromStr for CellRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_column_letters_round_trip() {
        assert_eq!(CellAddress::column_to_letters(0), "A");
        assert_eq!(CellAddress::column_to_letters(25), "Z");
        assert_eq!(CellAddress::column_to_letters(26), "AA");
        assert_eq!(CellAddress::column_to_letters(16383), "XFD");
        assert_eq!(CellAddress::letters_to_column("xfd").unwrap(), 16383);
        assert_eq!(CellAddress::letters_to_column("AB").unwrap(), 27);
        assert!(CellAddress::letters_to_column("XFE").is_err());
    }

    #[test]
    fn test_parse_address() {
        let addr = CellAddress::parse("B2").unwrap();
        assert_eq!(addr.position(), (1, 1));

        let addr = CellAddress::parse("$A$1").unwrap();
        assert!(addr.row_absolute && addr.col_absolute);

        assert!(CellAddress::parse("A0").is_err());
        assert!(CellAddress::parse("A").is_err());
        assert!(CellAddress::parse("11").is_err());
        assert!(CellAddress::parse("A1048577").is_err());
    }

    #[test]
    fn test_offset_keeps_absolute_parts() {
        let addr = CellAddress::parse("$A2").unwrap();
        let moved = addr.offset(3, 4).unwrap();
        assert_eq!(moved.to_a1_string(), "$A5");

        assert!(CellAddress::parse("A1").unwrap().offset(-1, 0).is_none());
    }

    #[test]
    fn test_range_is_normalized() {
        let range = CellRange::new(CellAddress::new(5, 3), CellAddress::new(1, 0));
        assert_eq!(range.start.position(), (1, 0));
        assert_eq!(range.end.position(), (5, 3));
        assert_eq!(range.to_a1_string(), "A2:D6");
    }

    #[test]
    fn test_range_geometry() {
        let a = CellRange::parse("B2:D4").unwrap();
        let b = CellRange::parse("C3:F9").unwrap();

        assert_eq!((a.row_count(), a.col_count()), (3, 3));
        assert!(a.contains(2, 2));
        assert!(!a.contains(0, 0));
        assert_eq!(a.intersect(&b).unwrap().to_a1_string(), "C3:D4");
        assert_eq!(a.bounding(&b).to_a1_string(), "B2:F9");
        assert!(a.intersect(&CellRange::parse("Z1").unwrap()).is_none());
    }

    #[test]
    fn test_full_column_clamp() {
        let cols = CellRange::full_columns(0, 1);
        assert!(cols.is_full_columns());
        assert_eq!(cols.clamp_spans(10, 5).to_a1_string(), "A1:B10");

        let plain = CellRange::parse("A1:A20").unwrap();
        assert_eq!(plain.clamp_spans(10, 5), plain);
    }

    #[test]
    fn test_cells_iteration_order() {
        let cells: Vec<_> = CellRange::parse("A1:B2").unwrap().cells().collect();
        assert_eq!(cells, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }
}
