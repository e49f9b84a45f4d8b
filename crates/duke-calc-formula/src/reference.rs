//! Reference text and name binding

use duke_calc_core::{CellAddress, CellRange, SheetId, UnitId, UnitSheetNameMap, MAX_COLS, MAX_ROWS};

/// Binds sheet and workbook names to ids while parsing
pub trait ReferenceResolver {
    /// Workbook display name (`[Book]`) to unit id
    fn unit_id(&self, workbook_name: &str) -> Option<UnitId>;

    /// Sheet name within a unit to sheet id
    fn sheet_id(&self, unit_id: &str, sheet_name: &str) -> Option<SheetId>;
}

impl ReferenceResolver for UnitSheetNameMap {
    fn unit_id(&self, workbook_name: &str) -> Option<UnitId> {
        UnitSheetNameMap::unit_id(self, workbook_name).map(str::to_string)
    }

    fn sheet_id(&self, unit_id: &str, sheet_name: &str) -> Option<SheetId> {
        UnitSheetNameMap::sheet_id(self, unit_id, sheet_name).map(str::to_string)
    }
}

/// Resolver that knows no names; every qualified reference is `#REF!`
#[derive(Debug, Clone, Copy, Default)]
pub struct NoResolver;

impl ReferenceResolver for NoResolver {
    fn unit_id(&self, _workbook_name: &str) -> Option<UnitId> {
        None
    }

    fn sheet_id(&self, _unit_id: &str, _sheet_name: &str) -> Option<SheetId> {
        None
    }
}

/// Shape of an area as written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaKind {
    /// `A1` or `A1:B2`
    Cells,
    /// `A:C`
    Columns,
    /// `1:3`
    Rows,
}

/// Parse `A1`, `$A$1:B2`, `A:C` or `1:3` into a normalized range
pub fn parse_area(text: &str) -> Option<CellRange> {
    parse_area_kind(text).map(|(range, _)| range)
}

/// Like [`parse_area`], also reporting which form was written
pub fn parse_area_kind(text: &str) -> Option<(CellRange, AreaKind)> {
    let text = text.trim();
    match text.split_once(':') {
        None => CellAddress::parse(text)
            .ok()
            .map(|a| (CellRange::single(a), AreaKind::Cells)),
        Some((a, b)) => {
            if let (Ok(a), Ok(b)) = (CellAddress::parse(a), CellAddress::parse(b)) {
                return Some((CellRange::new(a, b), AreaKind::Cells));
            }
            if let (Some((a, a_abs)), Some((b, b_abs))) = (column_part(a), column_part(b)) {
                let start = CellAddress::with_absolute(0, a, true, a_abs);
                let end = CellAddress::with_absolute(MAX_ROWS - 1, b, true, b_abs);
                return Some((CellRange::new(start, end), AreaKind::Columns));
            }
            if let (Some((a, a_abs)), Some((b, b_abs))) = (row_part(a), row_part(b)) {
                let start = CellAddress::with_absolute(a, 0, a_abs, true);
                let end = CellAddress::with_absolute(b, MAX_COLS - 1, b_abs, true);
                return Some((CellRange::new(start, end), AreaKind::Rows));
            }
            None
        }
    }
}

fn column_part(s: &str) -> Option<(u16, bool)> {
    let (abs, letters) = match s.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    if letters.is_empty() || !letters.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    CellAddress::letters_to_column(letters).ok().map(|c| (c, abs))
}

fn row_part(s: &str) -> Option<(u32, bool)> {
    let (abs, digits) = match s.strip_prefix('$') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    CellAddress::parse_row_number(digits).map(|r| (r, abs))
}

/// Render a range in the form it was written
pub fn format_area(range: &CellRange, kind: AreaKind) -> String {
    let dollar = |abs: bool| if abs { "$" } else { "" };
    match kind {
        AreaKind::Cells => range.to_a1_string(),
        AreaKind::Columns => format!(
            "{}{}:{}{}",
            dollar(range.start.col_absolute),
            CellAddress::column_to_letters(range.start.col),
            dollar(range.end.col_absolute),
            CellAddress::column_to_letters(range.end.col)
        ),
        AreaKind::Rows => format!(
            "{}{}:{}{}",
            dollar(range.start.row_absolute),
            range.start.row + 1,
            dollar(range.end.row_absolute),
            range.end.row + 1
        ),
    }
}
