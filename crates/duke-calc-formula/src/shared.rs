//! Shared formula expansion
//!
//! Cells that share a formula store the text once (the origin) and an offset
//! everywhere else. Before evaluation every occurrence gets its own text,
//! with relative references moved by its offset.

use duke_calc_core::{CellAddress, CellRange, FormulaDataItem, MAX_COLS, MAX_ROWS};

use crate::lexer::{Lexer, TokenKind};
use crate::reference::{format_area, parse_area_kind};
use crate::FastMap;

/// Move the relative references of `text` by `row_offset` rows and
/// `col_offset` columns
///
/// Absolute parts (`$A`, `$1`) stay put. A reference pushed off the sheet
/// becomes `#REF!`.
pub fn shift_formula(text: &str, row_offset: i64, col_offset: i64) -> String {
    shift_formula_with(&Lexer::default(), text, row_offset, col_offset)
}

/// [`shift_formula`] with a specific lexer
pub fn shift_formula_with(lexer: &Lexer, text: &str, row_offset: i64, col_offset: i64) -> String {
    if row_offset == 0 && col_offset == 0 {
        return text.to_string();
    }

    let tree = lexer.tokenize(text);
    let mut out = String::with_capacity(text.len());
    let mut last = 0;

    for token in tree.tokens() {
        let reference = match &token.kind {
            TokenKind::Reference(r) => r,
            _ => continue,
        };
        let (range, kind) = match parse_area_kind(&reference.area) {
            Some(parsed) => parsed,
            None => continue,
        };

        match shift_range(&range, row_offset, col_offset) {
            Some(shifted) => {
                out.push_str(&text[last..reference.area_span.start]);
                out.push_str(&format_area(&shifted, kind));
                last = reference.area_span.end;
            }
            None => {
                out.push_str(&text[last..token.span.start]);
                out.push_str("#REF!");
                last = token.span.end;
            }
        }
    }

    out.push_str(&text[last..]);
    out
}

fn shift_range(range: &CellRange, row_offset: i64, col_offset: i64) -> Option<CellRange> {
    let start = shift_address(&range.start, row_offset, col_offset)?;
    let end = shift_address(&range.end, row_offset, col_offset)?;
    Some(CellRange::new(start, end))
}

fn shift_address(addr: &CellAddress, row_offset: i64, col_offset: i64) -> Option<CellAddress> {
    let row = if addr.row_absolute {
        addr.row as i64
    } else {
        addr.row as i64 + row_offset
    };
    let col = if addr.col_absolute {
        addr.col as i64
    } else {
        addr.col as i64 + col_offset
    };
    if row < 0 || row >= MAX_ROWS as i64 || col < 0 || col >= MAX_COLS as i64 {
        return None;
    }
    Some(CellAddress::with_absolute(
        row as u32,
        col as u16,
        addr.row_absolute,
        addr.col_absolute,
    ))
}

/// Give every formula of one sheet its own text
///
/// `cells` is in row-major order. Occurrences take the text of the first
/// cell with the same `formula_id` that has text of its own; the offset is
/// the occurrence's stored one, or its distance from that origin. An
/// occurrence whose origin is missing keeps an empty text.
pub fn expand_shared_formulas<'a, I>(cells: I) -> Vec<(u32, u16, FormulaDataItem)>
where
    I: IntoIterator<Item = (u32, u16, &'a FormulaDataItem)>,
{
    let cells: Vec<_> = cells.into_iter().collect();

    let mut origins: FastMap<&str, (u32, u16, &str)> = FastMap::default();
    for (row, col, item) in &cells {
        if let (Some(id), true) = (item.formula_id.as_deref(), item.has_text()) {
            origins.entry(id).or_insert((*row, *col, item.formula.as_str()));
        }
    }

    cells
        .iter()
        .map(|(row, col, item)| {
            if item.has_text() {
                return (*row, *col, (*item).clone());
            }
            let origin = item.formula_id.as_deref().and_then(|id| origins.get(id));
            let formula = match origin {
                Some((origin_row, origin_col, text)) => {
                    let dy = item.offset_y.unwrap_or(*row as i64 - *origin_row as i64);
                    let dx = item.offset_x.unwrap_or(*col as i64 - *origin_col as i64);
                    shift_formula(text, dy, dx)
                }
                None => {
                    log::warn!("shared formula {:?} has no origin", item.formula_id);
                    String::new()
                }
            };
            (
                *row,
                *col,
                FormulaDataItem {
                    formula,
                    ..(*item).clone()
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_shift_relative_references() {
        assert_eq!(shift_formula("=A1+B2", 1, 0), "=A2+B3");
        assert_eq!(shift_formula("=A1+B2", 0, 2), "=C1+D2");
        assert_eq!(shift_formula("=SUM(A1:A3)*2", 2, 1), "=SUM(B3:B5)*2");
    }

    #[test]
    fn test_shift_keeps_absolute_parts() {
        assert_eq!(shift_formula("=$A$1+A$1+$A1", 3, 3), "=$A$1+D$1+$A4");
        assert_eq!(shift_formula("=SUM(B:B)", 5, 1), "=SUM(C:C)");
        assert_eq!(shift_formula("=SUM(2:2)", 1, 5), "=SUM(3:3)");
    }

    #[test]
    fn test_shift_qualified_and_text() {
        assert_eq!(shift_formula("=Sheet2!A1&\"A1\"", 1, 0), "=Sheet2!A2&\"A1\"");
        assert_eq!(shift_formula("='My Sheet'!B2", 0, 1), "='My Sheet'!C2");
    }

    #[test]
    fn test_shift_off_sheet() {
        assert_eq!(shift_formula("=A1+1", -1, 0), "=#REF!+1");
        assert_eq!(shift_formula("=Sheet2!A1", 0, -1), "=#REF!");
    }

    #[test]
    fn test_expand_shared() {
        let origin = FormulaDataItem::shared("=A1*2", "f1");
        let by_offset = FormulaDataItem::occurrence("f1", 0, 1);
        let by_position = FormulaDataItem {
            formula_id: Some("f1".into()),
            ..Default::default()
        };
        let orphan = FormulaDataItem::occurrence("f9", 0, 1);
        let plain = FormulaDataItem::new("=1");

        let cells = vec![
            (0, 1, &origin),
            (1, 1, &by_offset),
            (2, 1, &by_position),
            (3, 1, &orphan),
            (4, 1, &plain),
        ];
        let expanded: Vec<(u32, u16, String)> = expand_shared_formulas(cells)
            .into_iter()
            .map(|(r, c, f)| (r, c, f.formula))
            .collect();

        assert_eq!(
            expanded,
            vec![
                (0, 1, "=A1*2".to_string()),
                (1, 1, "=A2*2".to_string()),
                (2, 1, "=A3*2".to_string()),
                (3, 1, String::new()),
                (4, 1, "=1".to_string()),
            ]
        );
    }
}
