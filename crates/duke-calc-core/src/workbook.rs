//! Workbook (unit) type and defined names

use crate::error::{Error, Result};
use crate::range::{SheetId, UnitId};
use crate::worksheet::Worksheet;

/// A defined name
///
/// `refers_to` is formula text: a reference (`=Sheet1!$A$1:$B$4`), a constant
/// (`=0.07`) or any expression. The leading `=` is optional.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DefinedName {
    pub name: String,
    pub refers_to: String,
    /// Sheet the name is local to; `None` for workbook scope
    #[cfg_attr(feature = "serde", serde(default))]
    pub scope: Option<SheetId>,
}

impl DefinedName {
    pub fn new<N: Into<String>, R: Into<String>>(name: N, refers_to: R) -> Self {
        Self {
            name: name.into(),
            refers_to: refers_to.into(),
            scope: None,
        }
    }

    /// Restrict the name to one sheet
    pub fn scoped_to<S: Into<SheetId>>(mut self, sheet_id: S) -> Self {
        self.scope = Some(sheet_id.into());
        self
    }

    /// Formula text with a guaranteed leading `=`
    pub fn formula_text(&self) -> String {
        let text = self.refers_to.trim();
        if text.starts_with('=') {
            text.to_string()
        } else {
            format!("={}", text)
        }
    }
}

/// A workbook: an ordered set of sheets plus defined names
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Workbook {
    id: UnitId,
    /// Display name, used by `[Book]Sheet!A1` qualifiers
    #[cfg_attr(feature = "serde", serde(default))]
    name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    sheets: Vec<Worksheet>,
    #[cfg_attr(feature = "serde", serde(default))]
    defined_names: Vec<DefinedName>,
}

impl Workbook {
    /// Create an empty workbook whose display name equals its id
    pub fn new<I: Into<UnitId>>(id: I) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            sheets: Vec::new(),
            defined_names: Vec::new(),
        }
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // === Sheets ===

    /// Append a sheet; names must be unique (case-insensitive)
    pub fn add_sheet(&mut self, sheet: Worksheet) -> Result<&mut Worksheet> {
        if self.sheet_by_name(sheet.name()).is_some() {
            return Err(Error::DuplicateSheetName(sheet.name().to_string()));
        }
        if self.sheet(sheet.id()).is_some() {
            return Err(Error::other(format!("duplicate sheet id: {}", sheet.id())));
        }
        self.sheets.push(sheet);
        let last = self.sheets.len() - 1;
        Ok(&mut self.sheets[last])
    }

    pub fn sheet(&self, sheet_id: &str) -> Option<&Worksheet> {
        self.sheets.iter().find(|s| s.id() == sheet_id)
    }

    pub fn sheet_mut(&mut self, sheet_id: &str) -> Option<&mut Worksheet> {
        self.sheets.iter_mut().find(|s| s.id() == sheet_id)
    }

    /// Case-insensitive lookup by display name
    pub fn sheet_by_name(&self, name: &str) -> Option<&Worksheet> {
        self.sheets.iter().find(|s| s.name().eq_ignore_ascii_case(name))
    }

    pub fn sheets(&self) -> impl Iterator<Item = &Worksheet> + '_ {
        self.sheets.iter()
    }

    pub fn sheets_mut(&mut self) -> impl Iterator<Item = &mut Worksheet> + '_ {
        self.sheets.iter_mut()
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    // === Defined names ===

    /// Add or replace a defined name (same name and scope)
    pub fn define_name(&mut self, name: DefinedName) -> Result<()> {
        if !is_valid_name(&name.name) {
            return Err(Error::InvalidName(name.name));
        }
        self.defined_names
            .retain(|n| !(n.name.eq_ignore_ascii_case(&name.name) && n.scope == name.scope));
        self.defined_names.push(name);
        Ok(())
    }

    /// Resolve a name as seen from `sheet_id`: sheet scope first, then workbook scope
    pub fn defined_name(&self, name: &str, sheet_id: Option<&str>) -> Option<&DefinedName> {
        let matches = |n: &&DefinedName| n.name.eq_ignore_ascii_case(name);
        sheet_id
            .and_then(|sid| {
                self.defined_names
                    .iter()
                    .filter(matches)
                    .find(|n| n.scope.as_deref() == Some(sid))
            })
            .or_else(|| {
                self.defined_names
                    .iter()
                    .filter(matches)
                    .find(|n| n.scope.is_none())
            })
    }

    pub fn defined_names(&self) -> &[DefinedName] {
        &self.defined_names
    }
}

/// Names start with a letter, `_` or `\` and continue with letters, digits, `_` or `.`
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '\\' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workbook() -> Workbook {
        let mut wb = Workbook::new("book1");
        wb.add_sheet(Worksheet::new("s1", "Sheet1")).unwrap();
        wb.add_sheet(Worksheet::new("s2", "Data Sheet")).unwrap();
        wb
    }

    #[test]
    fn test_sheet_lookup() {
        let wb = workbook();
        assert_eq!(wb.sheet_count(), 2);
        assert_eq!(wb.sheet_by_name("data sheet").map(|s| s.id()), Some("s2"));
        assert!(wb.sheet("s3").is_none());
    }

    #[test]
    fn test_duplicate_sheet_name() {
        let mut wb = workbook();
        assert!(matches!(
            wb.add_sheet(Worksheet::new("s9", "SHEET1")),
            Err(Error::DuplicateSheetName(_))
        ));
    }

    #[test]
    fn test_defined_name_scoping() {
        let mut wb = workbook();
        wb.define_name(DefinedName::new("Rate", "=0.1")).unwrap();
        wb.define_name(DefinedName::new("Rate", "0.2").scoped_to("s2"))
            .unwrap();

        assert_eq!(wb.defined_name("rate", Some("s1")).unwrap().refers_to, "=0.1");
        assert_eq!(wb.defined_name("RATE", Some("s2")).unwrap().formula_text(), "=0.2");
        assert_eq!(wb.defined_name("Rate", None).unwrap().refers_to, "=0.1");
        assert!(wb.defined_name("Other", None).is_none());
        assert!(wb.define_name(DefinedName::new("1bad", "=1")).is_err());
    }
}
