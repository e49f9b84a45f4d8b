//! Stored cell content

use super::CellValue;

/// A stored formula
///
/// Cells that share one formula carry the same `formula_id`. Only one of them
/// (the origin) needs the text; the others hold their offset from the origin
/// and get the text with relative references shifted by that offset.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FormulaDataItem {
    /// Formula text, including the leading `=`; empty for shared occurrences
    #[cfg_attr(feature = "serde", serde(rename = "f", default))]
    pub formula: String,
    /// Column offset from the origin occurrence
    #[cfg_attr(feature = "serde", serde(rename = "x", default))]
    pub offset_x: Option<i64>,
    /// Row offset from the origin occurrence
    #[cfg_attr(feature = "serde", serde(rename = "y", default))]
    pub offset_y: Option<i64>,
    /// Shared formula id
    #[cfg_attr(feature = "serde", serde(rename = "si", default))]
    pub formula_id: Option<String>,
}

impl FormulaDataItem {
    /// A formula with its own text
    pub fn new<S: Into<String>>(formula: S) -> Self {
        Self {
            formula: formula.into(),
            ..Default::default()
        }
    }

    /// The origin occurrence of a shared formula
    pub fn shared<S: Into<String>, I: Into<String>>(formula: S, formula_id: I) -> Self {
        Self {
            formula: formula.into(),
            formula_id: Some(formula_id.into()),
            ..Default::default()
        }
    }

    /// Another occurrence of a shared formula, `offset_x` columns and `offset_y` rows
    /// away from the origin
    pub fn occurrence<I: Into<String>>(formula_id: I, offset_x: i64, offset_y: i64) -> Self {
        Self {
            formula: String::new(),
            offset_x: Some(offset_x),
            offset_y: Some(offset_y),
            formula_id: Some(formula_id.into()),
        }
    }

    /// Does this item carry formula text of its own
    pub fn has_text(&self) -> bool {
        !self.formula.trim().is_empty()
    }
}

/// Content of one cell in the data snapshot
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellData {
    /// Raw (or last calculated) value
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub value: Option<CellValue>,
    /// Formula, if this is a formula cell
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub formula: Option<FormulaDataItem>,
}

impl CellData {
    pub fn with_value<V: Into<CellValue>>(value: V) -> Self {
        Self {
            value: Some(value.into()),
            formula: None,
        }
    }

    pub fn with_formula(formula: FormulaDataItem) -> Self {
        Self {
            value: None,
            formula: Some(formula),
        }
    }

    /// Value to use when this cell is read, blank when absent
    pub fn value_or_empty(&self) -> CellValue {
        self.value.clone().unwrap_or_default()
    }

    pub fn is_formula(&self) -> bool {
        self.formula.is_some()
    }

    /// Neither a value nor a formula
    pub fn is_empty(&self) -> bool {
        self.formula.is_none() && self.value.as_ref().map_or(true, CellValue::is_empty)
    }
}
