//! Cell contents and lazily computed values.
//!
//! A cell is one of {Empty, Text, Formula} plus a value cache. The cache is
//! interior-mutable: computing or resetting a value works through a shared
//! reference, since the value is an extension of reading the cell, not a
//! change to it. Single-threaded (`RefCell`, not a lock).

use std::cell::RefCell;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::formula::{Formula, FormulaError, FormulaParseError};
use crate::position::Position;
use crate::sheet::Sheet;

/// Introduces a formula when it is the first character of cell input.
pub const FORMULA_SIGN: char = '=';
/// In text cells, hides itself: the displayed value starts after it.
pub const ESCAPE_SIGN: char = '\'';

/// What a cell holds.
#[derive(Debug, Clone, PartialEq)]
pub enum CellContent {
    Empty,
    /// Stored verbatim, including a leading escape character if present.
    Text(String),
    Formula(Formula),
}

/// What a cell computes to.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Error(FormulaError),
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            CellValue::Error(e) => write!(f, "{}", e),
        }
    }
}

/// A single cell: content plus memoized value.
#[derive(Debug, Clone, Default)]
pub struct Cell {
    content: CellContent,
    cache: RefCell<Option<CellValue>>,
}

impl Default for CellContent {
    fn default() -> Self {
        CellContent::Empty
    }
}

impl Cell {
    /// Create an empty cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cell from raw input text.
    ///
    /// Empty input makes an Empty cell. Input starting with `=` and longer
    /// than one character is parsed as a formula; a parse failure rejects
    /// the whole input. Everything else, including a bare `=`, is text,
    /// stored verbatim.
    pub fn from_input(input: &str) -> Result<Self, FormulaParseError> {
        let content = if input.is_empty() {
            CellContent::Empty
        } else if input.starts_with(FORMULA_SIGN) && input.len() > 1 {
            CellContent::Formula(Formula::parse(&input[1..])?)
        } else {
            CellContent::Text(input.to_string())
        };
        Ok(Self {
            content,
            cache: RefCell::new(None),
        })
    }

    pub fn content(&self) -> &CellContent {
        &self.content
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.content, CellContent::Empty)
    }

    /// The cell's stored textual representation.
    ///
    /// Formulas print as `=` plus their canonical expression, which may
    /// differ from the original input in whitespace and parentheses.
    pub fn text(&self) -> String {
        match &self.content {
            CellContent::Empty => String::new(),
            CellContent::Text(s) => s.clone(),
            CellContent::Formula(f) => format!("{}{}", FORMULA_SIGN, f.expression()),
        }
    }

    /// The cell's value, computed on first read and cached until the next
    /// invalidation.
    ///
    /// Formula evaluation reads referenced cells through the sheet; absent
    /// slots read as 0. Requires the dependency graph to be acyclic, which
    /// the sheet's update protocol guarantees.
    pub fn value(&self, sheet: &Sheet) -> CellValue {
        if let Some(cached) = self.cache.borrow().as_ref() {
            return cached.clone();
        }
        let value = self.compute(sheet);
        *self.cache.borrow_mut() = Some(value.clone());
        value
    }

    fn compute(&self, sheet: &Sheet) -> CellValue {
        match &self.content {
            CellContent::Empty => CellValue::Text(String::new()),
            CellContent::Text(s) => {
                let display = match s.strip_prefix(ESCAPE_SIGN) {
                    Some(tail) => tail,
                    None => s.as_str(),
                };
                CellValue::Text(display.to_string())
            }
            CellContent::Formula(f) => match f.evaluate(|pos| sheet.lookup_value(pos)) {
                Ok(n) => CellValue::Number(n),
                Err(e) => CellValue::Error(e),
            },
        }
    }

    /// Positions this cell's content references. Empty for non-formulas.
    pub fn referenced_cells(&self) -> &[Position] {
        match &self.content {
            CellContent::Formula(f) => f.referenced_cells(),
            _ => &[],
        }
    }

    /// Drop the cached value; the next `value` call recomputes.
    ///
    /// Takes `&self`: invalidation reaches cells through shared references
    /// during the sheet's ancestor sweep.
    pub fn reset_cache(&self) {
        self.cache.borrow_mut().take();
    }

    /// Whether a value is currently cached.
    pub fn has_cached_value(&self) -> bool {
        self.cache.borrow().is_some()
    }
}

// Cells serialize as their text form and reconstruct through `from_input`,
// so the on-disk shape stays stable however the AST representation evolves.
// Caches are not persisted.
impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text())
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Cell::from_input(&text).map_err(D::Error::custom)
    }
}
