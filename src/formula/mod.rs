//! Formula parsing and evaluation.
//!
//! A [`Formula`] is a parsed expression held by a formula cell: it evaluates
//! against a cell-value lookup, prints in canonical form (minimal
//! parentheses, no whitespace), and reports the positions it references.

pub mod eval;
pub mod parser;

use thiserror::Error;

use crate::cell::CellValue;
use crate::position::Position;

use parser::Expr;

/// Evaluation error carried as a cell value.
///
/// These are values, not failures: a formula that divides by zero has the
/// value `#ARITHM!`, which caches and propagates like any number would.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormulaError {
    /// Reference outside the grid bounds.
    #[error("#REF!")]
    Ref,
    /// Referenced cell's text is not interpretable as a number.
    #[error("#VALUE!")]
    Value,
    /// Division by zero or a non-finite intermediate result.
    #[error("#ARITHM!")]
    Arithmetic,
}

/// Rejected formula text. Returned before any sheet state changes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("formula parse error: {message}")]
pub struct FormulaParseError {
    message: String,
}

impl FormulaParseError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A parsed formula expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    ast: Expr,
    /// In-bounds referenced positions, sorted row-major, deduplicated.
    refs: Vec<Position>,
}

impl Formula {
    /// Parse an expression (without the leading `=`).
    pub fn parse(expression: &str) -> Result<Self, FormulaParseError> {
        let ast = parser::parse(expression)?;
        let mut refs = Vec::new();
        collect_refs(&ast, &mut refs);
        refs.sort_unstable();
        refs.dedup();
        Ok(Self { ast, refs })
    }

    /// Evaluate the formula, resolving references through `lookup`.
    pub fn evaluate<L>(&self, lookup: L) -> Result<f64, FormulaError>
    where
        L: Fn(Position) -> CellValue,
    {
        eval::evaluate(&self.ast, &lookup)
    }

    /// Canonical printed form (no leading `=`).
    pub fn expression(&self) -> String {
        self.ast.to_string()
    }

    /// Positions this formula references, sorted and deduplicated.
    ///
    /// Out-of-bounds references are excluded: they can never be grid slots
    /// or graph nodes, and evaluate to `#REF!` regardless of sheet state.
    pub fn referenced_cells(&self) -> &[Position] {
        &self.refs
    }
}

fn collect_refs(expr: &Expr, refs: &mut Vec<Position>) {
    match expr {
        Expr::Number(_) => {}
        Expr::Ref(pos) => {
            if pos.is_valid() {
                refs.push(*pos);
            }
        }
        Expr::Unary { operand, .. } => collect_refs(operand, refs),
        Expr::Binary { left, right, .. } => {
            collect_refs(left, refs);
            collect_refs(right, refs);
        }
    }
}
