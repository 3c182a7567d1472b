// Formula evaluation against a cell-value lookup.
//
// Coercion follows spreadsheet convention: numbers pass through, empty text
// reads as 0, numeric text parses, anything else is #VALUE!. Errors stored in
// referenced cells propagate unchanged.

use crate::cell::CellValue;
use crate::position::Position;

use super::parser::{Expr, Op, UnaryOp};
use super::FormulaError;

/// Evaluate an expression, resolving cell references through `lookup`.
///
/// `lookup` receives only in-bounds positions; out-of-bounds references
/// short-circuit to `#REF!` here. Non-finite intermediate results (division
/// by zero, overflow) surface as `#ARITHM!`.
pub fn evaluate<L>(expr: &Expr, lookup: &L) -> Result<f64, FormulaError>
where
    L: Fn(Position) -> CellValue,
{
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Ref(pos) => {
            if !pos.is_valid() {
                return Err(FormulaError::Ref);
            }
            coerce(lookup(*pos))
        }
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, lookup)?;
            Ok(match op {
                UnaryOp::Plus => value,
                UnaryOp::Minus => -value,
            })
        }
        Expr::Binary { op, left, right } => {
            let left = evaluate(left, lookup)?;
            let right = evaluate(right, lookup)?;
            let result = match op {
                Op::Add => left + right,
                Op::Sub => left - right,
                Op::Mul => left * right,
                Op::Div => left / right,
            };
            if result.is_finite() {
                Ok(result)
            } else {
                Err(FormulaError::Arithmetic)
            }
        }
    }
}

/// Convert a referenced cell's value to a number.
fn coerce(value: CellValue) -> Result<f64, FormulaError> {
    match value {
        CellValue::Number(n) => Ok(n),
        CellValue::Text(s) => {
            if s.is_empty() {
                Ok(0.0)
            } else {
                s.parse().map_err(|_| FormulaError::Value)
            }
        }
        CellValue::Error(e) => Err(e),
    }
}
