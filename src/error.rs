//! Error types for sheet operations.

use thiserror::Error;

use crate::formula::FormulaParseError;
use crate::position::Position;

/// Errors surfaced by the public sheet operations.
///
/// Formula *evaluation* errors are not here: they are values
/// ([`FormulaError`](crate::formula::FormulaError)) carried in the cell's
/// computed result, and reading a cell never fails.
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("invalid position: row = {}, col = {}", .0.row, .0.col)]
    InvalidPosition(Position),

    /// Installing the cell would create a cycle through this position.
    /// The sheet is unchanged when this is returned.
    #[error("setting cell {0} would create a circular dependency")]
    CircularDependency(Position),

    #[error(transparent)]
    Parse(#[from] FormulaParseError),
}

pub type Result<T> = std::result::Result<T, SheetError>;
