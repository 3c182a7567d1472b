//! Cell positions and grid dimensions.
//!
//! A `Position` identifies a slot in the sheet's sparse grid. Positions are
//! plain values: copied freely, compared and hashed by their coordinate pair,
//! ordered row-major. A position may carry coordinates outside the grid
//! bounds (the formula layer parses such references and resolves them to
//! `#REF!` at evaluation time), so validity is a query, not a constructor
//! precondition.

use serde::{Deserialize, Serialize};

/// Maximum number of rows in a sheet.
pub const MAX_ROWS: usize = 16_384;
/// Maximum number of columns in a sheet.
pub const MAX_COLS: usize = 16_384;

/// Identifies a cell slot in the grid.
///
/// Used as the node key in the dependency graph and as the grid map key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    /// Row index (0-based)
    pub row: usize,
    /// Column index (0-based)
    pub col: usize,
}

impl Position {
    /// Create a new Position.
    #[inline]
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Returns true if this position lies inside the grid bounds.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.row < MAX_ROWS && self.col < MAX_COLS
    }

    /// Parse an A1-style reference ("A1", "ZZ100") into a position.
    ///
    /// Accepts coordinates beyond the grid bounds; callers that need an
    /// in-bounds position check `is_valid` afterwards. Returns `None` for
    /// anything that is not letters followed by a nonzero row number.
    pub fn parse_a1(s: &str) -> Option<Self> {
        let split = s.find(|c: char| !c.is_ascii_alphabetic())?;
        let (col_str, row_str) = s.split_at(split);
        if col_str.is_empty() || !row_str.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }

        let row: usize = row_str.parse().ok()?;
        if row == 0 {
            return None;
        }

        // Column letters to index: A=0, B=1, ..., Z=25, AA=26, AB=27, ...
        let col = col_str
            .chars()
            .try_fold(0usize, |acc, c| {
                let digit = (c.to_ascii_uppercase() as usize) - ('A' as usize) + 1;
                acc.checked_mul(26)?.checked_add(digit)
            })?
            .checked_sub(1)?;

        Some(Self { row: row - 1, col })
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", col_to_letters(self.col), self.row + 1)
    }
}

/// Convert 0-based column index to Excel-style letter(s).
pub fn col_to_letters(col: usize) -> String {
    let mut result = String::new();
    let mut n = col;
    loop {
        result.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    result
}

/// Row/column extent of the printable region.
///
/// Exclusive upper bounds: a sheet whose bottom-right occupied slot is at
/// `(r, c)` has size `(r + 1, c + 1)`; an empty sheet has size `(0, 0)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub rows: usize,
    pub cols: usize,
}

impl Size {
    #[inline]
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_equality_and_hash() {
        use std::collections::HashSet;

        let a = Position::new(0, 0);
        let b = Position::new(0, 0);
        let c = Position::new(1, 0);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b); // duplicate
        set.insert(c);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_row_major_ordering() {
        let mut positions = vec![
            Position::new(1, 0),
            Position::new(0, 2),
            Position::new(0, 1),
            Position::new(2, 0),
        ];
        positions.sort();
        assert_eq!(
            positions,
            vec![
                Position::new(0, 1),
                Position::new(0, 2),
                Position::new(1, 0),
                Position::new(2, 0),
            ]
        );
    }

    #[test]
    fn test_validity_bounds() {
        assert!(Position::new(0, 0).is_valid());
        assert!(Position::new(MAX_ROWS - 1, MAX_COLS - 1).is_valid());
        assert!(!Position::new(MAX_ROWS, 0).is_valid());
        assert!(!Position::new(0, MAX_COLS).is_valid());
    }

    #[test]
    fn test_col_to_letters() {
        assert_eq!(col_to_letters(0), "A");
        assert_eq!(col_to_letters(1), "B");
        assert_eq!(col_to_letters(25), "Z");
        assert_eq!(col_to_letters(26), "AA");
        assert_eq!(col_to_letters(27), "AB");
        assert_eq!(col_to_letters(701), "ZZ");
        assert_eq!(col_to_letters(702), "AAA");
    }

    #[test]
    fn test_parse_a1() {
        assert_eq!(Position::parse_a1("A1"), Some(Position::new(0, 0)));
        assert_eq!(Position::parse_a1("B3"), Some(Position::new(2, 1)));
        assert_eq!(Position::parse_a1("aa10"), Some(Position::new(9, 26)));
        assert_eq!(Position::parse_a1("ZZ100"), Some(Position::new(99, 701)));
    }

    #[test]
    fn test_parse_a1_rejects_malformed() {
        assert_eq!(Position::parse_a1(""), None);
        assert_eq!(Position::parse_a1("A"), None);
        assert_eq!(Position::parse_a1("1"), None);
        assert_eq!(Position::parse_a1("A0"), None);
        assert_eq!(Position::parse_a1("A1B"), None);
        assert_eq!(Position::parse_a1("1A"), None);
        assert_eq!(Position::parse_a1("A-1"), None);
    }

    #[test]
    fn test_parse_a1_beyond_grid_bounds() {
        // Out-of-grid references parse; validity is a separate question.
        let huge = Position::parse_a1("ZZZZ99999").unwrap();
        assert!(!huge.is_valid());
    }

    #[test]
    fn test_display_roundtrip() {
        for pos in [
            Position::new(0, 0),
            Position::new(9, 26),
            Position::new(99, 701),
            Position::new(0, 702),
        ] {
            assert_eq!(Position::parse_a1(&pos.to_string()), Some(pos));
        }
        assert_eq!(Position::new(0, 0).to_string(), "A1");
        assert_eq!(Position::new(9, 26).to_string(), "AA10");
    }

    #[test]
    fn test_size_default_is_empty() {
        assert_eq!(Size::default(), Size::new(0, 0));
    }
}
