//! The sheet: sparse grid, update protocol, printing.
//!
//! `set_cell` is the heart of the engine. It keeps the grid, the dependency
//! graph, and the per-cell value caches mutually consistent under an atomic
//! contract: a mutation either lands entirely or, when it would create a
//! reference cycle, leaves the sheet observably untouched.

use std::io::{self, Write};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::cell::{Cell, CellValue};
use crate::dep_graph::DepGraph;
use crate::error::{Result, SheetError};
use crate::position::{Position, Size};

/// A sparse two-dimensional grid of cells.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sheet {
    #[serde(with = "cells_as_entries")]
    cells: FxHashMap<Position, Cell>,
    /// Rebuilt from cell contents after deserialization; see
    /// [`Sheet::rebuild_graph`].
    #[serde(skip)]
    graph: DepGraph,
    printable: Size,
}

impl Sheet {
    /// Create an empty sheet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cell at `pos` from raw input text.
    ///
    /// Protocol, in order:
    /// 1. validate the position;
    /// 2. build the new cell off-grid (parse failures surface here, before
    ///    any state changes);
    /// 3. reject direct self-references;
    /// 4. materialize an Empty cell for every referent without a slot,
    ///    remembering them for rollback;
    /// 5. detach the old outgoing edges, keeping a snapshot;
    /// 6. install the node and the new outgoing edges;
    /// 7. probe for cycles. A cycle rolls back the phantoms and the edge
    ///    changes and fails; otherwise every transitive referrer's cache is
    ///    reset and the new cell replaces the slot.
    pub fn set_cell(&mut self, pos: Position, text: &str) -> Result<()> {
        self.validate(pos)?;

        let new_cell = Cell::from_input(text)?;
        let new_refs: Vec<Position> = new_cell.referenced_cells().to_vec();

        if new_refs.contains(&pos) {
            return Err(SheetError::CircularDependency(pos));
        }

        let mut phantoms: Vec<Position> = Vec::new();
        for &referent in &new_refs {
            if !self.cells.contains_key(&referent) {
                self.place_cell(referent, Cell::new());
                phantoms.push(referent);
            }
        }

        // Snapshot from the graph, not the grid cell: a cleared cell keeps
        // its node and outgoing edges, and those must be detached too.
        let old_refs = self.graph.forward_refs(pos);
        for &referent in &old_refs {
            self.graph.remove_dependency(pos, referent);
        }

        self.graph.add_cell(pos);
        for &referent in &new_refs {
            self.graph.add_cell(referent);
            self.graph.add_dependency(pos, referent);
        }

        if !self.graph.is_acyclic_from(pos) {
            for &phantom in &phantoms {
                self.remove_slot(phantom);
            }
            for &referent in &new_refs {
                self.graph.remove_dependency(pos, referent);
            }
            for &referent in &old_refs {
                self.graph.add_cell(referent);
                self.graph.add_dependency(pos, referent);
            }
            return Err(SheetError::CircularDependency(pos));
        }

        // The new cell's cache is empty by construction; only the ancestors
        // need sweeping. The sweep includes pos itself, which is harmless.
        let cells = &self.cells;
        self.graph.invalidate_ancestors(pos, |ancestor| {
            if let Some(cell) = cells.get(&ancestor) {
                cell.reset_cache();
            }
        });

        self.place_cell(pos, new_cell);
        Ok(())
    }

    /// The cell at `pos`, or `None` for an absent slot. Never materializes.
    pub fn cell(&self, pos: Position) -> Result<Option<&Cell>> {
        self.validate(pos)?;
        Ok(self.cells.get(&pos))
    }

    /// The computed value at `pos`; `None` for an absent slot.
    pub fn value(&self, pos: Position) -> Result<Option<CellValue>> {
        Ok(self.cell(pos)?.map(|cell| cell.value(self)))
    }

    /// Remove the cell at `pos`, leaving the slot absent.
    ///
    /// Graph nodes and edges survive: a cleared cell that other formulas
    /// still reference keeps reading as 0 through the absent-slot fallback,
    /// and its node preserves the invalidation paths of those referrers.
    pub fn clear_cell(&mut self, pos: Position) -> Result<()> {
        self.validate(pos)?;
        // Referrers cached a value that read this cell; they must recompute.
        let cells = &self.cells;
        self.graph.invalidate_ancestors(pos, |ancestor| {
            if let Some(cell) = cells.get(&ancestor) {
                cell.reset_cache();
            }
        });
        self.remove_slot(pos);
        Ok(())
    }

    /// Smallest bounding box containing every present slot.
    pub fn printable_size(&self) -> Size {
        self.printable
    }

    /// Iterate over all present cells in arbitrary order.
    pub fn cells_iter(&self) -> impl Iterator<Item = (Position, &Cell)> {
        self.cells.iter().map(|(&pos, cell)| (pos, cell))
    }

    /// Write computed values over the printable region: tab-separated
    /// columns, newline-terminated rows, absent and Empty slots blank.
    pub fn print_values<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.print_with(out, |cell| cell.value(self).to_string())
    }

    /// Write stored texts over the printable region, same shape as
    /// [`print_values`](Self::print_values).
    pub fn print_texts<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.print_with(out, |cell| cell.text())
    }

    fn print_with<W, F>(&self, out: &mut W, mut render: F) -> io::Result<()>
    where
        W: Write,
        F: FnMut(&Cell) -> String,
    {
        for row in 0..self.printable.rows {
            for col in 0..self.printable.cols {
                if col > 0 {
                    out.write_all(b"\t")?;
                }
                if let Some(cell) = self.cells.get(&Position::new(row, col)) {
                    out.write_all(render(cell).as_bytes())?;
                }
            }
            out.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Repopulate the dependency graph from cell contents.
    ///
    /// Call after deserializing: the graph is transient state and is not
    /// persisted. Persisted sheets are acyclic, so no probe is needed here.
    pub fn rebuild_graph(&mut self) {
        self.graph = DepGraph::new();
        for (&pos, cell) in &self.cells {
            self.graph.add_cell(pos);
            for &referent in cell.referenced_cells() {
                self.graph.add_cell(referent);
                self.graph.add_dependency(pos, referent);
            }
        }
    }

    /// Value a formula reads at `pos`: the cell's computed value, or 0 for
    /// an absent slot.
    pub(crate) fn lookup_value(&self, pos: Position) -> CellValue {
        match self.cells.get(&pos) {
            Some(cell) => cell.value(self),
            None => CellValue::Number(0.0),
        }
    }

    fn validate(&self, pos: Position) -> Result<()> {
        if pos.is_valid() {
            Ok(())
        } else {
            Err(SheetError::InvalidPosition(pos))
        }
    }

    fn place_cell(&mut self, pos: Position, cell: Cell) {
        self.cells.insert(pos, cell);
        self.printable.rows = self.printable.rows.max(pos.row + 1);
        self.printable.cols = self.printable.cols.max(pos.col + 1);
    }

    fn remove_slot(&mut self, pos: Position) {
        if self.cells.remove(&pos).is_some()
            && (pos.row + 1 == self.printable.rows || pos.col + 1 == self.printable.cols)
        {
            // A boundary cell went away; rescan the (sparse) survivors.
            self.printable = Size::default();
            for p in self.cells.keys() {
                self.printable.rows = self.printable.rows.max(p.row + 1);
                self.printable.cols = self.printable.cols.max(p.col + 1);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn graph(&self) -> &DepGraph {
        &self.graph
    }
}

/// Serialize the sparse cell map as a sorted sequence of `(position, cell)`
/// entries. JSON maps require string keys; a sequence sidesteps that and
/// keeps the output stable.
mod cells_as_entries {
    use super::*;
    use serde::ser::SerializeSeq;

    pub fn serialize<S>(cells: &FxHashMap<Position, Cell>, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut entries: Vec<(&Position, &Cell)> = cells.iter().collect();
        entries.sort_by_key(|(pos, _)| **pos);
        let mut seq = serializer.serialize_seq(Some(entries.len()))?;
        for entry in entries {
            seq.serialize_element(&entry)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<FxHashMap<Position, Cell>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let entries = Vec::<(Position, Cell)>::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}
