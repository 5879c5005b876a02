//! Row view: the table the operator looks at, reduced to add/update/redraw.
//!
//! Views own their row storage and issue `RowHandle`s. `TableView` is the in-memory store the
//! desktop and terminal front ends render from.

use crate::error::ReviewError;
use std::fmt;

/// Column holding the message number.
pub const ID_COLUMN: usize = 0;
/// Column holding the Accept/Reject controls, later replaced by the verdict.
pub const STATUS_COLUMN: usize = 4;
/// Columns per row: number, source, destination, payload, status.
pub const COLUMN_COUNT: usize = 5;

/// Opaque row identifier issued by a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowHandle(u64);

impl RowHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// One table cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Number(u64),
    Text(String),
    /// Accept and Reject buttons.
    Controls,
    /// Decision marker: true = accepted.
    Verdict(bool),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Text(s) => write!(f, "{}", s),
            Cell::Controls => write!(f, "[accept] [reject]"),
            Cell::Verdict(true) => write!(f, "Message accepted"),
            Cell::Verdict(false) => write!(f, "Message rejected"),
        }
    }
}

/// Operator activated a row control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowAction {
    pub handle: RowHandle,
    pub approved: bool,
}

pub trait RowView {
    /// Rows currently in the table (pre-populated ones included).
    fn row_count(&self) -> usize;

    /// Append a row and return its handle. Handles increase with every call and are never
    /// reissued; a view that breaks this leaves the row unbound.
    fn add_row(&mut self, cells: Vec<Cell>) -> RowHandle;

    /// Replace one cell of an existing row.
    fn update_row(&mut self, handle: RowHandle, column: usize, value: Cell)
        -> Result<(), ReviewError>;

    /// Make pending changes visible.
    fn redraw(&mut self);
}

/// In-memory ordered row store. The handle of a row is its insertion index, so a table
/// created with N rows issues N, N+1, ... for the rows added later.
#[derive(Debug, Clone, Default)]
pub struct TableView {
    rows: Vec<Vec<Cell>>,
    dirty: bool,
    generation: u64,
}

impl TableView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table that already shows `rows` (e.g. restored from a previous screen).
    pub fn with_rows(rows: Vec<Vec<Cell>>) -> Self {
        Self {
            rows,
            dirty: false,
            generation: 0,
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = (RowHandle, &[Cell])> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, cells)| (RowHandle::new(i as u64), cells.as_slice()))
    }

    pub fn row(&self, handle: RowHandle) -> Option<&[Cell]> {
        let idx = usize::try_from(handle.raw()).ok()?;
        self.rows.get(idx).map(|cells| cells.as_slice())
    }

    /// Incremented on every redraw that had changes behind it.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True if rows changed since the last redraw.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl RowView for TableView {
    fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn add_row(&mut self, cells: Vec<Cell>) -> RowHandle {
        let handle = RowHandle::new(self.rows.len() as u64);
        self.rows.push(cells);
        self.dirty = true;
        handle
    }

    fn update_row(
        &mut self,
        handle: RowHandle,
        column: usize,
        value: Cell,
    ) -> Result<(), ReviewError> {
        let idx = usize::try_from(handle.raw()).map_err(|_| ReviewError::UnknownRow(handle))?;
        let row = self
            .rows
            .get_mut(idx)
            .ok_or(ReviewError::UnknownRow(handle))?;
        let cell = row.get_mut(column).ok_or(ReviewError::UnknownRow(handle))?;
        *cell = value;
        self.dirty = true;
        Ok(())
    }

    fn redraw(&mut self) {
        if self.dirty {
            self.dirty = false;
            self.generation += 1;
        }
    }
}
