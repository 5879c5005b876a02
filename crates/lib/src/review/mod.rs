//! Review core: message registry, row view, and the per-connection session tying them to the
//! feed.

mod registry;
mod session;
mod view;

pub use registry::{Decision, Observed, Registry, RowBinding};
pub use session::{ReviewSession, SessionState};
pub use view::{
    Cell, RowAction, RowHandle, RowView, TableView, COLUMN_COUNT, ID_COLUMN, STATUS_COLUMN,
};
