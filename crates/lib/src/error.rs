//! Review errors. Every variant is per-frame or per-action; none of them ends the session.
//! Only a close from the connection does that.

use crate::review::RowHandle;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReviewError {
    /// Inbound frame is not valid JSON or lacks the message fields.
    #[error("malformed frame: {0}")]
    Parse(String),

    /// Action for a row that has no message bound to it (stale click, pre-populated row).
    #[error("no message bound to row {0}")]
    UnknownRow(RowHandle),

    /// The view issued a handle that is already bound or not past the last issued one.
    #[error("row {0} was issued twice by the view")]
    RowReused(RowHandle),

    /// Outbound frame could not be serialized; nothing was sent.
    #[error("cannot encode frame: {0}")]
    Encode(String),

    /// The connection is gone; nothing more can be sent.
    #[error("connection closed")]
    TransportClosed,
}
