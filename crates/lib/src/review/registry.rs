//! Message registry: dedups the feed against seen message numbers and binds each accepted
//! message to exactly one view row.
//!
//! Seen ids are never evicted; a long session grows the set without bound.

use crate::error::ReviewError;
use crate::feed::InboundMessage;
use crate::review::view::{Cell, RowHandle, RowView};
use std::collections::{HashMap, HashSet};

/// Binding between a visible row and the message it shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBinding {
    pub row_handle: RowHandle,
    pub message_id: u64,
}

/// Outcome of observing a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
    Bound(RowBinding),
    /// Already seen; nothing changed.
    Duplicate,
}

/// Operator verdict on one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub message_id: u64,
    pub approved: bool,
}

impl Decision {
    /// Wire payload for the feed.
    pub fn encode(&self) -> Result<String, ReviewError> {
        crate::feed::encode_decision(self.message_id, self.approved)
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    seen: HashSet<u64>,
    bindings: HashMap<RowHandle, u64>,
    /// Rows present before the session started; their handles are never bound.
    base_rows: u64,
    last_handle: Option<RowHandle>,
}

impl Registry {
    /// Registry for a view that currently holds `base_rows` rows.
    pub fn new(base_rows: usize) -> Self {
        Self {
            base_rows: base_rows as u64,
            ..Default::default()
        }
    }

    pub fn for_view(view: &impl RowView) -> Self {
        Self::new(view.row_count())
    }

    /// Dedup `msg` and, if new, add its row to `view` and bind it.
    ///
    /// Handles are opaque, so freshness can only be checked after `add_row`. When the view
    /// hands back a reused handle the row it added stays in the view unbound: actions on it
    /// resolve to `UnknownRow` and send nothing. The id is not marked seen, so a redelivery
    /// gets another attempt.
    pub fn observe(
        &mut self,
        msg: &InboundMessage,
        view: &mut impl RowView,
    ) -> Result<Observed, ReviewError> {
        if self.seen.contains(&msg.id) {
            log::debug!("duplicate message {} ignored", msg.id);
            return Ok(Observed::Duplicate);
        }

        let handle = view.add_row(vec![
            Cell::Number(msg.id),
            Cell::Text(msg.source.clone()),
            Cell::Text(msg.destination.clone()),
            Cell::Text(msg.payload.clone()),
            Cell::Controls,
        ]);
        if !self.is_fresh(handle) {
            return Err(ReviewError::RowReused(handle));
        }

        self.seen.insert(msg.id);
        self.bindings.insert(handle, msg.id);
        self.last_handle = Some(handle);
        log::debug!("message {} bound to row {}", msg.id, handle);
        Ok(Observed::Bound(RowBinding {
            row_handle: handle,
            message_id: msg.id,
        }))
    }

    /// Message id shown on `handle`.
    pub fn resolve(&self, handle: RowHandle) -> Result<u64, ReviewError> {
        self.bindings
            .get(&handle)
            .copied()
            .ok_or(ReviewError::UnknownRow(handle))
    }

    pub fn has_seen(&self, id: u64) -> bool {
        self.seen.contains(&id)
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn bound_count(&self) -> usize {
        self.bindings.len()
    }

    fn is_fresh(&self, handle: RowHandle) -> bool {
        if handle.raw() < self.base_rows || self.bindings.contains_key(&handle) {
            return false;
        }
        self.last_handle.map_or(true, |last| handle > last)
    }
}
