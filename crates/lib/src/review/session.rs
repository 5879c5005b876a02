//! Review session: one per feed connection. Reacts to feed events and operator actions in
//! arrival order, keeping the registry, the view and the operator status line in step.

use crate::error::ReviewError;
use crate::feed::{decode_frame, CloseInfo, FeedEvent, FeedFrame, FeedSender};
use crate::review::registry::{Decision, Observed, Registry};
use crate::review::view::{Cell, RowAction, RowView, STATUS_COLUMN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Closed,
}

pub struct ReviewSession<V: RowView> {
    state: SessionState,
    registry: Registry,
    view: V,
    sender: FeedSender,
    status: String,
}

impl<V: RowView> ReviewSession<V> {
    pub fn new(view: V, sender: FeedSender) -> Self {
        Self {
            state: SessionState::Connecting,
            registry: Registry::for_view(&view),
            view,
            sender,
            status: "Connecting...".to_string(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Operator-visible status line.
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// React to one adapter event. Never fails: bad frames and late events are logged and
    /// reflected in the status line.
    pub fn handle_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Open => {
                if self.state == SessionState::Connecting {
                    self.state = SessionState::Open;
                    self.status = "Connection established".to_string();
                    log::info!("review session open");
                }
            }
            FeedEvent::Message(text) => {
                if self.state == SessionState::Closed {
                    log::debug!("frame after close ignored");
                    return;
                }
                if let Err(e) = self.handle_frame(&text) {
                    log::warn!("dropped frame: {}", e);
                    self.status = format!("Dropped frame: {}", e);
                }
            }
            FeedEvent::Error(info) => {
                // The adapter follows every error with a Close; that is what ends the session.
                log::warn!("feed error: {}", info);
                if self.state != SessionState::Closed {
                    self.status = format!("Error {}", info);
                }
            }
            FeedEvent::Close(info) => {
                self.state = SessionState::Closed;
                self.status = close_status(&info);
                log::info!("review session closed: {}", self.status);
            }
        }
    }

    fn handle_frame(&mut self, text: &str) -> Result<(), ReviewError> {
        match decode_frame(text)? {
            FeedFrame::Control(control) => {
                log::debug!("control frame kind {} ignored", control.kind);
            }
            FeedFrame::Message(msg) => {
                if let Observed::Bound(_) = self.registry.observe(&msg, &mut self.view)? {
                    self.view.redraw();
                }
            }
        }
        Ok(())
    }

    /// Resolve an operator action, send the decision, and mark the row. Stale rows and a closed
    /// connection are reported as errors and change nothing.
    pub fn handle_action(&mut self, action: RowAction) -> Result<Decision, ReviewError> {
        if self.state != SessionState::Open {
            log::warn!("decision on row {} dropped: connection not open", action.handle);
            return Err(ReviewError::TransportClosed);
        }
        let message_id = self.registry.resolve(action.handle).map_err(|e| {
            log::warn!("decision dropped: {}", e);
            e
        })?;
        let decision = Decision {
            message_id,
            approved: action.approved,
        };
        self.sender.send(decision.encode()?).map_err(|e| {
            log::warn!("decision for message {} not sent: {}", message_id, e);
            e
        })?;
        self.view
            .update_row(action.handle, STATUS_COLUMN, Cell::Verdict(action.approved))?;
        self.view.redraw();
        log::info!(
            "message {} {}",
            message_id,
            if action.approved { "accepted" } else { "rejected" }
        );
        Ok(decision)
    }
}

fn close_status(info: &CloseInfo) -> String {
    let head = if info.was_clean {
        "Connection closed cleanly."
    } else {
        "Connection lost."
    };
    format!("{} Code: {} reason: {}", head, info.code, info.reason)
}
