//! Handle to a running session
//!
//! Sessions are fire-and-forget: they clean up after themselves whatever
//! happens. The handle only lets the owner observe progress, inject an
//! action, and collect the transition history once the session is over.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::history::SessionHistory;
use super::session::SessionMessage;
use crate::config::SessionAction;
use crate::errors::{Result, SessionError};
use crate::types::{ChannelId, SessionId, SessionState};

pub struct SessionHandle {
    session_id: SessionId,
    channel_id: ChannelId,
    state_rx: watch::Receiver<SessionState>,
    control_tx: mpsc::UnboundedSender<SessionMessage>,
    task: JoinHandle<SessionHistory>,
}

impl SessionHandle {
    pub(crate) fn new(
        session_id: SessionId,
        channel_id: ChannelId,
        state_rx: watch::Receiver<SessionState>,
        control_tx: mpsc::UnboundedSender<SessionMessage>,
        task: JoinHandle<SessionHistory>,
    ) -> Self {
        Self {
            session_id,
            channel_id,
            state_rx,
            control_tx,
            task,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    /// Most recently published state
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Wait until the session enters `state`
    ///
    /// Fails if the session finishes without being observed in `state`.
    pub async fn wait_for_state(&mut self, state: SessionState) -> Result<()> {
        self.state_rx
            .wait_for(|current| *current == state)
            .await
            .map(|_| ())
            .map_err(|_| SessionError::TaskFailed(format!("session ended before reaching {}", state)))
    }

    /// Dispatch `action` as if its digit had been pressed
    ///
    /// Returns false when the session has already finished.
    pub fn send_action(&self, action: SessionAction) -> bool {
        self.control_tx.send(SessionMessage::Control(action)).is_ok()
    }

    /// Stop the recording in progress
    pub fn stop_recording(&self) -> bool {
        self.send_action(SessionAction::Stop)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to reach `done` and return its history
    pub async fn wait_done(self) -> Result<SessionHistory> {
        self.task
            .await
            .map_err(|e| SessionError::TaskFailed(e.to_string()))
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.session_id)
            .field("channel_id", &self.channel_id)
            .field("state", &self.state())
            .finish()
    }
}
