//! Session-start entry point
//!
//! A call lands in the voicemail application with a start event whose
//! arguments name the mailbox (`[domain, mailbox_number, busy_flag]`) and a
//! channel that is already connected. [`VoicemailApp::create`] turns the pair
//! into a running [`VoicemailSession`].
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use rvoip_voicemail::api::{StartEvent, VoicemailApp};
//! # use rvoip_voicemail::channel::Channel;
//! # use rvoip_voicemail::collaborators::SessionDependencies;
//! # async fn example(deps: SessionDependencies, channel: Arc<dyn Channel>) -> rvoip_voicemail::Result<()> {
//! let app = VoicemailApp::new(deps);
//! let handle = app.create(&StartEvent::new(["example.com", "1234", "busy"]), channel)?;
//! let history = handle.wait_done().await?;
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::channel::Channel;
use crate::collaborators::SessionDependencies;
use crate::errors::{Result, SessionError};
use crate::state_machine::VoicemailSession;

pub use crate::state_machine::{SessionHandle, SessionHistory, TransitionRecord};

/// Value of the third start argument marking the mailbox owner as busy
pub const BUSY_FLAG: &str = "busy";

/// Start event delivered when a channel enters the application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartEvent {
    pub args: Vec<String>,
}

impl StartEvent {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// Session parameters extracted from a start event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStart {
    pub domain: String,
    pub mailbox_number: String,
    pub busy: bool,
}

impl SessionStart {
    pub fn from_event(event: &StartEvent) -> Result<Self> {
        let domain = required_arg(event, 0, "domain")?;
        let mailbox_number = required_arg(event, 1, "mailbox number")?;
        let busy = event.args.get(2).map(|flag| flag == BUSY_FLAG).unwrap_or(false);

        Ok(Self {
            domain,
            mailbox_number,
            busy,
        })
    }
}

fn required_arg(event: &StartEvent, index: usize, name: &str) -> Result<String> {
    event
        .args
        .get(index)
        .filter(|value| !value.trim().is_empty())
        .cloned()
        .ok_or_else(|| SessionError::InvalidStartEvent(format!("missing {} (argument {})", name, index)))
}

/// Creates a voicemail session for every channel that enters the application
#[derive(Debug, Clone)]
pub struct VoicemailApp {
    deps: SessionDependencies,
}

impl VoicemailApp {
    pub fn new(deps: SessionDependencies) -> Self {
        Self { deps }
    }

    /// Start a session for `channel`
    ///
    /// Errors only when the start event is malformed or no tokio runtime is
    /// running; the session itself never reports failure.
    pub fn create(&self, event: &StartEvent, channel: Arc<dyn Channel>) -> Result<SessionHandle> {
        let start = SessionStart::from_event(event)?;

        debug!(
            domain = %start.domain,
            mailbox_number = %start.mailbox_number,
            busy = start.busy,
            channel = %channel.id(),
            "Starting voicemail session"
        );

        let handle = VoicemailSession::start(
            start.domain,
            start.mailbox_number,
            start.busy,
            channel,
            self.deps.clone(),
        )?;

        info!(session_id = %handle.session_id(), channel = %handle.channel_id(), "Voicemail session created");
        Ok(handle)
    }
}
