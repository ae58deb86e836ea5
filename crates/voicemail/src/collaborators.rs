//! Collaborators the session orchestrates
//!
//! The session never authenticates, records or renders audio itself; it
//! asks these factories for per-call objects bound to its channel and drives
//! them in order.

use async_trait::async_trait;
use std::sync::Arc;

use crate::channel::Channel;
use crate::config::{ConfigProvider, PromptSpec};
use crate::errors::{AuthError, PromptError, RecordingError};
use crate::types::Mailbox;

/// Creates authenticators bound to a channel
pub trait AuthenticatorFactory: Send + Sync {
    fn create(&self, channel: Arc<dyn Channel>) -> Box<dyn Authenticator>;
}

/// Resolves the mailbox a caller is leaving a message in
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn init(&self, domain: &str, mailbox_number: &str) -> Result<Mailbox, AuthError>;
}

/// Creates recording writers for a mailbox
pub trait MailboxWriterFactory: Send + Sync {
    fn create_writer(&self, mailbox: &Mailbox, channel: Arc<dyn Channel>) -> Arc<dyn RecordingWriter>;
}

/// Captures a message from the channel and persists it
#[async_trait]
pub trait RecordingWriter: Send + Sync {
    /// Record until stopped or until the recording ends on its own
    async fn record(&self) -> Result<(), RecordingError>;

    /// Persist the captured message into the mailbox
    async fn save(&self) -> Result<(), RecordingError>;

    /// Ask a pending [`record`](Self::record) to resolve
    fn stop(&self);
}

/// Creates prompts for a channel
pub trait PromptFactory: Send + Sync {
    fn create(&self, spec: &PromptSpec, channel: Arc<dyn Channel>) -> Box<dyn Prompt>;
}

/// A sequence of sounds played to the channel
#[async_trait]
pub trait Prompt: Send + Sync {
    async fn play(&self) -> Result<(), PromptError>;
}

/// Everything a session needs besides its channel
#[derive(Clone)]
pub struct SessionDependencies {
    pub auth: Arc<dyn AuthenticatorFactory>,
    pub mailbox: Arc<dyn MailboxWriterFactory>,
    pub prompt: Arc<dyn PromptFactory>,
    pub config: Arc<dyn ConfigProvider>,
}

impl SessionDependencies {
    pub fn new(
        auth: Arc<dyn AuthenticatorFactory>,
        mailbox: Arc<dyn MailboxWriterFactory>,
        prompt: Arc<dyn PromptFactory>,
        config: Arc<dyn ConfigProvider>,
    ) -> Self {
        Self { auth, mailbox, prompt, config }
    }
}

impl std::fmt::Debug for SessionDependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionDependencies").finish_non_exhaustive()
    }
}
