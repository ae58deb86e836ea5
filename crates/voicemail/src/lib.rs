//! # RVoIP Voicemail
//!
//! Drives one telephony channel through a voicemail recording session:
//! answer the channel, authenticate the mailbox, record a message, save it,
//! play a goodbye prompt and hang up.
//!
//! The session is a small state machine (`init → authenticating → ready →
//! done`) running as its own tokio task. It reacts to two channel event
//! streams while collaborator calls are in flight:
//!
//! - **Channel termination** pre-empts everything and ends the session.
//! - **Keypad digits** are looked up in a per-state action table; in `ready`
//!   the default table maps `#` to stopping the recording.
//!
//! Whatever happens, the session cleans up after itself: listeners are
//! removed exactly once and the channel is hung up at most once.
//!
//! ## Modules
//!
//! - `api`: session-start entry point
//! - `state_machine`: the session actor, its handle and history
//! - `channel`: channel abstraction and event subscriptions
//! - `collaborators`: authenticator, recording writer and prompt interfaces
//! - `config`: digit-action table and prompts, YAML loading
//! - `memory`: in-process channel and collaborators for tests and demos
//! - `logging`: tracing subscriber setup

pub mod api;
pub mod channel;
pub mod collaborators;
pub mod config;
pub mod errors;
pub mod logging;
pub mod memory;
pub mod state_machine;
pub mod types;

pub use api::{SessionStart, StartEvent, VoicemailApp};
pub use channel::{Channel, ChannelEvent, ChannelEventKind, SubscriptionHandle};
pub use collaborators::SessionDependencies;
pub use config::{ConfigProvider, SessionAction, VoicemailConfig};
pub use errors::{Result, SessionError};
pub use state_machine::{SessionHandle, SessionHistory, VoicemailSession};
pub use types::{ChannelId, DtmfDigit, Mailbox, SessionId, SessionState};
