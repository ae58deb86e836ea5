//! Error types for the voicemail session
//!
//! Every collaborator failure is terminal for the session but never for the
//! process: the state machine logs it and funnels the session toward hangup.
//! Only the entry point surfaces errors to its caller, and only for problems
//! detected before a session exists.

use std::path::PathBuf;
use thiserror::Error;

/// Failures reported by the telephony channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Failed to answer channel: {0}")]
    AnswerFailed(String),

    #[error("Failed to hang up channel: {0}")]
    HangupFailed(String),

    #[error("Channel is gone: {0}")]
    Gone(String),
}

/// Failures initializing the mailbox for a caller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Mailbox {mailbox_number}@{domain} not found")]
    MailboxNotFound { domain: String, mailbox_number: String },

    #[error("Authentication rejected: {0}")]
    Rejected(String),

    #[error("Authentication provider error: {0}")]
    ProviderError(String),
}

/// Failures capturing or persisting a message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordingError {
    #[error("Recording failed: {0}")]
    RecordFailed(String),

    #[error("Failed to save recording: {0}")]
    SaveFailed(String),
}

/// Failures playing a prompt to the channel
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    #[error("Prompt playback failed: {0}")]
    PlaybackFailed(String),
}

/// Failures loading voicemail configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("No config file to reload from")]
    NoSource,

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}")]
    InvalidLogFormat(String),

    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(String),
}

/// Umbrella error for the voicemail crate
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Recording error: {0}")]
    Recording(#[from] RecordingError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid session start event: {0}")]
    InvalidStartEvent(String),

    #[error("No tokio runtime available to drive the session")]
    NoRuntime,

    #[error("Session task failed: {0}")]
    TaskFailed(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collaborator_errors_convert_into_session_error() {
        let err: SessionError = RecordingError::SaveFailed("disk full".into()).into();
        assert!(matches!(err, SessionError::Recording(RecordingError::SaveFailed(_))));
        assert_eq!(err.to_string(), "Recording error: Failed to save recording: disk full");

        let err: SessionError = AuthError::MailboxNotFound {
            domain: "example.com".into(),
            mailbox_number: "1234".into(),
        }
        .into();
        assert_eq!(err.to_string(), "Auth error: Mailbox 1234@example.com not found");
    }
}
