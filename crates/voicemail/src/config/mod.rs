//! Voicemail configuration
//!
//! Two things are configurable per deployment: which keypad digits trigger
//! which session action in each state, and the prompt played once the message
//! is saved. Both are read from YAML:
//!
//! ```yaml
//! inputs:
//!   mailbox_writer:
//!     ready:
//!       "#": stop
//! prompts:
//!   mailbox_writer:
//!     goodbye:
//!       - sound: vm-goodbye
//!         post_silence: 1
//! ```
//!
//! `*` and `#` must be quoted; unquoted `*` starts a YAML alias.

pub mod provider;

pub use provider::{ConfigProvider, ReloadableConfig, StaticConfig};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::errors::ConfigError;
use crate::types::{DtmfDigit, SessionState};

/// Environment variable naming a YAML file that overrides the defaults
pub const CONFIG_PATH_ENV: &str = "RVOIP_VOICEMAIL_CONFIG";

/// Action a digit can trigger inside the session
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionAction {
    /// Stop the recording in progress
    Stop,
}

impl fmt::Display for SessionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stop => f.write_str("stop"),
        }
    }
}

/// Digit-to-action table keyed by session state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DigitActionMap(HashMap<SessionState, HashMap<DtmfDigit, SessionAction>>);

impl DigitActionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with_action(mut self, state: SessionState, digit: DtmfDigit, action: SessionAction) -> Self {
        self.insert(state, digit, action);
        self
    }

    pub fn insert(&mut self, state: SessionState, digit: DtmfDigit, action: SessionAction) {
        self.0.entry(state).or_default().insert(digit, action);
    }

    /// Action mapped for `digit` in `state`, if any
    pub fn action_for(&self, state: SessionState, digit: DtmfDigit) -> Option<SessionAction> {
        self.0.get(&state).and_then(|digits| digits.get(&digit)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(HashMap::is_empty)
    }
}

/// One sound in a prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSegment {
    pub sound: String,
    /// Whether a keypress may skip this sound
    #[serde(default)]
    pub skipable: bool,
    /// Seconds of silence after the sound
    #[serde(default, alias = "postSilence")]
    pub post_silence: u32,
}

impl PromptSegment {
    pub fn new(sound: impl Into<String>) -> Self {
        Self {
            sound: sound.into(),
            skipable: false,
            post_silence: 0,
        }
    }

    pub fn with_post_silence(mut self, seconds: u32) -> Self {
        self.post_silence = seconds;
        self
    }
}

/// Ordered list of sounds making up a prompt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptSpec {
    pub segments: Vec<PromptSegment>,
}

impl PromptSpec {
    pub fn new(segments: Vec<PromptSegment>) -> Self {
        Self { segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Digit mappings per application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputsConfig {
    #[serde(default, alias = "mailboxWriter")]
    pub mailbox_writer: DigitActionMap,
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            mailbox_writer: DigitActionMap::new().with_action(
                SessionState::Ready,
                DtmfDigit::Pound,
                SessionAction::Stop,
            ),
        }
    }
}

/// Prompts used while leaving a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxWriterPrompts {
    /// Played after the message has been saved
    #[serde(default = "default_goodbye")]
    pub goodbye: PromptSpec,
}

fn default_goodbye() -> PromptSpec {
    PromptSpec::new(vec![PromptSegment::new("vm-goodbye").with_post_silence(1)])
}

impl Default for MailboxWriterPrompts {
    fn default() -> Self {
        Self {
            goodbye: default_goodbye(),
        }
    }
}

/// Prompts per application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default, alias = "mailboxWriter")]
    pub mailbox_writer: MailboxWriterPrompts,
}

/// Application configuration consumed by the session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoicemailConfig {
    #[serde(default)]
    pub inputs: InputsConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

impl VoicemailConfig {
    /// Parse configuration from a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Load the file named by [`CONFIG_PATH_ENV`], falling back to defaults
    pub fn load() -> Self {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => {
                tracing::info!("Loading voicemail config from: {}", path);
                match Self::from_file(&path) {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("Failed to load voicemail config from {}: {}, falling back to defaults", path, e);
                        Self::default()
                    }
                }
            }
            Err(_) => {
                tracing::debug!("Using default voicemail config");
                Self::default()
            }
        }
    }

    /// Digit-action table for the mailbox writer
    pub fn mailbox_writer_inputs(&self) -> &DigitActionMap {
        &self.inputs.mailbox_writer
    }

    /// Prompt played after the message is saved
    pub fn goodbye_prompt(&self) -> &PromptSpec {
        &self.prompts.mailbox_writer.goodbye
    }
}
