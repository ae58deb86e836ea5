//! Configuration providers
//!
//! Sessions ask their provider for the current configuration every time they
//! need it, so a reload is picked up by sessions already in progress.

use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::VoicemailConfig;
use crate::errors::ConfigError;

/// Supplies the configuration a session reads digit mappings and prompts from
pub trait ConfigProvider: Send + Sync {
    fn app_config(&self) -> Arc<VoicemailConfig>;
}

/// Provider holding a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct StaticConfig {
    config: Arc<VoicemailConfig>,
}

impl StaticConfig {
    pub fn new(config: VoicemailConfig) -> Self {
        Self { config: Arc::new(config) }
    }
}

impl ConfigProvider for StaticConfig {
    fn app_config(&self) -> Arc<VoicemailConfig> {
        self.config.clone()
    }
}

/// Provider whose configuration can be swapped while sessions run
#[derive(Debug)]
pub struct ReloadableConfig {
    current: ArcSwap<VoicemailConfig>,
    source: Option<PathBuf>,
}

impl ReloadableConfig {
    pub fn new(config: VoicemailConfig) -> Self {
        Self {
            current: ArcSwap::from_pointee(config),
            source: None,
        }
    }

    /// Load from a YAML file and remember it for [`reload`](Self::reload)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = VoicemailConfig::from_file(path)?;
        Ok(Self {
            current: ArcSwap::from_pointee(config),
            source: Some(path.to_path_buf()),
        })
    }

    /// Replace the configuration
    pub fn store(&self, config: VoicemailConfig) {
        self.current.store(Arc::new(config));
    }

    /// Re-read the source file; the previous configuration stays on error
    pub fn reload(&self) -> Result<(), ConfigError> {
        let path = self.source.as_ref().ok_or(ConfigError::NoSource)?;
        let config = VoicemailConfig::from_file(path)?;
        self.store(config);
        tracing::info!("Reloaded voicemail config from {}", path.display());
        Ok(())
    }
}

impl ConfigProvider for ReloadableConfig {
    fn app_config(&self) -> Arc<VoicemailConfig> {
        self.current.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionAction;
    use crate::types::{DtmfDigit, SessionState};
    use std::io::Write;

    #[test]
    fn test_reload_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "inputs:\n  mailbox_writer:\n    ready:\n      \"#\": stop").unwrap();

        let provider = ReloadableConfig::from_file(file.path()).unwrap();
        let before = provider.app_config();
        assert_eq!(
            before.mailbox_writer_inputs().action_for(SessionState::Ready, DtmfDigit::Pound),
            Some(SessionAction::Stop)
        );

        std::fs::write(file.path(), "inputs:\n  mailbox_writer:\n    ready:\n      \"*\": stop\n").unwrap();
        provider.reload().unwrap();

        let after = provider.app_config();
        assert_eq!(after.mailbox_writer_inputs().action_for(SessionState::Ready, DtmfDigit::Pound), None);
        assert_eq!(
            after.mailbox_writer_inputs().action_for(SessionState::Ready, DtmfDigit::Star),
            Some(SessionAction::Stop)
        );
        // Snapshots handed out earlier are unaffected
        assert!(before.mailbox_writer_inputs().action_for(SessionState::Ready, DtmfDigit::Pound).is_some());
    }

    #[test]
    fn test_failed_reload_keeps_previous_config() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "prompts:\n  mailbox_writer:\n    goodbye:\n      - sound: bye\n").unwrap();

        let provider = ReloadableConfig::from_file(file.path()).unwrap();
        std::fs::write(file.path(), "inputs: [not, a, map]\n").unwrap();

        assert!(provider.reload().is_err());
        assert_eq!(provider.app_config().goodbye_prompt().segments[0].sound, "bye");
    }

    #[test]
    fn test_reload_without_source() {
        let provider = ReloadableConfig::new(VoicemailConfig::default());
        assert!(matches!(provider.reload(), Err(ConfigError::NoSource)));
    }
}
