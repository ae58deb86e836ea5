//! Shared fixtures for voicemail session tests

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rvoip_voicemail::config::{ConfigProvider, StaticConfig, VoicemailConfig};
use rvoip_voicemail::memory::{MemoryAuthenticatorFactory, MemoryChannel, MemoryPromptFactory, MemoryWriterFactory};
use rvoip_voicemail::SessionDependencies;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("rvoip_voicemail=trace")
        .with_test_writer()
        .try_init();
}

/// In-memory collaborators plus the channel they serve
pub struct Fixture {
    pub channel: Arc<MemoryChannel>,
    pub auth: Arc<MemoryAuthenticatorFactory>,
    pub writer: Arc<MemoryWriterFactory>,
    pub prompt: Arc<MemoryPromptFactory>,
    pub config: Arc<dyn ConfigProvider>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            channel: Arc::new(MemoryChannel::new("test-channel")),
            auth: Arc::new(MemoryAuthenticatorFactory::accepting()),
            writer: Arc::new(MemoryWriterFactory::new()),
            prompt: Arc::new(MemoryPromptFactory::new()),
            config: Arc::new(StaticConfig::new(VoicemailConfig::default())),
        }
    }

    pub fn channel(mut self, channel: MemoryChannel) -> Self {
        self.channel = Arc::new(channel);
        self
    }

    pub fn auth(mut self, auth: MemoryAuthenticatorFactory) -> Self {
        self.auth = Arc::new(auth);
        self
    }

    pub fn writer(mut self, writer: MemoryWriterFactory) -> Self {
        self.writer = Arc::new(writer);
        self
    }

    pub fn prompt(mut self, prompt: MemoryPromptFactory) -> Self {
        self.prompt = Arc::new(prompt);
        self
    }

    pub fn config(mut self, config: Arc<dyn ConfigProvider>) -> Self {
        self.config = config;
        self
    }

    pub fn deps(&self) -> SessionDependencies {
        SessionDependencies::new(
            self.auth.clone(),
            self.writer.clone(),
            self.prompt.clone(),
            self.config.clone(),
        )
    }
}

/// Fail the test instead of hanging when `future` never completes
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, future)
        .await
        .expect("timed out waiting for session")
}

/// Give spawned tasks a chance to run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
