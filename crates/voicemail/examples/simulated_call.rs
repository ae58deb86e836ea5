//! Simulated voicemail call
//!
//! Runs one session against the in-memory channel: the caller leaves a
//! message for a busy mailbox and presses `#` after two seconds.
//!
//! ```sh
//! cargo run -p rvoip-voicemail --example simulated_call
//! RVOIP_VOICEMAIL_LOG=trace RVOIP_VOICEMAIL_CONFIG=voicemail.yaml cargo run -p rvoip-voicemail --example simulated_call
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rvoip_voicemail::config::StaticConfig;
use rvoip_voicemail::logging::{setup_logging, LoggingConfig};
use rvoip_voicemail::memory::{MemoryAuthenticatorFactory, MemoryChannel, MemoryPromptFactory, MemoryWriterFactory};
use rvoip_voicemail::{SessionDependencies, StartEvent, VoicemailApp, VoicemailConfig};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logging = match std::env::var(rvoip_voicemail::logging::LOG_LEVEL_ENV) {
        Ok(_) => LoggingConfig::from_env("simulated_call")?,
        Err(_) => LoggingConfig::new(Level::DEBUG, "simulated_call"),
    };
    setup_logging(&logging.with_session_spans())?;

    let writer = Arc::new(MemoryWriterFactory::new());
    let prompt = Arc::new(MemoryPromptFactory::new());
    let deps = SessionDependencies::new(
        Arc::new(MemoryAuthenticatorFactory::accepting()),
        writer.clone(),
        prompt.clone(),
        Arc::new(StaticConfig::new(VoicemailConfig::load())),
    );

    let channel = Arc::new(MemoryChannel::new("PJSIP/alice-00000001"));
    let app = VoicemailApp::new(deps);
    let handle = app
        .create(&StartEvent::new(["example.com", "1234", "busy"]), channel.clone())
        .context("failed to start voicemail session")?;

    info!("📞 Caller is leaving a message for 1234@example.com");

    let caller = channel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        info!("☎️  Caller presses #");
        caller.emit_digit('#');
    });

    let history = handle.wait_done().await?;

    for record in &history.transitions {
        info!(
            "  {} → {} at {}",
            record.from_state,
            record.to_state,
            record.timestamp.format("%H:%M:%S%.3f")
        );
    }
    info!(
        "✅ Session finished: saved={} prompts={} hangups={}",
        writer.saved(),
        prompt.plays(),
        channel.hangup_calls()
    );

    Ok(())
}
