//! Scoped channel release
//!
//! The recording sequence holds a [`ChannelReleaseGuard`] for as long as it
//! runs. Dropping the guard asks the session to hang up, which covers normal
//! completion, an early `?` return and a panicking collaborator alike.

use tokio::sync::mpsc;

use super::session::SessionMessage;

pub(crate) struct ChannelReleaseGuard {
    messages: Option<mpsc::UnboundedSender<SessionMessage>>,
}

impl ChannelReleaseGuard {
    pub(crate) fn new(messages: mpsc::UnboundedSender<SessionMessage>) -> Self {
        Self { messages: Some(messages) }
    }
}

impl Drop for ChannelReleaseGuard {
    fn drop(&mut self) {
        if let Some(messages) = self.messages.take() {
            // Session already finished if the inbox is closed
            if messages.send(SessionMessage::ReleaseChannel).is_err() {
                tracing::trace!("session gone before channel release");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_requests_release_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let _guard = ChannelReleaseGuard::new(tx);
        }
        assert!(matches!(rx.try_recv(), Ok(SessionMessage::ReleaseChannel)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_drop_after_session_gone_is_silent() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        drop(ChannelReleaseGuard::new(tx));
    }
}
