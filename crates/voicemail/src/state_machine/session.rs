//! Voicemail session actor
//!
//! One [`VoicemailSession`] drives one channel through
//! `init → authenticating → ready → done`. The session runs as a single tokio
//! task and owns all of its state. Collaborator calls are spawned as separate
//! tasks that post their completion back into the session's inbox, so the
//! session keeps reacting to channel events while a call is pending.
//!
//! Channel termination pre-empts everything: the session moves to `done`
//! immediately and stops its loop, so completions of calls still in flight
//! are dropped unread.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn, Instrument};

use super::guard::ChannelReleaseGuard;
use super::handle::SessionHandle;
use super::history::SessionHistory;
use crate::channel::{Channel, ChannelEvent, ChannelEventKind, ChannelEventSink, SubscriptionHandle};
use crate::collaborators::{PromptFactory, RecordingWriter, SessionDependencies};
use crate::config::{ConfigProvider, SessionAction};
use crate::errors::{AuthError, ChannelError, Result, SessionError};
use crate::types::{DtmfDigit, Mailbox, SessionId, SessionState};

/// Message delivered to the session besides channel events
#[derive(Debug)]
pub(crate) enum SessionMessage {
    /// A collaborator call finished
    Completed(Completion),
    /// Action injected through the session handle
    Control(SessionAction),
    /// The recording sequence is over; the channel must be released
    ReleaseChannel,
}

/// Result of a collaborator call
#[derive(Debug)]
pub(crate) enum Completion {
    Answer(std::result::Result<(), ChannelError>),
    Authenticate(std::result::Result<Mailbox, AuthError>),
    Hangup(std::result::Result<(), ChannelError>),
}

/// Voicemail recording session for a single channel
pub struct VoicemailSession {
    id: SessionId,
    state: SessionState,

    domain: String,
    mailbox_number: String,
    busy: bool,

    /// Set once the channel is known to be gone; shared with the recording task
    hung_up: Arc<AtomicBool>,
    hangup_requested: bool,

    mailbox: Option<Mailbox>,
    writer: Option<Arc<dyn RecordingWriter>>,

    hangup_subscription: Option<SubscriptionHandle>,
    digit_subscription: Option<SubscriptionHandle>,

    channel: Arc<dyn Channel>,
    deps: SessionDependencies,
    history: SessionHistory,

    state_tx: watch::Sender<SessionState>,
    events_tx: ChannelEventSink,
    events_rx: Option<mpsc::UnboundedReceiver<ChannelEvent>>,
    messages_tx: mpsc::UnboundedSender<SessionMessage>,
    messages_rx: Option<mpsc::UnboundedReceiver<SessionMessage>>,
}

impl VoicemailSession {
    /// Create a session in `init` without running it
    pub fn new(
        domain: impl Into<String>,
        mailbox_number: impl Into<String>,
        busy: bool,
        channel: Arc<dyn Channel>,
        deps: SessionDependencies,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Init);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (messages_tx, messages_rx) = mpsc::unbounded_channel();

        Self {
            id: SessionId::new(),
            state: SessionState::Init,
            domain: domain.into(),
            mailbox_number: mailbox_number.into(),
            busy,
            hung_up: Arc::new(AtomicBool::new(false)),
            hangup_requested: false,
            mailbox: None,
            writer: None,
            hangup_subscription: None,
            digit_subscription: None,
            channel,
            deps,
            history: SessionHistory::default(),
            state_tx,
            events_tx,
            events_rx: Some(events_rx),
            messages_tx,
            messages_rx: Some(messages_rx),
        }
    }

    /// Create a session and start driving it on the current tokio runtime
    pub fn start(
        domain: impl Into<String>,
        mailbox_number: impl Into<String>,
        busy: bool,
        channel: Arc<dyn Channel>,
        deps: SessionDependencies,
    ) -> Result<SessionHandle> {
        Self::new(domain, mailbox_number, busy, channel, deps).spawn()
    }

    /// Start driving this session on the current tokio runtime
    pub fn spawn(self) -> Result<SessionHandle> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        let channel_id = self.channel.id();
        let span = tracing::info_span!(
            "voicemail_session",
            component = "voicemail-fsm",
            session_id = %self.id,
            channel = %channel_id,
        );

        let session_id = self.id.clone();
        let state_rx = self.state_tx.subscribe();
        let control_tx = self.messages_tx.clone();
        let task = runtime.spawn(self.run().instrument(span));

        Ok(SessionHandle::new(session_id, channel_id, state_rx, control_tx, task))
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_hung_up(&self) -> bool {
        self.hung_up.load(Ordering::SeqCst)
    }

    pub fn mailbox(&self) -> Option<&Mailbox> {
        self.mailbox.as_ref()
    }

    pub fn has_writer(&self) -> bool {
        self.writer.is_some()
    }

    /// Drive the session until it reaches `done`
    pub(crate) async fn run(mut self) -> SessionHistory {
        let (Some(mut events_rx), Some(mut messages_rx)) = (self.events_rx.take(), self.messages_rx.take()) else {
            error!("session {} was already run", self.id);
            return self.history;
        };

        debug!(domain = %self.domain, mailbox_number = %self.mailbox_number, busy = self.busy, "Starting voicemail session");
        self.enter_init();

        while !self.state.is_terminal() {
            tokio::select! {
                biased;

                Some(event) = events_rx.recv() => self.handle_channel_event(event),
                Some(message) = messages_rx.recv() => self.handle_message(message),
                else => {
                    warn!("session inboxes closed before reaching done");
                    break;
                }
            }
        }

        info!(transitions = self.history.len(), "Voicemail session finished");
        self.history.hung_up = self.is_hung_up();
        self.history
    }

    /// React to an event from the channel
    pub(crate) fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Terminated => self.on_channel_terminated(),
            ChannelEvent::DigitReceived { digit } => self.on_digit(digit),
        }
    }

    fn handle_message(&mut self, message: SessionMessage) {
        if self.state.is_terminal() {
            debug!(?message, "discarding message for spent session");
            return;
        }

        match message {
            SessionMessage::Completed(completion) => self.on_completion(completion),
            SessionMessage::Control(action) => self.handle_action(action),
            SessionMessage::ReleaseChannel => self.hangup(),
        }
    }

    /// Run the handler for `action` in the current state
    pub(crate) fn handle_action(&mut self, action: SessionAction) {
        match (self.state, action) {
            (SessionState::Ready, SessionAction::Stop) => {
                trace!("stop called");
                match &self.writer {
                    Some(writer) => writer.stop(),
                    None => warn!("stop requested without an active writer"),
                }
            }
            (SessionState::Done, _) => {
                warn!(%action, "called handle on spent session");
            }
            (state, action) => {
                debug!(%action, %state, "no handler for action in this state");
            }
        }
    }

    fn on_channel_terminated(&mut self) {
        trace!("hangup handler called");

        if self.state.is_terminal() {
            warn!("channel terminated event on spent session");
            return;
        }

        self.hung_up.store(true, Ordering::SeqCst);
        self.transition(SessionState::Done);
    }

    fn on_digit(&mut self, digit: char) {
        if self.state.is_terminal() {
            warn!(%digit, "digit received on spent session");
            return;
        }

        let Some(tone) = DtmfDigit::from_char(digit) else {
            debug!(%digit, state = %self.state, "ignoring non-DTMF input");
            return;
        };

        let config = self.deps.config.app_config();
        let action = config.mailbox_writer_inputs().action_for(self.state, tone);

        debug!(digit = %tone, action = ?action, state = %self.state, "dtmf received");

        if let Some(action) = action {
            self.handle_action(action);
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Answer(result) => self.on_answered(result),
            Completion::Authenticate(result) => self.on_authenticated(result),
            Completion::Hangup(result) => self.on_hangup_complete(result),
        }
    }

    fn on_answered(&mut self, result: std::result::Result<(), ChannelError>) {
        if self.state != SessionState::Init {
            debug!(state = %self.state, "ignoring stale answer completion");
            return;
        }

        match result {
            Ok(()) => self.transition(SessionState::Authenticating),
            Err(e) => {
                error!(error = %e, state = %self.state, "error answering channel");
                self.transition(SessionState::Done);
            }
        }
    }

    fn on_authenticated(&mut self, result: std::result::Result<Mailbox, AuthError>) {
        if self.state != SessionState::Authenticating {
            debug!(state = %self.state, "ignoring stale authentication completion");
            return;
        }

        match result {
            Ok(mut mailbox) => {
                mailbox.set_busy(self.busy);
                debug!(mailbox = %mailbox, busy = mailbox.busy, "mailbox initialized");
                self.mailbox = Some(mailbox);
                self.transition(SessionState::Ready);
            }
            Err(e) => {
                // No retries: any authentication failure ends the call
                error!(error = %e, state = %self.state, "error initializing authenticator");
                self.hangup();
            }
        }
    }

    fn on_hangup_complete(&mut self, result: std::result::Result<(), ChannelError>) {
        match result {
            Ok(()) => debug!("channel hung up"),
            Err(e) => warn!(error = %e, "hangup failed, treating channel as released"),
        }

        self.hung_up.store(true, Ordering::SeqCst);
        self.transition(SessionState::Done);
    }

    fn transition(&mut self, next: SessionState) {
        if self.state.is_terminal() {
            warn!(to = %next, "ignoring transition out of done");
            return;
        }
        if self.state == next {
            return;
        }

        let from = self.state;
        self.history.record(from, next);
        self.state = next;
        debug!(%from, to = %next, "session state changed");

        match next {
            SessionState::Init => {}
            SessionState::Authenticating => self.enter_authenticating(),
            SessionState::Ready => self.enter_ready(),
            SessionState::Done => self.enter_done(),
        }

        // Published after the entry action so observers never see a half-entered state
        self.state_tx.send_replace(next);
    }

    fn enter_init(&mut self) {
        trace!("In init state");

        self.hangup_subscription = Some(
            self.channel
                .subscribe(ChannelEventKind::Terminated, self.events_tx.clone()),
        );
        self.digit_subscription = Some(
            self.channel
                .subscribe(ChannelEventKind::DigitReceived, self.events_tx.clone()),
        );

        let channel = self.channel.clone();
        self.spawn_operation(async move { Completion::Answer(channel.answer().await) });
    }

    fn enter_authenticating(&mut self) {
        trace!("In authenticating state");

        let authenticator = self.deps.auth.create(self.channel.clone());
        let domain = self.domain.clone();
        let mailbox_number = self.mailbox_number.clone();

        self.spawn_operation(async move {
            Completion::Authenticate(authenticator.init(&domain, &mailbox_number).await)
        });
    }

    fn enter_ready(&mut self) {
        trace!("In ready state");

        let Some(mailbox) = self.mailbox.clone() else {
            error!("entered ready without a mailbox");
            self.hangup();
            return;
        };

        let writer = self.deps.mailbox.create_writer(&mailbox, self.channel.clone());
        self.writer = Some(writer.clone());

        let sequence = MessageSequence {
            writer,
            prompts: self.deps.prompt.clone(),
            config: self.deps.config.clone(),
            channel: self.channel.clone(),
            hung_up: self.hung_up.clone(),
        };
        let release = ChannelReleaseGuard::new(self.messages_tx.clone());

        tokio::spawn(
            async move {
                let _release = release;
                if let Err(e) = sequence.run().await {
                    // Swallowed: the channel is released either way
                    error!(error = %e, "error recording message");
                }
            }
            .in_current_span(),
        );
    }

    fn enter_done(&mut self) {
        trace!("In done state");

        self.writer = None;
        self.remove_hangup_listener();
        self.remove_digit_listener();
    }

    fn remove_hangup_listener(&mut self) {
        if let Some(handle) = self.hangup_subscription.take() {
            trace!(%handle, "removing hangup listener");
            self.channel.unsubscribe(handle);
        }
    }

    fn remove_digit_listener(&mut self) {
        if let Some(handle) = self.digit_subscription.take() {
            trace!(%handle, "removing digit listener");
            self.channel.unsubscribe(handle);
        }
    }

    /// Ask the channel to hang up, at most once per session
    fn hangup(&mut self) {
        trace!("hangup called");

        if self.state.is_terminal() || self.is_hung_up() {
            debug!("channel already released, skipping hangup");
            return;
        }
        if self.hangup_requested {
            debug!("hangup already requested");
            return;
        }

        self.hangup_requested = true;
        self.history.hangup_requested = true;

        let channel = self.channel.clone();
        self.spawn_operation(async move { Completion::Hangup(channel.hangup().await) });
    }

    fn spawn_operation<F>(&self, operation: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let messages = self.messages_tx.clone();
        tokio::spawn(
            async move {
                let completion = operation.await;
                if messages.send(SessionMessage::Completed(completion)).is_err() {
                    trace!("session finished before operation completed");
                }
            }
            .in_current_span(),
        );
    }
}

/// Record, save, then say goodbye
///
/// A message recorded before the caller hung up is still saved; only the
/// goodbye prompt depends on the channel being there.
struct MessageSequence {
    writer: Arc<dyn RecordingWriter>,
    prompts: Arc<dyn PromptFactory>,
    config: Arc<dyn ConfigProvider>,
    channel: Arc<dyn Channel>,
    hung_up: Arc<AtomicBool>,
}

impl MessageSequence {
    async fn run(&self) -> Result<()> {
        self.writer.record().await?;
        self.writer.save().await?;

        if self.channel_gone() {
            debug!("channel gone after saving, skipping goodbye prompt");
            return Ok(());
        }
        let config = self.config.app_config();
        let prompt = self.prompts.create(config.goodbye_prompt(), self.channel.clone());
        prompt.play().await?;

        Ok(())
    }

    fn channel_gone(&self) -> bool {
        self.hung_up.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StaticConfig, VoicemailConfig};
    use crate::memory::{MemoryAuthenticatorFactory, MemoryChannel, MemoryPromptFactory, MemoryWriterFactory};

    fn session_with(channel: Arc<MemoryChannel>) -> VoicemailSession {
        let deps = SessionDependencies::new(
            Arc::new(MemoryAuthenticatorFactory::accepting()),
            Arc::new(MemoryWriterFactory::new()),
            Arc::new(MemoryPromptFactory::new()),
            Arc::new(StaticConfig::new(VoicemailConfig::default())),
        );
        VoicemailSession::new("example.com", "1234", false, channel, deps)
    }

    #[tokio::test]
    async fn test_init_installs_both_listeners() {
        let channel = Arc::new(MemoryChannel::new("chan-1"));
        let mut session = session_with(channel.clone());

        session.enter_init();

        assert_eq!(channel.active_subscriptions(), 2);
        assert_eq!(session.state(), SessionState::Init);
    }

    #[tokio::test]
    async fn test_terminated_moves_any_state_to_done() {
        let channel = Arc::new(MemoryChannel::new("chan-1"));
        let mut session = session_with(channel.clone());
        session.enter_init();

        session.handle_channel_event(ChannelEvent::Terminated);

        assert_eq!(session.state(), SessionState::Done);
        assert!(session.is_hung_up());
        assert_eq!(channel.unsubscribe_calls(), 2);
        assert_eq!(channel.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_spent_session_ignores_everything() {
        let channel = Arc::new(MemoryChannel::new("chan-1"));
        let mut session = session_with(channel.clone());
        session.enter_init();
        session.handle_channel_event(ChannelEvent::Terminated);
        let transitions = session.history.len();

        session.handle_channel_event(ChannelEvent::Terminated);
        session.handle_channel_event(ChannelEvent::DigitReceived { digit: '#' });
        session.handle_action(SessionAction::Stop);
        session.handle_message(SessionMessage::ReleaseChannel);
        session.handle_message(SessionMessage::Completed(Completion::Authenticate(Ok(Mailbox::new(
            "example.com",
            "1234",
        )))));
        session.remove_hangup_listener();
        session.remove_digit_listener();
        session.hangup();

        assert_eq!(session.state(), SessionState::Done);
        assert_eq!(session.history.len(), transitions);
        assert!(session.mailbox().is_none());
        assert!(!session.has_writer());
        assert_eq!(channel.unsubscribe_calls(), 2);
        assert!(!session.hangup_requested);

        tokio::task::yield_now().await;
        assert_eq!(channel.hangup_calls(), 0);
    }

    #[tokio::test]
    async fn test_unmapped_digit_and_non_dtmf_input_are_ignored() {
        let channel = Arc::new(MemoryChannel::new("chan-1"));
        let mut session = session_with(channel.clone());
        session.enter_init();

        session.handle_channel_event(ChannelEvent::DigitReceived { digit: '#' });
        session.handle_channel_event(ChannelEvent::DigitReceived { digit: 'x' });

        assert_eq!(session.state(), SessionState::Init);
        assert!(session.history.is_empty());
        assert!(!session.hangup_requested);
    }

    #[tokio::test]
    async fn test_hangup_is_requested_once() {
        let channel = Arc::new(MemoryChannel::new("chan-1"));
        let mut session = session_with(channel.clone());
        session.enter_init();

        session.hangup();
        session.hangup();

        assert!(session.hangup_requested);
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(channel.hangup_calls(), 1);
    }

    #[tokio::test]
    async fn test_busy_flag_is_applied_to_mailbox() {
        let channel = Arc::new(MemoryChannel::new("chan-1"));
        let mut session = session_with(channel);
        session.busy = true;
        session.state = SessionState::Authenticating;

        session.on_authenticated(Ok(Mailbox::new("example.com", "1234")));

        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.mailbox().map(|m| m.busy).unwrap_or(false));
        assert!(session.has_writer());
    }
}
