//! In-process channel and collaborators
//!
//! These stand in for a real telephony stack in tests and demos. Every
//! implementation counts the calls made into it and can be told to fail, and
//! the authenticator can be held back by a [`Gate`] to keep a session parked
//! in `authenticating`.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

use crate::channel::{Channel, ChannelEvent, ChannelEventKind, ChannelEventSink, SubscriptionHandle};
use crate::collaborators::{
    Authenticator, AuthenticatorFactory, MailboxWriterFactory, Prompt, PromptFactory, RecordingWriter,
};
use crate::config::PromptSpec;
use crate::errors::{AuthError, ChannelError, PromptError, RecordingError};
use crate::types::{ChannelId, Mailbox};

/// One-shot latch that async code can wait on
#[derive(Debug, Default)]
pub struct Gate {
    open: AtomicBool,
    notify: Notify,
}

impl Gate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        self.open.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub async fn wait(&self) {
        loop {
            // Register before checking so an open() in between is not missed
            let notified = self.notify.notified();
            if self.is_open() {
                return;
            }
            notified.await;
        }
    }
}

/// Channel living entirely in memory
///
/// Successful hangups terminate the channel, which notifies `Terminated`
/// subscribers the way a real channel leaving the application would.
#[derive(Debug)]
pub struct MemoryChannel {
    id: ChannelId,
    subscriptions: Mutex<HashMap<SubscriptionHandle, ChannelEventSink>>,
    answer_error: Option<ChannelError>,
    hangup_error: Option<ChannelError>,
    terminate_on_hangup: bool,
    terminated: AtomicBool,
    answer_calls: AtomicUsize,
    hangup_calls: AtomicUsize,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
}

impl MemoryChannel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: ChannelId::new(id),
            subscriptions: Mutex::new(HashMap::new()),
            answer_error: None,
            hangup_error: None,
            terminate_on_hangup: true,
            terminated: AtomicBool::new(false),
            answer_calls: AtomicUsize::new(0),
            hangup_calls: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
            unsubscribe_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_answer_error(mut self, error: ChannelError) -> Self {
        self.answer_error = Some(error);
        self
    }

    pub fn with_hangup_error(mut self, error: ChannelError) -> Self {
        self.hangup_error = Some(error);
        self
    }

    /// Keep the channel alive after a successful hangup
    pub fn without_termination_on_hangup(mut self) -> Self {
        self.terminate_on_hangup = false;
        self
    }

    /// Deliver a keypad digit; returns the number of subscribers reached
    pub fn emit_digit(&self, digit: char) -> usize {
        self.deliver(ChannelEventKind::DigitReceived, ChannelEvent::DigitReceived { digit }, false)
    }

    /// Terminate the channel; returns the number of subscribers reached
    ///
    /// Only the first call has any effect.
    pub fn emit_terminated(&self) -> usize {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return 0;
        }
        self.deliver(ChannelEventKind::Terminated, ChannelEvent::Terminated, true)
    }

    fn deliver(&self, kind: ChannelEventKind, event: ChannelEvent, once: bool) -> usize {
        let mut subscriptions = self.subscriptions.lock();
        let handles: Vec<SubscriptionHandle> = subscriptions
            .keys()
            .filter(|handle| handle.kind() == kind)
            .copied()
            .collect();

        let mut delivered = 0;
        for handle in handles {
            let sent = subscriptions
                .get(&handle)
                .map(|sink| sink.send(event.clone()).is_ok())
                .unwrap_or(false);
            if sent {
                delivered += 1;
            }
            if once || !sent {
                subscriptions.remove(&handle);
            }
        }
        delivered
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.lock().len()
    }

    pub fn answer_calls(&self) -> usize {
        self.answer_calls.load(Ordering::SeqCst)
    }

    pub fn hangup_calls(&self) -> usize {
        self.hangup_calls.load(Ordering::SeqCst)
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    fn id(&self) -> ChannelId {
        self.id.clone()
    }

    async fn answer(&self) -> Result<(), ChannelError> {
        self.answer_calls.fetch_add(1, Ordering::SeqCst);
        if self.is_terminated() {
            return Err(ChannelError::Gone(self.id.to_string()));
        }
        match &self.answer_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn hangup(&self) -> Result<(), ChannelError> {
        self.hangup_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.hangup_error {
            return Err(error.clone());
        }
        if self.terminate_on_hangup {
            self.emit_terminated();
        }
        Ok(())
    }

    fn subscribe(&self, kind: ChannelEventKind, sink: ChannelEventSink) -> SubscriptionHandle {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let handle = SubscriptionHandle::next(kind);
        self.subscriptions.lock().insert(handle, sink);
        handle
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.lock().remove(&handle).is_some()
    }
}

#[derive(Debug, Default)]
struct AuthStats {
    created: AtomicUsize,
    init_calls: AtomicUsize,
    completed: AtomicUsize,
}

/// Authenticator factory resolving every mailbox it is asked for
#[derive(Debug, Clone)]
pub struct MemoryAuthenticatorFactory {
    error: Option<AuthError>,
    gate: Option<Arc<Gate>>,
    stats: Arc<AuthStats>,
}

impl MemoryAuthenticatorFactory {
    /// Accept any `(domain, mailbox_number)`
    pub fn accepting() -> Self {
        Self {
            error: None,
            gate: None,
            stats: Arc::new(AuthStats::default()),
        }
    }

    /// Reject every mailbox with `error`
    pub fn rejecting(error: AuthError) -> Self {
        Self {
            error: Some(error),
            ..Self::accepting()
        }
    }

    /// Hold every `init` until `gate` opens
    pub fn with_gate(mut self, gate: Arc<Gate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn created(&self) -> usize {
        self.stats.created.load(Ordering::SeqCst)
    }

    pub fn init_calls(&self) -> usize {
        self.stats.init_calls.load(Ordering::SeqCst)
    }

    /// Number of `init` calls that have returned
    pub fn completed(&self) -> usize {
        self.stats.completed.load(Ordering::SeqCst)
    }
}

impl AuthenticatorFactory for MemoryAuthenticatorFactory {
    fn create(&self, _channel: Arc<dyn Channel>) -> Box<dyn Authenticator> {
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        Box::new(MemoryAuthenticator {
            factory: self.clone(),
        })
    }
}

struct MemoryAuthenticator {
    factory: MemoryAuthenticatorFactory,
}

#[async_trait]
impl Authenticator for MemoryAuthenticator {
    async fn init(&self, domain: &str, mailbox_number: &str) -> Result<Mailbox, AuthError> {
        let stats = &self.factory.stats;
        stats.init_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.factory.gate {
            gate.wait().await;
        }

        let result = match &self.factory.error {
            Some(error) => Err(error.clone()),
            None => Ok(Mailbox::new(domain, mailbox_number)),
        };
        stats.completed.fetch_add(1, Ordering::SeqCst);
        result
    }
}

#[derive(Debug, Default)]
struct WriterStats {
    created: AtomicUsize,
    record_calls: AtomicUsize,
    save_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    saved: AtomicUsize,
    last_mailbox: Mutex<Option<Mailbox>>,
}

/// Writer factory whose writers record until stopped
#[derive(Debug, Clone)]
pub struct MemoryWriterFactory {
    finish_immediately: bool,
    end_on_hangup: bool,
    save_gate: Option<Arc<Gate>>,
    record_error: Option<RecordingError>,
    save_error: Option<RecordingError>,
    stats: Arc<WriterStats>,
}

impl MemoryWriterFactory {
    pub fn new() -> Self {
        Self {
            finish_immediately: false,
            end_on_hangup: false,
            save_gate: None,
            record_error: None,
            save_error: None,
            stats: Arc::new(WriterStats::default()),
        }
    }

    /// Recordings end on their own without waiting for `stop`
    pub fn finishing_immediately(mut self) -> Self {
        self.finish_immediately = true;
        self
    }

    /// Recordings also end when the channel terminates, like a recorder
    /// losing its media stream
    pub fn ending_on_hangup(mut self) -> Self {
        self.end_on_hangup = true;
        self
    }

    /// Hold every `save` until `gate` opens
    pub fn with_save_gate(mut self, gate: Arc<Gate>) -> Self {
        self.save_gate = Some(gate);
        self
    }

    pub fn with_record_error(mut self, error: RecordingError) -> Self {
        self.record_error = Some(error);
        self
    }

    pub fn with_save_error(mut self, error: RecordingError) -> Self {
        self.save_error = Some(error);
        self
    }

    pub fn writers_created(&self) -> usize {
        self.stats.created.load(Ordering::SeqCst)
    }

    pub fn record_calls(&self) -> usize {
        self.stats.record_calls.load(Ordering::SeqCst)
    }

    pub fn save_calls(&self) -> usize {
        self.stats.save_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stats.stop_calls.load(Ordering::SeqCst)
    }

    /// Number of messages successfully saved
    pub fn saved(&self) -> usize {
        self.stats.saved.load(Ordering::SeqCst)
    }

    /// Mailbox handed to the most recent `create_writer`
    pub fn last_mailbox(&self) -> Option<Mailbox> {
        self.stats.last_mailbox.lock().clone()
    }
}

impl Default for MemoryWriterFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MailboxWriterFactory for MemoryWriterFactory {
    fn create_writer(&self, mailbox: &Mailbox, channel: Arc<dyn Channel>) -> Arc<dyn RecordingWriter> {
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        *self.stats.last_mailbox.lock() = Some(mailbox.clone());

        let hangup = self.end_on_hangup.then(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            (channel.subscribe(ChannelEventKind::Terminated, tx), rx)
        });

        Arc::new(MemoryWriter {
            factory: self.clone(),
            channel,
            hangup: Mutex::new(hangup),
            stopped: AtomicBool::new(false),
            stop_notify: Notify::new(),
        })
    }
}

struct MemoryWriter {
    factory: MemoryWriterFactory,
    channel: Arc<dyn Channel>,
    hangup: Mutex<Option<(SubscriptionHandle, mpsc::UnboundedReceiver<ChannelEvent>)>>,
    stopped: AtomicBool,
    stop_notify: Notify,
}

impl MemoryWriter {
    async fn wait_for_stop(&self) {
        while !self.stopped.load(Ordering::SeqCst) {
            self.stop_notify.notified().await;
        }
    }
}

#[async_trait]
impl RecordingWriter for MemoryWriter {
    async fn record(&self) -> Result<(), RecordingError> {
        self.factory.stats.record_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = &self.factory.record_error {
            return Err(error.clone());
        }
        if self.factory.finish_immediately {
            return Ok(());
        }

        let hangup = self.hangup.lock().take();
        match hangup {
            Some((handle, mut terminated)) => {
                tokio::select! {
                    _ = self.wait_for_stop() => {}
                    _ = terminated.recv() => tracing::debug!("channel terminated, recording ended"),
                }
                self.channel.unsubscribe(handle);
            }
            None => self.wait_for_stop().await,
        }
        Ok(())
    }

    async fn save(&self) -> Result<(), RecordingError> {
        self.factory.stats.save_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.factory.save_gate {
            gate.wait().await;
        }

        if let Some(error) = &self.factory.save_error {
            return Err(error.clone());
        }
        self.factory.stats.saved.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.factory.stats.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
        // notify_one keeps a permit if record() is not waiting yet
        self.stop_notify.notify_one();
    }
}

#[derive(Debug, Default)]
struct PromptStats {
    created: AtomicUsize,
    plays: AtomicUsize,
    last_spec: Mutex<Option<PromptSpec>>,
}

/// Prompt factory whose prompts finish instantly
#[derive(Debug, Clone)]
pub struct MemoryPromptFactory {
    play_error: Option<PromptError>,
    stats: Arc<PromptStats>,
}

impl MemoryPromptFactory {
    pub fn new() -> Self {
        Self {
            play_error: None,
            stats: Arc::new(PromptStats::default()),
        }
    }

    pub fn with_play_error(mut self, error: PromptError) -> Self {
        self.play_error = Some(error);
        self
    }

    pub fn prompts_created(&self) -> usize {
        self.stats.created.load(Ordering::SeqCst)
    }

    pub fn plays(&self) -> usize {
        self.stats.plays.load(Ordering::SeqCst)
    }

    /// Spec handed to the most recent `create`
    pub fn last_spec(&self) -> Option<PromptSpec> {
        self.stats.last_spec.lock().clone()
    }
}

impl Default for MemoryPromptFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptFactory for MemoryPromptFactory {
    fn create(&self, spec: &PromptSpec, _channel: Arc<dyn Channel>) -> Box<dyn Prompt> {
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        *self.stats.last_spec.lock() = Some(spec.clone());
        Box::new(MemoryPrompt {
            factory: self.clone(),
        })
    }
}

struct MemoryPrompt {
    factory: MemoryPromptFactory,
}

#[async_trait]
impl Prompt for MemoryPrompt {
    async fn play(&self) -> Result<(), PromptError> {
        self.factory.stats.plays.fetch_add(1, Ordering::SeqCst);
        match &self.factory.play_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_terminated_fires_once_and_drops_subscription() {
        let channel = MemoryChannel::new("chan-1");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = channel.subscribe(ChannelEventKind::Terminated, tx);

        assert_eq!(channel.emit_terminated(), 1);
        assert_eq!(channel.emit_terminated(), 0);
        assert_eq!(rx.recv().await, Some(ChannelEvent::Terminated));

        // Already removed by the channel; removing again is harmless
        assert!(!channel.unsubscribe(handle));
        assert!(!channel.unsubscribe(handle));
    }

    #[tokio::test]
    async fn test_digits_reach_only_digit_subscribers() {
        let channel = MemoryChannel::new("chan-1");
        let (digits_tx, mut digits_rx) = mpsc::unbounded_channel();
        let (hangup_tx, mut hangup_rx) = mpsc::unbounded_channel();
        channel.subscribe(ChannelEventKind::DigitReceived, digits_tx);
        channel.subscribe(ChannelEventKind::Terminated, hangup_tx);

        assert_eq!(channel.emit_digit('5'), 1);
        assert_eq!(digits_rx.recv().await, Some(ChannelEvent::DigitReceived { digit: '5' }));
        assert!(hangup_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_hangup_terminates_channel() {
        let channel = MemoryChannel::new("chan-1");
        let (tx, mut rx) = mpsc::unbounded_channel();
        channel.subscribe(ChannelEventKind::Terminated, tx);

        channel.hangup().await.unwrap();

        assert!(channel.is_terminated());
        assert_eq!(rx.recv().await, Some(ChannelEvent::Terminated));
        assert!(channel.answer().await.is_err());
    }

    #[tokio::test]
    async fn test_writer_record_resolves_after_early_stop() {
        let factory = MemoryWriterFactory::new();
        let channel: Arc<dyn Channel> = Arc::new(MemoryChannel::new("chan-1"));
        let writer = factory.create_writer(&Mailbox::new("example.com", "1234"), channel);

        writer.stop();
        writer.record().await.unwrap();

        assert_eq!(factory.stop_calls(), 1);
        assert_eq!(factory.record_calls(), 1);
    }

    #[tokio::test]
    async fn test_writer_ending_on_hangup_resolves_when_channel_terminates() {
        let factory = MemoryWriterFactory::new().ending_on_hangup();
        let channel = Arc::new(MemoryChannel::new("chan-1"));
        let writer = factory.create_writer(&Mailbox::new("example.com", "1234"), channel.clone());
        assert_eq!(channel.active_subscriptions(), 1);

        assert_eq!(channel.emit_terminated(), 1);
        writer.record().await.unwrap();

        assert_eq!(factory.stop_calls(), 0);
        assert_eq!(channel.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_gate_releases_waiters() {
        let gate = Gate::new();
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait().await })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        gate.open();
        waiter.await.unwrap();
        gate.wait().await;
    }
}
