//! Channel abstraction
//!
//! A [`Channel`] is the live telephony leg a session drives. Besides the two
//! control operations (answer and hangup) it offers event subscriptions:
//! registering returns a [`SubscriptionHandle`] and removing a handle that is
//! no longer registered is a no-op, so a subscriber can never remove somebody
//! else's listener or fail on a second removal.

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

use crate::errors::ChannelError;
use crate::types::ChannelId;

/// Kind of channel event a subscription listens for
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum ChannelEventKind {
    /// The channel has left the application (fires at most once)
    Terminated,
    /// A keypad digit was received (fires zero or more times)
    DigitReceived,
}

/// Event delivered by a channel to its subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Terminated,
    DigitReceived { digit: char },
}

impl ChannelEvent {
    pub fn kind(&self) -> ChannelEventKind {
        match self {
            Self::Terminated => ChannelEventKind::Terminated,
            Self::DigitReceived { .. } => ChannelEventKind::DigitReceived,
        }
    }
}

/// Sink a channel pushes events into
pub type ChannelEventSink = mpsc::UnboundedSender<ChannelEvent>;

/// Registration token returned by [`Channel::subscribe`]
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct SubscriptionHandle {
    id: u64,
    kind: ChannelEventKind,
}

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

impl SubscriptionHandle {
    /// Allocate a process-unique handle for a subscription of `kind`
    pub fn next(kind: ChannelEventKind) -> Self {
        Self {
            id: NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed),
            kind,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> ChannelEventKind {
        self.kind
    }
}

impl fmt::Display for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}({:?})", self.id, self.kind)
    }
}

/// Live telephony channel
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel identifier, used for logging
    fn id(&self) -> ChannelId;

    /// Answer the channel
    async fn answer(&self) -> Result<(), ChannelError>;

    /// Disconnect the channel
    async fn hangup(&self) -> Result<(), ChannelError>;

    /// Register `sink` for events of `kind`
    ///
    /// A `Terminated` subscription is dropped by the channel after it fires.
    fn subscribe(&self, kind: ChannelEventKind, sink: ChannelEventSink) -> SubscriptionHandle;

    /// Remove a subscription; returns whether it was still registered
    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool;
}
