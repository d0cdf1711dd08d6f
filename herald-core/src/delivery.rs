//! Notification delivery contract.

use crate::entities::ChannelId;
use async_trait::async_trait;
use std::borrow::Cow;
use thiserror::Error;

/// Longest message the chat platform accepts, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// The delivery policy shared by both schedulers.
///
/// A trigger's key is recorded as fired before its message is sent, and it
/// stays recorded whatever the send outcome. A crash or a transport error
/// between the two steps loses that message; it is never sent twice and
/// never retried. Turning this into at-least-once delivery would reintroduce
/// duplicate announcements after restarts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryGuarantee {
    /// At most one send attempt per idempotency key, no automatic retry.
    AtMostOncePerKey,
}

/// The only guarantee this crate implements.
pub const DELIVERY_GUARANTEE: DeliveryGuarantee = DeliveryGuarantee::AtMostOncePerKey;

/// Whether a scheduler pass actually sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Deliver,
    /// Record due triggers as fired without sending (boot-sync).
    Suppress,
}

impl DeliveryMode {
    pub fn is_suppressed(self) -> bool {
        self == DeliveryMode::Suppress
    }
}

/// Errors reported by a notification sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("message transport error: {0}")]
    Transport(String),

    #[error("destination {0} rejected the message")]
    Rejected(ChannelId),
}

/// Outbound message transport.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, destination: ChannelId, text: &str) -> Result<(), SinkError>;
}

/// Cut `text` down to [`MAX_MESSAGE_CHARS`], marking the cut with an ellipsis.
pub fn truncate_message(text: &str) -> Cow<'_, str> {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return Cow::Borrowed(text);
    }
    let mut cut: String = text.chars().take(MAX_MESSAGE_CHARS - 1).collect();
    cut.push('…');
    Cow::Owned(cut)
}
