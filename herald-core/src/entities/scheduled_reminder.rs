//! One-shot reminders created by the interactive picker.

use super::ChannelId;
use crate::store::IdempotencyKey;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A pre-rendered message to post once at `fire_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledReminder {
    pub id: Uuid,
    pub destination: ChannelId,
    #[serde(with = "time::serde::rfc3339")]
    pub fire_at: OffsetDateTime,
    pub message: String,
    #[serde(default)]
    pub fired: bool,
}

impl ScheduledReminder {
    pub fn new(destination: ChannelId, fire_at: OffsetDateTime, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            destination,
            fire_at,
            message: message.into(),
            fired: false,
        }
    }

    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        !self.fired && now >= self.fire_at
    }

    pub fn idempotency_key(&self) -> IdempotencyKey {
        IdempotencyKey::reminder(self.id)
    }
}
