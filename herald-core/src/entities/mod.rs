pub mod calendar_event;
pub mod channel_config;
pub mod scheduled_reminder;

pub use calendar_event::{CalendarEvent, MISSING_UID};
pub use channel_config::ChannelConfig;
pub use scheduled_reminder::ScheduledReminder;

use serde::{Deserialize, Serialize};
use std::num::NonZeroU64;

/// Snowflake identifier of a chat channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(NonZeroU64);

/// Snowflake identifier of a guild role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoleId(NonZeroU64);

impl ChannelId {
    /// Returns `None` for the zero id, which the chat platform never assigns.
    pub fn new(id: u64) -> Option<Self> {
        NonZeroU64::new(id).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// Parse either a raw id (`123`) or a channel mention (`<#123>`).
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let raw = input
            .strip_prefix("<#")
            .and_then(|rest| rest.strip_suffix('>'))
            .unwrap_or(input);
        raw.parse().ok().and_then(Self::new)
    }

    pub fn mention(self) -> String {
        format!("<#{}>", self.0)
    }
}

impl RoleId {
    pub fn new(id: u64) -> Option<Self> {
        NonZeroU64::new(id).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// Parse either a raw id (`123`) or a role mention (`<@&123>`).
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let raw = input
            .strip_prefix("<@&")
            .and_then(|rest| rest.strip_suffix('>'))
            .unwrap_or(input);
        raw.parse().ok().and_then(Self::new)
    }

    pub fn mention(self) -> String {
        format!("<@&{}>", self.0)
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for RoleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
