//! Runtime channel and role configuration.

use super::{ChannelId, RoleId};
use serde::{Deserialize, Serialize};

/// Destinations and roles, mutable at runtime through commands.
///
/// Every field is optional: unset fields fall back to the process defaults
/// given at startup (see [`ChannelConfig::with_defaults`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Where announcements are posted.
    pub announce_channel: Option<ChannelId>,
    /// Where one-shot reminders are posted. Falls back to `announce_channel`.
    pub reminder_channel: Option<ChannelId>,
    /// Role mentioned in announcements and reminders.
    pub mention_role: Option<RoleId>,
    /// Role allowed to run commands. Administrators only while unset.
    pub access_role: Option<RoleId>,
}

impl ChannelConfig {
    /// Fill every unset field from `defaults`.
    pub fn with_defaults(self, defaults: &ChannelConfig) -> Self {
        Self {
            announce_channel: self.announce_channel.or(defaults.announce_channel),
            reminder_channel: self.reminder_channel.or(defaults.reminder_channel),
            mention_role: self.mention_role.or(defaults.mention_role),
            access_role: self.access_role.or(defaults.access_role),
        }
    }

    pub fn reminder_destination(&self) -> Option<ChannelId> {
        self.reminder_channel.or(self.announce_channel)
    }

    /// Mention text for outgoing messages; `fallback` is used when no role is set.
    pub fn mention(&self, fallback: &str) -> String {
        match self.mention_role {
            Some(role) => role.mention(),
            None => fallback.to_string(),
        }
    }
}

impl std::fmt::Display for ChannelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn channel(id: Option<ChannelId>) -> String {
            id.map(ChannelId::mention).unwrap_or_else(|| "not set".to_string())
        }
        fn role(id: Option<RoleId>) -> String {
            id.map(RoleId::mention).unwrap_or_else(|| "not set".to_string())
        }
        writeln!(f, "Announcement channel: {}", channel(self.announce_channel))?;
        writeln!(f, "Reminder channel: {}", channel(self.reminder_destination()))?;
        writeln!(f, "Mention role: {}", role(self.mention_role))?;
        write!(f, "Access role: {}", role(self.access_role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_only_fill_unset_fields() {
        let defaults = ChannelConfig {
            announce_channel: ChannelId::new(1),
            mention_role: RoleId::new(2),
            ..Default::default()
        };
        let configured = ChannelConfig {
            announce_channel: ChannelId::new(10),
            ..Default::default()
        };
        let merged = configured.with_defaults(&defaults);
        assert_eq!(merged.announce_channel, ChannelId::new(10));
        assert_eq!(merged.mention_role, RoleId::new(2));
        assert_eq!(merged.access_role, None);
    }

    #[test]
    fn test_reminder_destination_falls_back() {
        let config = ChannelConfig {
            announce_channel: ChannelId::new(5),
            ..Default::default()
        };
        assert_eq!(config.reminder_destination(), ChannelId::new(5));
        assert_eq!(config.mention("@here"), "@here");
    }
}
