//! Durable state: idempotency keys, scheduled reminders and channel config.
//!
//! The whole document is rewritten through a [`StatePersistence`] port after
//! every mutation. A failed write is logged and the in-memory state keeps
//! serving reads for the rest of the process lifetime.

mod json_file;
mod memory;

pub use json_file::JsonFilePersistence;
pub use memory::MemoryPersistence;

use crate::entities::{CalendarEvent, ChannelConfig, ScheduledReminder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Separator between idempotency key segments.
pub const KEY_SEPARATOR: char = ':';

/// Errors raised by a persistence backend.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("state file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("persistence backend unavailable: {0}")]
    Unavailable(String),
}

/// Key prefixes owned by each scheduler. Namespaces never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyNamespace {
    Announcement,
    Reminder,
}

impl KeyNamespace {
    pub fn prefix(self) -> &'static str {
        match self {
            KeyNamespace::Announcement => "ann",
            KeyNamespace::Reminder => "rem",
        }
    }
}

/// Deterministic identifier of one trigger instance.
///
/// Announcement keys are `ann:<uid>:<instance>:<suffix>`. The instance tag
/// has a fixed shape and suffixes cannot contain `:`, so keys stay distinct
/// even when a UID contains the separator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    pub fn announcement(event: &CalendarEvent, suffix: &str) -> Self {
        Self(format!(
            "{}{sep}{}{sep}{}{sep}{}",
            KeyNamespace::Announcement.prefix(),
            event.uid,
            event.instance_tag(),
            suffix,
            sep = KEY_SEPARATOR
        ))
    }

    pub fn reminder(id: Uuid) -> Self {
        Self(format!("{}{}{}", KeyNamespace::Reminder.prefix(), KEY_SEPARATOR, id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn namespace(&self) -> Option<KeyNamespace> {
        let (prefix, _) = self.0.split_once(KEY_SEPARATOR)?;
        [KeyNamespace::Announcement, KeyNamespace::Reminder]
            .into_iter()
            .find(|ns| ns.prefix() == prefix)
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The persisted document.
///
/// Idempotency keys are stored as top-level entries next to the
/// `scheduled` and `config` sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub scheduled: Vec<ScheduledReminder>,
    #[serde(default)]
    pub config: ChannelConfig,
    #[serde(flatten)]
    pub fired: BTreeMap<String, bool>,
}

/// Storage port for [`PersistedState`].
pub trait StatePersistence: Send + Sync {
    /// Load the stored document. A missing document is `Ok(default)`.
    fn load(&self) -> Result<PersistedState, PersistenceError>;

    /// Replace the stored document.
    fn flush(&self, state: &PersistedState) -> Result<(), PersistenceError>;
}

/// Store shared between the schedulers and the command handler.
pub type SharedStore = Arc<Mutex<StateStore>>;

/// In-memory state backed by a persistence port.
pub struct StateStore {
    state: PersistedState,
    defaults: ChannelConfig,
    persistence: Box<dyn StatePersistence>,
}

impl StateStore {
    /// Load state from `persistence`, starting empty when it cannot be read.
    ///
    /// `defaults` fill configuration fields that were never set by a command.
    pub fn open(persistence: impl StatePersistence + 'static, defaults: ChannelConfig) -> Self {
        let state = match persistence.load() {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "Failed to load persisted state, starting from empty state");
                PersistedState::default()
            }
        };
        debug!(
            keys = state.fired.len(),
            scheduled = state.scheduled.len(),
            "Loaded persisted state"
        );
        Self {
            state,
            defaults,
            persistence: Box::new(persistence),
        }
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    pub fn has(&self, key: &IdempotencyKey) -> bool {
        self.state.fired.get(key.as_str()).copied().unwrap_or(false)
    }

    /// Mark `key` as fired and flush.
    ///
    /// Returns `false` without touching storage when the key was already
    /// marked.
    pub fn mark(&mut self, key: &IdempotencyKey) -> bool {
        if self.has(key) {
            return false;
        }
        self.state.fired.insert(key.as_str().to_string(), true);
        self.flush();
        true
    }

    /// Whether any announcement key was ever recorded.
    pub fn has_announcement_keys(&self) -> bool {
        let prefix = KeyNamespace::Announcement.prefix();
        self.state.fired.keys().any(|key| {
            key.split_once(KEY_SEPARATOR)
                .is_some_and(|(head, _)| head == prefix)
        })
    }

    pub fn key_count(&self) -> usize {
        self.state.fired.len()
    }

    /// Configuration with process defaults applied.
    pub fn config(&self) -> ChannelConfig {
        self.state.config.clone().with_defaults(&self.defaults)
    }

    /// Apply `change` to the stored configuration and flush.
    pub fn update_config(&mut self, change: impl FnOnce(&mut ChannelConfig)) {
        change(&mut self.state.config);
        self.flush();
    }

    pub fn scheduled(&self) -> &[ScheduledReminder] {
        &self.state.scheduled
    }

    pub fn push_reminder(&mut self, reminder: ScheduledReminder) {
        self.state.scheduled.push(reminder);
        self.flush();
    }

    /// Record that the reminder `id` fired.
    ///
    /// Sets its `fired` flag and marks its key in the reminder namespace in
    /// one flush. Returns `false` if it was already recorded or is unknown.
    pub fn mark_reminder_fired(&mut self, id: Uuid) -> bool {
        let key = IdempotencyKey::reminder(id);
        let Some(reminder) = self.state.scheduled.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        if reminder.fired || self.state.fired.contains_key(key.as_str()) {
            reminder.fired = true;
            return false;
        }
        reminder.fired = true;
        self.state.fired.insert(key.as_str().to_string(), true);
        self.flush();
        true
    }

    /// Drop fired reminders together with their keys. Returns how many were
    /// removed.
    pub fn prune_fired(&mut self) -> usize {
        let before = self.state.scheduled.len();
        let fired = &mut self.state.fired;
        self.state.scheduled.retain(|reminder| {
            if reminder.fired {
                fired.remove(reminder.idempotency_key().as_str());
            }
            !reminder.fired
        });
        let pruned = before - self.state.scheduled.len();
        if pruned > 0 {
            self.flush();
        }
        pruned
    }

    fn flush(&self) {
        if let Err(e) = self.persistence.flush(&self.state) {
            error!(error = %e, "Failed to persist state, continuing with in-memory state");
        }
    }
}
