//! Application state shared between the gateway handler and the tasks.

use crate::config::Settings;
use crate::discord::SerenitySink;
use herald_core::calendar::{EventSnapshot, HttpCalendarSource};
use herald_core::commands::CommandHandler;
use herald_core::processors::{Announcer, ReminderScheduler};
use herald_core::store::{JsonFilePersistence, SharedStore, StateStore};
use std::sync::Arc;

/// Cloneable handle to every long-lived component (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub announcer: Arc<Announcer>,
    pub reminders: Arc<ReminderScheduler>,
    pub commands: Arc<CommandHandler>,
}

impl AppState {
    /// Open the state file and wire the schedulers to `sink`.
    pub fn new(settings: &Settings, sink: Arc<SerenitySink>) -> Self {
        let persistence = JsonFilePersistence::new(&settings.state_path);
        let store = StateStore::open(persistence, settings.defaults.clone()).into_shared();
        let snapshot = EventSnapshot::new();

        let announcer = Arc::new(Announcer::new(
            store.clone(),
            Arc::new(
                HttpCalendarSource::new(settings.calendar_url.clone())
                    .with_floating_zone(settings.calendar_zone),
            ),
            sink.clone(),
            Arc::new(settings.rules.clone()),
            snapshot.clone(),
            settings.mention.clone(),
        ));
        let reminders = Arc::new(ReminderScheduler::new(store.clone(), sink));
        let commands = Arc::new(CommandHandler::new(
            settings.prefix.clone(),
            store.clone(),
            snapshot,
            reminders.clone(),
            settings.mention.clone(),
        ));

        Self {
            store,
            announcer,
            reminders,
            commands,
        }
    }
}
