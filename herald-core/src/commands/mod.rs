//! Chat command surface.
//!
//! Text commands configure destinations and roles; `remind` opens the
//! [`picker`]. Every command and menu selection passes the [`access`] gate
//! before anything else happens.

pub mod access;
pub mod picker;

pub use access::{AccessDenied, Caller, authorize};
pub use picker::{EventRef, Menu, MenuOption, PickerAction};

use crate::calendar::EventSnapshot;
use crate::entities::{ChannelId, RoleId};
use crate::processors::ReminderScheduler;
use crate::store::SharedStore;
use crate::utils::timestamps::{chat_timestamp, parse_iso_date};
use std::sync::Arc;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetChannel(ChannelId),
    /// `None` falls back to the announcement channel.
    SetReminderChannel(Option<ChannelId>),
    SetRole(Option<RoleId>),
    SetAccessRole(Option<RoleId>),
    ShowConfig,
    Remind,
    Help,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Usage: `{0}`")]
    Usage(&'static str),
}

const CLEAR_WORD: &str = "none";

impl Command {
    /// Parse `text` as a command.
    ///
    /// Returns `None` for text that is not addressed to us: no prefix or an
    /// unknown command name.
    pub fn parse(prefix: &str, text: &str) -> Option<Result<Self, CommandError>> {
        let body = text.trim().strip_prefix(prefix)?;
        let mut words = body.split_whitespace();
        let name = words.next()?.to_ascii_lowercase();
        let argument = words.next();
        let command = match name.as_str() {
            "setchannel" => argument
                .and_then(ChannelId::parse)
                .map(Command::SetChannel)
                .ok_or(CommandError::Usage("setchannel <#channel>")),
            "setreminderchannel" => optional(argument, ChannelId::parse)
                .map(Command::SetReminderChannel)
                .ok_or(CommandError::Usage("setreminderchannel <#channel|none>")),
            "setrole" => optional(argument, RoleId::parse)
                .map(Command::SetRole)
                .ok_or(CommandError::Usage("setrole <@role|none>")),
            "setaccessrole" => optional(argument, RoleId::parse)
                .map(Command::SetAccessRole)
                .ok_or(CommandError::Usage("setaccessrole <@role|none>")),
            "config" => Ok(Command::ShowConfig),
            "remind" => Ok(Command::Remind),
            "help" => Ok(Command::Help),
            _ => return None,
        };
        Some(command)
    }
}

/// `Some(None)` for the clear word, `Some(Some(id))` for a parsable id.
fn optional<T>(argument: Option<&str>, parse: impl Fn(&str) -> Option<T>) -> Option<Option<T>> {
    let argument = argument?;
    if argument.eq_ignore_ascii_case(CLEAR_WORD) {
        return Some(None);
    }
    parse(argument).map(Some)
}

/// What the chat adapter should do in response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Not a command for us; stay silent.
    Ignored,
    Reply(String),
    Menu(Menu),
}

impl From<AccessDenied> for CommandOutcome {
    fn from(denied: AccessDenied) -> Self {
        CommandOutcome::Reply(denied.to_string())
    }
}

/// Handles commands and picker selections against shared state.
pub struct CommandHandler {
    prefix: String,
    store: SharedStore,
    snapshot: EventSnapshot,
    reminders: Arc<ReminderScheduler>,
    fallback_mention: String,
}

impl CommandHandler {
    pub fn new(
        prefix: impl Into<String>,
        store: SharedStore,
        snapshot: EventSnapshot,
        reminders: Arc<ReminderScheduler>,
        fallback_mention: impl Into<String>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            store,
            snapshot,
            reminders,
            fallback_mention: fallback_mention.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub async fn handle_message(&self, caller: &Caller, text: &str, now: OffsetDateTime) -> CommandOutcome {
        if caller.is_bot {
            return CommandOutcome::Ignored;
        }
        let Some(parsed) = Command::parse(&self.prefix, text) else {
            return CommandOutcome::Ignored;
        };
        let config = self.store.lock().await.config();
        if let Err(denied) = authorize(caller, &config) {
            return denied.into();
        }
        match parsed {
            Ok(command) => self.execute(command, now).await,
            Err(CommandError::Usage(usage)) => {
                CommandOutcome::Reply(format!("Usage: `{}{usage}`", self.prefix))
            }
        }
    }

    async fn execute(&self, command: Command, now: OffsetDateTime) -> CommandOutcome {
        match command {
            Command::SetChannel(channel) => {
                self.store
                    .lock()
                    .await
                    .update_config(|config| config.announce_channel = Some(channel));
                info!(%channel, "Announcement channel updated");
                CommandOutcome::Reply(format!("Announcements will be posted in {}.", channel.mention()))
            }
            Command::SetReminderChannel(channel) => {
                self.store
                    .lock()
                    .await
                    .update_config(|config| config.reminder_channel = channel);
                info!(channel = ?channel.map(ChannelId::get), "Reminder channel updated");
                CommandOutcome::Reply(match channel {
                    Some(channel) => format!("Reminders will be posted in {}.", channel.mention()),
                    None => "Reminders will be posted in the announcement channel.".to_string(),
                })
            }
            Command::SetRole(role) => {
                self.store.lock().await.update_config(|config| config.mention_role = role);
                info!(role = ?role.map(RoleId::get), "Mention role updated");
                CommandOutcome::Reply(match role {
                    Some(role) => format!("Announcements will mention {}.", role.mention()),
                    None => "Announcements will not mention a role.".to_string(),
                })
            }
            Command::SetAccessRole(role) => {
                self.store.lock().await.update_config(|config| config.access_role = role);
                info!(role = ?role.map(RoleId::get), "Access role updated");
                CommandOutcome::Reply(match role {
                    Some(role) => format!("Commands are now limited to {}.", role.mention()),
                    None => "Commands are now limited to administrators.".to_string(),
                })
            }
            Command::ShowConfig => CommandOutcome::Reply(self.store.lock().await.config().to_string()),
            Command::Remind => self.open_picker(now).await,
            Command::Help => CommandOutcome::Reply(self.help()),
        }
    }

    async fn open_picker(&self, now: OffsetDateTime) -> CommandOutcome {
        let events = self.snapshot.events().await;
        let Some(event) = picker::active_event(&events, now) else {
            return CommandOutcome::Reply("There is no upcoming event to set reminders for.".to_string());
        };
        match picker::date_menu(event) {
            Some(menu) => CommandOutcome::Menu(menu),
            None => CommandOutcome::Reply(format!("**{}** has no selectable dates.", event.title())),
        }
    }

    /// Handle a choice made in one of our menus.
    pub async fn handle_selection(
        &self,
        caller: &Caller,
        custom_id: &str,
        value: &str,
        now: OffsetDateTime,
    ) -> CommandOutcome {
        let Some(action) = PickerAction::parse(custom_id) else {
            return CommandOutcome::Ignored;
        };
        let config = self.store.lock().await.config();
        if let Err(denied) = authorize(caller, &config) {
            return denied.into();
        }
        match action {
            PickerAction::Date { event: event_ref } => {
                let Some(date) = parse_iso_date(value) else {
                    return CommandOutcome::Reply("That date could not be read.".to_string());
                };
                let Some(event) = self.snapshot.find_by(|event| event_ref.matches(event)).await else {
                    return event_gone();
                };
                match picker::hour_menu(&event, date) {
                    Some(menu) => CommandOutcome::Menu(menu),
                    None => CommandOutcome::Reply("No hour on that date falls inside the event.".to_string()),
                }
            }
            PickerAction::Hour { event: event_ref, date } => {
                let Ok(hour) = value.parse::<u8>() else {
                    return CommandOutcome::Reply("That hour could not be read.".to_string());
                };
                let Some(event) = self.snapshot.find_by(|event| event_ref.matches(event)).await else {
                    return event_gone();
                };
                let Some(destination) = config.reminder_destination() else {
                    return CommandOutcome::Reply(format!(
                        "No reminder channel is configured. Use `{}setreminderchannel` or `{}setchannel` first.",
                        self.prefix, self.prefix
                    ));
                };
                let plan = match picker::reminder_plan(&event, date, hour, now) {
                    Ok(plan) => plan,
                    Err(err) => {
                        warn!(uid = %event.uid, hour, error = %err, "Rejected reminder selection");
                        return CommandOutcome::Reply("That time is outside the event window.".to_string());
                    }
                };
                let mention = config.mention(&self.fallback_mention);
                let mut scheduled = 0;
                for planned in &plan.reminders {
                    let message = picker::reminder_message(&event, &mention, plan.start, planned.lead);
                    if self
                        .reminders
                        .schedule(destination, planned.fire_at, message, now)
                        .await
                        .is_some()
                    {
                        scheduled += 1;
                    }
                }
                CommandOutcome::Reply(match scheduled {
                    0 => "Both reminder times have already passed; nothing was scheduled.".to_string(),
                    1 => format!(
                        "Scheduled 1 reminder for **{}** at {}.",
                        event.title(),
                        chat_timestamp(plan.start, 'F')
                    ),
                    n => format!(
                        "Scheduled {n} reminders for **{}** at {}.",
                        event.title(),
                        chat_timestamp(plan.start, 'F')
                    ),
                })
            }
        }
    }

    fn help(&self) -> String {
        let p = &self.prefix;
        format!(
            "Commands:\n\
             `{p}setchannel <#channel>` choose where announcements go\n\
             `{p}setreminderchannel <#channel|none>` choose where reminders go\n\
             `{p}setrole <@role|none>` role mentioned in announcements\n\
             `{p}setaccessrole <@role|none>` role allowed to use commands\n\
             `{p}config` show the current configuration\n\
             `{p}remind` pick a time to be reminded of the current event\n\
             `{p}help` show this message"
        )
    }
}

fn event_gone() -> CommandOutcome {
    CommandOutcome::Reply("That event is no longer in the calendar.".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{CalendarEvent, ChannelConfig};
    use crate::store::{MemoryPersistence, StateStore};
    use crate::test_support::{RecordingSink, channel};
    use time::macros::{date, datetime};

    struct Fixture {
        handler: CommandHandler,
        store: SharedStore,
        persistence: MemoryPersistence,
    }

    async fn fixture(events: Vec<CalendarEvent>) -> Fixture {
        let persistence = MemoryPersistence::new();
        let store = StateStore::open(persistence.clone(), ChannelConfig::default()).into_shared();
        let snapshot = EventSnapshot::new();
        snapshot.replace(events).await;
        let reminders = Arc::new(ReminderScheduler::new(store.clone(), Arc::new(RecordingSink::new())));
        Fixture {
            handler: CommandHandler::new("!", store.clone(), snapshot, reminders, "@here"),
            store,
            persistence,
        }
    }

    fn cup() -> CalendarEvent {
        CalendarEvent::new(
            "cup-1",
            datetime!(2025-03-01 00:00 UTC),
            datetime!(2025-03-03 00:00 UTC),
        )
        .with_summary("Spring Cup")
        .with_description("Type: registration_window")
    }

    const NOW: OffsetDateTime = datetime!(2025-03-01 13:35 UTC);

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("!", "!setchannel <#42>"), Some(Ok(Command::SetChannel(channel(42)))));
        assert_eq!(
            Command::parse("!", "  !SetRole none "),
            Some(Ok(Command::SetRole(None)))
        );
        assert_eq!(
            Command::parse("!", "!setaccessrole <@&7>"),
            Some(Ok(Command::SetAccessRole(RoleId::new(7))))
        );
        assert_eq!(
            Command::parse("!", "!setchannel nowhere"),
            Some(Err(CommandError::Usage("setchannel <#channel>")))
        );
        assert_eq!(Command::parse("!", "!dance"), None);
        assert_eq!(Command::parse("!", "remind"), None);
        assert_eq!(Command::parse("!", "!"), None);
    }

    #[tokio::test]
    async fn test_non_admin_is_denied_before_usage_is_checked() {
        let f = fixture(vec![]).await;
        let outcome = f.handler.handle_message(&Caller::member(vec![]), "!setchannel", NOW).await;
        assert_eq!(outcome, CommandOutcome::Reply(AccessDenied.to_string()));
        assert_eq!(f.persistence.flush_count(), 0);
    }

    #[tokio::test]
    async fn test_bots_and_chatter_are_ignored() {
        let f = fixture(vec![]).await;
        let bot = Caller {
            is_bot: true,
            ..Caller::admin()
        };
        assert_eq!(f.handler.handle_message(&bot, "!help", NOW).await, CommandOutcome::Ignored);
        assert_eq!(
            f.handler.handle_message(&Caller::admin(), "good morning", NOW).await,
            CommandOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn test_access_role_hands_over_control() {
        let f = fixture(vec![]).await;
        let moderators = RoleId::new(7).unwrap();
        f.handler
            .handle_message(&Caller::admin(), "!setaccessrole <@&7>", NOW)
            .await;
        assert_eq!(f.store.lock().await.config().access_role, Some(moderators));

        let admin = f.handler.handle_message(&Caller::admin(), "!config", NOW).await;
        assert_eq!(admin, CommandOutcome::Reply(AccessDenied.to_string()));

        let moderator = Caller::member(vec![moderators]);
        f.handler.handle_message(&moderator, "!setchannel <#100>", NOW).await;
        assert_eq!(f.store.lock().await.config().announce_channel, Some(channel(100)));
    }

    #[tokio::test]
    async fn test_remind_without_active_event() {
        let f = fixture(vec![]).await;
        let outcome = f.handler.handle_message(&Caller::admin(), "!remind", NOW).await;
        assert!(matches!(outcome, CommandOutcome::Reply(text) if text.contains("no upcoming event")));
    }

    #[tokio::test]
    async fn test_picker_flow_schedules_remaining_reminder() {
        let f = fixture(vec![cup()]).await;
        let admin = Caller::admin();
        f.handler.handle_message(&admin, "!setreminderchannel <#55>", NOW).await;

        let CommandOutcome::Menu(dates) = f.handler.handle_message(&admin, "!remind", NOW).await else {
            panic!("expected a date menu");
        };
        assert_eq!(dates.custom_id, "herald:date:cup-1@20250301T000000Z");
        assert_eq!(dates.options.len(), 2);

        let CommandOutcome::Menu(hours) = f
            .handler
            .handle_selection(&admin, &dates.custom_id, "2025-03-01", NOW)
            .await
        else {
            panic!("expected an hour menu");
        };
        assert_eq!(hours.custom_id, "herald:hour:cup-1@20250301T000000Z:2025-03-01");
        assert_eq!(hours.options.len(), 24);
        assert_eq!(hours.options[14].label, "14:00 UTC");

        let outcome = f.handler.handle_selection(&admin, &hours.custom_id, "14", NOW).await;
        assert!(matches!(outcome, CommandOutcome::Reply(text) if text.starts_with("Scheduled 1 reminder")));

        let store = f.store.lock().await;
        let scheduled = store.scheduled();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].fire_at, datetime!(2025-03-01 13:50 UTC));
        assert_eq!(scheduled[0].destination, channel(55));
        assert!(scheduled[0].message.starts_with("@here **Spring Cup** starts"));
    }

    #[tokio::test]
    async fn test_picker_follows_the_offered_recurrence() {
        let mut ended = cup();
        ended.start = datetime!(2025-02-22 00:00 UTC);
        ended.end = datetime!(2025-02-24 00:00 UTC);
        let f = fixture(vec![ended, cup()]).await;
        let admin = Caller::admin();
        f.handler.handle_message(&admin, "!setchannel <#9>", NOW).await;

        let CommandOutcome::Menu(dates) = f.handler.handle_message(&admin, "!remind", NOW).await else {
            panic!("expected a date menu");
        };
        assert_eq!(dates.options[0].value, "2025-03-01");

        let CommandOutcome::Menu(hours) = f
            .handler
            .handle_selection(&admin, &dates.custom_id, "2025-03-01", NOW)
            .await
        else {
            panic!("expected an hour menu");
        };
        let outcome = f.handler.handle_selection(&admin, &hours.custom_id, "14", NOW).await;
        assert!(matches!(outcome, CommandOutcome::Reply(text) if text.starts_with("Scheduled 1 reminder")));
    }

    #[tokio::test]
    async fn test_hour_selection_requires_destination() {
        let f = fixture(vec![cup()]).await;
        let id = PickerAction::Hour {
            event: EventRef::of(&cup()),
            date: date!(2025-03-01),
        }
        .custom_id();
        let outcome = f.handler.handle_selection(&Caller::admin(), &id, "14", NOW).await;
        assert!(matches!(outcome, CommandOutcome::Reply(text) if text.contains("No reminder channel")));
        assert!(f.store.lock().await.scheduled().is_empty());
    }

    #[tokio::test]
    async fn test_selection_outside_window_is_rejected() {
        let f = fixture(vec![cup()]).await;
        f.handler.handle_message(&Caller::admin(), "!setchannel <#1>", NOW).await;
        let id = PickerAction::Hour {
            event: EventRef::of(&cup()),
            date: date!(2025-03-03),
        }
        .custom_id();
        let outcome = f.handler.handle_selection(&Caller::admin(), &id, "5", NOW).await;
        assert_eq!(
            outcome,
            CommandOutcome::Reply("That time is outside the event window.".to_string())
        );
    }

    #[tokio::test]
    async fn test_foreign_selection_is_ignored() {
        let f = fixture(vec![cup()]).await;
        let outcome = f
            .handler
            .handle_selection(&Caller::admin(), "other-bot:menu", "1", NOW)
            .await;
        assert_eq!(outcome, CommandOutcome::Ignored);
    }
}
