//! Interactive date/hour picker.
//!
//! Step one offers the UTC calendar days an event spans, step two the whole
//! hours of a chosen day that fall inside the event window. Choosing an
//! hour yields reminders 30 and 10 minutes before that instant; leads that
//! have already elapsed are dropped.

use crate::classifier::classify;
use crate::entities::CalendarEvent;
use crate::utils::timestamps::{chat_timestamp, iso_date, parse_iso_date};
use thiserror::Error;
use time::{Date, Duration, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};
use uuid::Uuid;

/// Options per menu accepted by the chat platform.
pub const MAX_MENU_OPTIONS: usize = 25;

/// How long before the chosen instant each reminder fires.
pub const REMINDER_LEADS: [Duration; 2] = [Duration::minutes(30), Duration::minutes(10)];

/// Longest custom id the chat platform accepts.
pub const MAX_CUSTOM_ID_LEN: usize = 100;

const CUSTOM_ID_PREFIX: &str = "herald:";

/// Room left for an [`EventRef`] in the longest custom id we build.
const MAX_EVENT_REF_LEN: usize =
    MAX_CUSTOM_ID_LEN - CUSTOM_ID_PREFIX.len() - "hour:".len() - ":YYYY-MM-DD".len();

/// Names one event instance inside a custom id.
///
/// Recurring instances share a uid, so the instance tag is included.
/// References that would not fit are replaced by a name-based UUID of the
/// same text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRef(String);

impl EventRef {
    pub fn of(event: &CalendarEvent) -> Self {
        let inline = format!("{}@{}", event.uid, event.instance_tag());
        if inline.len() <= MAX_EVENT_REF_LEN {
            return Self(inline);
        }
        let hashed = Uuid::new_v5(&Uuid::NAMESPACE_OID, inline.as_bytes());
        Self(format!("#{}", hashed.simple()))
    }

    pub fn matches(&self, event: &CalendarEvent) -> bool {
        *self == Self::of(event)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Errors for a selection that cannot be turned into reminders.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PickError {
    #[error("{0} is not an hour of the day")]
    InvalidHour(u8),

    #[error("the selected time is outside the event window")]
    OutsideWindow,
}

/// What a menu selection refers to, encoded in the menu's custom id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerAction {
    /// A date was chosen for `event`.
    Date { event: EventRef },
    /// An hour was chosen on `date` for `event`.
    Hour { event: EventRef, date: Date },
}

impl PickerAction {
    pub fn custom_id(&self) -> String {
        match self {
            PickerAction::Date { event } => format!("{CUSTOM_ID_PREFIX}date:{}", event.as_str()),
            PickerAction::Hour { event, date } => {
                format!("{CUSTOM_ID_PREFIX}hour:{}:{}", event.as_str(), iso_date(*date))
            }
        }
    }

    /// Decode a custom id produced by [`PickerAction::custom_id`].
    pub fn parse(custom_id: &str) -> Option<Self> {
        let rest = custom_id.strip_prefix(CUSTOM_ID_PREFIX)?;
        if let Some(event) = rest.strip_prefix("date:") {
            return Some(PickerAction::Date {
                event: EventRef(event.to_string()),
            });
        }
        let (event, date) = rest.strip_prefix("hour:")?.rsplit_once(':')?;
        Some(PickerAction::Hour {
            event: EventRef(event.to_string()),
            date: parse_iso_date(date)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuOption {
    pub label: String,
    pub value: String,
}

/// A single-choice selection menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Menu {
    pub custom_id: String,
    pub prompt: String,
    pub placeholder: String,
    pub options: Vec<MenuOption>,
}

/// A reminder the selection resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedReminder {
    pub fire_at: OffsetDateTime,
    pub lead: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderPlan {
    pub start: OffsetDateTime,
    pub reminders: Vec<PlannedReminder>,
}

/// The typed event the picker targets: the earliest-starting one that has
/// not ended yet.
pub fn active_event(events: &[CalendarEvent], now: OffsetDateTime) -> Option<&CalendarEvent> {
    events
        .iter()
        .filter(|event| event.end > now && classify(event).is_some())
        .min_by_key(|event| event.start)
}

/// UTC days overlapping `[start, end)`, capped at [`MAX_MENU_OPTIONS`].
pub fn selectable_dates(event: &CalendarEvent) -> Vec<Date> {
    if event.start >= event.end {
        return Vec::new();
    }
    let mut dates = Vec::new();
    let mut day = event.start.to_offset(UtcOffset::UTC).date();
    while dates.len() < MAX_MENU_OPTIONS && day.midnight().assume_utc() < event.end {
        dates.push(day);
        match day.next_day() {
            Some(next) => day = next,
            None => break,
        }
    }
    dates
}

/// Whole hours of `date` whose instant lies inside the event window.
pub fn selectable_hours(event: &CalendarEvent, date: Date) -> Vec<u8> {
    (0..24u8)
        .filter(|&hour| hour_instant(date, hour).is_some_and(|instant| event.contains(instant)))
        .collect()
}

pub fn date_menu(event: &CalendarEvent) -> Option<Menu> {
    let dates = selectable_dates(event);
    if dates.is_empty() {
        return None;
    }
    Some(Menu {
        custom_id: PickerAction::Date {
            event: EventRef::of(event),
        }
        .custom_id(),
        prompt: format!("Pick a date for **{}** (UTC).", event.title()),
        placeholder: "Date".to_string(),
        options: dates
            .into_iter()
            .map(|date| MenuOption {
                label: iso_date(date),
                value: iso_date(date),
            })
            .collect(),
    })
}

pub fn hour_menu(event: &CalendarEvent, date: Date) -> Option<Menu> {
    let hours = selectable_hours(event, date);
    if hours.is_empty() {
        return None;
    }
    Some(Menu {
        custom_id: PickerAction::Hour {
            event: EventRef::of(event),
            date,
        }
        .custom_id(),
        prompt: format!(
            "Pick a start hour on {} for **{}** (UTC).",
            iso_date(date),
            event.title()
        ),
        placeholder: "Hour".to_string(),
        options: hours
            .into_iter()
            .map(|hour| MenuOption {
                label: format!("{hour:02}:00 UTC"),
                value: hour.to_string(),
            })
            .collect(),
    })
}

/// Resolve a date/hour selection into the reminders still worth sending.
pub fn reminder_plan(
    event: &CalendarEvent,
    date: Date,
    hour: u8,
    now: OffsetDateTime,
) -> Result<ReminderPlan, PickError> {
    let start = hour_instant(date, hour).ok_or(PickError::InvalidHour(hour))?;
    if !event.contains(start) {
        return Err(PickError::OutsideWindow);
    }
    let reminders = REMINDER_LEADS
        .iter()
        .filter_map(|&lead| {
            let fire_at = start.checked_sub(lead)?;
            (fire_at > now).then_some(PlannedReminder { fire_at, lead })
        })
        .collect();
    Ok(ReminderPlan { start, reminders })
}

pub fn reminder_message(event: &CalendarEvent, mention: &str, start: OffsetDateTime, lead: Duration) -> String {
    format!(
        "{mention} **{}** starts {} ({} minutes).",
        event.title(),
        chat_timestamp(start, 'R'),
        lead.whole_minutes()
    )
    .trim()
    .to_string()
}

fn hour_instant(date: Date, hour: u8) -> Option<OffsetDateTime> {
    let time = Time::from_hms(hour, 0, 0).ok()?;
    Some(PrimitiveDateTime::new(date, time).assume_utc())
}
