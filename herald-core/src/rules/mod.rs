//! Trigger rule table and per-event evaluation.
//!
//! Each event type maps to a list of [`TriggerRule`]s. A rule is either a
//! point trigger (`now >= moment`, no upper bound, safe to fire late) or a
//! window trigger (`from <= now < until`). Window triggers that fall between
//! two polls are skipped, never announced after the fact.

mod render;

pub use render::render_message;

use crate::classifier::{EventType, classify};
use crate::entities::CalendarEvent;
use crate::store::{IdempotencyKey, KEY_SEPARATOR};
use compact_str::CompactString;
use std::collections::HashMap;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

/// Errors found while validating a rule table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleTableError {
    #[error("invalid event type token {0:?}, expected [a-z0-9_]+")]
    InvalidType(String),

    #[error("rule for {event_type} has an invalid suffix {suffix:?}")]
    InvalidSuffix { event_type: String, suffix: String },

    #[error("rule suffix {suffix:?} is used twice for {event_type}")]
    DuplicateSuffix { event_type: String, suffix: String },

    #[error("rule {suffix:?} for {event_type} has an offset beyond {max_days} days")]
    OffsetOutOfRange {
        event_type: String,
        suffix: String,
        max_days: i64,
    },

    #[error("window rule {suffix:?} for {event_type} never opens")]
    EmptyWindow { event_type: String, suffix: String },
}

/// Largest offset a rule may use, either direction.
pub const MAX_RULE_OFFSET: Duration = Duration::days(366);

/// Which event boundary an offset is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Start,
    End,
}

/// An instant relative to one of an event's boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Moment {
    pub anchor: Anchor,
    pub offset: Duration,
}

impl Moment {
    pub fn at(anchor: Anchor) -> Self {
        Self {
            anchor,
            offset: Duration::ZERO,
        }
    }

    pub fn offset(anchor: Anchor, offset: Duration) -> Self {
        Self { anchor, offset }
    }

    /// The instant for `event`, or `None` when it falls outside the
    /// representable date range.
    pub fn resolve(&self, event: &CalendarEvent) -> Option<OffsetDateTime> {
        let base = match self.anchor {
            Anchor::Start => event.start,
            Anchor::End => event.end,
        };
        base.checked_add(self.offset)
    }
}

/// When a rule becomes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Due from `moment` onward, with no upper bound.
    At(Moment),
    /// Due only inside the half-open interval `[from, until)`.
    Window { from: Moment, until: Moment },
}

impl Trigger {
    /// Unrepresentable moments are never due.
    pub fn is_due(&self, event: &CalendarEvent, now: OffsetDateTime) -> bool {
        match self {
            Trigger::At(moment) => moment.resolve(event).is_some_and(|at| now >= at),
            Trigger::Window { from, until } => match (from.resolve(event), until.resolve(event)) {
                (Some(from), Some(until)) => from <= now && now < until,
                _ => false,
            },
        }
    }

    pub fn is_window(&self) -> bool {
        matches!(self, Trigger::Window { .. })
    }
}

/// One announcement for an event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRule {
    /// Last segment of the idempotency key. Unique within one event type.
    pub suffix: CompactString,
    pub trigger: Trigger,
    /// Message template, see [`render_message`].
    pub message: String,
}

impl TriggerRule {
    pub fn new(suffix: &str, trigger: Trigger, message: impl Into<String>) -> Self {
        Self {
            suffix: CompactString::from(suffix),
            trigger,
            message: message.into(),
        }
    }

    /// Fires once when the event starts.
    pub fn open_at_start(suffix: &str, message: impl Into<String>) -> Self {
        Self::new(suffix, Trigger::At(Moment::at(Anchor::Start)), message)
    }

    /// Fires once `delay` after the event ends.
    pub fn open_after_end(suffix: &str, delay: Duration, message: impl Into<String>) -> Self {
        Self::new(suffix, Trigger::At(Moment::offset(Anchor::End, delay)), message)
    }

    /// Fires once inside `[boundary - lead, boundary)`.
    pub fn warn_before(
        suffix: &str,
        boundary: Anchor,
        lead: Duration,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            suffix,
            Trigger::Window {
                from: Moment::offset(boundary, -lead),
                until: Moment::at(boundary),
            },
            message,
        )
    }

    /// Fires once when `boundary` is reached.
    pub fn close_at(suffix: &str, boundary: Anchor, message: impl Into<String>) -> Self {
        Self::new(suffix, Trigger::At(Moment::at(boundary)), message)
    }
}

/// A rule that is due for a specific event instance.
#[derive(Debug, Clone)]
pub struct DueTrigger<'a> {
    pub key: IdempotencyKey,
    pub event: &'a CalendarEvent,
    pub rule: &'a TriggerRule,
}

/// Static mapping from event type to its rules.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    types: HashMap<EventType, Vec<TriggerRule>>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the rules for `event_type`, replacing any previous list.
    pub fn insert(&mut self, event_type: EventType, rules: Vec<TriggerRule>) {
        self.types.insert(event_type, rules);
    }

    pub fn with(mut self, event_type: &str, rules: Vec<TriggerRule>) -> Self {
        self.insert(EventType::new(event_type), rules);
        self
    }

    pub fn rules_for(&self, event_type: &EventType) -> &[TriggerRule] {
        self.types.get(event_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// The table used when no rule file is configured.
    pub fn builtin() -> Self {
        Self::new()
            .with(
                "registration_window",
                vec![
                    TriggerRule::open_at_start(
                        "open",
                        "Registration for **{summary}** is now open! It closes {end_relative}. {mention}",
                    ),
                    TriggerRule::warn_before(
                        "warn",
                        Anchor::End,
                        Duration::hours(6),
                        "Last call: registration for **{summary}** closes {end_relative}. {mention}",
                    ),
                    TriggerRule::close_at(
                        "close",
                        Anchor::End,
                        "Registration for **{summary}** is now closed.",
                    ),
                ],
            )
            .with(
                "post_event_registration",
                vec![TriggerRule::open_after_end(
                    "open",
                    Duration::hours(24),
                    "Registration for the next **{summary}** is now open. {mention}",
                )],
            )
            .with(
                "single_warning",
                vec![TriggerRule::warn_before(
                    "warn",
                    Anchor::Start,
                    Duration::hours(1),
                    "**{summary}** starts {start_relative}. {mention}",
                )],
            )
    }

    /// Check tokens, suffixes and window bounds.
    pub fn validate(&self) -> Result<(), RuleTableError> {
        for (event_type, rules) in &self.types {
            if !EventType::is_valid_token(event_type.as_str()) {
                return Err(RuleTableError::InvalidType(event_type.to_string()));
            }
            let mut seen: Vec<&str> = Vec::with_capacity(rules.len());
            for rule in rules {
                let suffix = rule.suffix.as_str();
                if suffix.is_empty() || suffix.contains(KEY_SEPARATOR) {
                    return Err(RuleTableError::InvalidSuffix {
                        event_type: event_type.to_string(),
                        suffix: suffix.to_string(),
                    });
                }
                if seen.contains(&suffix) {
                    return Err(RuleTableError::DuplicateSuffix {
                        event_type: event_type.to_string(),
                        suffix: suffix.to_string(),
                    });
                }
                seen.push(suffix);

                let in_range = |moment: &Moment| moment.offset.abs() <= MAX_RULE_OFFSET;
                let offsets_ok = match &rule.trigger {
                    Trigger::At(moment) => in_range(moment),
                    Trigger::Window { from, until } => in_range(from) && in_range(until),
                };
                if !offsets_ok {
                    return Err(RuleTableError::OffsetOutOfRange {
                        event_type: event_type.to_string(),
                        suffix: suffix.to_string(),
                        max_days: MAX_RULE_OFFSET.whole_days(),
                    });
                }

                if let Trigger::Window { from, until } = rule.trigger {
                    if from.anchor == until.anchor && from.offset >= until.offset {
                        return Err(RuleTableError::EmptyWindow {
                            event_type: event_type.to_string(),
                            suffix: suffix.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Every rule of `event`'s type that is due at `now`, in table order.
    ///
    /// Untyped events and types without rules yield nothing. Whether a due
    /// trigger already fired is the caller's concern.
    pub fn evaluate<'a>(&'a self, event: &'a CalendarEvent, now: OffsetDateTime) -> Vec<DueTrigger<'a>> {
        let Some(event_type) = classify(event) else {
            return Vec::new();
        };
        self.rules_for(&event_type)
            .iter()
            .filter(|rule| rule.trigger.is_due(event, now))
            .map(|rule| DueTrigger {
                key: IdempotencyKey::announcement(event, &rule.suffix),
                event,
                rule,
            })
            .collect()
    }
}
