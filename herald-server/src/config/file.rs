//! TOML rule file structures.
//!
//! These structs directly map to the file given with `--rules`.

use herald_core::classifier::EventType;
use herald_core::rules::{Anchor, Moment, RuleTable, Trigger, TriggerRule};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::Duration;

/// Root of the rule file: type token to rule list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleFile {
    #[serde(default)]
    pub types: BTreeMap<String, Vec<RuleEntry>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEntry {
    /// Last segment of the idempotency key; unique per type.
    pub suffix: String,
    /// Message template with `{summary}`-style placeholders.
    pub message: String,
    pub trigger: TriggerEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerEntry {
    /// Due from the moment on, with no upper bound.
    At {
        anchor: AnchorEntry,
        #[serde(default)]
        offset_minutes: i64,
    },
    /// Due in `[from, until)` only.
    Window { from: MomentEntry, until: MomentEntry },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MomentEntry {
    pub anchor: AnchorEntry,
    #[serde(default)]
    pub offset_minutes: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorEntry {
    Start,
    End,
}

/// Saturates instead of overflowing; `RuleTable::validate` rejects the result.
fn offset(minutes: i64) -> Duration {
    Duration::seconds(minutes.saturating_mul(60))
}

impl From<AnchorEntry> for Anchor {
    fn from(anchor: AnchorEntry) -> Self {
        match anchor {
            AnchorEntry::Start => Anchor::Start,
            AnchorEntry::End => Anchor::End,
        }
    }
}

impl From<MomentEntry> for Moment {
    fn from(moment: MomentEntry) -> Self {
        Moment::offset(moment.anchor.into(), offset(moment.offset_minutes))
    }
}

impl From<TriggerEntry> for Trigger {
    fn from(trigger: TriggerEntry) -> Self {
        match trigger {
            TriggerEntry::At {
                anchor,
                offset_minutes,
            } => Trigger::At(Moment::offset(anchor.into(), offset(offset_minutes))),
            TriggerEntry::Window { from, until } => Trigger::Window {
                from: from.into(),
                until: until.into(),
            },
        }
    }
}

impl RuleFile {
    /// Build the (not yet validated) rule table.
    pub fn into_table(self) -> RuleTable {
        let mut table = RuleTable::new();
        for (token, entries) in self.types {
            let rules = entries
                .into_iter()
                .map(|entry| TriggerRule::new(&entry.suffix, entry.trigger.into(), entry.message))
                .collect();
            table.insert(EventType::new(&token), rules);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_file_parsing() {
        let toml_str = r#"
[[types.registration_window]]
suffix = "open"
message = "Registration for **{summary}** is open until {end}. {mention}"
trigger = { kind = "at", anchor = "start" }

[[types.registration_window]]
suffix = "warn"
message = "Registration for **{summary}** closes {end_relative}. {mention}"
trigger = { kind = "window", from = { anchor = "end", offset_minutes = -360 }, until = { anchor = "end" } }

[[types.meetup]]
suffix = "recap"
message = "Thanks for joining **{summary}**!"
trigger = { kind = "at", anchor = "end", offset_minutes = 60 }
"#;
        let file: RuleFile = toml::from_str(toml_str).unwrap();
        assert_eq!(file.types.len(), 2);
        assert_eq!(file.types["registration_window"].len(), 2);

        let table = file.into_table();
        assert!(table.validate().is_ok());
        let rules = table.rules_for(&EventType::new("registration_window"));
        assert_eq!(rules[0].suffix.as_str(), "open");
        assert_eq!(
            rules[1].trigger,
            Trigger::Window {
                from: Moment::offset(Anchor::End, Duration::hours(-6)),
                until: Moment::at(Anchor::End),
            }
        );
        let recap = table.rules_for(&EventType::new("meetup"));
        assert_eq!(recap[0].trigger, Trigger::At(Moment::offset(Anchor::End, Duration::hours(1))));
    }

    #[test]
    fn test_unknown_trigger_kind_is_rejected() {
        let toml_str = r#"
[[types.meetup]]
suffix = "x"
message = "x"
trigger = { kind = "sometimes", anchor = "start" }
"#;
        assert!(toml::from_str::<RuleFile>(toml_str).is_err());
    }

    #[test]
    fn test_huge_offset_fails_validation() {
        let toml_str = r#"
[[types.meetup]]
suffix = "late"
message = "x"
trigger = { kind = "at", anchor = "end", offset_minutes = 9223372036854775807 }
"#;
        let file: RuleFile = toml::from_str(toml_str).unwrap();
        assert!(matches!(
            file.into_table().validate(),
            Err(herald_core::rules::RuleTableError::OffsetOutOfRange { .. })
        ));
    }

    #[test]
    fn test_invalid_token_fails_validation() {
        let toml_str = r#"
[[types.bad-type]]
suffix = "open"
message = "x"
trigger = { kind = "at", anchor = "start" }
"#;
        let file: RuleFile = toml::from_str(toml_str).unwrap();
        assert!(file.into_table().validate().is_err());
    }
}
