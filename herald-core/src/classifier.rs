//! Event type extraction.
//!
//! Calendar entries opt into announcements by carrying a `Type: <token>` tag
//! somewhere in their free text. Entries without a tag are ignored by every
//! rule.

use crate::entities::CalendarEvent;
use compact_str::CompactString;
use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Borrow;

lazy_static! {
    static ref TYPE_TAG: Regex = type_tag_pattern();
}

#[allow(clippy::expect_used)]
fn type_tag_pattern() -> Regex {
    Regex::new(r"(?i)Type:\s*([a-z0-9_]+)").expect("valid type tag pattern")
}

/// A lower-cased type token such as `registration_window`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventType(CompactString);

impl EventType {
    pub fn new(token: &str) -> Self {
        Self(CompactString::from(token.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `token` is a valid type token as written in rule tables.
    pub fn is_valid_token(token: &str) -> bool {
        !token.is_empty()
            && token
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    }
}

impl Borrow<str> for EventType {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the type tag from a single text field.
pub fn extract_type(text: &str) -> Option<EventType> {
    TYPE_TAG
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|token| EventType::new(token.as_str()))
}

/// Classify an event by its description, summary and location, in that
/// order. The first field carrying a tag wins.
pub fn classify(event: &CalendarEvent) -> Option<EventType> {
    [&event.description, &event.summary, &event.location]
        .into_iter()
        .flatten()
        .find_map(|text| extract_type(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn event() -> CalendarEvent {
        CalendarEvent::new("uid", datetime!(2025-03-01 00:00 UTC), datetime!(2025-03-02 00:00 UTC))
    }

    #[test]
    fn test_extract_is_case_insensitive_and_lowercases() {
        assert_eq!(
            extract_type("type:   Registration_Window\nmore text").map(|t| t.to_string()),
            Some("registration_window".to_string())
        );
        assert_eq!(
            extract_type("TYPE:single_warning").map(|t| t.to_string()),
            Some("single_warning".to_string())
        );
    }

    #[test]
    fn test_extract_stops_at_token_boundary() {
        assert_eq!(
            extract_type("Type: post_event-7").map(|t| t.to_string()),
            Some("post_event".to_string())
        );
    }

    #[test]
    fn test_missing_or_malformed_tag_yields_none() {
        assert_eq!(extract_type(""), None);
        assert_eq!(extract_type("Type:"), None);
        assert_eq!(extract_type("Type: -"), None);
        assert_eq!(extract_type("nothing to see"), None);
    }

    #[test]
    fn test_description_takes_precedence() {
        let e = event()
            .with_summary("Type: from_summary")
            .with_description("Type: from_description")
            .with_location("Type: from_location");
        assert_eq!(classify(&e).map(|t| t.to_string()), Some("from_description".to_string()));
    }

    #[test]
    fn test_falls_through_untagged_fields() {
        let e = event()
            .with_description("no tag here")
            .with_location("Type: from_location");
        assert_eq!(classify(&e).map(|t| t.to_string()), Some("from_location".to_string()));
        assert_eq!(classify(&event()), None);
    }

    #[test]
    fn test_token_validation() {
        assert!(EventType::is_valid_token("registration_window"));
        assert!(!EventType::is_valid_token("Registration"));
        assert!(!EventType::is_valid_token("with-dash"));
        assert!(!EventType::is_valid_token(""));
    }
}
