//! Calendar entries as read from the feed.

use crate::utils::timestamps::compact_utc;
use time::OffsetDateTime;

/// UID used for feed entries that carry none.
pub const MISSING_UID: &str = "no-uid";

/// One calendar entry from the most recent fetch.
///
/// Entries are transient: they are re-fetched on every poll and never
/// persisted. All timestamps are UTC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarEvent {
    pub uid: String,
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
}

impl CalendarEvent {
    /// Create an event with no free-text fields.
    pub fn new(uid: impl Into<String>, start: OffsetDateTime, end: OffsetDateTime) -> Self {
        let uid = uid.into();
        Self {
            uid: if uid.is_empty() {
                MISSING_UID.to_string()
            } else {
                uid
            },
            start,
            end,
            summary: None,
            description: None,
            location: None,
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Discriminates recurrences that share a UID.
    pub fn instance_tag(&self) -> String {
        compact_utc(self.start)
    }

    /// Whether `instant` lies in the half-open window `[start, end)`.
    pub fn contains(&self, instant: OffsetDateTime) -> bool {
        self.start <= instant && instant < self.end
    }

    pub fn title(&self) -> &str {
        self.summary.as_deref().unwrap_or("Untitled event")
    }
}
