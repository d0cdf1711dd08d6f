//! Time formatting helpers shared by keys, menus and message templates.

use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

/// `YYYYMMDDTHHMMSSZ`, the iCalendar UTC date-time form.
pub fn compact_utc(instant: OffsetDateTime) -> String {
    let t = instant.to_offset(UtcOffset::UTC);
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        t.year(),
        u8::from(t.month()),
        t.day(),
        t.hour(),
        t.minute(),
        t.second()
    )
}

/// `YYYY-MM-DD`.
pub fn iso_date(date: Date) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), u8::from(date.month()), date.day())
}

pub fn parse_iso_date(input: &str) -> Option<Date> {
    Date::parse(input.trim(), format_description!("[year]-[month]-[day]")).ok()
}

/// Chat-platform timestamp markup, rendered client-side in the reader's zone.
///
/// `style` is one of the platform's format letters, e.g. `F` (full) or
/// `R` (relative).
pub fn chat_timestamp(instant: OffsetDateTime, style: char) -> String {
    format!("<t:{}:{}>", instant.unix_timestamp(), style)
}
