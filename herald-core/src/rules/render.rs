use crate::entities::CalendarEvent;
use crate::utils::timestamps::chat_timestamp;
use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref PLACEHOLDER: Regex = placeholder_pattern();
}

#[allow(clippy::expect_used)]
fn placeholder_pattern() -> Regex {
    Regex::new(r"\{([a-z_]+)\}").expect("valid placeholder pattern")
}

/// Fill a message template for `event`.
///
/// Supported placeholders: `{summary}`, `{location}`, `{mention}`,
/// `{start}`, `{end}` (absolute timestamps) and `{start_relative}`,
/// `{end_relative}`. Anything else in braces is left untouched. Only the
/// template is scanned, so braces inside event text are copied verbatim.
pub fn render_message(template: &str, event: &CalendarEvent, mention: &str) -> String {
    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| match &caps[1] {
        "summary" => event.title().to_string(),
        "location" => event.location.clone().unwrap_or_default(),
        "mention" => mention.to_string(),
        "start_relative" => chat_timestamp(event.start, 'R'),
        "end_relative" => chat_timestamp(event.end, 'R'),
        "start" => chat_timestamp(event.start, 'F'),
        "end" => chat_timestamp(event.end, 'F'),
        _ => caps[0].to_string(),
    });
    rendered.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_render_all_placeholders() {
        let event = CalendarEvent::new(
            "e",
            datetime!(1970-01-01 00:01 UTC),
            datetime!(1970-01-01 00:02 UTC),
        )
        .with_summary("Cup")
        .with_location("Arena");
        let text = render_message(
            "{summary} @ {location}: {start} / {end_relative} {mention} {unknown}",
            &event,
            "<@&9>",
        );
        assert_eq!(text, "Cup @ Arena: <t:60:F> / <t:120:R> <@&9> {unknown}");
    }

    #[test]
    fn test_event_text_is_not_expanded() {
        let event = CalendarEvent::new(
            "e",
            datetime!(1970-01-01 00:01 UTC),
            datetime!(1970-01-01 00:02 UTC),
        )
        .with_summary("Free {mention} party until {end}")
        .with_location("{summary}");
        let text = render_message("{summary} at {location} {mention}", &event, "<@&9>");
        assert_eq!(text, "Free {mention} party until {end} at {summary} <@&9>");
    }

    #[test]
    fn test_empty_mention_leaves_no_trailing_space() {
        let event = CalendarEvent::new(
            "e",
            datetime!(2025-03-01 00:00 UTC),
            datetime!(2025-03-02 00:00 UTC),
        );
        assert_eq!(render_message("{summary} is open. {mention}", &event, ""), "Untitled event is open.");
    }
}
