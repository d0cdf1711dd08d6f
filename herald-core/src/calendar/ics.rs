//! Minimal iCalendar (RFC 5545) reader for `VEVENT` components.
//!
//! Only the properties the scheduler needs are read. Date-times are
//! resolved to UTC: `Z` values as-is, `TZID` values through the IANA zone
//! database, and floating values (including all-day dates) in the
//! calendar's `X-WR-TIMEZONE` or the caller's default zone. Events naming a
//! zone that cannot be resolved are dropped.

use crate::entities::{CalendarEvent, MISSING_UID};
use chrono::{LocalResult, NaiveDate, Offset, TimeDelta, TimeZone};
use chrono_tz::Tz;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, UtcOffset};
use tracing::{debug, warn};

/// Parse every `VEVENT` in `body`, in document order.
///
/// `floating` is the zone for times without `Z` or `TZID` when the calendar
/// does not declare `X-WR-TIMEZONE`. Events without a parseable `DTSTART`
/// are dropped. A missing `DTEND` yields a zero-length event.
pub fn parse_calendar(body: &str, floating: Tz) -> Vec<CalendarEvent> {
    let mut events = Vec::new();
    let mut floating = floating;
    let mut current: Option<EventFields> = None;
    // depth of components nested inside the current VEVENT (VALARM etc.)
    let mut nested = 0usize;

    for line in unfold(body) {
        let Some((head, value)) = line.split_once(':') else {
            continue;
        };
        let mut parts = head.split(';');
        let name = parts.next().unwrap_or(head).trim().to_ascii_uppercase();
        let tzid = parts.find_map(|param| {
            let (key, zone) = param.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("TZID")
                .then(|| zone.trim().trim_matches('"').to_string())
        });

        match name.as_str() {
            "BEGIN" if value.trim().eq_ignore_ascii_case("VEVENT") => {
                current = Some(EventFields::default());
                nested = 0;
            }
            "BEGIN" if current.is_some() => nested += 1,
            "END" if value.trim().eq_ignore_ascii_case("VEVENT") => {
                if let Some(fields) = current.take() {
                    if let Some(event) = fields.build(floating) {
                        events.push(event);
                    }
                }
            }
            "END" if current.is_some() => nested = nested.saturating_sub(1),
            "X-WR-TIMEZONE" if current.is_none() => match value.trim().parse::<Tz>() {
                Ok(zone) => floating = zone,
                Err(_) => warn!(zone = value.trim(), "Ignoring unknown calendar time zone"),
            },
            _ if nested == 0 => {
                if let Some(fields) = current.as_mut() {
                    fields.set(&name, tzid, value);
                }
            }
            _ => {}
        }
    }

    events
}

/// A DTSTART/DTEND value as written, resolved once the calendar zone is known.
#[derive(Debug)]
struct RawTime {
    value: String,
    tzid: Option<String>,
}

#[derive(Debug)]
enum TimeError {
    Malformed,
    UnknownZone(String),
}

impl RawTime {
    fn resolve(&self, floating: Tz) -> Result<OffsetDateTime, TimeError> {
        let value = self.value.trim();
        if let Some(utc) = value.strip_suffix(['Z', 'z']) {
            return parse_local(utc)
                .map(PrimitiveDateTime::assume_utc)
                .ok_or(TimeError::Malformed);
        }
        let zone = match &self.tzid {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| TimeError::UnknownZone(name.clone()))?,
            None => floating,
        };
        let local = parse_local(value).ok_or(TimeError::Malformed)?;
        in_zone(local, zone).ok_or(TimeError::Malformed)
    }
}

#[derive(Debug, Default)]
struct EventFields {
    uid: Option<String>,
    start: Option<RawTime>,
    end: Option<RawTime>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
}

impl EventFields {
    fn set(&mut self, name: &str, tzid: Option<String>, value: &str) {
        let raw = || RawTime {
            value: value.to_string(),
            tzid: tzid.clone(),
        };
        match name {
            "UID" => self.uid = Some(value.trim().to_string()),
            "DTSTART" => self.start = Some(raw()),
            "DTEND" => self.end = Some(raw()),
            "SUMMARY" => self.summary = Some(unescape_text(value)),
            "DESCRIPTION" => self.description = Some(unescape_text(value)),
            "LOCATION" => self.location = Some(unescape_text(value)),
            _ => {}
        }
    }

    fn build(self, floating: Tz) -> Option<CalendarEvent> {
        let uid = self
            .uid
            .filter(|uid| !uid.is_empty())
            .unwrap_or_else(|| MISSING_UID.to_string());
        let resolve = |raw: &RawTime| match raw.resolve(floating) {
            Ok(instant) => Some(instant),
            Err(TimeError::Malformed) => {
                debug!(%uid, value = %raw.value, "Dropping VEVENT with an invalid date-time");
                None
            }
            Err(TimeError::UnknownZone(zone)) => {
                warn!(%uid, %zone, "Dropping VEVENT in an unknown time zone");
                None
            }
        };
        let Some(start) = self.start.as_ref().and_then(|raw| resolve(raw)) else {
            if self.start.is_none() {
                debug!(%uid, "Dropping VEVENT without DTSTART");
            }
            return None;
        };
        let end = match &self.end {
            Some(raw) => resolve(raw)?,
            None => start,
        };
        Some(CalendarEvent {
            uid,
            start,
            end,
            summary: self.summary,
            description: self.description,
            location: self.location,
        })
    }
}

/// Join folded continuation lines (lines starting with a space or tab).
fn unfold(body: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in body.lines() {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        match (raw.strip_prefix([' ', '\t']), lines.last_mut()) {
            (Some(continuation), Some(last)) => last.push_str(continuation),
            _ => lines.push(raw.to_string()),
        }
    }
    lines
}

fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// `YYYYMMDDTHHMMSS` or all-day `YYYYMMDD` (midnight), without zone.
fn parse_local(value: &str) -> Option<PrimitiveDateTime> {
    if value.len() == 8 {
        let date = Date::parse(value, format_description!("[year][month][day]")).ok()?;
        return Some(date.midnight());
    }
    PrimitiveDateTime::parse(
        value,
        format_description!("[year][month][day]T[hour][minute][second]"),
    )
    .ok()
}

/// Read a wall-clock time in `zone`.
///
/// Ambiguous times (clocks turned back) take the earlier instant; times in
/// a gap (clocks turned forward) use the offset in effect before the gap.
fn in_zone(local: PrimitiveDateTime, zone: Tz) -> Option<OffsetDateTime> {
    let naive = NaiveDate::from_ymd_opt(local.year(), u32::from(u8::from(local.month())), u32::from(local.day()))?
        .and_hms_opt(
            u32::from(local.hour()),
            u32::from(local.minute()),
            u32::from(local.second()),
        )?;
    let offset = match zone.offset_from_local_datetime(&naive) {
        LocalResult::Single(offset) | LocalResult::Ambiguous(offset, _) => offset,
        LocalResult::None => {
            let before = naive.checked_sub_signed(TimeDelta::hours(3))?;
            zone.offset_from_local_datetime(&before).earliest()?
        }
    };
    let offset = UtcOffset::from_whole_seconds(offset.fix().local_minus_utc()).ok()?;
    Some(local.assume_offset(offset).to_offset(UtcOffset::UTC))
}
