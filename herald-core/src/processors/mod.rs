//! Periodic processors.
//!
//! - `Announcer`: receives `AnnouncementTick`, fetches the calendar and
//!   sends due announcements exactly once per idempotency key
//! - `ReminderScheduler`: receives `ReminderTick`, sends due one-shot
//!   reminders and prunes them
//! - `RepeatingTask`: drives either processor on a fixed interval with an
//!   in-flight guard

pub mod announcer;
pub mod reminders;
pub mod repeating;

pub use announcer::{AnnouncementTick, Announcer, PollError, PollReport};
pub use reminders::{ReminderReport, ReminderScheduler, ReminderTick};
pub use repeating::{InFlight, InFlightGuard, RepeatingTask};
