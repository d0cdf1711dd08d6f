//! Fakes for the external collaborators.

use crate::calendar::{CalendarSource, FetchError};
use crate::delivery::{NotificationSink, SinkError};
use crate::entities::{CalendarEvent, ChannelId};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Records every message instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(ChannelId, String)>>,
    attempts: AtomicUsize,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(ChannelId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, destination: ChannelId, text: &str) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Transport("simulated outage".to_string()));
        }
        self.sent.lock().unwrap().push((destination, text.to_string()));
        Ok(())
    }
}

/// Serves a fixed event list, optionally failing.
#[derive(Debug, Default)]
pub struct StaticCalendarSource {
    events: Mutex<Vec<CalendarEvent>>,
    failing: AtomicBool,
}

impl StaticCalendarSource {
    pub fn new(events: Vec<CalendarEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl CalendarSource for StaticCalendarSource {
    async fn fetch(&self) -> Result<Vec<CalendarEvent>, FetchError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError::Status { status: 503 });
        }
        Ok(self.events.lock().unwrap().clone())
    }
}

pub fn channel(id: u64) -> ChannelId {
    ChannelId::new(id).unwrap()
}
