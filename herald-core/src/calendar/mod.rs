//! Calendar feed retrieval.
//!
//! - [`CalendarSource`]: the fetch port used by the announcement scheduler
//! - [`HttpCalendarSource`]: fetches an iCalendar feed over HTTP
//! - [`EventSnapshot`]: the last successfully fetched event list, read by
//!   the interactive picker

pub mod ics;

use crate::entities::CalendarEvent;
use async_trait::async_trait;
use chrono_tz::Tz;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

/// Errors that can occur while fetching the calendar feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request error
    #[error("calendar request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Feed answered with a non-success status
    #[error("calendar feed returned status {status}")]
    Status { status: u16 },
}

/// Source of the current calendar entries.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// Fetch all entries, in feed order.
    async fn fetch(&self) -> Result<Vec<CalendarEvent>, FetchError>;
}

/// Fetches and parses an iCalendar feed.
pub struct HttpCalendarSource {
    url: Url,
    floating_zone: Tz,
    http_client: reqwest::Client,
}

impl HttpCalendarSource {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            floating_zone: Tz::UTC,
            http_client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    /// Zone for floating times when the feed declares none.
    pub fn with_floating_zone(mut self, zone: Tz) -> Self {
        self.floating_zone = zone;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl CalendarSource for HttpCalendarSource {
    async fn fetch(&self) -> Result<Vec<CalendarEvent>, FetchError> {
        let response = self.http_client.get(self.url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        let body = response.text().await?;
        let events = ics::parse_calendar(&body, self.floating_zone);
        debug!(url = %self.url, events = events.len(), "Fetched calendar feed");
        Ok(events)
    }
}

/// Shared copy of the most recent successful fetch.
#[derive(Clone, Default)]
pub struct EventSnapshot {
    inner: Arc<RwLock<Vec<CalendarEvent>>>,
}

impl EventSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn replace(&self, events: Vec<CalendarEvent>) {
        *self.inner.write().await = events;
    }

    pub async fn events(&self) -> Vec<CalendarEvent> {
        self.inner.read().await.clone()
    }

    /// First event satisfying `matches`.
    pub async fn find_by(&self, matches: impl Fn(&CalendarEvent) -> bool) -> Option<CalendarEvent> {
        self.inner.read().await.iter().find(|e| matches(e)).cloned()
    }
}
