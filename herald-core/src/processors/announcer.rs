//! Announcer processor.
//!
//! The Announcer is responsible for:
//! - Fetching the calendar feed on every `AnnouncementTick`
//! - Evaluating every (event, rule) pair against the tick's `now`
//! - Marking each newly due trigger's idempotency key, then sending its
//!   message (see [`DeliveryGuarantee`](crate::delivery::DeliveryGuarantee))
//! - Publishing the fetched events to the [`EventSnapshot`]
//!
//! Evaluation keeps no state between polls other than the idempotency keys,
//! so a failed poll is simply retried from scratch on the next tick.

use crate::calendar::{CalendarSource, EventSnapshot, FetchError};
use crate::delivery::{DeliveryMode, NotificationSink, SinkError};
use crate::rules::{RuleTable, render_message};
use crate::store::{IdempotencyKey, SharedStore};
use kanau::processor::Processor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// Errors that abort an announcement poll.
#[derive(Debug, Error)]
pub enum PollError {
    /// The calendar could not be fetched; nothing was evaluated.
    #[error("calendar fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// A send failed. Its key stays marked and later triggers stay pending.
    #[error("delivery of {key} failed: {source}")]
    Delivery {
        key: IdempotencyKey,
        #[source]
        source: SinkError,
    },
}

/// Input of one announcement pass.
#[derive(Debug, Clone, Copy)]
pub struct AnnouncementTick {
    pub now: OffsetDateTime,
    pub mode: DeliveryMode,
}

impl AnnouncementTick {
    pub fn deliver(now: OffsetDateTime) -> Self {
        Self {
            now,
            mode: DeliveryMode::Deliver,
        }
    }

    pub fn suppressed(now: OffsetDateTime) -> Self {
        Self {
            now,
            mode: DeliveryMode::Suppress,
        }
    }
}

/// Counters for one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Events returned by the feed.
    pub events: usize,
    /// Due triggers whose key had not fired yet.
    pub newly_due: usize,
    /// Messages sent.
    pub sent: usize,
    /// Keys marked without sending.
    pub suppressed: usize,
    /// The pass was skipped because no announcement channel is configured.
    pub skipped_no_destination: bool,
}

/// Announcement processor.
pub struct Announcer {
    store: SharedStore,
    source: Arc<dyn CalendarSource>,
    sink: Arc<dyn NotificationSink>,
    rules: Arc<RuleTable>,
    snapshot: EventSnapshot,
    fallback_mention: String,
    /// Set once boot-sync has succeeded or was found unnecessary.
    synced: AtomicBool,
}

impl Announcer {
    /// Create a new Announcer.
    ///
    /// # Arguments
    ///
    /// * `store` - Shared idempotency and config store
    /// * `source` - Calendar feed
    /// * `sink` - Outbound message transport
    /// * `rules` - Rule table keyed by event type
    /// * `snapshot` - Receives the events of every successful fetch
    /// * `fallback_mention` - Mention text used when no role is configured
    pub fn new(
        store: SharedStore,
        source: Arc<dyn CalendarSource>,
        sink: Arc<dyn NotificationSink>,
        rules: Arc<RuleTable>,
        snapshot: EventSnapshot,
        fallback_mention: impl Into<String>,
    ) -> Self {
        Self {
            store,
            source,
            sink,
            rules,
            snapshot,
            fallback_mention: fallback_mention.into(),
            synced: AtomicBool::new(false),
        }
    }

    /// Startup sequence: boot-sync when no announcement key exists yet,
    /// followed by a delivering pass.
    ///
    /// Boot-sync marks everything currently due without sending, so the
    /// first deployment (or one with a wiped store) does not replay the
    /// whole calendar history into the channel. A failed boot-sync is
    /// retried by every later pass before it may deliver.
    pub async fn boot(&self, now: OffsetDateTime) -> Result<PollReport, PollError> {
        self.ensure_synced(now).await?;
        self.process(AnnouncementTick::deliver(now)).await
    }

    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    async fn ensure_synced(&self, now: OffsetDateTime) -> Result<(), PollError> {
        if self.is_synced() {
            return Ok(());
        }
        let first_run = !self.store.lock().await.has_announcement_keys();
        if first_run {
            info!("No announcement keys recorded, running boot-sync pass");
            let report = self.poll(now, DeliveryMode::Suppress).await?;
            info!(suppressed = report.suppressed, "Boot-sync complete");
        }
        self.synced.store(true, Ordering::Release);
        Ok(())
    }

    /// One delivering pass at the current wall-clock time, with errors
    /// logged. This is the body of the periodic task.
    pub async fn run_pass(&self) {
        let now = OffsetDateTime::now_utc();
        let result = match self.ensure_synced(now).await {
            Ok(()) => self.poll(now, DeliveryMode::Deliver).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(report) if report.sent > 0 || report.suppressed > 0 => {
                info!(sent = report.sent, suppressed = report.suppressed, "Announcement poll complete");
            }
            Ok(report) => {
                debug!(events = report.events, "Announcement poll complete, nothing due");
            }
            Err(e) => warn!(error = %e, "Announcement poll failed"),
        }
    }

    /// Evaluate every event against `now` and fire whatever is newly due.
    pub async fn poll(&self, now: OffsetDateTime, mode: DeliveryMode) -> Result<PollReport, PollError> {
        let events = self.source.fetch().await?;
        self.snapshot.replace(events.clone()).await;

        let mut report = PollReport {
            events: events.len(),
            ..Default::default()
        };

        let (destination, mention) = {
            let store = self.store.lock().await;
            let config = store.config();
            (config.announce_channel, config.mention(&self.fallback_mention))
        };
        if destination.is_none() && !mode.is_suppressed() {
            warn!("No announcement channel configured, skipping announcement poll");
            report.skipped_no_destination = true;
            return Ok(report);
        }

        for event in &events {
            for due in self.rules.evaluate(event, now) {
                // pending -> fired happens here, before any send attempt
                if !self.store.lock().await.mark(&due.key) {
                    continue;
                }
                report.newly_due += 1;

                let Some(channel) = destination.filter(|_| !mode.is_suppressed()) else {
                    debug!(key = %due.key, "Marked trigger without sending");
                    report.suppressed += 1;
                    continue;
                };

                let text = render_message(&due.rule.message, due.event, &mention);
                if let Err(e) = self.sink.send(channel, &text).await {
                    warn!(key = %due.key, error = %e, "Failed to send announcement, abandoning poll");
                    return Err(PollError::Delivery {
                        key: due.key,
                        source: e,
                    });
                }
                info!(key = %due.key, channel = %channel, "Sent announcement");
                report.sent += 1;
            }
        }

        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Processor trait implementation
// ---------------------------------------------------------------------------

impl Processor<AnnouncementTick> for Announcer {
    type Output = PollReport;
    type Error = PollError;

    async fn process(&self, tick: AnnouncementTick) -> Result<PollReport, PollError> {
        self.poll(tick.now, tick.mode).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{CalendarEvent, ChannelConfig};
    use crate::store::{MemoryPersistence, StateStore};
    use crate::test_support::{RecordingSink, StaticCalendarSource, channel};
    use time::macros::datetime;

    struct Harness {
        announcer: Announcer,
        sink: Arc<RecordingSink>,
        source: Arc<StaticCalendarSource>,
        store: SharedStore,
        persistence: MemoryPersistence,
        snapshot: EventSnapshot,
    }

    fn registration_event() -> CalendarEvent {
        CalendarEvent::new(
            "reg-1",
            datetime!(2025-03-01 00:00 UTC),
            datetime!(2025-03-03 00:00 UTC),
        )
        .with_summary("Spring Cup")
        .with_description("Type: registration_window")
    }

    fn harness_with(persistence: MemoryPersistence, events: Vec<CalendarEvent>) -> Harness {
        let defaults = ChannelConfig {
            announce_channel: Some(channel(100)),
            ..Default::default()
        };
        let store = StateStore::open(persistence.clone(), defaults).into_shared();
        let sink = Arc::new(RecordingSink::new());
        let source = Arc::new(StaticCalendarSource::new(events));
        let snapshot = EventSnapshot::new();
        let announcer = Announcer::new(
            store.clone(),
            source.clone(),
            sink.clone(),
            Arc::new(RuleTable::builtin()),
            snapshot.clone(),
            "@everyone",
        );
        Harness {
            announcer,
            sink,
            source,
            store,
            persistence,
            snapshot,
        }
    }

    fn harness(events: Vec<CalendarEvent>) -> Harness {
        harness_with(MemoryPersistence::new(), events)
    }

    /// Seed one unrelated key so `boot` skips boot-sync.
    async fn seed_warm_store(h: &Harness) {
        let seed = CalendarEvent::new("seed", datetime!(2000-01-01 00:00 UTC), datetime!(2000-01-01 00:00 UTC));
        h.store.lock().await.mark(&IdempotencyKey::announcement(&seed, "open"));
    }

    #[tokio::test]
    async fn test_registration_window_lifecycle() {
        let h = harness(vec![registration_event()]);
        seed_warm_store(&h).await;

        let polls = [
            (datetime!(2025-03-01 00:05 UTC), 1),
            (datetime!(2025-03-01 12:00 UTC), 0),
            (datetime!(2025-03-02 19:00 UTC), 1),
            (datetime!(2025-03-02 20:00 UTC), 0),
            (datetime!(2025-03-03 00:00 UTC), 1),
            (datetime!(2025-03-04 00:00 UTC), 0),
            (datetime!(2026-01-01 00:00 UTC), 0),
        ];
        for (now, expected) in polls {
            let report = h.announcer.process(AnnouncementTick::deliver(now)).await.unwrap();
            assert_eq!(report.sent, expected, "poll at {now}");
        }

        let sent = h.sink.sent();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|(ch, _)| *ch == channel(100)));
        assert!(sent[0].1.contains("is now open"));
        assert!(sent[0].1.ends_with("@everyone"));
        assert!(sent[1].1.contains("Last call"));
        assert!(sent[2].1.contains("is now closed"));
    }

    #[tokio::test]
    async fn test_warn_window_not_fired_early_and_fired_once() {
        let h = harness(vec![registration_event()]);
        seed_warm_store(&h).await;
        let warn_key = IdempotencyKey::announcement(&registration_event(), "warn");

        h.announcer.poll(datetime!(2025-03-02 17:00 UTC), DeliveryMode::Deliver).await.unwrap();
        assert!(!h.store.lock().await.has(&warn_key));

        for minute in [0, 10, 20, 30] {
            let now = datetime!(2025-03-02 19:00 UTC) + time::Duration::minutes(minute);
            h.announcer.poll(now, DeliveryMode::Deliver).await.unwrap();
        }
        assert!(h.store.lock().await.has(&warn_key));
        let warns = h.sink.sent().iter().filter(|(_, text)| text.contains("Last call")).count();
        assert_eq!(warns, 1);
    }

    #[tokio::test]
    async fn test_missed_window_is_never_announced_late() {
        let h = harness(vec![registration_event()]);
        seed_warm_store(&h).await;

        // first poll after downtime lands past the warn window
        let report = h.announcer.poll(datetime!(2025-03-03 01:00 UTC), DeliveryMode::Deliver).await.unwrap();
        assert_eq!(report.sent, 2);
        assert!(h.sink.sent().iter().all(|(_, text)| !text.contains("Last call")));
    }

    #[tokio::test]
    async fn test_boot_sync_marks_without_sending() {
        let h = harness(vec![registration_event()]);
        let open_key = IdempotencyKey::announcement(&registration_event(), "open");

        let report = h.announcer.boot(datetime!(2025-03-01 06:00 UTC)).await.unwrap();
        assert_eq!(report.sent, 0);
        assert_eq!(h.sink.attempts(), 0);
        assert!(h.store.lock().await.has(&open_key));
        let flushes = h.persistence.flush_count();

        let report = h.announcer.poll(datetime!(2025-03-01 06:10 UTC), DeliveryMode::Deliver).await.unwrap();
        assert_eq!(report.newly_due, 0);
        assert_eq!(h.sink.attempts(), 0);
        assert_eq!(h.persistence.flush_count(), flushes);
    }

    #[tokio::test]
    async fn test_failed_boot_sync_is_retried_before_delivering() {
        let h = harness(vec![registration_event()]);
        h.source.set_failing(true);
        let err = h.announcer.boot(datetime!(2025-03-04 00:00 UTC)).await.unwrap_err();
        assert!(matches!(err, PollError::Fetch(_)));
        assert!(!h.announcer.is_synced());

        // the next periodic pass must sync before it may send anything
        h.source.set_failing(false);
        h.announcer.run_pass().await;
        assert!(h.announcer.is_synced());
        assert_eq!(h.sink.attempts(), 0);
        let open_key = IdempotencyKey::announcement(&registration_event(), "open");
        let close_key = IdempotencyKey::announcement(&registration_event(), "close");
        assert!(h.store.lock().await.has(&open_key));
        assert!(h.store.lock().await.has(&close_key));

        h.announcer.run_pass().await;
        assert_eq!(h.sink.attempts(), 0);
    }

    #[tokio::test]
    async fn test_boot_with_existing_keys_delivers_immediately() {
        let h = harness(vec![registration_event()]);
        seed_warm_store(&h).await;
        let report = h.announcer.boot(datetime!(2025-03-01 06:00 UTC)).await.unwrap();
        assert_eq!(report.sent, 1);
    }

    #[tokio::test]
    async fn test_restart_does_not_refire() {
        let persistence = MemoryPersistence::new();
        let first = harness_with(persistence.clone(), vec![registration_event()]);
        seed_warm_store(&first).await;
        first.announcer.poll(datetime!(2025-03-01 00:05 UTC), DeliveryMode::Deliver).await.unwrap();
        assert_eq!(first.sink.sent().len(), 1);

        let second = harness_with(persistence, vec![registration_event()]);
        let report = second.announcer.boot(datetime!(2025-03-01 00:15 UTC)).await.unwrap();
        assert_eq!(report.sent, 0);
        assert_eq!(second.sink.attempts(), 0);
    }

    #[tokio::test]
    async fn test_send_failure_marks_key_and_abandons_rest_of_poll() {
        let h = harness(vec![registration_event()]);
        seed_warm_store(&h).await;
        h.sink.set_failing(true);

        // open and close are both due at this instant
        let now = datetime!(2025-03-03 00:00 UTC);
        let err = h.announcer.poll(now, DeliveryMode::Deliver).await.unwrap_err();
        assert!(matches!(err, PollError::Delivery { .. }));
        assert_eq!(h.sink.attempts(), 1);

        let open_key = IdempotencyKey::announcement(&registration_event(), "open");
        let close_key = IdempotencyKey::announcement(&registration_event(), "close");
        assert!(h.store.lock().await.has(&open_key));
        assert!(!h.store.lock().await.has(&close_key));

        h.sink.set_failing(false);
        let report = h.announcer.poll(now, DeliveryMode::Deliver).await.unwrap();
        assert_eq!(report.sent, 1);
        assert!(h.sink.sent()[0].1.contains("is now closed"));
    }

    #[tokio::test]
    async fn test_fetch_failure_changes_nothing() {
        let h = harness(vec![registration_event()]);
        seed_warm_store(&h).await;
        h.source.set_failing(true);

        let err = h.announcer.poll(datetime!(2025-03-01 00:05 UTC), DeliveryMode::Deliver).await.unwrap_err();
        assert!(matches!(err, PollError::Fetch(_)));
        assert_eq!(h.store.lock().await.key_count(), 1);
        assert!(h.snapshot.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_destination_skips_without_marking() {
        let store = StateStore::open(MemoryPersistence::new(), ChannelConfig::default()).into_shared();
        let sink = Arc::new(RecordingSink::new());
        let announcer = Announcer::new(
            store.clone(),
            Arc::new(StaticCalendarSource::new(vec![registration_event()])),
            sink.clone(),
            Arc::new(RuleTable::builtin()),
            EventSnapshot::new(),
            "",
        );

        let report = announcer.poll(datetime!(2025-03-01 00:05 UTC), DeliveryMode::Deliver).await.unwrap();
        assert!(report.skipped_no_destination);
        assert_eq!(store.lock().await.key_count(), 0);
        assert_eq!(sink.attempts(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_receives_fetched_events() {
        let h = harness(vec![registration_event()]);
        h.announcer.poll(datetime!(2025-02-01 00:00 UTC), DeliveryMode::Deliver).await.unwrap();
        assert_eq!(h.snapshot.events().await, vec![registration_event()]);
    }
}
