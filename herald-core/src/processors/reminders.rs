//! ReminderScheduler processor.
//!
//! The ReminderScheduler is responsible for:
//! - Accepting one-shot reminders with an absolute fire time
//! - Sending each due reminder at most once on every `ReminderTick`
//! - Pruning fired reminders from the persisted list
//!
//! A reminder's firing is recorded durably before delivery is attempted and
//! before it is pruned, so a crash at any point never sends it twice.

use crate::delivery::{DeliveryMode, NotificationSink};
use crate::entities::{ChannelId, ScheduledReminder};
use crate::store::SharedStore;
use kanau::processor::Processor;
use std::convert::Infallible;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// Input of one reminder pass.
#[derive(Debug, Clone, Copy)]
pub struct ReminderTick {
    pub now: OffsetDateTime,
    pub mode: DeliveryMode,
}

/// Counters for one reminder pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReminderReport {
    pub due: usize,
    pub sent: usize,
    pub failed: usize,
    pub suppressed: usize,
    pub pruned: usize,
}

/// One-shot reminder processor.
pub struct ReminderScheduler {
    store: SharedStore,
    sink: Arc<dyn NotificationSink>,
}

impl ReminderScheduler {
    pub fn new(store: SharedStore, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, sink }
    }

    /// Persist a reminder for `fire_at`.
    ///
    /// Times at or before `now` are ignored and yield `None`.
    pub async fn schedule(
        &self,
        destination: ChannelId,
        fire_at: OffsetDateTime,
        message: impl Into<String>,
        now: OffsetDateTime,
    ) -> Option<ScheduledReminder> {
        if fire_at <= now {
            debug!(%fire_at, %now, "Ignoring reminder scheduled in the past");
            return None;
        }
        let reminder = ScheduledReminder::new(destination, fire_at, message);
        self.store.lock().await.push_reminder(reminder.clone());
        info!(id = %reminder.id, %fire_at, channel = %destination, "Scheduled reminder");
        Some(reminder)
    }

    /// The periodic body: one delivering pass at the current time.
    pub async fn run_pass(&self) {
        let report = self.process_due(OffsetDateTime::now_utc(), DeliveryMode::Deliver).await;
        if report.due > 0 {
            info!(
                sent = report.sent,
                failed = report.failed,
                pruned = report.pruned,
                "Reminder pass complete"
            );
        }
    }

    /// Fire every unfired reminder whose time has come, then prune.
    ///
    /// Send failures are logged and not retried.
    pub async fn process_due(&self, now: OffsetDateTime, mode: DeliveryMode) -> ReminderReport {
        let due: Vec<ScheduledReminder> = {
            let store = self.store.lock().await;
            store
                .scheduled()
                .iter()
                .filter(|r| r.is_due(now))
                .cloned()
                .collect()
        };

        let mut report = ReminderReport::default();
        for reminder in due {
            if !self.store.lock().await.mark_reminder_fired(reminder.id) {
                continue;
            }
            report.due += 1;

            if mode.is_suppressed() {
                debug!(id = %reminder.id, "Dropped overdue reminder without sending");
                report.suppressed += 1;
                continue;
            }

            match self.sink.send(reminder.destination, &reminder.message).await {
                Ok(()) => {
                    info!(id = %reminder.id, channel = %reminder.destination, "Sent reminder");
                    report.sent += 1;
                }
                Err(e) => {
                    warn!(id = %reminder.id, error = %e, "Failed to send reminder");
                    report.failed += 1;
                }
            }
        }

        report.pruned = self.store.lock().await.prune_fired();
        report
    }
}

// ---------------------------------------------------------------------------
// Processor trait implementation
// ---------------------------------------------------------------------------

impl Processor<ReminderTick> for ReminderScheduler {
    type Output = ReminderReport;
    type Error = Infallible;

    async fn process(&self, tick: ReminderTick) -> Result<ReminderReport, Infallible> {
        Ok(self.process_due(tick.now, tick.mode).await)
    }
}
