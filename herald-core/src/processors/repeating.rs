//! Fixed-interval task driver.
//!
//! Each tick starts one pass of the wrapped job unless the previous pass is
//! still running, in which case the tick is skipped rather than queued.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Re-entrancy flag shared by every pass of one task.
#[derive(Debug, Clone, Default)]
pub struct InFlight(Arc<AtomicBool>);

/// Held for the duration of a pass; clears the flag on drop.
#[derive(Debug)]
pub struct InFlightGuard(Arc<AtomicBool>);

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the flag, or `None` if a pass is already running.
    pub fn try_begin(&self) -> Option<InFlightGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(Arc::clone(&self.0)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A job run every `period` until shutdown.
pub struct RepeatingTask {
    name: &'static str,
    period: Duration,
    in_flight: InFlight,
}

impl RepeatingTask {
    pub fn new(name: &'static str, period: Duration) -> Self {
        Self {
            name,
            period,
            in_flight: InFlight::new(),
        }
    }

    pub fn in_flight(&self) -> InFlight {
        self.in_flight.clone()
    }

    /// Run until `shutdown_rx` turns `true` or its sender is dropped.
    ///
    /// The first pass starts one `period` after this call; callers run their
    /// startup pass themselves. On shutdown a pass that is still running is
    /// awaited so it can finish its bookkeeping.
    pub async fn run<F, Fut>(self, mut shutdown_rx: watch::Receiver<bool>, mut job: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut current: Option<JoinHandle<()>> = None;

        info!(task = self.name, period_secs = self.period.as_secs(), "Repeating task started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!(task = self.name, "Repeating task received shutdown signal");
                        break;
                    }
                }

                _ = ticker.tick() => {
                    let Some(guard) = self.in_flight.try_begin() else {
                        debug!(task = self.name, "Previous pass still in flight, skipping tick");
                        continue;
                    };
                    if let Some(previous) = current.take() {
                        self.join_pass(previous).await;
                    }
                    let pass = job();
                    current = Some(tokio::spawn(async move {
                        let _guard = guard;
                        pass.await;
                    }));
                }
            }
        }

        if let Some(handle) = current {
            self.join_pass(handle).await;
        }
        info!(task = self.name, "Repeating task shutdown complete");
    }

    async fn join_pass(&self, handle: JoinHandle<()>) {
        if let Err(e) = handle.await {
            error!(task = self.name, error = %e, "Repeating task pass panicked");
        }
    }
}
