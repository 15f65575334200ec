//! Wall-clock scheduling of ingestion cycles.
//!
//! A cycle runs once right away, then at every multiple of the interval on the
//! UTC clock (with 15 minutes: `:00`, `:15`, `:30`, `:45`). Cycles run on their
//! own task behind an in-flight guard; a trigger that fires while a cycle is
//! still running is skipped, never queued.
//!
//! ```rust,ignore
//! let handle = Scheduler::new(settings.interval()).start(Arc::new(ingestor));
//! tokio::signal::ctrl_c().await?;
//! handle.stop().await;
//! ```

use crate::fetch::Fetch;
use crate::ingest::Ingestor;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

pub struct Scheduler {
    interval: Duration,
}

/// Controls a running [`Scheduler`].
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    in_flight: Arc<Mutex<()>>,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Spawn the trigger loop and return its handle.
    pub fn start<F: Fetch + 'static>(self, ingestor: Arc<Ingestor<F>>) -> SchedulerHandle {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let in_flight = Arc::new(Mutex::new(()));
        let guard = Arc::clone(&in_flight);
        let interval = self.interval;

        info!(interval_secs = interval.as_secs(), "Scheduler started");
        let task = tokio::spawn(async move {
            loop {
                trigger(&ingestor, &guard);

                let wait = until_next_boundary(Utc::now(), interval);
                debug!(wait_secs = wait.as_secs(), "Waiting for next trigger");
                tokio::select! {
                    _ = sleep(wait) => {}
                    _ = shutdown_rx.changed() => break,
                }
            }
        });

        SchedulerHandle {
            shutdown,
            task,
            in_flight,
        }
    }
}

impl SchedulerHandle {
    /// Stop triggering and wait for an in-flight cycle to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Scheduler loop ended abnormally");
        }
        let _drained = self.in_flight.lock().await;
        info!("Scheduler stopped");
    }
}

/// Start a cycle unless one is already running. Returns whether it started.
fn trigger<F: Fetch + 'static>(ingestor: &Arc<Ingestor<F>>, in_flight: &Arc<Mutex<()>>) -> bool {
    match Arc::clone(in_flight).try_lock_owned() {
        Ok(guard) => {
            let ingestor = Arc::clone(ingestor);
            tokio::spawn(async move {
                let _guard = guard;
                ingestor.run_cycle().await;
            });
            true
        }
        Err(_) => {
            warn!("Previous cycle still running; skipping this trigger");
            false
        }
    }
}

/// Time from `now` to the next multiple of `interval` since the Unix epoch.
///
/// Landing exactly on a boundary waits a full interval.
pub fn until_next_boundary(now: DateTime<Utc>, interval: Duration) -> Duration {
    let interval_ms = interval.as_millis() as i64;
    if interval_ms <= 0 {
        return interval;
    }
    let into_period = now.timestamp_millis().rem_euclid(interval_ms);
    Duration::from_millis((interval_ms - into_period) as u64)
}
