//! Cancellable fixed-interval background sweeps for Rallypoint.
//!
//! A [`Sweeper`] runs one [`SweepTask`] on its own Tokio task, on a fixed
//! interval that has nothing to do with client traffic. It stops cleanly:
//! [`SweeperHandle::stop`] signals the loop and waits for any pass in
//! progress to finish.
//!
//! # Scheduling
//!
//! - The first pass is delayed by a random jitter (`0..initial_jitter`) so
//!   several sweepers started together don't fire in lockstep.
//! - Missed ticks are skipped (`MissedTickBehavior::Skip`). A pass that
//!   runs longer than the interval never triggers a burst of catch-up
//!   passes.
//! - A pass that uses more than `budget_warn_threshold` of the interval is
//!   logged as a warning.
//!
//! ```ignore
//! let handle = Sweeper::new(expiry_sweep, SweepConfig::every(Duration::from_secs(60))).spawn();
//! // ... serve ...
//! let metrics = handle.stop().await;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// One unit of periodic background work.
///
/// A pass must handle its own failures: whatever goes wrong for one item
/// is logged and counted in the report, and the pass carries on.
pub trait SweepTask: Send + Sync + 'static {
    /// Summary of one pass, logged at debug level.
    type Report: fmt::Debug + Send + 'static;

    /// Short name used in log lines.
    fn name(&self) -> &'static str {
        "sweep"
    }

    /// Runs one pass.
    fn sweep(&self) -> impl Future<Output = Self::Report> + Send;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Scheduling settings for a [`Sweeper`].
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Time between pass starts.
    pub interval: Duration,
    /// Upper bound of the random delay added before the first pass.
    pub initial_jitter: Duration,
    /// Run the first pass right away instead of after one interval.
    pub run_at_start: bool,
    /// Fraction of the interval (0.0–1.0) a pass may use before a warning
    /// is logged.
    pub budget_warn_threshold: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            initial_jitter: Duration::from_millis(500),
            run_at_start: false,
            budget_warn_threshold: 0.80,
        }
    }
}

impl SweepConfig {
    /// Shortest interval accepted.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

    /// A config with the given interval and default settings otherwise.
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Clamps out-of-range values.
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                min_ms = Self::MIN_INTERVAL.as_millis() as u64,
                "sweep interval below minimum, clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Runtime metrics for a sweeper.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepMetrics {
    /// Passes completed.
    pub total_passes: u64,
    /// Passes that took longer than the interval.
    pub total_overruns: u64,
    /// Duration of the most recent pass.
    pub last_duration: Duration,
    /// Longest pass observed.
    pub max_duration: Duration,
}

// ---------------------------------------------------------------------------
// Sweeper
// ---------------------------------------------------------------------------

/// Runs a [`SweepTask`] on a fixed interval.
pub struct Sweeper<T: SweepTask> {
    task: Arc<T>,
    config: SweepConfig,
}

impl<T: SweepTask> Sweeper<T> {
    pub fn new(task: T, config: SweepConfig) -> Self {
        Self {
            task: Arc::new(task),
            config: config.validated(),
        }
    }

    /// Starts the loop on a new Tokio task.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let metrics = Arc::new(Mutex::new(SweepMetrics::default()));

        let jitter = if self.config.initial_jitter.is_zero() {
            Duration::ZERO
        } else {
            let max_us = self.config.initial_jitter.as_micros() as u64;
            Duration::from_micros(rand::rng().random_range(0..max_us.max(1)))
        };
        let first = if self.config.run_at_start {
            Instant::now() + jitter
        } else {
            Instant::now() + self.config.interval + jitter
        };

        debug!(
            task = self.task.name(),
            interval_ms = self.config.interval.as_millis() as u64,
            jitter_us = jitter.as_micros() as u64,
            "sweeper started"
        );

        let join = tokio::spawn(run_loop(
            self.task,
            self.config,
            first,
            metrics.clone(),
            shutdown_rx,
        ));

        SweeperHandle {
            shutdown: shutdown_tx,
            join,
            metrics,
        }
    }
}

async fn run_loop<T: SweepTask>(
    task: Arc<T>,
    config: SweepConfig,
    first: Instant,
    metrics: Arc<Mutex<SweepMetrics>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = time::interval_at(first, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                // A dropped sender means the handle is gone; stop as well.
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let started = Instant::now();
                let report = task.sweep().await;
                let elapsed = started.elapsed();
                trace!(task = task.name(), ?report, "sweep pass finished");
                record_pass(&metrics, &config, task.name(), elapsed);
                debug!(task = task.name(), elapsed_ms = elapsed.as_millis() as u64, ?report, "sweep pass");
            }
        }
    }

    info!(task = task.name(), "sweeper stopped");
}

fn record_pass(
    metrics: &Mutex<SweepMetrics>,
    config: &SweepConfig,
    name: &'static str,
    elapsed: Duration,
) {
    let utilization = elapsed.as_secs_f64() / config.interval.as_secs_f64();
    let overrun = elapsed > config.interval;
    if overrun {
        warn!(
            task = name,
            elapsed_ms = elapsed.as_millis() as u64,
            interval_ms = config.interval.as_millis() as u64,
            "sweep pass exceeded its interval"
        );
    } else if utilization >= config.budget_warn_threshold {
        warn!(
            task = name,
            utilization_pct = format!("{:.1}", utilization * 100.0),
            "sweep pass approaching its interval"
        );
    }

    let mut m = metrics.lock().unwrap_or_else(PoisonError::into_inner);
    m.total_passes += 1;
    if overrun {
        m.total_overruns += 1;
    }
    m.last_duration = elapsed;
    m.max_duration = m.max_duration.max(elapsed);
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Controls a running sweeper.
///
/// Dropping the handle without calling [`stop`](Self::stop) also ends the
/// loop (the shutdown channel closes), but nothing waits for it.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
    metrics: Arc<Mutex<SweepMetrics>>,
}

impl SweeperHandle {
    /// Snapshot of the current metrics.
    pub fn metrics(&self) -> SweepMetrics {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `true` once the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signals the loop to stop, waits for it, and returns final metrics.
    ///
    /// A pass already in progress runs to completion first.
    pub async fn stop(self) -> SweepMetrics {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            warn!(error = %e, "sweeper task ended abnormally");
        }
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for SweeperHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SweeperHandle")
            .field("metrics", &self.metrics())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validated_clamps_interval_and_threshold() {
        let config = SweepConfig {
            interval: Duration::ZERO,
            budget_warn_threshold: 3.0,
            ..SweepConfig::default()
        }
        .validated();
        assert_eq!(config.interval, SweepConfig::MIN_INTERVAL);
        assert_eq!(config.budget_warn_threshold, 1.0);
    }

    #[test]
    fn test_record_pass_tracks_overrun_and_max() {
        let metrics = Mutex::new(SweepMetrics::default());
        let config = SweepConfig::every(Duration::from_secs(10));

        record_pass(&metrics, &config, "t", Duration::from_secs(2));
        record_pass(&metrics, &config, "t", Duration::from_secs(12));
        record_pass(&metrics, &config, "t", Duration::from_secs(1));

        let m = metrics.into_inner().unwrap();
        assert_eq!(m.total_passes, 3);
        assert_eq!(m.total_overruns, 1);
        assert_eq!(m.max_duration, Duration::from_secs(12));
        assert_eq!(m.last_duration, Duration::from_secs(1));
    }
}
