//! Background periodic samplers.
//!
//! A [`PeriodicSampler`] owns one thread that drives a [`Recorder`]: one tick
//! right away, then one tick per [`SampleInterval`]. Each tick is independent.
//! Retryable failures are logged and the next tick runs on schedule; a
//! non-retryable failure ends the loop. A panicking tick is contained to the
//! sampler thread and counted as a failure.
//!
//! Stopping sends a signal over a channel: no new tick starts afterwards, a
//! tick already in flight runs to completion, and `stop` joins the thread.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, error, info, warn};

use crate::error::{Result, TelemetryError};

/// A validated, strictly positive sampling interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleInterval(Duration);

impl SampleInterval {
    /// Validate `seconds` for the telemetry parameter named `parameter`.
    pub fn new(parameter: &str, seconds: f64) -> Result<Self> {
        if seconds.is_nan() || seconds <= 0.0 {
            return Err(TelemetryError::config(format!(
                "The telemetry parameter '{parameter}' must be greater than zero but was {seconds}."
            )));
        }
        if !seconds.is_finite() {
            return Err(TelemetryError::config(format!(
                "The telemetry parameter '{parameter}' must be a finite number but was {seconds}."
            )));
        }
        let interval = Duration::try_from_secs_f64(seconds).map_err(|_| {
            TelemetryError::config(format!(
                "The telemetry parameter '{parameter}' must be at most {} seconds but was {seconds}.",
                Duration::MAX.as_secs()
            ))
        })?;
        if interval.is_zero() {
            return Err(TelemetryError::config(format!(
                "The telemetry parameter '{parameter}' must be greater than zero but was {seconds}."
            )));
        }
        Ok(Self(interval))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }
}

/// One observation cycle against a data source.
pub trait Recorder: Send + 'static {
    /// Label used in log lines and the thread name.
    fn name(&self) -> String;

    /// Fetch, extract and write one sample.
    fn record(&mut self) -> Result<()>;
}

/// Tick counters of one sampler.
#[derive(Debug, Default)]
struct SamplerCounters {
    ticks: AtomicU64,
    failures: AtomicU64,
}

/// Snapshot of a sampler's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    /// Ticks that ran, successful or not.
    pub ticks: u64,
    /// Ticks that returned an error or panicked.
    pub failures: u64,
}

enum TickOutcome {
    Recorded,
    Failed,
    Fatal,
}

/// Handle to a running background sampler.
pub struct PeriodicSampler {
    name: String,
    interval: SampleInterval,
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    counters: Arc<SamplerCounters>,
}

impl PeriodicSampler {
    /// Spawn the sampling thread.
    pub fn start<R: Recorder>(mut recorder: R, interval: SampleInterval) -> Result<Self> {
        let name = recorder.name();
        let counters = Arc::new(SamplerCounters::default());
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread_counters = Arc::clone(&counters);
        let thread_name = name.clone();
        let handle = std::thread::Builder::new()
            .name(format!("sampler-{name}"))
            .spawn(move || {
                loop {
                    match run_tick(&mut recorder, &thread_counters) {
                        TickOutcome::Fatal => {
                            error!("sampler [{thread_name}] stops after a non-retryable error");
                            break;
                        }
                        TickOutcome::Recorded | TickOutcome::Failed => {}
                    }
                    match stop_rx.recv_timeout(interval.as_duration()) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("sampler [{thread_name}] finished");
            })?;

        info!(
            "started sampler [{}] with an interval of {}s",
            name,
            interval.as_secs_f64()
        );
        Ok(Self {
            name,
            interval,
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            counters,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> SampleInterval {
        self.interval
    }

    /// Whether the sampling thread is still alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stats(&self) -> SamplerStats {
        SamplerStats {
            ticks: self.counters.ticks.load(Ordering::SeqCst),
            failures: self.counters.failures.load(Ordering::SeqCst),
        }
    }

    /// Stop scheduling ticks and wait for the in-flight tick. Idempotent.
    pub fn stop(&mut self) -> SamplerStats {
        if let Some(tx) = self.stop_tx.take() {
            // The thread may already have exited after a fatal tick.
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("sampler [{}] thread panicked outside a tick", self.name);
            }
            let stats = self.stats();
            info!(
                "stopped sampler [{}] after {} tick(s), {} failed",
                self.name, stats.ticks, stats.failures
            );
        }
        self.stats()
    }
}

impl Drop for PeriodicSampler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_tick<R: Recorder>(recorder: &mut R, counters: &SamplerCounters) -> TickOutcome {
    counters.ticks.fetch_add(1, Ordering::SeqCst);
    match catch_unwind(AssertUnwindSafe(|| recorder.record())) {
        Ok(Ok(())) => TickOutcome::Recorded,
        Ok(Err(e)) => {
            counters.failures.fetch_add(1, Ordering::SeqCst);
            error!("sampler [{}] failed to record: {e}", recorder.name());
            if e.is_retryable() {
                TickOutcome::Failed
            } else {
                TickOutcome::Fatal
            }
        }
        Err(_) => {
            counters.failures.fetch_add(1, Ordering::SeqCst);
            error!("sampler [{}] panicked while recording", recorder.name());
            TickOutcome::Failed
        }
    }
}
