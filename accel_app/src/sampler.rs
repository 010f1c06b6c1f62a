//! Fixed-cadence sampling loop.
//!
//! The loop is a small state machine (`Idle -> Configured -> Running ->
//! Stopped`) with its clock, sensor and sink all injected, so every
//! scheduling and failure-policy decision is testable without hardware
//! or a database. Tick deadlines come from a fixed grid anchored at loop
//! start; a slow poll or sink write delays the current tick but never
//! shifts the grid.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use log::{info, warn};

use crate::sink::{Sink, SinkError};

/// Source of converted readings, one per poll. Implemented by the sensor
/// glue in `main` and by fakes in tests.
pub trait AccelSource {
    /// One-time device bring-up. Must succeed before polling starts.
    fn configure(&mut self) -> Result<(), SourceError>;
    /// One reading in units of standard gravity, x/y/z.
    fn read_g(&mut self) -> Result<[f64; 3], SourceError>;
}

#[derive(Debug)]
pub enum SourceError {
    /// A flaky-bus style failure; the next tick may well succeed.
    Transient(String),
    /// The device state can no longer be trusted.
    Fatal(String),
}

/// Time as seen by the loop. Wall time stamps the samples; monotonic
/// time drives the schedule.
pub trait Clock {
    fn wall_now(&self) -> SystemTime;
    fn mono_now(&self) -> Instant;
    fn sleep_until(&mut self, deadline: Instant);
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn wall_now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn mono_now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&mut self, deadline: Instant) {
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Configured,
    Running,
    Stopped,
}

#[derive(Debug)]
pub enum FatalError {
    /// `run` was called before `configure` succeeded.
    NotConfigured,
    Source(String),
    Sink(String),
    RetryBudgetExhausted { failures: u32, last: String },
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalError::NotConfigured => write!(f, "sampling loop started before configuration"),
            FatalError::Source(msg) => write!(f, "sensor failed: {}", msg),
            FatalError::Sink(msg) => write!(f, "sink failed: {}", msg),
            FatalError::RetryBudgetExhausted { failures, last } => write!(
                f,
                "{} consecutive failed ticks, giving up (last: {})",
                failures, last
            ),
        }
    }
}

impl std::error::Error for FatalError {}

enum TickFailure {
    Transient(String),
    Fatal(FatalError),
}

pub struct Sampler<S, K, C> {
    source: S,
    sink: K,
    clock: C,
    interval: Duration,
    failure_budget: u32,
    measurement: String,
    stop: Arc<AtomicBool>,
    state: LoopState,
}

impl<S, K, C> Sampler<S, K, C>
where
    S: AccelSource,
    K: Sink,
    C: Clock,
{
    pub fn new(
        source: S,
        sink: K,
        clock: C,
        interval: Duration,
        failure_budget: u32,
        measurement: String,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            sink,
            clock,
            interval,
            failure_budget,
            measurement,
            stop,
            state: LoopState::Idle,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Brings the device up. On failure the loop stays `Idle` and the
    /// error is surfaced to the caller.
    pub fn configure(&mut self) -> Result<(), FatalError> {
        match self.source.configure() {
            Ok(()) => {
                self.state = LoopState::Configured;
                Ok(())
            }
            Err(SourceError::Transient(msg)) | Err(SourceError::Fatal(msg)) => {
                Err(FatalError::Source(msg))
            }
        }
    }

    /// Polls until the stop flag is raised (clean shutdown, `Ok`) or a
    /// fatal condition ends the loop (`Err`, surfaced exactly once).
    /// Either way the loop lands in `Stopped`.
    pub fn run(&mut self) -> Result<(), FatalError> {
        if self.state != LoopState::Configured {
            return Err(FatalError::NotConfigured);
        }
        self.state = LoopState::Running;
        info!(
            "sampling every {:?} into measurement '{}'",
            self.interval, self.measurement
        );

        let start = self.clock.mono_now();
        let mut tick: u64 = 0;
        let mut consecutive: u32 = 0;

        loop {
            // Shutdown takes effect here, at a tick boundary, never in
            // the middle of a bus transaction or sink write.
            if self.stop.load(Ordering::Relaxed) {
                info!("stop requested, shutting down");
                self.state = LoopState::Stopped;
                return Ok(());
            }

            let deadline = start + self.interval.mul_f64(tick as f64);
            self.clock.sleep_until(deadline);

            match self.poll_once() {
                Ok(()) => consecutive = 0,
                Err(TickFailure::Transient(msg)) => {
                    consecutive += 1;
                    warn!(
                        "tick failed ({} consecutive, budget {}): {}",
                        consecutive, self.failure_budget, msg
                    );
                    if consecutive >= self.failure_budget {
                        self.state = LoopState::Stopped;
                        return Err(FatalError::RetryBudgetExhausted {
                            failures: consecutive,
                            last: msg,
                        });
                    }
                }
                Err(TickFailure::Fatal(err)) => {
                    self.state = LoopState::Stopped;
                    return Err(err);
                }
            }

            // Next grid slot still in the future. An overrunning tick
            // skips slots instead of firing a burst of late polls.
            let elapsed = self.clock.mono_now().duration_since(start);
            let grid = (elapsed.as_nanos() / self.interval.as_nanos().max(1)) as u64;
            tick = (tick + 1).max(grid + 1);
        }
    }

    fn poll_once(&mut self) -> Result<(), TickFailure> {
        let g = match self.source.read_g() {
            Ok(g) => g,
            Err(SourceError::Transient(msg)) => return Err(TickFailure::Transient(msg)),
            Err(SourceError::Fatal(msg)) => {
                return Err(TickFailure::Fatal(FatalError::Source(msg)))
            }
        };

        let fields = [("x", g[0]), ("y", g[1]), ("z", g[2])];
        match self
            .sink
            .write(&self.measurement, &fields, self.clock.wall_now())
        {
            Ok(()) => Ok(()),
            Err(SinkError::Retryable(e)) => Err(TickFailure::Transient(format!("sink: {}", e))),
            Err(SinkError::Fatal(msg)) => Err(TickFailure::Fatal(FatalError::Sink(msg))),
        }
    }
}
