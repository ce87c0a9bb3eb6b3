//! Budgeted tile accumulation.
//!
//! One call to [`AccumulationLoopController::run_accumulation_budget`] pulls
//! tiles from a [`TileScheduler`], dispatches them one at a time and stops once
//! the GPU time measured since the start of the call exceeds the budget.

use std::time::{Duration, Instant};

use tiles::{Tile, TileScheduler};

const NANOS_PER_MILLI: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampMarker {
    Start,
    End,
}

pub trait TileKernel {
    /// Submits one compute dispatch addressed at `tile`, followed by a full
    /// barrier so the next dispatch observes its writes.
    fn dispatch_tile(&mut self, tile: Tile);
}

pub trait TimestampQueries {
    /// Records a timestamp after all previously submitted work.
    fn write_timestamp(&mut self, marker: TimestampMarker);

    /// Nanoseconds recorded for `marker`, or `None` while the value is not yet
    /// readable on the host.
    fn read_timestamp_ns(&mut self, marker: TimestampMarker) -> Option<u64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccumulationLoopConfig {
    pub max_poll_attempts: u32,
    pub poll_timeout: Duration,
}

impl Default for AccumulationLoopConfig {
    fn default() -> Self {
        Self {
            max_poll_attempts: 1_000_000,
            poll_timeout: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulationStop {
    BudgetExhausted,
    /// The scheduler's current pass ended during this call.
    PassLimitReached,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccumulationReport {
    pub tiles_dispatched: u32,
    pub elapsed_millis: f64,
    pub average_tile_millis: f64,
    /// Passes completed by the scheduler during this call.
    pub passes_completed: u64,
    pub stop_reason: AccumulationStop,
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum AccumulationError {
    #[error("accumulation budget {budget_millis} ms must be finite and non-negative")]
    InvalidBudget { budget_millis: f64 },
    #[error(
        "gpu timestamps unavailable after {poll_attempts} polls ({waited:?}), {tiles_dispatched} tiles dispatched"
    )]
    TimestampUnavailable {
        tiles_dispatched: u32,
        poll_attempts: u32,
        waited: Duration,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccumulationTelemetry {
    pub calls: u64,
    pub tiles_dispatched: u64,
    pub timestamp_faults: u64,
}

#[derive(Debug, Clone, Copy)]
struct PollTimeout {
    attempts: u32,
    waited: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct AccumulationLoopController {
    config: AccumulationLoopConfig,
    telemetry: AccumulationTelemetry,
}

impl AccumulationLoopController {
    pub fn new(config: AccumulationLoopConfig) -> Self {
        Self {
            config,
            telemetry: AccumulationTelemetry::default(),
        }
    }

    pub fn telemetry(&self) -> AccumulationTelemetry {
        self.telemetry
    }

    /// Dispatches tiles until the measured GPU time exceeds `budget_millis`.
    ///
    /// The budget is checked only after a dispatch has completed, so at least
    /// one tile is dispatched per call. A call also stops at the end of the
    /// scheduler's current pass, so no tile is dispatched twice in one call.
    /// A call that starts mid-pass therefore dispatches at most the tiles
    /// left in that pass.
    pub fn run_accumulation_budget<G>(
        &mut self,
        budget_millis: f64,
        scheduler: &mut TileScheduler,
        gpu: &mut G,
    ) -> Result<AccumulationReport, AccumulationError>
    where
        G: TileKernel + TimestampQueries,
    {
        if !budget_millis.is_finite() || budget_millis < 0.0 {
            return Err(AccumulationError::InvalidBudget { budget_millis });
        }
        self.telemetry.calls += 1;

        let passes_before = scheduler.passes_completed();
        let mut tiles_dispatched: u32 = 0;

        gpu.write_timestamp(TimestampMarker::Start);
        loop {
            let tile = scheduler.next_tile();
            gpu.dispatch_tile(tile);
            gpu.write_timestamp(TimestampMarker::End);
            tiles_dispatched += 1;
            self.telemetry.tiles_dispatched += 1;

            let elapsed_ns = match self.await_elapsed_ns(gpu) {
                Ok(elapsed_ns) => elapsed_ns,
                Err(timeout) => {
                    self.telemetry.timestamp_faults += 1;
                    let error = AccumulationError::TimestampUnavailable {
                        tiles_dispatched,
                        poll_attempts: timeout.attempts,
                        waited: timeout.waited,
                    };
                    log::error!(target: "accumulate", "{error}");
                    return Err(error);
                }
            };
            let elapsed_millis = elapsed_ns as f64 / NANOS_PER_MILLI;

            let stop_reason = if elapsed_millis > budget_millis {
                AccumulationStop::BudgetExhausted
            } else if scheduler.passes_completed() > passes_before {
                AccumulationStop::PassLimitReached
            } else {
                continue;
            };

            let report = AccumulationReport {
                tiles_dispatched,
                elapsed_millis,
                average_tile_millis: elapsed_millis / f64::from(tiles_dispatched),
                passes_completed: scheduler.passes_completed() - passes_before,
                stop_reason,
            };
            log::debug!(
                target: "accumulate",
                "tiles={} elapsed_ms={:.3} avg_tile_ms={:.3} budget_ms={:.3} passes={} stop={:?}",
                report.tiles_dispatched,
                report.elapsed_millis,
                report.average_tile_millis,
                budget_millis,
                report.passes_completed,
                report.stop_reason,
            );
            return Ok(report);
        }
    }

    fn await_elapsed_ns<G: TimestampQueries>(&self, gpu: &mut G) -> Result<u64, PollTimeout> {
        let poll_started = Instant::now();
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            let start = gpu.read_timestamp_ns(TimestampMarker::Start);
            let end = gpu.read_timestamp_ns(TimestampMarker::End);
            if let (Some(start), Some(end)) = (start, end) {
                return Ok(end.saturating_sub(start));
            }

            let waited = poll_started.elapsed();
            if attempts >= self.config.max_poll_attempts || waited >= self.config.poll_timeout {
                return Err(PollTimeout { attempts, waited });
            }
            std::hint::spin_loop();
        }
    }
}
