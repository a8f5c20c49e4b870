use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rcdrive_traits::DriveOutput;
use rcdrive_traits::clock::Clock;

use crate::error::Result as CoreResult;
use crate::inputs::ControlInputs;
use crate::motor::Motor;
use crate::sampler::RangeSampler;
use crate::status::TickStatus;

/// When the loop should end. With nothing set it runs until `shutdown` flips.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Stop after this much wall time on the loop's clock.
    pub duration: Option<Duration>,
    /// Stop after this many ticks.
    pub max_ticks: Option<u64>,
    /// Cooperative stop flag, e.g. set from a signal handler.
    pub shutdown: Option<Arc<AtomicBool>>,
}

/// What happened during a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    pub stall_trips: u64,
    pub paused_ticks: u64,
    pub final_measured_rps: f32,
    pub peak_measured_rps: f32,
    /// Lowest AEB ceiling seen while running, rps.
    pub min_aeb_ceiling_rps: Option<f32>,
    /// Longest time spent inside one iteration, µs.
    pub max_tick_us: u64,
    /// Iterations that took longer than the nominal period.
    pub overruns: u64,
    pub elapsed_ms: u64,
}

#[inline]
fn should_stop(opts: &RunOptions, ticks: u64, elapsed: Duration) -> bool {
    if let Some(flag) = &opts.shutdown
        && flag.load(Ordering::Relaxed)
    {
        return true;
    }
    if let Some(d) = opts.duration
        && elapsed >= d
    {
        return true;
    }
    matches!(opts.max_ticks, Some(n) if ticks >= n)
}

#[inline]
fn duration_us(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

/// Drive `motor` periodically until `opts` says stop, then zero the output.
///
/// Each iteration pulls the latest inputs and range reading, runs one tick on
/// the motor's clock and sleeps out the rest of the period on `clock`. Both
/// drive channels are zeroed on every exit path, including errors.
pub fn run<D, C>(
    motor: &mut Motor<D>,
    inputs: Option<&ControlInputs>,
    range: Option<&RangeSampler>,
    clock: &C,
    opts: &RunOptions,
) -> CoreResult<RunSummary>
where
    D: DriveOutput,
    C: Clock + ?Sized,
{
    tracing::info!(
        tick_ms = u64::try_from(motor.nominal_tick().as_millis()).unwrap_or(u64::MAX),
        aeb = motor.has_aeb(),
        "control loop start"
    );
    let outcome = run_loop(motor, inputs, range, clock, opts);
    let stopped = motor.stop();
    match &outcome {
        Ok(s) => tracing::info!(
            ticks = s.ticks,
            stall_trips = s.stall_trips,
            final_rps = s.final_measured_rps,
            "control loop stopped"
        ),
        Err(e) => tracing::error!(error = %e, "control loop aborted"),
    }
    if let Err(e) = &stopped {
        tracing::error!(error = %e, "failed to zero drive on teardown");
    }
    let summary = outcome?;
    stopped?;
    Ok(summary)
}

fn run_loop<D, C>(
    motor: &mut Motor<D>,
    inputs: Option<&ControlInputs>,
    range: Option<&RangeSampler>,
    clock: &C,
    opts: &RunOptions,
) -> CoreResult<RunSummary>
where
    D: DriveOutput,
    C: Clock + ?Sized,
{
    let period = motor.nominal_tick();
    let start = clock.now();
    let mut s = RunSummary::default();

    loop {
        let iter_start = clock.now();
        if should_stop(opts, s.ticks, iter_start.saturating_duration_since(start)) {
            break;
        }

        if let Some(i) = inputs {
            motor.apply_inputs(i);
        }
        if let Some(r) = range
            && let Some(reading) = r.latest()
        {
            motor.set_distance_mm(reading.map(u32::from));
        }

        let status = motor.tick_now()?;
        s.ticks += 1;
        match status {
            TickStatus::StallDetected => s.stall_trips += 1,
            TickStatus::StallPaused { .. } => s.paused_ticks += 1,
            TickStatus::Running | TickStatus::Idle => {}
        }
        let measured = motor.measured_rps();
        s.final_measured_rps = measured;
        if measured.abs() > s.peak_measured_rps.abs() {
            s.peak_measured_rps = measured;
        }
        if motor.has_aeb() {
            let c = motor.aeb_ceiling_rps();
            s.min_aeb_ceiling_rps = Some(s.min_aeb_ceiling_rps.map_or(c, |m| m.min(c)));
        }

        let spent = clock.now().saturating_duration_since(iter_start);
        s.max_tick_us = s.max_tick_us.max(duration_us(spent));
        if spent >= period {
            s.overruns += 1;
        } else {
            clock.sleep(period - spent);
        }
    }

    s.elapsed_ms = clock.ms_since(start);
    Ok(s)
}
