/// Timed multi-sensor sampling over one averaging window
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::SensorError;
use crate::i2c::bus::I2cBus;
use crate::i2c::mux::Tca9548a;
use crate::models::{Schema, WindowBuffers};
use crate::registry::RoleProbe;
use crate::utils::{format_datetime, now_local};

/// Monotonic time source for tick pacing
pub trait Clock {
    /// Time since an arbitrary fixed origin
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Cadence of one window
#[derive(Debug, Clone)]
pub struct SamplingPlan {
    pub tick_interval: Duration,
    pub points: u32,
    /// Log every raw reading as it arrives
    pub print_readings: bool,
}

/// Sleep needed to keep tick starts `interval` apart
///
/// Reads that overrun the interval start the next tick immediately; there
/// is no catch-up.
pub fn remaining_wait(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// Collect `plan.points` ticks of readings from every probe
///
/// A failed read skips that role for that tick only; its buffers simply
/// end up shorter than the others.
pub fn capture_window(
    bus: &mut dyn I2cBus,
    mux: &mut Tca9548a,
    probes: &mut [RoleProbe],
    schema: &Schema,
    plan: &SamplingPlan,
    clock: &dyn Clock,
) -> WindowBuffers {
    let mut window = WindowBuffers::new(schema.clone(), now_local());
    let window_start = clock.now();

    // Column of every (probe, parameter) pair, resolved once per window
    let columns: Vec<Vec<Option<usize>>> = probes
        .iter()
        .map(|probe| {
            probe
                .role
                .parameters
                .iter()
                .map(|parameter| schema.position(probe.role.name, parameter))
                .collect()
        })
        .collect();

    for tick in 0..plan.points {
        let tick_start = clock.now();

        for (probe, columns) in probes.iter_mut().zip(&columns) {
            let values = match mux
                .select(bus, probe.role.channel)
                .and_then(|_| probe.sensor.read(bus))
            {
                Ok(values) => values,
                Err(e) => {
                    window.stats.skipped_reads += 1;
                    match &e {
                        SensorError::Unavailable { .. } => debug!(
                            "Tick {}: {} ({}) skipped: {}",
                            tick + 1,
                            probe.role.name,
                            probe.sensor.name(),
                            e
                        ),
                        _ => warn!(
                            "Tick {}: {} ({}) skipped: {}",
                            tick + 1,
                            probe.role.name,
                            probe.sensor.name(),
                            e
                        ),
                    }
                    continue;
                }
            };

            if values.len() != columns.len() {
                warn!(
                    "{} returned {} values for {} parameters",
                    probe.role.name,
                    values.len(),
                    columns.len()
                );
            }

            for ((parameter, column), value) in probe.role.parameters.iter().zip(columns).zip(values) {
                if plan.print_readings {
                    info!("{:<10} {:<12} {:>12.2}", probe.role.name, parameter, value);
                }
                match column {
                    Some(column) if value.is_finite() => window.push(*column, value),
                    _ => debug!("Tick {}: {} {} not recorded", tick + 1, probe.role.name, parameter),
                }
            }
        }

        let elapsed = clock.now().saturating_sub(tick_start);
        let wait = remaining_wait(plan.tick_interval, elapsed);
        window.stats.ticks += 1;
        window.stats.total_wait += wait;
        if !wait.is_zero() {
            clock.sleep(wait);
        }
    }

    window.stats.elapsed = clock.now().saturating_sub(window_start);
    info!(
        "Window started {} ran {} ticks in {:.1}s (average wait {:.3}s, {} skipped reads)",
        format_datetime(&window.started),
        window.stats.ticks,
        window.stats.elapsed.as_secs_f64(),
        window.stats.average_wait().as_secs_f64(),
        window.stats.skipped_reads
    );

    window
}
