//! Tick-rate configuration and fixed-step server stepping.

use std::time::Duration;

use tracing::debug;

use crate::error::{TickError, TickResult};
use crate::NetworkTick;

/// How the host waits between simulation steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FrameRateMode {
    /// Sleep when headless, busy-wait otherwise.
    #[default]
    Auto,
    /// Spin until the next step is due.
    BusyWait,
    /// Yield to the OS until the next step is due.
    Sleep,
}

impl FrameRateMode {
    /// Resolves `Auto` to a concrete mode.
    #[must_use]
    pub const fn resolve(self, headless: bool) -> Self {
        match self {
            Self::Auto if headless => Self::Sleep,
            Self::Auto => Self::BusyWait,
            other => other,
        }
    }
}

/// Simulation and network rates.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TickRateConfig {
    /// Simulation ticks per second.
    pub simulation_tick_rate: u32,
    /// Snapshots are sent to a given connection every `network_send_divisor` ticks.
    pub network_send_divisor: u32,
    /// Maximum simulation steps executed per host frame.
    pub max_steps_per_frame: u32,
    /// Maximum ticks folded into a single long step when behind.
    pub max_step_batch: u32,
    pub frame_rate_mode: FrameRateMode,
}

impl Default for TickRateConfig {
    fn default() -> Self {
        Self {
            simulation_tick_rate: 60,
            network_send_divisor: 1,
            max_steps_per_frame: 4,
            max_step_batch: 4,
            frame_rate_mode: FrameRateMode::Auto,
        }
    }
}

impl TickRateConfig {
    /// A small fixed config for tests: 30 Hz, send every tick, no batching.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            simulation_tick_rate: 30,
            network_send_divisor: 1,
            max_steps_per_frame: 2,
            max_step_batch: 1,
            frame_rate_mode: FrameRateMode::Sleep,
        }
    }

    pub fn validate(&self) -> TickResult<()> {
        if self.simulation_tick_rate == 0 {
            return Err(TickError::InvalidConfig {
                field: "simulation_tick_rate",
                reason: "must be positive",
            });
        }
        if self.network_send_divisor == 0 {
            return Err(TickError::InvalidConfig {
                field: "network_send_divisor",
                reason: "must be positive",
            });
        }
        if self.max_steps_per_frame == 0 {
            return Err(TickError::InvalidConfig {
                field: "max_steps_per_frame",
                reason: "must be positive",
            });
        }
        if self.max_step_batch == 0 {
            return Err(TickError::InvalidConfig {
                field: "max_step_batch",
                reason: "must be positive",
            });
        }
        Ok(())
    }

    /// Duration of one simulation tick.
    #[must_use]
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.simulation_tick_rate.max(1)))
    }

    /// Whether connection `slot` receives a snapshot on `tick`.
    ///
    /// Slots are spread round-robin over the divisor so each tick serves
    /// roughly `1 / divisor` of the connections.
    #[must_use]
    pub fn sends_on(&self, tick: NetworkTick, slot: u32) -> bool {
        let divisor = self.network_send_divisor.max(1);
        tick.index().wrapping_add(slot % divisor) % divisor == 0
    }
}

/// One simulation step to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// Server tick after this step.
    pub tick: NetworkTick,
    /// Ticks folded into this step (1 unless catching up).
    pub batch: u32,
    /// Simulated time for the step.
    pub dt: Duration,
}

/// Steps produced by one host frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepPlan {
    pub steps: Vec<Step>,
    /// Ticks of backlog discarded because the frame could not catch up.
    pub dropped_ticks: u32,
}

/// Fixed-timestep accumulator for the server simulation.
///
/// Each [`advance`](Self::advance) converts wall time into whole ticks. When
/// the backlog exceeds `max_steps_per_frame`, ticks are folded into long steps
/// of up to `max_step_batch` ticks; whatever still does not fit is dropped.
/// The server tick only ever moves forward.
#[derive(Debug, Clone)]
pub struct ServerTickStepper {
    config: TickRateConfig,
    tick_dt: Duration,
    tick: NetworkTick,
    accumulator: Duration,
}

impl ServerTickStepper {
    pub fn new(config: TickRateConfig, start: NetworkTick) -> TickResult<Self> {
        config.validate()?;
        Ok(Self {
            tick_dt: config.tick_duration(),
            config,
            tick: start,
            accumulator: Duration::ZERO,
        })
    }

    #[must_use]
    pub const fn tick(&self) -> NetworkTick {
        self.tick
    }

    #[must_use]
    pub const fn config(&self) -> &TickRateConfig {
        &self.config
    }

    /// Time left until the next step is due.
    #[must_use]
    pub fn time_to_next_step(&self) -> Duration {
        self.tick_dt.saturating_sub(self.accumulator)
    }

    pub fn advance(&mut self, frame_dt: Duration) -> StepPlan {
        self.accumulator = self.accumulator.saturating_add(frame_dt);
        let dt_nanos = self.tick_dt.as_nanos().max(1);
        let nanos = self.accumulator.as_nanos();
        // Backlog past u32::MAX ticks is dropped below anyway.
        let pending = u32::try_from(nanos / dt_nanos).unwrap_or(u32::MAX);
        self.accumulator = Duration::from_nanos(u64::try_from(nanos % dt_nanos).unwrap_or(u64::MAX));

        let max_steps = self.config.max_steps_per_frame;
        let batch = if pending <= max_steps {
            1
        } else {
            pending.div_ceil(max_steps).min(self.config.max_step_batch)
        };

        let mut plan = StepPlan::default();
        let mut remaining = pending;
        while remaining > 0 && (plan.steps.len() as u32) < max_steps {
            let ticks = remaining.min(batch);
            self.tick = self.tick.add(ticks);
            plan.steps.push(Step {
                tick: self.tick,
                batch: ticks,
                dt: self.tick_dt * ticks,
            });
            remaining -= ticks;
        }
        plan.dropped_ticks = remaining;
        if remaining > 0 {
            debug!(
                dropped = remaining,
                tick = %self.tick,
                "server stepping slipped behind wall clock"
            );
        }
        plan
    }
}
