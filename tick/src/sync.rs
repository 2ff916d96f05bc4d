//! Client-side estimation of the server timeline.
//!
//! The client runs two clocks relative to the newest server tick it has seen:
//! a prediction clock ahead of the server (so commands arrive in time) and an
//! interpolation clock behind it (so there are always two snapshots to blend).
//! Both converge on their targets by nudging their rate, and hard-reset when
//! they are too far off.

use std::time::Duration;

use tracing::debug;

use crate::error::{TickError, TickResult};
use crate::{NetworkTick, PartialTick};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeSyncConfig {
    /// Ticks the interpolation clock trails the newest server tick.
    pub interpolation_delay_ticks: f32,
    /// Jitter multiples added to the prediction lead.
    pub jitter_margin: f32,
    /// Extra ticks of prediction lead on top of half the RTT.
    pub command_slack_ticks: f32,
    /// Maximum relative rate change, e.g. `0.1` allows `[0.9, 1.1]`.
    pub max_time_scale_adjust: f32,
    /// Rate change per tick of error before clamping.
    pub time_scale_gain: f32,
    /// Error beyond this many ticks snaps the clock to its target.
    pub reset_threshold_ticks: f32,
    /// EWMA weight of a new RTT sample.
    pub rtt_smoothing: f32,
    /// EWMA weight of a new deviation sample.
    pub jitter_smoothing: f32,
}

impl Default for TimeSyncConfig {
    fn default() -> Self {
        Self {
            interpolation_delay_ticks: 2.0,
            jitter_margin: 2.0,
            command_slack_ticks: 1.0,
            max_time_scale_adjust: 0.1,
            time_scale_gain: 0.05,
            reset_threshold_ticks: 20.0,
            rtt_smoothing: 0.125,
            jitter_smoothing: 0.25,
        }
    }
}

impl TimeSyncConfig {
    pub fn validate(&self) -> TickResult<()> {
        if !(self.interpolation_delay_ticks >= 0.0) {
            return Err(TickError::InvalidConfig {
                field: "interpolation_delay_ticks",
                reason: "must be non-negative",
            });
        }
        if !(0.0..1.0).contains(&self.max_time_scale_adjust) {
            return Err(TickError::InvalidConfig {
                field: "max_time_scale_adjust",
                reason: "must be in [0, 1)",
            });
        }
        for (field, weight) in [
            ("rtt_smoothing", self.rtt_smoothing),
            ("jitter_smoothing", self.jitter_smoothing),
        ] {
            if !(weight > 0.0 && weight <= 1.0) {
                return Err(TickError::InvalidConfig {
                    field,
                    reason: "must be in (0, 1]",
                });
            }
        }
        if !(self.reset_threshold_ticks > 0.0) {
            return Err(TickError::InvalidConfig {
                field: "reset_threshold_ticks",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

/// Clock targets produced by [`ClientTimeSync::update`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSyncOutput {
    /// Where the prediction loop should simulate up to.
    pub predicted: PartialTick,
    /// Where remote ghosts should be rendered from.
    pub interpolated: PartialTick,
    /// Rate applied to the prediction clock this frame.
    pub predicted_scale: f32,
    /// Rate applied to the interpolation clock this frame.
    pub interpolated_scale: f32,
}

#[derive(Debug, Clone)]
pub struct ClientTimeSync {
    config: TimeSyncConfig,
    tick_secs: f64,
    rtt_secs: Option<f64>,
    jitter_secs: f64,
    latest_server_tick: NetworkTick,
    /// Ticks ahead of `latest_server_tick`.
    predicted_offset: f64,
    /// Ticks relative to `latest_server_tick` (normally negative).
    interpolated_offset: f64,
    resets: u32,
}

impl ClientTimeSync {
    pub fn new(config: TimeSyncConfig, tick_duration: Duration) -> TickResult<Self> {
        config.validate()?;
        if tick_duration.is_zero() {
            return Err(TickError::InvalidConfig {
                field: "tick_duration",
                reason: "must be positive",
            });
        }
        Ok(Self {
            config,
            tick_secs: tick_duration.as_secs_f64(),
            rtt_secs: None,
            jitter_secs: 0.0,
            latest_server_tick: NetworkTick::INVALID,
            predicted_offset: 0.0,
            interpolated_offset: 0.0,
            resets: 0,
        })
    }

    /// Smoothed round-trip time, once a sample exists.
    #[must_use]
    pub fn rtt(&self) -> Option<Duration> {
        self.rtt_secs.map(Duration::from_secs_f64)
    }

    /// Smoothed RTT deviation.
    #[must_use]
    pub fn jitter(&self) -> Duration {
        Duration::from_secs_f64(self.jitter_secs)
    }

    #[must_use]
    pub const fn latest_server_tick(&self) -> NetworkTick {
        self.latest_server_tick
    }

    /// Number of hard resets so far.
    #[must_use]
    pub const fn resets(&self) -> u32 {
        self.resets
    }

    /// Feeds one round-trip measurement.
    pub fn record_rtt_sample(&mut self, sample: Duration) {
        let sample = sample.as_secs_f64();
        match self.rtt_secs {
            None => {
                self.rtt_secs = Some(sample);
                self.jitter_secs = sample / 2.0;
            }
            Some(rtt) => {
                let beta = f64::from(self.config.jitter_smoothing);
                let alpha = f64::from(self.config.rtt_smoothing);
                self.jitter_secs = (1.0 - beta).mul_add(self.jitter_secs, beta * (rtt - sample).abs());
                self.rtt_secs = Some((1.0 - alpha).mul_add(rtt, alpha * sample));
            }
        }
    }

    /// Records a server tick seen in a snapshot. Older ticks are ignored.
    pub fn on_server_tick(&mut self, tick: NetworkTick) {
        if !tick.is_valid() {
            return;
        }
        if !self.latest_server_tick.is_valid() {
            self.latest_server_tick = tick;
            self.predicted_offset = self.predicted_target();
            self.interpolated_offset = self.interpolated_target();
            return;
        }
        if tick.is_newer_than(self.latest_server_tick) {
            let advanced = f64::from(tick.ticks_since(self.latest_server_tick));
            self.latest_server_tick = tick;
            self.predicted_offset -= advanced;
            self.interpolated_offset -= advanced;
        }
    }

    /// Prediction lead in ticks the clock converges towards.
    #[must_use]
    pub fn predicted_target(&self) -> f64 {
        let rtt = self.rtt_secs.unwrap_or(0.0);
        let lead_secs = f64::from(self.config.jitter_margin).mul_add(self.jitter_secs, rtt / 2.0);
        lead_secs / self.tick_secs + f64::from(self.config.command_slack_ticks)
    }

    /// Interpolation position in ticks the clock converges towards.
    #[must_use]
    pub fn interpolated_target(&self) -> f64 {
        -f64::from(self.config.interpolation_delay_ticks)
    }

    /// Advances both clocks by one host frame.
    ///
    /// Returns `None` until the first server tick has been seen.
    pub fn update(&mut self, frame_dt: Duration) -> Option<TimeSyncOutput> {
        if !self.latest_server_tick.is_valid() {
            return None;
        }
        let frame_ticks = frame_dt.as_secs_f64() / self.tick_secs;

        let predicted_target = self.predicted_target();
        let interpolated_target = self.interpolated_target();
        let (predicted_offset, predicted_scale) =
            self.step_clock("predicted", self.predicted_offset, predicted_target, frame_ticks);
        let (interpolated_offset, interpolated_scale) = self.step_clock(
            "interpolated",
            self.interpolated_offset,
            interpolated_target,
            frame_ticks,
        );
        self.predicted_offset = predicted_offset;
        // Interpolation never runs past the newest snapshot.
        self.interpolated_offset = interpolated_offset.min(0.0);

        Some(TimeSyncOutput {
            predicted: PartialTick::from_offset(self.latest_server_tick, self.predicted_offset),
            interpolated: PartialTick::from_offset(
                self.latest_server_tick,
                self.interpolated_offset,
            ),
            predicted_scale,
            interpolated_scale,
        })
    }

    fn step_clock(&mut self, clock: &'static str, offset: f64, target: f64, frame_ticks: f64) -> (f64, f32) {
        // Error measured where the clock would land at nominal rate.
        let error = target - (offset + frame_ticks);
        if error.abs() > f64::from(self.config.reset_threshold_ticks) {
            self.resets += 1;
            debug!(clock, error, target, "time sync hard reset");
            return (target, 1.0);
        }
        let adjust = f64::from(self.config.max_time_scale_adjust);
        let scale = f64::from(self.config.time_scale_gain)
            .mul_add(error, 1.0)
            .clamp(1.0 - adjust, 1.0 + adjust);
        (frame_ticks.mul_add(scale, offset), scale as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(20);

    fn sync() -> ClientTimeSync {
        ClientTimeSync::new(TimeSyncConfig::default(), TICK).unwrap()
    }

    #[test]
    fn no_output_before_first_snapshot() {
        let mut sync = sync();
        assert!(sync.update(TICK).is_none());
    }

    #[test]
    fn rtt_ewma_tracks_samples() {
        let mut sync = sync();
        sync.record_rtt_sample(Duration::from_millis(100));
        assert_eq!(sync.rtt(), Some(Duration::from_millis(100)));
        for _ in 0..200 {
            sync.record_rtt_sample(Duration::from_millis(60));
        }
        let rtt = sync.rtt().unwrap().as_secs_f64();
        assert!((rtt - 0.060).abs() < 0.001, "rtt {rtt}");
        assert!(sync.jitter() < Duration::from_millis(2));
    }

    #[test]
    fn predicted_leads_and_interpolated_trails() {
        let mut sync = sync();
        sync.record_rtt_sample(Duration::from_millis(100));
        sync.on_server_tick(NetworkTick::new(500));
        let out = sync.update(Duration::ZERO).unwrap();
        assert!(out.predicted.tick.is_newer_than(NetworkTick::new(500)));
        assert!(NetworkTick::new(500).is_newer_than(out.interpolated.tick));
    }

    #[test]
    fn converges_with_steady_server() {
        let mut sync = sync();
        sync.record_rtt_sample(Duration::from_millis(80));
        let mut server = NetworkTick::new(1000);
        sync.on_server_tick(server);
        // Start the clock badly behind but inside the reset threshold.
        sync.predicted_offset -= 6.0;
        for _ in 0..2000 {
            server.increment();
            sync.on_server_tick(server);
            sync.update(TICK);
        }
        let error = sync.predicted_target() - sync.predicted_offset;
        assert!(error.abs() < 0.5, "error {error}");
        assert_eq!(sync.resets(), 0);
    }

    #[test]
    fn large_error_hard_resets() {
        let mut sync = sync();
        sync.on_server_tick(NetworkTick::new(10));
        sync.on_server_tick(NetworkTick::new(200));
        let out = sync.update(Duration::ZERO).unwrap();
        assert!(sync.resets() >= 1);
        assert!((out.predicted_scale - 1.0).abs() < f32::EPSILON);
        assert!(out.predicted.tick.is_newer_than(NetworkTick::new(200)));
    }

    #[test]
    fn stale_server_tick_ignored() {
        let mut sync = sync();
        sync.on_server_tick(NetworkTick::new(50));
        sync.on_server_tick(NetworkTick::new(40));
        assert_eq!(sync.latest_server_tick(), NetworkTick::new(50));
    }

    #[test]
    fn config_validation() {
        let config = TimeSyncConfig {
            rtt_smoothing: 0.0,
            ..TimeSyncConfig::default()
        };
        assert!(ClientTimeSync::new(config, TICK).is_err());
        assert!(ClientTimeSync::new(TimeSyncConfig::default(), Duration::ZERO).is_err());
    }
}
