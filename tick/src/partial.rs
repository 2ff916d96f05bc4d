//! Partial ticks: a tick plus how much of it has elapsed.

use crate::NetworkTick;

/// Fractions this close to a tick boundary snap to it.
pub const FRACTION_SNAP: f32 = 0.05;

/// A point in simulation time.
///
/// `tick` is the tick being simulated and `fraction` is in `(0, 1]`, where
/// `1.0` means the tick is fully simulated. Fractions within
/// [`FRACTION_SNAP`] of either boundary snap to the boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialTick {
    pub tick: NetworkTick,
    pub fraction: f32,
}

impl PartialTick {
    /// A fully simulated tick.
    #[must_use]
    pub const fn full(tick: NetworkTick) -> Self {
        Self {
            tick,
            fraction: 1.0,
        }
    }

    /// Builds a partial tick, snapping near-boundary fractions.
    ///
    /// `fraction >= 0.95` becomes a full `tick`; `fraction <= 0.05` becomes the
    /// end of the previous full tick.
    #[must_use]
    pub fn new(tick: NetworkTick, fraction: f32) -> Self {
        if !fraction.is_finite() || fraction >= 1.0 - FRACTION_SNAP {
            return Self::full(tick);
        }
        if fraction <= FRACTION_SNAP {
            return Self::full(tick.subtract(1));
        }
        Self { tick, fraction }
    }

    /// Converts a continuous tick position relative to `base`.
    ///
    /// `offset_ticks = 0.0` is the end of `base`; `2.5` is halfway through `base + 3`.
    #[must_use]
    pub fn from_offset(base: NetworkTick, offset_ticks: f64) -> Self {
        let whole = offset_ticks.floor();
        let frac = (offset_ticks - whole) as f32;
        let whole = whole.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32;
        if frac <= 0.0 {
            return Self::full(base.offset(whole));
        }
        Self::new(base.offset(whole).add(1), frac)
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.fraction >= 1.0
    }

    /// The newest tick that is completely simulated at this point.
    #[must_use]
    pub fn last_full_tick(&self) -> NetworkTick {
        if self.is_full() {
            self.tick
        } else {
            self.tick.subtract(1)
        }
    }
}
