//! Client simulation clock with rewind support for prediction replay.

use crate::error::{TickError, TickResult};
use crate::{NetworkTick, PartialTick};

/// The client's current simulation tick.
///
/// The prediction loop rewinds the clock to replay from an older tick and
/// must restore it afterwards; systems that read the clock during replay see
/// the replayed tick.
#[derive(Debug, Clone)]
pub struct ClientTickClock {
    current: PartialTick,
    saved: Option<PartialTick>,
}

impl ClientTickClock {
    #[must_use]
    pub const fn new(start: NetworkTick) -> Self {
        Self {
            current: PartialTick::full(start),
            saved: None,
        }
    }

    #[must_use]
    pub const fn current(&self) -> PartialTick {
        self.current
    }

    #[must_use]
    pub const fn is_rewound(&self) -> bool {
        self.saved.is_some()
    }

    /// Sets the clock outside of a prediction loop.
    pub fn set(&mut self, tick: PartialTick) {
        self.current = tick;
    }

    /// Saves the live tick and moves the clock to `tick` for replay.
    pub fn rewind_for_prediction(&mut self, tick: PartialTick) -> TickResult<()> {
        if let Some(saved) = self.saved {
            return Err(TickError::AlreadyRewound {
                rewound_to: saved.tick.raw(),
            });
        }
        self.saved = Some(self.current);
        self.current = tick;
        Ok(())
    }

    /// Advances the replay clock by one full tick.
    pub fn step_replay(&mut self) -> NetworkTick {
        let next = self.current.last_full_tick().add(1);
        self.current = PartialTick::full(next);
        next
    }

    /// Restores the tick saved by [`rewind_for_prediction`](Self::rewind_for_prediction).
    pub fn restore_after_prediction(&mut self) -> TickResult<PartialTick> {
        let saved = self.saved.take().ok_or(TickError::NotRewound)?;
        self.current = saved;
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewind_and_restore() {
        let mut clock = ClientTickClock::new(NetworkTick::new(60));
        clock
            .rewind_for_prediction(PartialTick::full(NetworkTick::new(55)))
            .unwrap();
        assert!(clock.is_rewound());
        assert_eq!(clock.step_replay().index(), 56);
        assert_eq!(clock.current().tick.index(), 56);
        let restored = clock.restore_after_prediction().unwrap();
        assert_eq!(restored.tick.index(), 60);
        assert!(!clock.is_rewound());
    }

    #[test]
    fn restore_without_rewind_fails() {
        let mut clock = ClientTickClock::new(NetworkTick::new(1));
        assert_eq!(clock.restore_after_prediction(), Err(TickError::NotRewound));
    }

    #[test]
    fn double_rewind_fails() {
        let mut clock = ClientTickClock::new(NetworkTick::new(9));
        let to = PartialTick::full(NetworkTick::new(5));
        clock.rewind_for_prediction(to).unwrap();
        assert!(matches!(
            clock.rewind_for_prediction(to),
            Err(TickError::AlreadyRewound { .. })
        ));
    }
}
