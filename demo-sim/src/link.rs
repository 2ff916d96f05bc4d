//! In-process lossy, delayed datagram link.

use std::collections::VecDeque;

/// Deterministic LCG so runs with the same seed match exactly.
#[derive(Debug, Clone)]
pub struct Rng {
    state: u64,
}

impl Rng {
    pub const fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.state >> 32) as u32
    }

    /// Uniform in `[min, max]`.
    pub fn range_f32(&mut self, min: f32, max: f32) -> f32 {
        let unit = self.next_u32() as f32 / u32::MAX as f32;
        unit.mul_add(max - min, min)
    }

    /// True with probability `percent / 100`.
    pub fn chance(&mut self, percent: u32) -> bool {
        self.next_u32() % 100 < percent
    }
}

/// One direction of a connection. Datagrams are dropped with probability
/// `loss_percent` and otherwise delivered, in order, `latency_ticks` later.
#[derive(Debug)]
pub struct LossyLink {
    loss_percent: u32,
    latency_ticks: u32,
    rng: Rng,
    in_flight: VecDeque<(u32, Vec<u8>)>,
    sent: u64,
    lost: u64,
}

impl LossyLink {
    pub const fn new(loss_percent: u32, latency_ticks: u32, seed: u64) -> Self {
        Self {
            loss_percent,
            latency_ticks,
            rng: Rng::new(seed),
            in_flight: VecDeque::new(),
            sent: 0,
            lost: 0,
        }
    }

    /// Returns false when the datagram was lost.
    pub fn send(&mut self, now: u32, bytes: Vec<u8>) -> bool {
        self.sent += 1;
        if self.rng.chance(self.loss_percent) {
            self.lost += 1;
            return false;
        }
        self.in_flight.push_back((now + self.latency_ticks, bytes));
        true
    }

    /// Datagrams due at or before `now`.
    pub fn deliver(&mut self, now: u32) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while self.in_flight.front().is_some_and(|(due, _)| *due <= now) {
            if let Some((_, bytes)) = self.in_flight.pop_front() {
                out.push(bytes);
            }
        }
        out
    }

    pub const fn sent(&self) -> u64 {
        self.sent
    }

    pub const fn lost(&self) -> u64 {
        self.lost
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_after_latency() {
        let mut link = LossyLink::new(0, 3, 7);
        assert!(link.send(10, vec![1]));
        assert!(link.send(11, vec![2]));
        assert!(link.deliver(12).is_empty());
        assert_eq!(link.deliver(13), vec![vec![1]]);
        assert_eq!(link.deliver(20), vec![vec![2]]);
    }

    #[test]
    fn total_loss_drops_everything() {
        let mut link = LossyLink::new(100, 0, 7);
        for now in 0..10 {
            assert!(!link.send(now, vec![0]));
        }
        assert_eq!(link.lost(), 10);
        assert!(link.deliver(100).is_empty());
    }

    #[test]
    fn same_seed_same_losses() {
        let run = |seed| {
            let mut link = LossyLink::new(30, 0, seed);
            (0..64).map(|now| link.send(now, Vec::new())).collect::<Vec<_>>()
        };
        assert_eq!(run(5), run(5));
    }
}
