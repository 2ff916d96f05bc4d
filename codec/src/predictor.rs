//! Multi-baseline delta prediction.
//!
//! Both peers run the same integer arithmetic over the same baselines, so the
//! prediction is bit-identical on each side and the delta against it is exact.

use schema::LaneKind;
use tick::NetworkTick;

/// Predicts the current lanes of a ghost from up to three baselines.
///
/// Baselines are ordered newest first. Predictable lanes (integers and
/// quantized floats) are extrapolated; every other lane predicts the newest
/// baseline, or zero when there is none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaPredictor {
    count: usize,
    /// Ticks from the newest baseline to the predicted tick.
    ahead: i64,
    /// Ticks between baseline 1 and baseline 0.
    span01: i64,
    /// Ticks between baseline 2 and baseline 1.
    span12: i64,
}

impl DeltaPredictor {
    /// `baseline_ticks` must be strictly decreasing and older than `tick`.
    #[must_use]
    pub fn new(tick: NetworkTick, baseline_ticks: &[NetworkTick]) -> Self {
        let count = baseline_ticks.len().min(3);
        let span = |newer: usize, older: usize| {
            if count > older {
                i64::from(baseline_ticks[newer].ticks_since(baseline_ticks[older]))
            } else {
                0
            }
        };
        Self {
            count,
            ahead: if count > 0 {
                i64::from(tick.ticks_since(baseline_ticks[0]))
            } else {
                0
            },
            span01: span(0, 1),
            span12: span(1, 2),
        }
    }

    /// Number of baselines this predictor uses.
    #[must_use]
    pub const fn baselines(&self) -> usize {
        self.count
    }

    /// Fills `out` with the predicted value of every lane.
    ///
    /// `baselines` holds each baseline's lanes, newest first; only the first
    /// [`baselines`](Self::baselines) entries are read.
    pub fn predict(&self, lanes: &[LaneKind], baselines: &[&[u32]], out: &mut Vec<u32>) {
        out.clear();
        out.extend(
            lanes
                .iter()
                .enumerate()
                .map(|(i, lane)| self.predict_lane(*lane, baselines, i)),
        );
    }

    fn predict_lane(&self, lane: LaneKind, baselines: &[&[u32]], i: usize) -> u32 {
        let value = |b: usize| i64::from(baselines[b][i] as i32);
        match (self.count, lane.is_predictable()) {
            (0, _) => 0,
            (1, _) | (_, false) => baselines[0][i],
            (2, true) => self.extrapolate(value(0), value(1)),
            (_, true) => {
                let (v0, v1, v2) = (value(0), value(1), value(2));
                // Same velocity over both spans, compared without division.
                if (v0 - v1) * self.span12 == (v1 - v2) * self.span01 {
                    self.extrapolate(v0, v1)
                } else {
                    baselines[0][i]
                }
            }
        }
    }

    fn extrapolate(&self, v0: i64, v1: i64) -> u32 {
        if self.span01 <= 0 {
            return v0 as i32 as u32;
        }
        // Integer division truncates toward zero on both peers.
        let predicted = v0 + (v0 - v1) * self.ahead / self.span01;
        predicted as i32 as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticks(values: &[u32]) -> Vec<NetworkTick> {
        values.iter().copied().map(NetworkTick::new).collect()
    }

    fn predict(tick: u32, baseline_ticks: &[u32], lanes: &[LaneKind], values: &[&[u32]]) -> Vec<u32> {
        let predictor = DeltaPredictor::new(NetworkTick::new(tick), &ticks(baseline_ticks));
        let mut out = Vec::new();
        predictor.predict(lanes, values, &mut out);
        out
    }

    #[test]
    fn no_baselines_predict_zero() {
        assert_eq!(predict(10, &[], &[LaneKind::Delta, LaneKind::Raw { bits: 1 }], &[]), vec![0, 0]);
    }

    #[test]
    fn one_baseline_predicts_itself() {
        let b0: &[u32] = &[7, 1];
        assert_eq!(
            predict(10, &[9], &[LaneKind::Delta, LaneKind::Raw { bits: 1 }], &[b0]),
            vec![7, 1]
        );
    }

    #[test]
    fn two_baselines_extrapolate_linearly() {
        let b0: &[u32] = &[120];
        let b1: &[u32] = &[100];
        // +20 per 2 ticks, predicted 3 ticks after b0.
        assert_eq!(predict(13, &[10, 8], &[LaneKind::Delta], &[b0, b1]), vec![150]);
    }

    #[test]
    fn extrapolation_truncates_toward_zero() {
        let b0: &[u32] = &[(-10i32) as u32];
        let b1: &[u32] = &[(-3i32) as u32];
        // -7 per 2 ticks, one tick ahead: -10 + (-7 / 2) = -13.
        assert_eq!(predict(11, &[10, 8], &[LaneKind::Delta], &[b0, b1]), vec![(-13i32) as u32]);
    }

    #[test]
    fn raw_lanes_are_not_extrapolated() {
        let b0: &[u32] = &[5];
        let b1: &[u32] = &[1];
        assert_eq!(predict(12, &[10, 8], &[LaneKind::Raw { bits: 8 }], &[b0, b1]), vec![5]);
    }

    #[test]
    fn three_baselines_require_constant_velocity() {
        let lanes = [LaneKind::Delta, LaneKind::Delta];
        let b0: &[u32] = &[30, 30];
        let b1: &[u32] = &[20, 25];
        let b2: &[u32] = &[10, 10];
        // Lane 0 moves +10 per tick consistently; lane 1 does not.
        assert_eq!(predict(11, &[10, 9, 8], &lanes, &[b0, b1, b2]), vec![40, 30]);
    }

    #[test]
    fn three_baselines_with_uneven_spacing() {
        let b0: &[u32] = &[60];
        let b1: &[u32] = &[40];
        let b2: &[u32] = &[0];
        // 10 per tick over spans of 2 and 4 ticks.
        assert_eq!(predict(12, &[10, 8, 4], &[LaneKind::Delta], &[b0, b1, b2]), vec![80]);
    }

    #[test]
    fn prediction_across_tick_wraparound() {
        let newest = NetworkTick::new(0).add(1);
        let older = NetworkTick::new(0).subtract(1);
        let predictor = DeltaPredictor::new(newest.add(2), &[newest, older]);
        let b0: &[u32] = &[4];
        let b1: &[u32] = &[0];
        let mut out = Vec::new();
        predictor.predict(&[LaneKind::Delta], &[b0, b1], &mut out);
        assert_eq!(out, vec![8]);
    }

    #[test]
    fn extreme_values_wrap_identically() {
        let b0: &[u32] = &[i32::MAX as u32];
        let b1: &[u32] = &[i32::MIN as u32];
        let a = predict(20, &[10, 9], &[LaneKind::Delta], &[b0, b1]);
        let b = predict(20, &[10, 9], &[LaneKind::Delta], &[b0, b1]);
        assert_eq!(a, b);
    }
}
