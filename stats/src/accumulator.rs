//! Per-worker stats collection and the per-tick merge.

use std::collections::BTreeMap;

use importance::{GhostChunk, SendReport};
use schema::GhostTypeId;
use tick::NetworkTick;

/// Replication volume of one ghost type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TypeStats {
    /// Records written.
    pub entity_count: u32,
    pub size_bits: u64,
    /// Records written without any baseline.
    pub uncompressed_count: u32,
    pub chunk_count: u32,
}

impl TypeStats {
    pub fn merge(&mut self, other: &Self) {
        self.entity_count = self.entity_count.saturating_add(other.entity_count);
        self.size_bits = self.size_bits.saturating_add(other.size_bits);
        self.uncompressed_count = self.uncompressed_count.saturating_add(other.uncompressed_count);
        self.chunk_count = self.chunk_count.saturating_add(other.chunk_count);
    }

    /// Average record size in bits.
    #[must_use]
    pub fn average_bits(&self) -> f64 {
        if self.entity_count == 0 {
            0.0
        } else {
            self.size_bits as f64 / f64::from(self.entity_count)
        }
    }
}

/// Command age, round-trip time and jitter observed at one moment.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimingSample {
    /// Ticks between a command's creation and its arrival on the server.
    pub command_age: f32,
    pub rtt_ms: f32,
    pub jitter_ms: f32,
}

/// Stats gathered by one worker during one tick.
///
/// Each worker owns its accumulator; [`TickStats::merge`] combines them once
/// per tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsAccumulator {
    types: BTreeMap<GhostTypeId, TypeStats>,
    prediction_errors: Vec<f32>,
    timing: Vec<TimingSample>,
}

impl StatsAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.prediction_errors.is_empty() && self.timing.is_empty()
    }

    pub fn record_ghost(&mut self, type_id: GhostTypeId, bits: usize, uncompressed: bool) {
        let stats = self.types.entry(type_id).or_default();
        stats.entity_count = stats.entity_count.saturating_add(1);
        stats.size_bits = stats.size_bits.saturating_add(bits as u64);
        if uncompressed {
            stats.uncompressed_count = stats.uncompressed_count.saturating_add(1);
        }
    }

    /// Records every ghost written into one packet.
    pub fn record_report(&mut self, report: &SendReport) {
        for record in &report.records {
            self.record_ghost(record.type_id, record.bits, record.baselines == 0);
        }
    }

    /// Counts the tick's chunks by ghost type.
    pub fn record_chunks(&mut self, chunks: &[GhostChunk]) {
        for chunk in chunks {
            let stats = self.types.entry(chunk.type_id).or_default();
            stats.chunk_count = stats.chunk_count.saturating_add(1);
        }
    }

    /// Distance between a predicted value and the authoritative one.
    pub fn record_prediction_error(&mut self, error: f32) {
        self.prediction_errors.push(error);
    }

    pub fn record_timing(&mut self, sample: TimingSample) {
        self.timing.push(sample);
    }
}

/// Everything observed during one tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickStats {
    pub tick: NetworkTick,
    pub types: BTreeMap<GhostTypeId, TypeStats>,
    pub prediction_errors: Vec<f32>,
    pub timing: Vec<TimingSample>,
}

impl TickStats {
    /// Combines the accumulators of every worker for `tick`.
    ///
    /// Samples keep the order of `accumulators`.
    pub fn merge(tick: NetworkTick, accumulators: impl IntoIterator<Item = StatsAccumulator>) -> Self {
        let mut merged = Self {
            tick,
            ..Self::default()
        };
        for accumulator in accumulators {
            for (type_id, stats) in &accumulator.types {
                merged.types.entry(*type_id).or_default().merge(stats);
            }
            merged.prediction_errors.extend(accumulator.prediction_errors);
            merged.timing.extend(accumulator.timing);
        }
        merged
    }

    /// Bits written across all types.
    #[must_use]
    pub fn total_bits(&self) -> u64 {
        self.types.values().map(|stats| stats.size_bits).sum()
    }

    #[must_use]
    pub fn total_entities(&self) -> u64 {
        self.types.values().map(|stats| u64::from(stats.entity_count)).sum()
    }

    /// Largest prediction error this tick.
    #[must_use]
    pub fn max_prediction_error(&self) -> Option<f32> {
        self.prediction_errors.iter().copied().reduce(f32::max)
    }
}
