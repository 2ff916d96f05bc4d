//! Run summary written to `summary.json`.

use std::collections::BTreeMap;

use anyhow::Result;
use schema::Registry;
use serde::Serialize;
use stats::TickStats;

#[derive(Debug, Clone, Default, Serialize)]
pub struct TypeSummary {
    pub entities: u64,
    pub bits: u64,
    pub uncompressed: u64,
}

#[derive(Debug, Default, Serialize)]
pub struct Summary {
    pub ghosts: u32,
    pub clients: u32,
    pub ticks: u32,
    pub seed: u64,
    pub loss_percent: u32,
    pub latency_ticks: u32,
    pub send_divisor: u32,
    pub packet_bytes: usize,
    pub registry_hash: String,

    pub packets_sent: u64,
    pub packets_lost: u64,
    pub acks_sent: u64,
    pub acks_lost: u64,
    pub bytes_total: u64,
    pub avg_packet_bytes: u64,
    pub p95_packet_bytes: u64,
    pub max_packet_bytes: u64,

    pub records_written: u64,
    pub records_deferred: u64,
    pub records_unchanged: u64,
    pub records_dropped: u64,
    pub despawns_sent: u64,
    pub spawns_seen: u64,

    pub rollbacks: u64,
    pub replayed_ticks: u64,
    pub backups_taken: u64,
    pub clamped_replays: u64,
    pub time_sync_resets: u32,
    pub prediction_error_max: f32,
    pub prediction_error_avg: f32,

    pub per_type: BTreeMap<String, TypeSummary>,

    #[serde(skip)]
    pub(crate) packet_sizes: Vec<u64>,
    #[serde(skip)]
    pub(crate) error_sum: f64,
    #[serde(skip)]
    pub(crate) error_count: u64,
}

impl Summary {
    pub fn push_packet(&mut self, bytes: usize) {
        self.packets_sent += 1;
        self.bytes_total += bytes as u64;
        self.packet_sizes.push(bytes as u64);
    }

    pub fn push_tick(&mut self, registry: &Registry, stats: &TickStats) {
        for (type_id, type_stats) in &stats.types {
            let name = registry
                .ghost_type(*type_id)
                .map_or_else(|_| format!("type{}", type_id.get()), |descriptor| descriptor.name.clone());
            let entry = self.per_type.entry(name).or_default();
            entry.entities += u64::from(type_stats.entity_count);
            entry.bits += type_stats.size_bits;
            entry.uncompressed += u64::from(type_stats.uncompressed_count);
        }
        for error in &stats.prediction_errors {
            self.error_sum += f64::from(*error);
            self.error_count += 1;
            self.prediction_error_max = self.prediction_error_max.max(*error);
        }
    }

    pub fn finalize(&mut self) {
        if self.packets_sent > 0 {
            self.avg_packet_bytes = self.bytes_total / self.packets_sent;
            self.packet_sizes.sort_unstable();
            let idx = ((self.packet_sizes.len() as f64) * 0.95).ceil() as usize;
            let idx = idx.saturating_sub(1).min(self.packet_sizes.len() - 1);
            self.p95_packet_bytes = self.packet_sizes[idx];
            self.max_packet_bytes = self.packet_sizes.last().copied().unwrap_or(0);
        }
        if self.error_count > 0 {
            self.prediction_error_avg = (self.error_sum / self.error_count as f64) as f32;
        }
    }

    pub fn assert_budgets(&self, max_p95: Option<u64>, max_avg: Option<u64>) -> Result<()> {
        if let Some(max_p95) = max_p95 {
            if self.p95_packet_bytes > max_p95 {
                anyhow::bail!(
                    "p95 packet bytes {} exceeds budget {}",
                    self.p95_packet_bytes,
                    max_p95
                );
            }
        }
        if let Some(max_avg) = max_avg {
            if self.avg_packet_bytes > max_avg {
                anyhow::bail!(
                    "avg packet bytes {} exceeds budget {}",
                    self.avg_packet_bytes,
                    max_avg
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_and_budgets() {
        let mut summary = Summary::default();
        for bytes in 1..=100 {
            summary.push_packet(bytes);
        }
        summary.finalize();
        assert_eq!(summary.avg_packet_bytes, 50);
        assert_eq!(summary.p95_packet_bytes, 95);
        assert_eq!(summary.max_packet_bytes, 100);
        assert!(summary.assert_budgets(Some(95), Some(50)).is_ok());
        assert!(summary.assert_budgets(Some(94), None).is_err());
        assert!(summary.assert_budgets(None, Some(49)).is_err());
    }
}
