//! Replication statistics for ghostwire.
//!
//! Every worker that serializes packets owns a [`StatsAccumulator`]. Once per
//! tick the accumulators are folded into a [`TickStats`] by
//! [`TickStats::merge`], which can be encoded with [`encode_stats_packet`] and
//! pushed to a local listener through [`StatsSocket`].
//!
//! Nothing in this crate feeds back into replication.

mod accumulator;
mod error;
mod packet;
mod socket;

pub use accumulator::{StatsAccumulator, TickStats, TimingSample, TypeStats};
pub use error::{StatsError, StatsResult};
pub use packet::{decode_stats_packet, encode_stats_packet, STATS_MAGIC};
pub use socket::StatsSocket;
