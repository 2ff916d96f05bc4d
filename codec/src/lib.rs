//! Snapshot encoding, baseline history and delta compression for ghostwire.
//!
//! This crate ties together `bitstream`, `wire`, `schema` and `tick`:
//!
//! - [`SnapshotData`] holds one ghost's state in the lane layout of its
//!   [`schema::GhostTypeDescriptor`].
//! - [`ServerConnection`] tracks, per client, which snapshots were sent and
//!   acknowledged, and encodes ghosts against up to three acked baselines
//!   into a [`SnapshotPacketWriter`].
//! - [`ClientReceiver`] decodes snapshot packets into per-ghost
//!   [`SnapshotHistory`], reports per-ghost failures without dropping the
//!   packet, and builds acks.
//!
//! # Design Principles
//!
//! - **Bit-exact** - encoder and decoder run the same [`DeltaPredictor`] over
//!   the same baselines, so decoding reproduces the encoded lanes exactly.
//! - **Bounded** - every count read from the network is checked against
//!   [`CodecLimits`] before allocation.
//! - **No partial records** - ghosts are encoded into [`CodecScratch`] and
//!   appended only when the packet still fits its byte budget.

mod ack;
mod baseline;
mod error;
mod field;
mod ghost;
mod inspect;
mod interpolate;
mod limits;
mod packet;
mod predictor;
mod receiver;
mod scratch;
mod server;
mod snapshot;
mod types;
mod value;

pub use ack::{decode_ack_packet, encode_ack_packet, AckState, SnapshotAck, ACK_WINDOW};
pub use baseline::{BaselineError, BaselineStore};
pub use error::{CodecError, CodecResult, LimitKind};
pub use ghost::{
    encode_ghost_record, read_record_body, read_record_header, EncodedRecord, RecordBody, RecordHeader,
    MAX_BASELINES,
};
pub use inspect::{inspect_snapshot_packet, PacketSummary, RecordSummary};
pub use interpolate::{blend, MAX_EXTRAPOLATION};
pub use limits::{CodecLimits, HistoryConfig};
pub use packet::{decode_snapshot_packet, SnapshotPacket, SnapshotPacketWriter};
pub use predictor::DeltaPredictor;
pub use receiver::{ClientGhost, ClientReceiver, GhostUpdate, ReceiveReport, SnapshotHistory, UpdateKind};
pub use scratch::CodecScratch;
pub use server::{GhostBaselines, GhostWrite, ServerConnection};
pub use snapshot::SnapshotData;
pub use types::GhostId;
pub use value::{dequantize, quantize, value_matches, FieldValue};
pub use wire::Limits as WireLimits;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_api_exports() {
        let _ = GhostId::new(0);
        let _ = WireLimits::default();
        let _ = CodecLimits::default();
        let _ = HistoryConfig::default();
        let _: CodecResult<()> = Ok(());
    }

    #[test]
    fn limits_reexported() {
        let limits = WireLimits::default();
        assert!(limits.max_packet_bytes > 0);
    }
}
