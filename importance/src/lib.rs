//! Importance-driven bandwidth allocation for ghostwire.
//!
//! Every tick, each connection gets one snapshot packet with a fixed byte
//! budget. Ghosts are grouped into [`GhostChunk`]s of one type; chunks are
//! scored by `importance × age × scale` and written best first until the
//! budget runs out. Anything that does not fit is deferred, grows older and
//! therefore climbs the order, so no relevant ghost starves.
//!
//! [`GhostSender`] drives the whole pass: it applies spawns and despawns at
//! the tick boundary, honors the send-rate divisor round-robin and builds
//! packets for all due connections in parallel.

mod chunk;
mod scaling;
mod scheduler;
mod sender;

pub use chunk::{build_chunks, ChunkId, GhostChunk};
pub use scaling::{DistanceImportance, ImportanceScaling, NoScaling};
pub use scheduler::{ImportanceScheduler, ScoredChunk, SendAges};
pub use sender::{
    ConnectionId, GhostSender, GhostSource, OutgoingPacket, SendError, SendReport, SendResult, SenderConfig,
    SentRecord,
};
