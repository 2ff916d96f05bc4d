//! Network tick arithmetic and time reconciliation for ghostwire.
//!
//! Server and client simulate at the same fixed rate but with independent
//! clocks. This crate provides the shared tick type and the pieces that keep
//! the two timelines aligned:
//!
//! - [`NetworkTick`]: 31-bit wrapping tick with an in-band validity bit.
//! - [`PartialTick`]: a tick plus elapsed fraction, snapped near boundaries.
//! - [`ServerTickStepper`]: fixed-step accumulator with catch-up batching.
//! - [`ClientTimeSync`]: RTT/jitter estimation driving the predicted and
//!   interpolated client clocks.
//! - [`ClientTickClock`]: the client clock, rewindable for prediction replay.
//!
//! # Design Principles
//!
//! - **Wrap-aware ordering** - ticks are only compared through signed wrapping distance.
//! - **Debug-checked arithmetic** - arithmetic on an invalid tick asserts in debug builds.
//! - **No wall clock access** - callers pass elapsed durations, keeping everything testable.

mod clock;
mod error;
mod network_tick;
mod partial;
mod rate;
mod sync;

pub use clock::ClientTickClock;
pub use error::{TickError, TickResult};
pub use network_tick::NetworkTick;
pub use partial::{PartialTick, FRACTION_SNAP};
pub use rate::{FrameRateMode, ServerTickStepper, Step, StepPlan, TickRateConfig};
pub use sync::{ClientTimeSync, TimeSyncConfig, TimeSyncOutput};
