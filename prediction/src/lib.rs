//! Client-side prediction and rollback for ghostwire.
//!
//! Predicted ghosts run ahead of the last authoritative snapshot. When the
//! [`codec::ClientReceiver`] reports new data for one of them, the
//! [`PredictionController`] restores it to that snapshot and replays forward
//! to the current prediction target. Updates without new data only simulate
//! the ticks that are new, so steady-state prediction costs no replays.
//!
//! Entity storage stays with the caller behind [`PredictedWorld`].

mod config;
mod controller;
mod error;
mod world;

pub use config::{PredictedSpawnPolicy, PredictionConfig};
pub use controller::{PredictionController, PredictionCounters, PredictionOutcome};
pub use error::{PredictionError, PredictionResult};
pub use world::PredictedWorld;
