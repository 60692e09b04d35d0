//! # Visage Arousal Mapper
//!
//! Derives ambient expression requests from continuous arousal telemetry:
//!
//! - **Direction**: increasing/decreasing, from consecutive samples
//! - **Hysteresis**: thresholds drop by a fixed epsilon while decreasing,
//!   so a value hovering at a boundary does not flicker between tiers
//! - **Post-climax boost**: a linearly decaying bonus over a recovery
//!   window sized from the capped climax count
//! - **Tier tables**: per channel, descending `(threshold, tier)` lists
//!
//! Output is a list of [`visage_core::EventDraft`]s; the engine decides
//! whether they are admitted.

mod mapper;
mod tiers;

pub use mapper::{ArousalMapper, Direction, Reading};
pub use tiers::TierTable;
