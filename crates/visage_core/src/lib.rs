//! # Visage Core
//!
//! Shared vocabulary of the expression & pose engine:
//!
//! - **Channels**: independent facial slots (`Blush`, `Eyes`, ...) with
//!   optional ordered scales for relative modifiers
//! - **Poses**: a small fixed taxonomy of body-region categories with a
//!   static conflict table
//! - **Events**: prioritized, time-windowed bundles of stage timelines, and
//!   the partial drafts producers submit
//! - **Actor sink**: the trait through which the engine reads and writes an
//!   actor's visible state
//! - **Config**: TOML configuration with env overrides

pub mod channel;
pub mod clock;
pub mod config;
pub mod model;
pub mod pose;
pub mod sink;

pub use channel::{Channel, Expression, UnknownChannel};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{
    ArousalConfig, DimensionConfig, EngineConfig, FeatureFlags, TickConfig, TierConfig,
    VisageConfig,
};
pub use model::{
    current_index, Event, EventDraft, EventKind, Id, IdAllocator, Millis, ModifierState,
    PoseStage, PoseStageDraft, Span, Stage, StageDraft, StageValue, Timed,
};
pub use pose::{Pose, PoseCategory, PoseSet, UnknownPose};
pub use sink::{ActorSink, ArousalSample, ChannelState, MemoryActor, SinkError};
