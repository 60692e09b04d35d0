//! # Visage Engine
//!
//! Resolves a queue of prioritized, time-windowed expression and pose
//! events onto one actor, once per host tick:
//!
//! - **Submission** (`submit`): drafts are defaulted, stamped and queued,
//!   never rejected
//! - **Resolution** (`resolve`): per channel and per pose category, the
//!   highest (priority, manual, id) current stage wins; pose categories
//!   that conflict are settled by a bounded greedy pass
//! - **Apply** (`apply`): winners become actor writes, only on change;
//!   relative modifiers apply once
//! - **GC** (`gc`): expired events, superseded infinite stages and
//!   played-out timelines are removed
//! - **Manual overrides** (`manual`): the last explicit look survives
//!   queue resets; the actor's own look on attach becomes the baseline
//!
//! ```text
//! push / set_* / reset ──▶ EventQueue ──tick──▶ resolve ──▶ apply ──▶ ActorSink
//!                               ▲                  │
//!                               └────── gc ◀───────┘
//! ```

pub mod apply;
pub mod engine;
pub mod gc;
pub mod manual;
pub mod queue;
pub mod resolve;
pub mod submit;

pub use apply::{AppliedState, Mutation};
pub use engine::{EngineState, ExpressionEngine, ResetFilter, TickOutcome, TickReport};
pub use gc::SweepReport;
pub use manual::{ManualSnapshot, BASELINE_PRIORITY};
pub use queue::EventQueue;
pub use resolve::{resolve, resolve_conflicts, ChannelWinner, ConflictOverflow, PoseWinner, Resolution};
pub use submit::{admits, default_span};
