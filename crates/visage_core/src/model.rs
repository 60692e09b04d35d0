//! Event model
//!
//! An [`Event`] is a prioritized, time-windowed bundle of per-channel stage
//! timelines plus one pose timeline. Producers describe events with the
//! partial [`EventDraft`] types; the engine's submission API fills in the
//! defaults, stamps ids and timestamps, and stores the resulting [`Event`].

use crate::channel::{Channel, Expression};
use crate::pose::PoseSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Monotonic timestamp in milliseconds, as delivered by the tick source.
pub type Millis = u64;

/// Sequence number shared by events and stages. Later pushes get higher ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Id(pub u32);

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Hands out increasing ids, wrapping back to 1 before overflow.
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Start the sequence at an arbitrary point (0 is skipped).
    pub fn starting_at(next: u32) -> Self {
        Self { next: next.max(1) }
    }

    pub fn next_id(&mut self) -> Id {
        let id = Id(self.next);
        self.next = if self.next == u32::MAX { 1 } else { self.next + 1 };
        id
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Length of a stage or event window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Span {
    Finite(u64),
    /// Lasts until superseded.
    Infinite,
}

impl Span {
    /// Interpret a raw millisecond count: anything `<= 0` means infinite.
    pub fn from_ms(ms: i64) -> Self {
        if ms <= 0 {
            Span::Infinite
        } else {
            Span::Finite(ms as u64)
        }
    }

    pub fn is_infinite(self) -> bool {
        matches!(self, Span::Infinite)
    }
}

/// Provenance tag of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Explicit "set now" from the user or host.
    ManualOverride,
    /// Continuously recomputed derived state (arousal-driven expression).
    Ambient,
    /// Recovery animation after a climax.
    PostClimax,
    /// Timed request from an outside producer.
    #[default]
    ExternalTimed,
    /// A canned animation from the catalog.
    Named,
    /// The actor's own look, captured on attach. Sits below everything.
    Baseline,
}

impl EventKind {
    /// Ambient-tier kinds share the ambient feature flag and its
    /// expiry-clearing rule.
    pub fn is_ambient_tier(self) -> bool {
        matches!(self, EventKind::Ambient | EventKind::PostClimax)
    }

    /// Manual overrides outrank automatic events of equal priority.
    pub fn is_manual(self) -> bool {
        matches!(self, EventKind::ManualOverride)
    }

    /// Kinds a soft reset falls back to.
    pub fn is_baseline(self) -> bool {
        matches!(self, EventKind::ManualOverride | EventKind::Baseline)
    }
}

/// What a stage does to its channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageValue {
    /// Absolute value; `None` clears the channel.
    Set(Option<Expression>),
    /// Signed move along the channel's ordered scale.
    Shift(i32),
}

/// Application guard for `Shift` stages.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ModifierState {
    /// Not yet evaluated while winning.
    #[default]
    Pending,
    /// Applied once; the computed absolute value is re-asserted while the
    /// stage keeps winning.
    Applied(Option<Expression>),
    /// Evaluated but could not be applied (no scale or off-scale value).
    /// Holds its slot like a skip stage.
    Stale,
}

/// Anything laid out on a timeline.
pub trait Timed {
    fn span(&self) -> Span;
}

/// One timed segment of a channel timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub id: Id,
    pub value: StageValue,
    pub span: Span,
    pub priority: i32,
    pub skip: bool,
    pub modifier: ModifierState,
    pub color: Option<String>,
}

impl Timed for Stage {
    fn span(&self) -> Span {
        self.span
    }
}

/// One timed segment of the pose timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseStage {
    pub id: Id,
    pub poses: PoseSet,
    pub span: Span,
    pub priority: i32,
}

impl Timed for PoseStage {
    fn span(&self) -> Span {
        self.span
    }
}

/// Index of the segment active `elapsed` ms into a timeline.
///
/// Walks the segments in order, subtracting each finite duration; the
/// first segment that the remainder does not cover, or the first infinite
/// one, is current. `None` once the whole timeline has elapsed.
pub fn current_index<T: Timed>(timeline: &[T], elapsed: u64) -> Option<usize> {
    let mut remaining = elapsed as i128;
    for (i, item) in timeline.iter().enumerate() {
        match item.span() {
            Span::Infinite => return Some(i),
            Span::Finite(ms) => {
                remaining -= ms as i128;
                if remaining < 0 {
                    return Some(i);
                }
            }
        }
    }
    None
}

/// A stored animation request.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: Id,
    pub kind: EventKind,
    pub priority: i32,
    pub created_at: Millis,
    /// `None` for infinite events.
    pub expires_at: Option<Millis>,
    pub channels: BTreeMap<Channel, Vec<Stage>>,
    pub poses: Vec<PoseStage>,
}

impl Event {
    /// Whether `now` is inside the event's window.
    pub fn is_active(&self, now: Millis) -> bool {
        self.expires_at.map_or(true, |until| now < until)
    }

    /// Whether a finite window has fully elapsed.
    pub fn is_expired(&self, now: Millis) -> bool {
        self.expires_at.is_some_and(|until| now >= until)
    }

    pub fn elapsed(&self, now: Millis) -> u64 {
        now.saturating_sub(self.created_at)
    }

    /// Index of the current stage on `channel`.
    pub fn current_stage(&self, channel: Channel, now: Millis) -> Option<usize> {
        let stages = self.channels.get(&channel)?;
        current_index(stages, self.elapsed(now))
    }

    /// Index of the current pose stage.
    pub fn current_pose_stage(&self, now: Millis) -> Option<usize> {
        current_index(&self.poses, self.elapsed(now))
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.poses.is_empty()
    }
}

// ============================================================================
// Drafts
// ============================================================================

/// Partially specified event as submitted by producers.
///
/// Every field is optional. Channel and pose names are plain strings so
/// drafts can come straight from TOML/JSON; unknown names are dropped with
/// a diagnostic at submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventDraft {
    pub kind: EventKind,
    pub priority: Option<i32>,
    /// `<= 0` means infinite.
    pub duration_ms: Option<i64>,
    pub channels: BTreeMap<String, Vec<StageDraft>>,
    pub poses: Vec<PoseStageDraft>,
}

impl EventDraft {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn duration_ms(mut self, ms: i64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    pub fn infinite(self) -> Self {
        self.duration_ms(-1)
    }

    /// Append a stage to a channel's timeline.
    pub fn stage(mut self, channel: Channel, stage: StageDraft) -> Self {
        self.channels
            .entry(channel.name().to_string())
            .or_default()
            .push(stage);
        self
    }

    pub fn pose_stage(mut self, stage: PoseStageDraft) -> Self {
        self.poses.push(stage);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageDraft {
    /// Absolute expression id. Absent together with `shift` means "clear".
    pub expression: Option<String>,
    /// Relative modifier; takes precedence over `expression`.
    pub shift: Option<i32>,
    pub duration_ms: Option<i64>,
    pub priority: Option<i32>,
    pub skip: bool,
    pub color: Option<String>,
}

impl StageDraft {
    pub fn expression(id: impl Into<String>) -> Self {
        Self {
            expression: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn clear() -> Self {
        Self::default()
    }

    pub fn shift(by: i32) -> Self {
        Self {
            shift: Some(by),
            ..Self::default()
        }
    }

    pub fn skip() -> Self {
        Self {
            skip: true,
            ..Self::default()
        }
    }

    pub fn for_ms(mut self, ms: i64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    pub fn value(&self) -> StageValue {
        match (self.shift, &self.expression) {
            (Some(by), _) => StageValue::Shift(by),
            (None, Some(id)) => StageValue::Set(Some(Expression::new(id.clone()))),
            (None, None) => StageValue::Set(None),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseStageDraft {
    pub poses: Vec<String>,
    pub duration_ms: Option<i64>,
    pub priority: Option<i32>,
}

impl PoseStageDraft {
    pub fn new<I, S>(poses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: ToString,
    {
        Self {
            poses: poses.into_iter().map(|p| p.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn for_ms(mut self, ms: i64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(span: Span) -> Stage {
        Stage {
            id: Id(1),
            value: StageValue::Set(None),
            span,
            priority: 0,
            skip: false,
            modifier: ModifierState::Pending,
            color: None,
        }
    }

    #[test]
    fn test_timeline_walk() {
        let timeline = vec![
            stage(Span::Finite(100)),
            stage(Span::Finite(200)),
            stage(Span::Finite(50)),
        ];
        assert_eq!(current_index(&timeline, 0), Some(0));
        assert_eq!(current_index(&timeline, 99), Some(0));
        assert_eq!(current_index(&timeline, 100), Some(1));
        assert_eq!(current_index(&timeline, 299), Some(1));
        assert_eq!(current_index(&timeline, 300), Some(2));
        assert_eq!(current_index(&timeline, 350), None);
    }

    #[test]
    fn test_infinite_stage_ends_walk() {
        let timeline = vec![
            stage(Span::Finite(100)),
            stage(Span::Infinite),
            stage(Span::Finite(100)),
        ];
        assert_eq!(current_index(&timeline, 50), Some(0));
        assert_eq!(current_index(&timeline, 100), Some(1));
        assert_eq!(current_index(&timeline, 1_000_000), Some(1));
    }

    #[test]
    fn test_span_sentinel() {
        assert_eq!(Span::from_ms(0), Span::Infinite);
        assert_eq!(Span::from_ms(-1), Span::Infinite);
        assert_eq!(Span::from_ms(250), Span::Finite(250));
    }

    #[test]
    fn test_id_allocator_wraps_before_overflow() {
        let mut ids = IdAllocator::starting_at(u32::MAX - 1);
        assert_eq!(ids.next_id(), Id(u32::MAX - 1));
        assert_eq!(ids.next_id(), Id(u32::MAX));
        assert_eq!(ids.next_id(), Id(1));
    }

    #[test]
    fn test_stage_draft_value() {
        assert_eq!(StageDraft::clear().value(), StageValue::Set(None));
        assert_eq!(
            StageDraft::expression("Closed").value(),
            StageValue::Set(Some(Expression::new("Closed")))
        );
        let mut both = StageDraft::expression("Closed");
        both.shift = Some(-2);
        assert_eq!(both.value(), StageValue::Shift(-2));
    }

    #[test]
    fn test_draft_from_toml() {
        let draft: EventDraft = toml::from_str(
            r#"
kind = "named"
priority = 5
duration_ms = 1500

[[channels.eyes]]
expression = "Closed"
duration_ms = 500

[[channels.eyes]]
expression = "Surprised"

[[poses]]
poses = ["Kneel", "Yoked"]
"#,
        )
        .unwrap();
        assert_eq!(draft.kind, EventKind::Named);
        assert_eq!(draft.priority, Some(5));
        assert_eq!(draft.channels["eyes"].len(), 2);
        assert_eq!(draft.poses[0].poses, vec!["Kneel", "Yoked"]);
    }
}
