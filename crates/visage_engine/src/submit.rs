//! Event Submission: turns partial drafts into stored events.
//!
//! Submission never rejects input. Missing durations and priorities are
//! defaulted, stages inherit from their event, unknown channel and pose
//! names are dropped with a diagnostic. The only way a draft is refused is
//! feature-flag policy, which the engine checks before calling in here.

use std::collections::BTreeMap;
use visage_core::{
    Channel, EngineConfig, Event, EventDraft, EventKind, FeatureFlags, IdAllocator, Millis,
    ModifierState, Pose, PoseSet, PoseStage, Span, Stage,
};

/// Whether events of `kind` may be pushed and ticked under `flags`.
pub fn admits(kind: EventKind, flags: FeatureFlags) -> bool {
    match kind {
        EventKind::Ambient | EventKind::PostClimax => flags.ambient,
        EventKind::Named => flags.named,
        EventKind::ManualOverride | EventKind::ExternalTimed | EventKind::Baseline => true,
    }
}

/// Window given to a draft of `kind` that did not specify one.
pub fn default_span(kind: EventKind, config: &EngineConfig) -> Span {
    match kind {
        EventKind::ManualOverride | EventKind::Ambient | EventKind::Baseline => Span::Infinite,
        EventKind::PostClimax | EventKind::ExternalTimed | EventKind::Named => {
            Span::Finite(config.timed_default_ms.max(1))
        }
    }
}

/// Stamp ids and timestamps onto `draft` and fill in every default.
pub(crate) fn build_event(
    draft: &EventDraft,
    ids: &mut IdAllocator,
    now: Millis,
    config: &EngineConfig,
) -> Event {
    let span = draft
        .duration_ms
        .map(Span::from_ms)
        .unwrap_or_else(|| default_span(draft.kind, config));
    let priority = draft.priority.unwrap_or(0);
    let id = ids.next_id();

    let mut channels: BTreeMap<Channel, Vec<Stage>> = BTreeMap::new();
    for (name, stages) in &draft.channels {
        let channel = match name.parse::<Channel>() {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!("Skipping {} stage(s) in event {}: {}", stages.len(), id, e);
                continue;
            }
        };
        let timeline = channels.entry(channel).or_default();
        for stage in stages {
            timeline.push(Stage {
                id: ids.next_id(),
                value: stage.value(),
                span: stage.duration_ms.map(Span::from_ms).unwrap_or(span),
                priority: stage.priority.unwrap_or(priority),
                skip: stage.skip,
                modifier: ModifierState::Pending,
                color: stage.color.clone(),
            });
        }
    }
    channels.retain(|_, timeline| !timeline.is_empty());

    let mut poses = Vec::with_capacity(draft.poses.len());
    for stage in &draft.poses {
        let mut set = PoseSet::new();
        for name in &stage.poses {
            match name.parse::<Pose>() {
                Ok(pose) => {
                    if let Some(replaced) = set.insert(pose) {
                        tracing::warn!(
                            "Event {}: {} replaces {} in the same {} stage",
                            id,
                            pose,
                            replaced,
                            pose.category()
                        );
                    }
                }
                Err(e) => tracing::warn!("Event {}: {}", id, e),
            }
        }
        poses.push(PoseStage {
            id: ids.next_id(),
            poses: set,
            span: stage.duration_ms.map(Span::from_ms).unwrap_or(span),
            priority: stage.priority.unwrap_or(priority),
        });
    }
    if poses.iter().all(|stage| stage.poses.is_empty()) {
        poses.clear();
    }

    Event {
        id,
        kind: draft.kind,
        priority,
        created_at: now,
        expires_at: match span {
            Span::Finite(ms) => Some(now.saturating_add(ms)),
            Span::Infinite => None,
        },
        channels,
        poses,
    }
}
