//! Manual Override Tracker
//!
//! Remembers the last explicitly chosen look per channel and pose category
//! so it survives a full queue reset (re-enable, attach). The snapshot is
//! replayed as a single manual event and then cleared; from there on the
//! queue is authoritative again.
//!
//! The actor's own look at attach time is not part of the snapshot. It is
//! queued as a [`baseline`] event that every other event outranks.

use crate::queue::EventQueue;
use std::collections::BTreeMap;
use visage_core::{
    Channel, ChannelState, EventDraft, EventKind, Millis, ModifierState, PoseCategory, PoseSet,
    PoseStageDraft, StageDraft, StageValue,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManualSnapshot {
    channels: BTreeMap<Channel, ChannelState>,
    poses: PoseSet,
}

impl ManualSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.poses.is_empty()
    }

    pub fn channel(&self, channel: Channel) -> Option<&ChannelState> {
        self.channels.get(&channel)
    }

    pub fn poses(&self) -> &PoseSet {
        &self.poses
    }

    pub fn record_expression(&mut self, channel: Channel, state: ChannelState) {
        self.channels.insert(channel, state);
    }

    /// Record explicitly asserted poses; conflicting categories are evicted.
    pub fn record_pose(&mut self, poses: &PoseSet) {
        for pose in poses.iter() {
            self.poses.assert_pose(pose);
        }
    }

    /// Fill channels and categories the snapshot does not know from the
    /// manual stages still current in the queue. Existing entries win;
    /// among queued stages the newest wins.
    pub fn harvest(&mut self, queue: &EventQueue, now: Millis) {
        let manual: Vec<_> = queue.iter().filter(|e| e.kind.is_manual()).collect();

        for event in manual.iter().rev() {
            for (&channel, stages) in &event.channels {
                if self.channels.contains_key(&channel) {
                    continue;
                }
                let Some(idx) = event.current_stage(channel, now) else {
                    continue;
                };
                let stage = &stages[idx];
                if stage.skip {
                    continue;
                }
                let expression = match (&stage.value, &stage.modifier) {
                    (StageValue::Set(value), _) => value.clone(),
                    (StageValue::Shift(_), ModifierState::Applied(value)) => value.clone(),
                    (StageValue::Shift(_), _) => continue,
                };
                self.channels
                    .insert(channel, ChannelState::new(expression, stage.color.clone()));
            }

            if let Some(idx) = event.current_pose_stage(now) {
                for pose in event.poses[idx].poses.iter() {
                    let category = pose.category();
                    let taken = self.poses.contains_category(category)
                        || category
                            .conflicts()
                            .iter()
                            .any(|c| self.poses.contains_category(*c));
                    if !taken {
                        self.poses.insert(pose);
                    }
                }
            }
        }
    }

    /// Forget the recorded look for the given channels and categories.
    pub fn remove(&mut self, channels: &[Channel], categories: &[PoseCategory]) {
        for channel in channels {
            self.channels.remove(channel);
        }
        for &category in categories {
            self.poses.remove(category);
        }
    }

    /// Take the snapshot as one infinite manual draft, leaving it empty.
    pub fn take_replay(&mut self, priority: i32) -> Option<EventDraft> {
        if self.is_empty() {
            return None;
        }
        let snapshot = std::mem::take(self);

        let mut draft = EventDraft::new(EventKind::ManualOverride)
            .priority(priority)
            .infinite();
        for (channel, state) in &snapshot.channels {
            draft = draft.stage(*channel, stage_for(state));
        }
        if !snapshot.poses.is_empty() {
            draft = draft.pose_stage(PoseStageDraft::new(snapshot.poses.iter()));
        }
        Some(draft)
    }
}

/// Priority of the attach-time baseline: below anything a producer can ask
/// for.
pub const BASELINE_PRIORITY: i32 = i32::MIN;

/// The actor's live look as one infinite baseline draft.
pub fn baseline(channels: &BTreeMap<Channel, ChannelState>, pose: &PoseSet) -> EventDraft {
    let mut draft = EventDraft::new(EventKind::Baseline)
        .priority(BASELINE_PRIORITY)
        .infinite();
    for (&channel, state) in channels {
        draft = draft.stage(channel, stage_for(state));
    }
    if !pose.is_empty() {
        draft = draft.pose_stage(PoseStageDraft::new(pose.iter()));
    }
    draft
}

fn stage_for(state: &ChannelState) -> StageDraft {
    StageDraft {
        expression: state.expression.as_ref().map(|e| e.as_str().to_string()),
        color: state.color.clone(),
        ..StageDraft::default()
    }
}
