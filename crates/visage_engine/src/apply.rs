//! Turning a [`Resolution`] into actor mutations.
//!
//! The engine keeps a cache of what it last wrote to the actor and only
//! emits a mutation when the resolved value differs from it. Relative
//! modifier stages are evaluated here, exactly once per stage.

use crate::queue::EventQueue;
use crate::resolve::Resolution;
use serde::Serialize;
use std::collections::BTreeMap;
use visage_core::{Channel, ChannelState, ModifierState, PoseSet, StageValue};

/// One write to the actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Mutation {
    Expression {
        channel: Channel,
        #[serde(flatten)]
        state: ChannelState,
    },
    Pose {
        poses: PoseSet,
    },
}

/// Last values successfully written to the actor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppliedState {
    pub channels: BTreeMap<Channel, ChannelState>,
    pub pose: Option<PoseSet>,
}

impl AppliedState {
    pub fn channel(&self, channel: Channel) -> ChannelState {
        self.channels.get(&channel).cloned().unwrap_or_default()
    }

    pub fn pose(&self) -> PoseSet {
        self.pose.clone().unwrap_or_else(PoseSet::neutral)
    }
}

/// Channel writes needed to bring the actor in line with `resolution`.
///
/// Channels without a winner are left alone: the actor keeps whatever it
/// last showed until some event says otherwise.
pub(crate) fn channel_changes(
    queue: &mut EventQueue,
    resolution: &Resolution,
    applied: &AppliedState,
) -> Vec<(Channel, ChannelState)> {
    let mut changes = Vec::new();

    for (&channel, winner) in &resolution.channels {
        let Some(stage) = queue.stage_mut(winner.event, channel, winner.stage) else {
            tracing::warn!("Winning stage {} on {} vanished before apply", winner.stage, channel);
            continue;
        };
        if stage.skip {
            tracing::trace!("{} held by skip stage {}", channel, stage.id);
            continue;
        }

        let current = applied.channel(channel);
        let value = match &stage.value {
            StageValue::Set(value) => value.clone(),
            StageValue::Shift(by) => match &stage.modifier {
                ModifierState::Pending => match channel.shift(current.expression.as_ref(), *by) {
                    Some(next) => {
                        tracing::debug!("{} shifted by {} to {:?}", channel, by, next);
                        stage.modifier = ModifierState::Applied(next.clone());
                        next
                    }
                    None => {
                        tracing::warn!(
                            "Cannot shift {} from {:?}: channel has no ordered scale for it",
                            channel,
                            current.expression
                        );
                        stage.modifier = ModifierState::Stale;
                        continue;
                    }
                },
                ModifierState::Applied(value) => value.clone(),
                ModifierState::Stale => continue,
            },
        };

        let desired = ChannelState::new(value, stage.color.clone());
        if desired != current {
            changes.push((channel, desired));
        }
    }

    changes
}

/// Pose write needed to bring the actor in line with `resolution`, if any.
pub(crate) fn pose_change(resolution: &Resolution, applied: &AppliedState) -> Option<PoseSet> {
    let current = applied.pose();
    let next = if resolution.pose_fallback {
        PoseSet::neutral()
    } else if resolution.poses.is_empty() {
        return None;
    } else {
        let mut next = current.clone();
        for winner in resolution.poses.values() {
            next.assert_pose(winner.pose);
        }
        next
    };
    (next != current).then_some(next)
}
