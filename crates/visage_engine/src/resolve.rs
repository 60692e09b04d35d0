//! Channel & Pose Resolvers
//!
//! Resolution is a pure read over the queue: for every channel, and for
//! every pose category, it picks the highest-priority current stage. At
//! equal priority a manual override beats an automatic event; remaining
//! ties go to the most recently created stage. Applying the result to
//! an actor is a separate step (see `apply`), so resolving the same queue
//! twice always yields the same winners.

use crate::queue::EventQueue;
use crate::submit::admits;
use std::collections::BTreeMap;
use visage_core::{Channel, Event, FeatureFlags, Id, Millis, Pose, PoseCategory};

/// The stage that owns a channel this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelWinner {
    pub event: Id,
    pub stage: Id,
    pub priority: i32,
    pub infinite: bool,
    /// Owned by a manual-override event.
    pub manual: bool,
}

impl ChannelWinner {
    pub fn rank(&self) -> (i32, bool, Id) {
        (self.priority, self.manual, self.stage)
    }
}

/// The pose stage that owns a category this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoseWinner {
    pub pose: Pose,
    pub event: Id,
    pub stage: Id,
    pub priority: i32,
    pub infinite: bool,
    /// Claimed by a manual-override event.
    pub manual: bool,
}

impl PoseWinner {
    pub fn category(&self) -> PoseCategory {
        self.pose.category()
    }

    pub fn rank(&self) -> (i32, bool, Id) {
        (self.priority, self.manual, self.stage)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub channels: BTreeMap<Channel, ChannelWinner>,
    /// Per-category winners before conflict resolution.
    pub candidates: BTreeMap<PoseCategory, PoseWinner>,
    /// Winners left after conflict resolution; never two conflicting
    /// categories.
    pub poses: BTreeMap<PoseCategory, PoseWinner>,
    /// Conflict resolution hit its iteration cap; the neutral pose applies.
    pub pose_fallback: bool,
}

/// Conflict resolution ran out of iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictOverflow {
    pub remaining: usize,
}

fn contributes(event: &Event, now: Millis, flags: FeatureFlags) -> bool {
    event.is_active(now) && admits(event.kind, flags)
}

/// Resolve every channel and pose category at `now`.
pub fn resolve(queue: &EventQueue, now: Millis, flags: FeatureFlags) -> Resolution {
    let mut resolution = Resolution::default();

    for channel in Channel::ALL {
        let mut best: Option<ChannelWinner> = None;
        for event in queue.iter().filter(|e| contributes(e, now, flags)) {
            let Some(idx) = event.current_stage(channel, now) else {
                continue;
            };
            let stage = &event.channels[&channel][idx];
            let candidate = ChannelWinner {
                event: event.id,
                stage: stage.id,
                priority: stage.priority,
                infinite: stage.span.is_infinite(),
                manual: event.kind.is_manual(),
            };
            if best.map_or(true, |b| candidate.rank() > b.rank()) {
                best = Some(candidate);
            }
        }
        if let Some(winner) = best {
            resolution.channels.insert(channel, winner);
        }
    }

    for event in queue.iter().filter(|e| contributes(e, now, flags)) {
        let Some(idx) = event.current_pose_stage(now) else {
            continue;
        };
        let stage = &event.poses[idx];
        for pose in stage.poses.iter() {
            let candidate = PoseWinner {
                pose,
                event: event.id,
                stage: stage.id,
                priority: stage.priority,
                infinite: stage.span.is_infinite(),
                manual: event.kind.is_manual(),
            };
            let slot = resolution.candidates.entry(pose.category());
            slot.and_modify(|b| {
                if candidate.rank() > b.rank() {
                    *b = candidate;
                }
            })
            .or_insert(candidate);
        }
    }

    match resolve_conflicts(&resolution.candidates, PoseCategory::ALL.len()) {
        Ok(accepted) => resolution.poses = accepted,
        Err(overflow) => {
            tracing::warn!(
                "Pose conflict resolution hit its cap with {} winner(s) left, falling back to neutral pose",
                overflow.remaining
            );
            resolution.pose_fallback = true;
        }
    }

    resolution
}

/// Repeatedly accept the highest-ranked remaining winner and drop every
/// winner whose category conflicts with it. Each round removes at least one
/// winner, so `cap` rounds (one per category) always suffice.
pub fn resolve_conflicts(
    candidates: &BTreeMap<PoseCategory, PoseWinner>,
    cap: usize,
) -> Result<BTreeMap<PoseCategory, PoseWinner>, ConflictOverflow> {
    let mut remaining: Vec<PoseWinner> = candidates.values().copied().collect();
    let mut accepted = BTreeMap::new();
    let mut rounds = 0;

    while !remaining.is_empty() {
        if rounds == cap {
            return Err(ConflictOverflow {
                remaining: remaining.len(),
            });
        }
        rounds += 1;

        let Some(top) = remaining
            .iter()
            .enumerate()
            .max_by_key(|(_, w)| w.rank())
            .map(|(i, _)| i)
        else {
            break;
        };
        let best = remaining.swap_remove(top);
        remaining.retain(|w| {
            let conflicting = w.category().conflicts_with(best.category());
            if conflicting {
                tracing::trace!("{} suppressed by {}", w.pose, best.pose);
            }
            !conflicting
        });
        accepted.insert(best.category(), best);
    }

    Ok(accepted)
}
