//! Garbage Collector
//!
//! Runs after resolution each tick. Removes expired events, cuts infinite
//! stages that a newer-or-stronger infinite winner has superseded (manual
//! overrides only yield to a newer manual override or a strictly stronger
//! automatic event), drops
//! timelines that have fully played out, and removes infinite events left
//! with nothing to say. Finite events are only ever removed once their
//! window has elapsed.

use crate::queue::EventQueue;
use crate::resolve::{ChannelWinner, PoseWinner, Resolution};
use std::collections::BTreeMap;
use visage_core::{current_index, Channel, Event, FeatureFlags, Id, Millis, PoseCategory};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Events removed because their window ended.
    pub expired: usize,
    /// Channel stages cut by a superseding infinite winner.
    pub pruned_stages: usize,
    /// Pose-category claims removed by a superseding infinite winner.
    pub pruned_claims: usize,
    /// Infinite events removed because nothing was left in them.
    pub emptied: usize,
    /// Channels whose ambient driver ended while the ambient flag was off,
    /// with the priority the clearing pulse should carry.
    pub clear: BTreeMap<Channel, i32>,
}

impl SweepReport {
    pub fn is_quiet(&self) -> bool {
        self.expired == 0
            && self.pruned_stages == 0
            && self.pruned_claims == 0
            && self.emptied == 0
            && self.clear.is_empty()
    }
}

pub fn sweep(
    queue: &mut EventQueue,
    resolution: &Resolution,
    now: Millis,
    flags: FeatureFlags,
) -> SweepReport {
    let mut report = SweepReport::default();

    drop_ended(queue, now, flags, &mut report);

    for (&channel, winner) in &resolution.channels {
        if winner.infinite {
            prune_channel(queue, channel, winner, now, &mut report);
        }
    }

    for winner in resolution.poses.values() {
        if winner.infinite {
            prune_claims(queue, winner, now, &mut report);
        }
    }

    for event in queue.iter_mut() {
        drop_played_out(event, now);
    }

    queue.retain(|event| {
        let keep = !(event.is_empty() && event.expires_at.is_none());
        if !keep {
            tracing::trace!("Event {} emptied, removing", event.id);
            report.emptied += 1;
        }
        keep
    });

    if !report.is_quiet() {
        tracing::debug!(
            "GC: {} expired, {} stage(s) pruned, {} pose claim(s) pruned, {} emptied",
            report.expired,
            report.pruned_stages,
            report.pruned_claims,
            report.emptied
        );
    }
    report
}

/// Remove events whose window has ended. An ambient-tier event whose flag
/// is off ends immediately if infinite, and every channel it drove gets a
/// clearing pulse. While the ambient flag is on, ambient expiry clears
/// nothing: the channel keeps its last look.
fn drop_ended(queue: &mut EventQueue, now: Millis, flags: FeatureFlags, report: &mut SweepReport) {
    queue.retain(|event| {
        let gated_ambient = event.kind.is_ambient_tier() && !flags.ambient;
        let ended = event.is_expired(now) || (gated_ambient && event.expires_at.is_none());
        if !ended {
            return true;
        }
        if gated_ambient {
            for &channel in event.channels.keys() {
                report
                    .clear
                    .entry(channel)
                    .and_modify(|p| *p = (*p).max(event.priority))
                    .or_insert(event.priority);
            }
        }
        tracing::trace!("Event {} ({:?}) ended", event.id, event.kind);
        report.expired += 1;
        false
    });
}

/// Whether an infinite entry ranked `(priority, manual, id)` has been
/// superseded by `winner`.
///
/// A manual override only yields to a strictly newer manual override or to
/// a strictly higher-priority automatic event.
fn superseded(entry: (i32, bool, Id), winner: (i32, bool, Id)) -> bool {
    let (priority, manual, id) = entry;
    let (w_priority, w_manual, w_id) = winner;
    if manual {
        (w_manual && w_id > id) || (!w_manual && w_priority > priority)
    } else {
        entry < winner
    }
}

/// Cut every other current infinite stage on `channel` superseded by the
/// infinite winner. The timeline is truncated at the cut stage; nothing
/// after an infinite stage was ever reachable.
fn prune_channel(
    queue: &mut EventQueue,
    channel: Channel,
    winner: &ChannelWinner,
    now: Millis,
    report: &mut SweepReport,
) {
    for event in queue.iter_mut() {
        let Some(idx) = event.current_stage(channel, now) else {
            continue;
        };
        let manual = event.kind.is_manual();
        let Some(stages) = event.channels.get_mut(&channel) else {
            continue;
        };
        let stage = &stages[idx];
        if stage.id == winner.stage || !stage.span.is_infinite() {
            continue;
        }
        if superseded((stage.priority, manual, stage.id), winner.rank()) {
            tracing::trace!("{} stage {} superseded by {}", channel, stage.id, winner.stage);
            stages.truncate(idx);
            report.pruned_stages += 1;
        }
    }
}

/// Remove superseded infinite claims on the winner's category and on every
/// category it conflicts with.
fn prune_claims(queue: &mut EventQueue, winner: &PoseWinner, now: Millis, report: &mut SweepReport) {
    let mut affected: Vec<PoseCategory> = vec![winner.category()];
    affected.extend_from_slice(winner.category().conflicts());

    for event in queue.iter_mut() {
        let Some(idx) = event.current_pose_stage(now) else {
            continue;
        };
        let manual = event.kind.is_manual();
        let stage = &mut event.poses[idx];
        if stage.id == winner.stage || !stage.span.is_infinite() {
            continue;
        }
        if !superseded((stage.priority, manual, stage.id), winner.rank()) {
            continue;
        }
        for &category in &affected {
            if stage.poses.remove(category).is_some() {
                tracing::trace!("{} claim of stage {} superseded by {}", category, stage.id, winner.stage);
                report.pruned_claims += 1;
            }
        }
        if stage.poses.is_empty() {
            event.poses.truncate(idx);
        }
    }
}

/// Drop channel and pose timelines that have fully played out.
fn drop_played_out(event: &mut Event, now: Millis) {
    let elapsed = event.elapsed(now);
    event
        .channels
        .retain(|_, stages| current_index(stages, elapsed).is_some());
    if current_index(&event.poses, elapsed).is_none() {
        event.poses.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::resolve;
    use crate::submit::build_event;
    use visage_core::{
        EngineConfig, EventDraft, EventKind, IdAllocator, Pose, PoseStageDraft, StageDraft,
    };

    struct Fixture {
        queue: EventQueue,
        ids: IdAllocator,
        config: EngineConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                queue: EventQueue::new(),
                ids: IdAllocator::new(),
                config: EngineConfig::default(),
            }
        }

        fn push(&mut self, draft: EventDraft, now: Millis) -> visage_core::Id {
            let event = build_event(&draft, &mut self.ids, now, &self.config);
            let id = event.id;
            self.queue.push(event);
            id
        }

        fn sweep(&mut self, now: Millis, flags: FeatureFlags) -> SweepReport {
            let resolution = resolve(&self.queue, now, flags);
            sweep(&mut self.queue, &resolution, now, flags)
        }
    }

    #[test]
    fn test_expired_event_removed_live_event_kept() {
        let mut fx = Fixture::new();
        let short = fx.push(
            EventDraft::new(EventKind::Named)
                .duration_ms(100)
                .stage(Channel::Eyes, StageDraft::expression("Closed")),
            0,
        );
        let long = fx.push(
            EventDraft::new(EventKind::Named)
                .duration_ms(1_000)
                .stage(Channel::Mouth, StageDraft::expression("Open")),
            0,
        );
        let report = fx.sweep(100, FeatureFlags::default());
        assert_eq!(report.expired, 1);
        assert!(fx.queue.get(short).is_none());
        assert!(fx.queue.get(long).is_some());
    }

    #[test]
    fn test_older_infinite_stage_pruned_by_newer() {
        let mut fx = Fixture::new();
        let e1 = fx.push(
            EventDraft::new(EventKind::Named)
                .infinite()
                .stage(Channel::Eyes, StageDraft::expression("a"))
                .stage(Channel::Mouth, StageDraft::expression("m")),
            0,
        );
        fx.push(
            EventDraft::new(EventKind::Named)
                .infinite()
                .stage(Channel::Eyes, StageDraft::expression("b")),
            0,
        );
        let report = fx.sweep(10, FeatureFlags::default());
        assert_eq!(report.pruned_stages, 1);
        let e1 = fx.queue.get(e1).unwrap();
        assert!(!e1.channels.contains_key(&Channel::Eyes));
        assert!(e1.channels.contains_key(&Channel::Mouth));
    }

    #[test]
    fn test_higher_priority_infinite_survives_newer_lower() {
        let mut fx = Fixture::new();
        let strong = fx.push(
            EventDraft::new(EventKind::Named)
                .priority(10)
                .infinite()
                .stage(Channel::Eyes, StageDraft::expression("a")),
            0,
        );
        let weak = fx.push(
            EventDraft::new(EventKind::Named)
                .infinite()
                .stage(Channel::Eyes, StageDraft::expression("b")),
            0,
        );
        fx.sweep(10, FeatureFlags::default());
        assert!(fx.queue.get(strong).is_some());
        assert!(fx.queue.get(weak).is_none(), "emptied infinite event removed");
    }

    #[test]
    fn test_finite_winner_prunes_nothing() {
        let mut fx = Fixture::new();
        let base = fx.push(
            EventDraft::new(EventKind::ManualOverride)
                .infinite()
                .stage(Channel::Eyes, StageDraft::expression("Open")),
            0,
        );
        fx.push(
            EventDraft::new(EventKind::Named)
                .priority(5)
                .duration_ms(500)
                .stage(Channel::Eyes, StageDraft::expression("Closed")),
            0,
        );
        let report = fx.sweep(10, FeatureFlags::default());
        assert_eq!(report.pruned_stages, 0);
        assert!(fx.queue.get(base).unwrap().channels.contains_key(&Channel::Eyes));
    }

    #[test]
    fn test_played_out_timeline_dropped_but_finite_event_kept() {
        let mut fx = Fixture::new();
        let id = fx.push(
            EventDraft::new(EventKind::Named)
                .duration_ms(1_000)
                .stage(Channel::Eyes, StageDraft::expression("Closed").for_ms(100)),
            0,
        );
        fx.sweep(200, FeatureFlags::default());
        let event = fx.queue.get(id).expect("still inside its window");
        assert!(event.channels.is_empty());
    }

    #[test]
    fn test_manual_pose_claim_carve_out() {
        let mut fx = Fixture::new();
        let manual = fx.push(
            EventDraft::new(EventKind::ManualOverride)
                .infinite()
                .pose_stage(PoseStageDraft::new([Pose::Yoked, Pose::Kneel])),
            0,
        );
        // Equal priority automatic claim on the upper body: newer, but the
        // manual claim outranks it and the loser is the one cut.
        let named = fx.push(
            EventDraft::new(EventKind::Named)
                .infinite()
                .pose_stage(PoseStageDraft::new([Pose::BackCuffs])),
            0,
        );
        let report = fx.sweep(10, FeatureFlags::default());
        assert_eq!(report.pruned_claims, 1);
        assert!(fx.queue.get(named).is_none());
        assert_eq!(fx.queue.get(manual).unwrap().poses[0].poses.len(), 2);

        // A strictly higher-priority automatic claim does prune it.
        fx.push(
            EventDraft::new(EventKind::Named)
                .priority(3)
                .infinite()
                .pose_stage(PoseStageDraft::new([Pose::OverTheHead])),
            0,
        );
        fx.sweep(20, FeatureFlags::default());
        let poses = &fx.queue.get(manual).unwrap().poses[0].poses;
        assert_eq!(poses.get(PoseCategory::BodyUpper), None);
        assert_eq!(poses.get(PoseCategory::BodyLower), Some(Pose::Kneel));
    }

    #[test]
    fn test_manual_channel_stage_outlives_equal_priority_ambient() {
        let mut fx = Fixture::new();
        let manual = fx.push(
            EventDraft::new(EventKind::ManualOverride)
                .infinite()
                .stage(Channel::Blush, StageDraft::expression("Extreme")),
            0,
        );
        let ambient = fx.push(
            EventDraft::new(EventKind::Ambient)
                .infinite()
                .stage(Channel::Blush, StageDraft::expression("Medium")),
            10,
        );
        let report = fx.sweep(20, FeatureFlags::default());
        assert_eq!(report.pruned_stages, 1);
        assert!(fx.queue.get(ambient).is_none());
        assert!(fx.queue.get(manual).unwrap().channels.contains_key(&Channel::Blush));
    }

    #[test]
    fn test_manual_channel_stage_yields_to_stronger_automatic() {
        let mut fx = Fixture::new();
        let manual = fx.push(
            EventDraft::new(EventKind::ManualOverride)
                .infinite()
                .stage(Channel::Eyes, StageDraft::expression("Wide"))
                .stage(Channel::Mouth, StageDraft::expression("Smile")),
            0,
        );
        fx.push(
            EventDraft::new(EventKind::Named)
                .priority(1)
                .infinite()
                .stage(Channel::Eyes, StageDraft::expression("Closed")),
            10,
        );
        fx.sweep(20, FeatureFlags::default());
        let event = fx.queue.get(manual).unwrap();
        assert!(!event.channels.contains_key(&Channel::Eyes));
        assert!(event.channels.contains_key(&Channel::Mouth));
    }

    #[test]
    fn test_superseded_rules() {
        // Automatic entries fall to anything ranked above them.
        assert!(superseded((0, false, Id(1)), (0, false, Id(2))));
        assert!(superseded((0, false, Id(5)), (0, true, Id(2))));
        assert!(!superseded((1, false, Id(1)), (0, true, Id(2))));
        // Manual entries fall to a newer manual or a stronger automatic.
        assert!(superseded((0, true, Id(1)), (0, true, Id(2))));
        assert!(superseded((0, true, Id(1)), (1, false, Id(2))));
        assert!(!superseded((0, true, Id(1)), (0, false, Id(2))));
        assert!(!superseded((0, true, Id(3)), (0, true, Id(2))));
    }

    #[test]
    fn test_newer_manual_prunes_older_manual_claim() {
        let mut fx = Fixture::new();
        let old = fx.push(
            EventDraft::new(EventKind::ManualOverride)
                .infinite()
                .pose_stage(PoseStageDraft::new([Pose::Kneel])),
            0,
        );
        fx.push(
            EventDraft::new(EventKind::ManualOverride)
                .infinite()
                .pose_stage(PoseStageDraft::new([Pose::LegsClosed])),
            0,
        );
        fx.sweep(10, FeatureFlags::default());
        assert!(fx.queue.get(old).is_none());
    }

    #[test]
    fn test_full_body_winner_prunes_conflicting_claims() {
        let mut fx = Fixture::new();
        let parts = fx.push(
            EventDraft::new(EventKind::Named)
                .priority(1)
                .infinite()
                .pose_stage(PoseStageDraft::new([Pose::Yoked])),
            0,
        );
        fx.push(
            EventDraft::new(EventKind::Named)
                .priority(5)
                .infinite()
                .pose_stage(PoseStageDraft::new([Pose::Hogtied])),
            0,
        );
        let report = fx.sweep(10, FeatureFlags::default());
        assert_eq!(report.pruned_claims, 1);
        assert!(fx.queue.get(parts).is_none());
    }

    #[test]
    fn test_gated_ambient_ends_with_clear_pulse() {
        let mut fx = Fixture::new();
        let ambient = fx.push(
            EventDraft::new(EventKind::Ambient)
                .infinite()
                .stage(Channel::Blush, StageDraft::expression("Medium")),
            0,
        );
        let flags_on = FeatureFlags::default();
        let report = fx.sweep(10, flags_on);
        assert!(report.clear.is_empty());
        assert!(fx.queue.get(ambient).is_some());

        let flags_off = FeatureFlags {
            ambient: false,
            named: true,
        };
        let report = fx.sweep(20, flags_off);
        assert!(fx.queue.get(ambient).is_none());
        assert_eq!(report.clear.get(&Channel::Blush), Some(&0));
    }

    #[test]
    fn test_ambient_expiry_with_flag_on_clears_nothing() {
        let mut fx = Fixture::new();
        fx.push(
            EventDraft::new(EventKind::PostClimax)
                .duration_ms(100)
                .stage(Channel::Eyes, StageDraft::expression("Closed")),
            0,
        );
        let report = fx.sweep(150, FeatureFlags::default());
        assert_eq!(report.expired, 1);
        assert!(report.clear.is_empty());
    }
}
