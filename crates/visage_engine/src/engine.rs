use crate::apply::{self, AppliedState, Mutation};
use crate::gc::{self, SweepReport};
use crate::manual::{self, ManualSnapshot};
use crate::queue::EventQueue;
use crate::resolve::{self, Resolution};
use crate::submit::{admits, build_event};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use visage_arousal::ArousalMapper;
use visage_core::{
    ActorSink, Channel, ChannelState, Clock, EngineConfig, Event, EventDraft, EventKind,
    Expression, FeatureFlags, Id, IdAllocator, Millis, MonotonicClock, PoseCategory, PoseSet,
    PoseStageDraft, SinkError, StageDraft, VisageConfig,
};

/// Global ticking state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Normal ticking.
    Enabled,
    /// Every flag just went off; the next tick clears the actor.
    Flushing,
    /// Ticking frozen, queue untouched.
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Resolved,
    /// Channels cleared and pose neutralized; the engine is now disabled.
    Flushed,
    /// The engine is disabled; nothing happened.
    Frozen,
    /// The actor could not be reached; the tick will be retried.
    Skipped(SinkError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub now: Millis,
    pub outcome: TickOutcome,
    pub mutations: Vec<Mutation>,
    pub sweep: SweepReport,
}

impl TickReport {
    fn new(now: Millis) -> Self {
        Self {
            now,
            outcome: TickOutcome::Resolved,
            mutations: Vec::new(),
            sweep: SweepReport::default(),
        }
    }

    fn skipped(mut self, error: SinkError) -> Self {
        self.outcome = TickOutcome::Skipped(error);
        self
    }
}

/// Which channels and pose categories a `reset` targets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResetFilter {
    pub channels: Vec<Channel>,
    pub categories: Vec<PoseCategory>,
    /// Also drop manual overrides and their snapshot entries.
    pub hard: bool,
}

impl ResetFilter {
    pub fn all() -> Self {
        Self {
            channels: Channel::ALL.to_vec(),
            categories: PoseCategory::ALL.to_vec(),
            hard: false,
        }
    }

    pub fn channels(channels: impl IntoIterator<Item = Channel>) -> Self {
        Self {
            channels: channels.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn categories(categories: impl IntoIterator<Item = PoseCategory>) -> Self {
        Self {
            categories: categories.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn hard(mut self) -> Self {
        self.hard = true;
        self
    }
}

/// Expression & pose engine for one actor.
///
/// Owns the event queue, the last-applied cache, the manual snapshot and
/// the arousal mapper. The host calls [`tick`](Self::tick) from its own
/// loop and submits work between ticks through `push`, `set_expression`,
/// `set_pose` and `reset`.
pub struct ExpressionEngine {
    config: EngineConfig,
    flags: FeatureFlags,
    state: EngineState,
    clock: Arc<dyn Clock>,
    ids: IdAllocator,
    queue: EventQueue,
    applied: AppliedState,
    manual: ManualSnapshot,
    mapper: ArousalMapper,
    attached: bool,
}

impl ExpressionEngine {
    pub fn new(config: &VisageConfig, clock: Arc<dyn Clock>) -> Self {
        let flags = config.flags;
        Self {
            config: config.engine.clone(),
            flags,
            state: if flags.any() {
                EngineState::Enabled
            } else {
                EngineState::Disabled
            },
            clock,
            ids: IdAllocator::new(),
            queue: EventQueue::new(),
            applied: AppliedState::default(),
            manual: ManualSnapshot::new(),
            mapper: ArousalMapper::new(&config.arousal),
            attached: false,
        }
    }

    /// Engine driven by the process's monotonic clock.
    pub fn realtime(config: &VisageConfig) -> Self {
        Self::new(config, Arc::new(MonotonicClock::new()))
    }

    pub fn now(&self) -> Millis {
        self.clock.now_ms()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn flags(&self) -> FeatureFlags {
        self.flags
    }

    pub fn queue(&self) -> &EventQueue {
        &self.queue
    }

    pub fn applied(&self) -> &AppliedState {
        &self.applied
    }

    pub fn snapshot(&self) -> &ManualSnapshot {
        &self.manual
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Submit a draft. Returns `None` when feature flags gate its kind off.
    pub fn push(&mut self, draft: EventDraft) -> Option<Id> {
        let now = self.now();
        self.push_at(draft, now)
    }

    fn push_at(&mut self, draft: EventDraft, now: Millis) -> Option<Id> {
        if !admits(draft.kind, self.flags) {
            tracing::debug!("Dropping {:?} event: feature disabled", draft.kind);
            return None;
        }
        let event = build_event(&draft, &mut self.ids, now, &self.config);
        let id = event.id;
        tracing::debug!(
            "Queued {:?} event {} (priority {}, {} channel(s), {} pose stage(s))",
            event.kind,
            id,
            event.priority,
            event.channels.len(),
            event.poses.len()
        );
        self.queue.push(event);
        Some(id)
    }

    /// Explicitly set a channel now. The value becomes part of the manual
    /// baseline that survives queue resets.
    pub fn set_expression(
        &mut self,
        channel: Channel,
        expression: Option<Expression>,
        color: Option<String>,
    ) -> Option<Id> {
        let state = ChannelState::new(expression, color);
        let stage = StageDraft {
            expression: state.expression.as_ref().map(|e| e.as_str().to_string()),
            color: state.color.clone(),
            ..StageDraft::default()
        };
        self.manual.record_expression(channel, state);
        let draft = self.manual_draft().stage(channel, stage);
        self.push(draft)
    }

    /// Explicitly assert poses now.
    pub fn set_pose(&mut self, poses: &PoseSet) -> Option<Id> {
        if poses.is_empty() {
            return None;
        }
        self.manual.record_pose(poses);
        let draft = self
            .manual_draft()
            .pose_stage(PoseStageDraft::new(poses.iter()));
        self.push(draft)
    }

    fn manual_draft(&self) -> EventDraft {
        EventDraft::new(EventKind::ManualOverride)
            .priority(self.config.manual_priority)
            .infinite()
    }

    /// Force channels and pose categories back to their baseline: the
    /// manual overrides and the look captured on attach.
    ///
    /// Every automatic contribution to the targeted slots is removed. Slots
    /// without a baseline get a short clearing pulse instead.
    pub fn reset(&mut self, filter: &ResetFilter) {
        let now = self.now();
        self.reset_at(filter, now);
    }

    fn reset_at(&mut self, filter: &ResetFilter, now: Millis) {
        let mut removed = 0usize;
        for event in self.queue.iter_mut() {
            if event.kind.is_baseline() && !filter.hard {
                continue;
            }
            for channel in &filter.channels {
                if event.channels.remove(channel).is_some() {
                    removed += 1;
                }
            }
            for stage in event.poses.iter_mut() {
                for &category in &filter.categories {
                    if stage.poses.remove(category).is_some() {
                        removed += 1;
                    }
                }
            }
            if event.poses.iter().all(|s| s.poses.is_empty()) {
                event.poses.clear();
            }
        }
        self.queue.retain(|e| !e.is_empty());
        if filter.hard {
            self.manual.remove(&filter.channels, &filter.categories);
        }

        let baseline = |queue: &EventQueue| {
            let mut channels = Vec::new();
            let mut categories = Vec::new();
            for event in queue.iter().filter(|e| e.kind.is_baseline()) {
                channels.extend(event.channels.keys().copied());
                for stage in &event.poses {
                    categories.extend(stage.poses.categories());
                }
            }
            (channels, categories)
        };
        let (kept_channels, kept_categories) = baseline(&self.queue);

        let mut pulse = EventDraft::new(EventKind::ExternalTimed)
            .priority(self.config.manual_priority)
            .duration_ms(self.clear_pulse_ms());
        for &channel in &filter.channels {
            if !kept_channels.contains(&channel) {
                pulse = pulse.stage(channel, StageDraft::clear());
            }
        }
        let neutral: PoseSet = filter
            .categories
            .iter()
            .filter(|c| !kept_categories.contains(*c))
            .flat_map(|c| c.neutral().iter().copied())
            .collect();
        if !neutral.is_empty() {
            pulse = pulse.pose_stage(PoseStageDraft::new(neutral.iter()));
        }

        tracing::info!(
            "Reset {} channel(s), {} categor(ies): {} contribution(s) removed",
            filter.channels.len(),
            filter.categories.len(),
            removed
        );
        if !pulse.channels.is_empty() || !pulse.poses.is_empty() {
            self.push_at(pulse, now);
        }
    }

    fn clear_pulse_ms(&self) -> i64 {
        i64::try_from(self.config.clear_pulse_ms.max(1)).unwrap_or(i64::MAX)
    }

    // ========================================================================
    // Flags & queue rebuilds
    // ========================================================================

    pub fn set_flags(&mut self, flags: FeatureFlags) {
        let previous = self.flags;
        self.flags = flags;
        if flags == previous {
            return;
        }
        tracing::info!(
            "Feature flags: ambient={} named={}",
            flags.ambient,
            flags.named
        );

        if flags.ambient && !previous.ambient {
            self.mapper.forget();
        }

        match (self.state, flags.any()) {
            (EngineState::Enabled, false) => {
                tracing::info!("Engine disabled, flushing on next tick");
                self.state = EngineState::Flushing;
            }
            (EngineState::Flushing, true) => {
                // Nothing was cleared yet; carry on as if never disabled.
                self.state = EngineState::Enabled;
            }
            (EngineState::Disabled, true) => {
                tracing::info!("Engine re-enabled, replaying manual baseline");
                let now = self.now();
                self.rebuild(now, None);
                self.state = EngineState::Enabled;
            }
            _ => {}
        }
    }

    /// Read the actor's live state and queue it as the baseline.
    ///
    /// Manual overrides set before attaching are replayed on top of it, and
    /// pending automatic events survive, re-ordered after both.
    pub fn attach<S: ActorSink + ?Sized>(&mut self, sink: &mut S) -> Result<(), SinkError> {
        sink.ready()?;
        let mut live = BTreeMap::new();
        for channel in Channel::ALL {
            live.insert(channel, sink.expression(channel)?);
        }
        let pose = sink.pose()?;

        self.applied = AppliedState {
            channels: live.clone(),
            pose: Some(pose.clone()),
        };
        let now = self.now();
        self.rebuild(now, Some((&live, &pose)));
        self.attached = true;
        tracing::info!("Attached to actor (pose {})", pose);
        Ok(())
    }

    /// Full queue reset: harvest surviving manual stages, replay the
    /// snapshot as one manual event, then clear it.
    ///
    /// With `live` (attach), the actor state is queued first as the baseline
    /// and pending automatic events are kept. Without it (re-enable), the
    /// queue is cleared outright.
    fn rebuild(
        &mut self,
        now: Millis,
        live: Option<(&BTreeMap<Channel, ChannelState>, &PoseSet)>,
    ) {
        self.manual.harvest(&self.queue, now);
        let drained = self.queue.drain();

        if let Some((channels, pose)) = live {
            self.push_at(manual::baseline(channels, pose), now);
        }
        if let Some(replay) = self.manual.take_replay(self.config.manual_priority) {
            self.push_at(replay, now);
        }

        let mut kept = 0usize;
        if live.is_some() {
            for mut event in drained.into_iter().filter(|e| !e.kind.is_baseline()) {
                restamp(&mut event, &mut self.ids);
                self.queue.push(event);
                kept += 1;
            }
        }
        tracing::debug!("Queue rebuilt: {} pending event(s) kept", kept);
        self.mapper.forget();
    }

    // ========================================================================
    // Ticking
    // ========================================================================

    /// Resolve the queue at `now` without touching anything.
    pub fn resolve(&self, now: Millis) -> Resolution {
        resolve::resolve(&self.queue, now, self.flags)
    }

    pub fn tick<S: ActorSink + ?Sized>(&mut self, sink: &mut S) -> TickReport {
        let now = self.now();
        self.tick_at(now, sink)
    }

    pub fn tick_at<S: ActorSink + ?Sized>(&mut self, now: Millis, sink: &mut S) -> TickReport {
        let mut report = TickReport::new(now);

        if self.state == EngineState::Disabled {
            report.outcome = TickOutcome::Frozen;
            return report;
        }

        if let Err(e) = sink.ready() {
            tracing::warn!("Skipping tick at {}ms: {}", now, e);
            return report.skipped(e);
        }

        if !self.attached {
            if let Err(e) = self.attach(sink) {
                tracing::warn!("Skipping tick at {}ms, attach failed: {}", now, e);
                return report.skipped(e);
            }
        }

        if self.state == EngineState::Flushing {
            return self.flush(report, sink);
        }

        if self.flags.ambient {
            match sink.arousal() {
                Ok(sample) => {
                    for draft in self.mapper.observe(sample, now) {
                        self.push_at(draft, now);
                    }
                }
                Err(e) => {
                    tracing::warn!("Skipping tick at {}ms, arousal unavailable: {}", now, e);
                    return report.skipped(e);
                }
            }
        }

        let resolution = resolve::resolve(&self.queue, now, self.flags);

        for (channel, state) in apply::channel_changes(&mut self.queue, &resolution, &self.applied) {
            if let Err(e) = sink.set_expression(channel, &state) {
                tracing::warn!("Write to {} failed, retrying next tick: {}", channel, e);
                return report.skipped(e);
            }
            tracing::debug!("{} -> {:?}", channel, state.expression);
            self.applied.channels.insert(channel, state.clone());
            report.mutations.push(Mutation::Expression { channel, state });
        }

        if let Some(poses) = apply::pose_change(&resolution, &self.applied) {
            if let Err(e) = sink.set_pose(&poses) {
                tracing::warn!("Pose write failed, retrying next tick: {}", e);
                return report.skipped(e);
            }
            tracing::debug!("Pose -> {}", poses);
            self.applied.pose = Some(poses.clone());
            report.mutations.push(Mutation::Pose { poses });
        }

        report.sweep = gc::sweep(&mut self.queue, &resolution, now, self.flags);
        if !report.sweep.clear.is_empty() {
            let mut pulse =
                EventDraft::new(EventKind::ExternalTimed).duration_ms(self.clear_pulse_ms());
            for (&channel, &priority) in &report.sweep.clear {
                pulse = pulse.stage(channel, StageDraft::clear().priority(priority));
            }
            self.push_at(pulse, now);
        }

        tracing::trace!(
            "Tick {}ms: {} mutation(s), {} event(s) queued",
            now,
            report.mutations.len(),
            self.queue.len()
        );
        report
    }

    /// Clear every channel and neutralize the pose, then freeze.
    fn flush<S: ActorSink + ?Sized>(&mut self, mut report: TickReport, sink: &mut S) -> TickReport {
        for channel in Channel::ALL {
            let cleared = ChannelState::cleared();
            if self.applied.channel(channel) == cleared {
                continue;
            }
            if let Err(e) = sink.set_expression(channel, &cleared) {
                tracing::warn!("Flush of {} failed, retrying next tick: {}", channel, e);
                return report.skipped(e);
            }
            self.applied.channels.insert(channel, cleared.clone());
            report.mutations.push(Mutation::Expression {
                channel,
                state: cleared,
            });
        }

        let neutral = PoseSet::neutral();
        if self.applied.pose() != neutral {
            if let Err(e) = sink.set_pose(&neutral) {
                tracing::warn!("Pose flush failed, retrying next tick: {}", e);
                return report.skipped(e);
            }
            self.applied.pose = Some(neutral.clone());
            report.mutations.push(Mutation::Pose { poses: neutral });
        }

        self.state = EngineState::Disabled;
        report.outcome = TickOutcome::Flushed;
        tracing::info!("Engine flushed and frozen");
        report
    }
}

/// Give an event and its stages fresh ids, keeping their relative order.
fn restamp(event: &mut Event, ids: &mut IdAllocator) {
    event.id = ids.next_id();
    for stages in event.channels.values_mut() {
        for stage in stages {
            stage.id = ids.next_id();
        }
    }
    for stage in &mut event.poses {
        stage.id = ids.next_id();
    }
}
