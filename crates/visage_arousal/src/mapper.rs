//! Arousal Mapper
//!
//! Turns the continuous arousal telemetry into low-priority ambient
//! expression requests. The mapper never touches the actor: it only emits
//! drafts for the engine to submit, so any manual or named animation of
//! equal-or-higher priority can still take over a channel.

use crate::tiers::TierTable;
use std::collections::BTreeMap;
use visage_core::{
    ArousalConfig, ArousalSample, Channel, EventDraft, EventKind, Expression, Millis, StageDraft,
};

/// Direction of travel between two consecutive samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Increasing,
    Decreasing,
}

/// Post-climax recovery window.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Recovery {
    started_at: Millis,
    window_ms: u64,
}

/// Adjusted value the tier lookup used on the last observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub value: f32,
    pub boost: f32,
    pub direction: Direction,
}

pub struct ArousalMapper {
    tables: Vec<TierTable>,
    hysteresis: f32,
    ceiling: f32,
    max_boost: f32,
    recovery_per_climax_ms: u64,
    climax_count_cap: u32,

    previous: Option<f32>,
    direction: Direction,
    climax_count: Option<u32>,
    recovery: Option<Recovery>,
    /// Tier last emitted per dimension.
    emitted: BTreeMap<Channel, Option<Expression>>,
    last: Option<Reading>,
}

/// Replace NaN/Inf telemetry with a neutral reading.
#[inline]
fn sanitize_f32(v: f32, fallback: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        tracing::warn!("NaN/Inf arousal sample, using fallback {}", fallback);
        fallback
    }
}

impl ArousalMapper {
    pub fn new(config: &ArousalConfig) -> Self {
        Self {
            tables: config.dimensions.iter().map(TierTable::from_config).collect(),
            hysteresis: config.hysteresis.max(0.0),
            ceiling: 100.0 + config.headroom.max(0.0),
            max_boost: config.max_boost.max(0.0),
            recovery_per_climax_ms: config.recovery_per_climax_ms,
            climax_count_cap: config.climax_count_cap,
            previous: None,
            direction: Direction::Increasing,
            climax_count: None,
            recovery: None,
            emitted: BTreeMap::new(),
            last: None,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn last_reading(&self) -> Option<Reading> {
        self.last
    }

    /// Boost still owed to the current recovery window at `now`.
    pub fn boost_at(&self, now: Millis) -> f32 {
        match self.recovery {
            Some(r) if r.window_ms > 0 => {
                let elapsed = now.saturating_sub(r.started_at);
                if elapsed >= r.window_ms {
                    0.0
                } else {
                    self.max_boost * (1.0 - elapsed as f32 / r.window_ms as f32)
                }
            }
            _ => 0.0,
        }
    }

    /// Forget which tiers were emitted, so the next observation re-emits
    /// every dimension. Used when ambient ticking resumes after a pause.
    pub fn forget(&mut self) {
        self.emitted.clear();
    }

    /// Feed one sample; returns the ambient drafts for every dimension whose
    /// tier changed.
    pub fn observe(&mut self, sample: ArousalSample, now: Millis) -> Vec<EventDraft> {
        let reading = self.read(sample, now);
        self.last = Some(reading);
        let shift = match reading.direction {
            Direction::Increasing => 0.0,
            Direction::Decreasing => self.hysteresis,
        };

        let mut drafts = Vec::new();
        for table in &self.tables {
            let Some(tier) = table.lookup(reading.value, shift) else {
                continue;
            };
            if self.emitted.get(&table.channel) == Some(&tier) {
                continue;
            }
            tracing::debug!(
                "Arousal {:.1} ({:?}, boost {:.1}) moves {} to {:?}",
                reading.value,
                reading.direction,
                reading.boost,
                table.channel,
                tier
            );
            let stage = match &tier {
                Some(expr) => StageDraft::expression(expr.as_str()),
                None => StageDraft::clear(),
            };
            drafts.push(
                EventDraft::new(EventKind::Ambient)
                    .priority(0)
                    .infinite()
                    .stage(table.channel, stage),
            );
            self.emitted.insert(table.channel, tier);
        }
        drafts
    }

    /// Update direction and recovery state from a sample and compute the
    /// lookup value.
    fn read(&mut self, sample: ArousalSample, now: Millis) -> Reading {
        let progress = sanitize_f32(sample.progress, 0.0).clamp(0.0, self.ceiling);

        if let Some(previous) = self.previous {
            if progress > previous {
                self.direction = Direction::Increasing;
            } else if progress < previous {
                self.direction = Direction::Decreasing;
            }
        }
        self.previous = Some(progress);

        match self.climax_count {
            Some(seen) if sample.climax_count > seen => {
                let counted = sample.climax_count.min(self.climax_count_cap) as u64;
                let window_ms = self.recovery_per_climax_ms.saturating_mul(counted);
                tracing::debug!("Climax #{} detected, recovery window {}ms", sample.climax_count, window_ms);
                self.recovery = Some(Recovery {
                    started_at: now,
                    window_ms,
                });
            }
            _ => {}
        }
        self.climax_count = Some(sample.climax_count);

        let boost = self.boost_at(now);
        if boost <= 0.0 {
            self.recovery = None;
        }

        Reading {
            value: (progress + boost).clamp(0.0, self.ceiling),
            boost,
            direction: self.direction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use visage_core::StageValue;

    fn sample(progress: f32) -> ArousalSample {
        ArousalSample {
            progress,
            climax_count: 0,
        }
    }

    fn blush_of(drafts: &[EventDraft]) -> Option<StageValue> {
        drafts
            .iter()
            .find_map(|d| d.channels.get("Blush"))
            .map(|stages| stages[0].value())
    }

    fn medium() -> StageValue {
        StageValue::Set(Some(Expression::new("Medium")))
    }

    fn low() -> StageValue {
        StageValue::Set(Some(Expression::new("Low")))
    }

    #[test]
    fn test_hysteresis_changes_tier_at_same_value() {
        let config = ArousalConfig::default();

        let mut rising = ArousalMapper::new(&config);
        rising.observe(sample(10.0), 0);
        let drafts = rising.observe(sample(60.0), 100);
        assert_eq!(rising.direction(), Direction::Increasing);
        assert_eq!(blush_of(&drafts), Some(low()));

        let mut falling = ArousalMapper::new(&config);
        falling.observe(sample(10.0), 0);
        falling.observe(sample(75.0), 100);
        let drafts = falling.observe(sample(60.0), 200);
        assert_eq!(falling.direction(), Direction::Decreasing);
        // 75 already selected Medium; staying there at 60 means no new draft
        assert_eq!(blush_of(&drafts), None);
        assert_eq!(falling.emitted.get(&Channel::Blush), Some(&Some(Expression::new("Medium"))));
    }

    #[test]
    fn test_drafts_are_infinite_ambient_priority_zero() {
        let mut mapper = ArousalMapper::new(&ArousalConfig::default());
        let drafts = mapper.observe(sample(70.0), 0);
        assert!(!drafts.is_empty());
        for draft in &drafts {
            assert_eq!(draft.kind, EventKind::Ambient);
            assert_eq!(draft.priority, Some(0));
            assert_eq!(draft.duration_ms, Some(-1));
            assert_eq!(draft.channels.len(), 1);
            assert_eq!(draft.channels.values().next().unwrap().len(), 1);
        }
        assert_eq!(blush_of(&drafts), Some(medium()));
    }

    #[test]
    fn test_unchanged_tier_emits_nothing() {
        let mut mapper = ArousalMapper::new(&ArousalConfig::default());
        let first = mapper.observe(sample(40.0), 0);
        assert!(!first.is_empty());
        assert!(mapper.observe(sample(41.0), 100).is_empty());
        assert!(mapper.observe(sample(41.0), 200).is_empty());
    }

    #[test]
    fn test_forget_reemits() {
        let mut mapper = ArousalMapper::new(&ArousalConfig::default());
        let first = mapper.observe(sample(40.0), 0);
        mapper.forget();
        let again = mapper.observe(sample(40.0), 100);
        assert_eq!(first.len(), again.len());
    }

    #[test]
    fn test_post_climax_boost_decays_linearly() {
        let config = ArousalConfig {
            max_boost: 40.0,
            recovery_per_climax_ms: 1_000,
            climax_count_cap: 3,
            ..ArousalConfig::default()
        };
        let mut mapper = ArousalMapper::new(&config);
        mapper.observe(ArousalSample { progress: 0.0, climax_count: 0 }, 0);
        mapper.observe(ArousalSample { progress: 0.0, climax_count: 1 }, 1_000);

        assert!((mapper.boost_at(1_000) - 40.0).abs() < 1e-4);
        assert!((mapper.boost_at(1_500) - 20.0).abs() < 1e-4);
        assert_eq!(mapper.boost_at(2_000), 0.0);
    }

    #[test]
    fn test_recovery_window_capped_by_climax_count() {
        let config = ArousalConfig {
            max_boost: 10.0,
            recovery_per_climax_ms: 1_000,
            climax_count_cap: 2,
            ..ArousalConfig::default()
        };
        let mut mapper = ArousalMapper::new(&config);
        mapper.observe(ArousalSample { progress: 0.0, climax_count: 7 }, 0);
        // Count already at 7 on first sample: no climax detected yet
        assert_eq!(mapper.boost_at(0), 0.0);

        mapper.observe(ArousalSample { progress: 0.0, climax_count: 8 }, 0);
        // Window is 2 * 1000ms, not 8 * 1000ms
        assert!(mapper.boost_at(1_999) > 0.0);
        assert_eq!(mapper.boost_at(2_000), 0.0);
    }

    #[test]
    fn test_boost_lifts_tier_after_climax() {
        let config = ArousalConfig {
            max_boost: 40.0,
            recovery_per_climax_ms: 10_000,
            ..ArousalConfig::default()
        };
        let mut mapper = ArousalMapper::new(&config);
        mapper.observe(ArousalSample { progress: 100.0, climax_count: 0 }, 0);
        let drafts = mapper.observe(ArousalSample { progress: 30.0, climax_count: 1 }, 100);
        // 30 + 40 boost = 70 -> Medium, even though raw value alone is Low
        assert_eq!(blush_of(&drafts), Some(medium()));
        assert_eq!(mapper.emitted.get(&Channel::Blush), Some(&Some(Expression::new("Medium"))));
    }

    #[test]
    fn test_nan_sample_is_neutral() {
        let mut mapper = ArousalMapper::new(&ArousalConfig::default());
        mapper.observe(sample(f32::NAN), 0);
        assert_eq!(mapper.emitted.get(&Channel::Blush), Some(&None));
    }
}
