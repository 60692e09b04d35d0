//! Tier tables: descending `(threshold, tier)` lists per expressive dimension.

use visage_core::{Channel, DimensionConfig, Expression};

/// Lookup table for one channel. Entries are kept sorted by descending
/// threshold whatever order the configuration listed them in.
#[derive(Debug, Clone, PartialEq)]
pub struct TierTable {
    pub channel: Channel,
    tiers: Vec<(f32, Option<Expression>)>,
}

impl TierTable {
    pub fn new(channel: Channel, tiers: impl IntoIterator<Item = (f32, Option<Expression>)>) -> Self {
        let mut tiers: Vec<_> = tiers
            .into_iter()
            .filter(|(threshold, _)| {
                let ok = threshold.is_finite();
                if !ok {
                    tracing::warn!("Dropping non-finite arousal threshold on {}", channel);
                }
                ok
            })
            .collect();
        tiers.sort_by(|a, b| b.0.total_cmp(&a.0));
        Self { channel, tiers }
    }

    pub fn from_config(config: &DimensionConfig) -> Self {
        Self::new(
            config.channel,
            config
                .tiers
                .iter()
                .map(|t| (t.threshold, t.expression.as_deref().map(Expression::new))),
        )
    }

    /// First tier whose threshold, lowered by `shift`, is met by `value`.
    ///
    /// The outer `None` means no tier matched at all.
    pub fn lookup(&self, value: f32, shift: f32) -> Option<Option<Expression>> {
        self.tiers
            .iter()
            .find(|(threshold, _)| value >= threshold - shift)
            .map(|(_, tier)| tier.clone())
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}
