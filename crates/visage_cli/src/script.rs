//! Timed driver scripts.
//!
//! A script is a TOML list of `[[step]]` tables. Each step fires once the
//! simulated (or wall) clock reaches its `at_ms` and may carry any of:
//!
//! ```toml
//! [[step]]
//! at_ms = 200
//! push = { kind = "named", priority = 2, duration_ms = 800, channels = { Eyes = [{ expression = "Closed" }] } }
//! set = { channel = "Blush", expression = "Low" }
//! pose = ["Kneel", "Yoked"]
//! reset = { channels = ["eyes"], categories = ["body_lower"] }
//! arousal = { progress = 70.0, climax_count = 1 }
//! flags = { ambient = false, named = true }
//! ```
//!
//! When a step carries several actions they run in the order listed above.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use visage_core::{
    ArousalSample, Channel, EventDraft, Expression, FeatureFlags, MemoryActor, Millis, Pose,
    PoseSet,
};
use visage_engine::{ExpressionEngine, ResetFilter};

#[derive(Debug, Default, Deserialize)]
pub struct Script {
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Step {
    pub at_ms: Millis,
    pub push: Option<EventDraft>,
    pub set: Option<SetExpression>,
    pub pose: Option<Vec<String>>,
    pub reset: Option<ResetFilter>,
    pub arousal: Option<ArousalSample>,
    pub flags: Option<FeatureFlags>,
}

/// Manual "set now" of one channel.
#[derive(Debug, Deserialize)]
pub struct SetExpression {
    pub channel: String,
    #[serde(default)]
    pub expression: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

impl Script {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read script: {}", path.as_ref().display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut script: Script = toml::from_str(content).context("Failed to parse script TOML")?;
        script.steps.sort_by_key(|s| s.at_ms);
        Ok(script)
    }

    /// Time of the last step.
    pub fn end_ms(&self) -> Millis {
        self.steps.last().map_or(0, |s| s.at_ms)
    }

    pub fn runner(self) -> Runner {
        Runner {
            steps: self.steps,
            next: 0,
        }
    }
}

/// Replays script steps as the clock advances.
pub struct Runner {
    steps: Vec<Step>,
    next: usize,
}

impl Runner {
    /// Apply every step due at or before `now`. Returns how many ran.
    pub fn apply_due(
        &mut self,
        now: Millis,
        engine: &mut ExpressionEngine,
        actor: &mut MemoryActor,
    ) -> Result<usize> {
        let start = self.next;
        while let Some(step) = self.steps.get(self.next) {
            if step.at_ms > now {
                break;
            }
            step.apply(engine, actor)
                .with_context(|| format!("Step at {}ms failed", step.at_ms))?;
            self.next += 1;
        }
        Ok(self.next - start)
    }

    pub fn is_done(&self) -> bool {
        self.next >= self.steps.len()
    }
}

impl Step {
    fn apply(&self, engine: &mut ExpressionEngine, actor: &mut MemoryActor) -> Result<()> {
        if let Some(draft) = &self.push {
            if engine.push(draft.clone()).is_none() {
                tracing::info!("{:?} event not admitted by current flags", draft.kind);
            }
        }
        if let Some(set) = &self.set {
            let channel: Channel = set.channel.parse()?;
            engine.set_expression(
                channel,
                set.expression.as_deref().map(Expression::new),
                set.color.clone(),
            );
        }
        if let Some(names) = &self.pose {
            let poses = names
                .iter()
                .map(|n| n.parse::<Pose>())
                .collect::<Result<PoseSet, _>>()?;
            engine.set_pose(&poses);
        }
        if let Some(filter) = &self.reset {
            engine.reset(filter);
        }
        if let Some(sample) = self.arousal {
            actor.arousal = sample;
        }
        if let Some(flags) = self.flags {
            engine.set_flags(flags);
        }
        Ok(())
    }
}
