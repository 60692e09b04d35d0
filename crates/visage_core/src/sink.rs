//! Actor-state sink
//!
//! The engine never owns the actor. It reads current state and writes
//! resolved mutations through this trait, so the same engine can drive a
//! game character, a test double, or the CLI's in-memory actor.

use crate::channel::{Channel, Expression};
use crate::pose::PoseSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Failure to reach the actor at tick time. Never fatal: the engine skips
/// the tick and retries on the next one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("actor is not attached")]
    Detached,
    #[error("actor state unavailable: {0}")]
    Unavailable(String),
}

/// One telemetry sample of the actor's arousal.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArousalSample {
    /// Nominal 0-100, boosted states may exceed 100 slightly.
    pub progress: f32,
    /// Cumulative number of climaxes so far.
    pub climax_count: u32,
}

/// Value written to (or read from) one channel.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelState {
    pub expression: Option<Expression>,
    pub color: Option<String>,
}

impl ChannelState {
    pub fn new(expression: Option<Expression>, color: Option<String>) -> Self {
        Self { expression, color }
    }

    pub fn cleared() -> Self {
        Self::default()
    }
}

/// Read/write access to one actor's visible state.
pub trait ActorSink {
    /// Fails when the actor is gone or not ready this tick.
    fn ready(&self) -> Result<(), SinkError> {
        Ok(())
    }

    fn expression(&self, channel: Channel) -> Result<ChannelState, SinkError>;

    fn set_expression(&mut self, channel: Channel, state: &ChannelState) -> Result<(), SinkError>;

    fn pose(&self) -> Result<PoseSet, SinkError>;

    fn set_pose(&mut self, poses: &PoseSet) -> Result<(), SinkError>;

    fn arousal(&self) -> Result<ArousalSample, SinkError>;
}

/// In-memory actor, used by the CLI and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryActor {
    pub channels: BTreeMap<Channel, ChannelState>,
    pub pose: PoseSet,
    pub arousal: ArousalSample,
    /// Simulates a missing actor: every call fails with `Detached`.
    pub detached: bool,
    /// Number of successful writes, for observing "emit only on change".
    pub writes: usize,
}

impl MemoryActor {
    pub fn new() -> Self {
        Self {
            pose: PoseSet::neutral(),
            ..Self::default()
        }
    }

    /// Convenience accessor for the displayed expression on `channel`.
    pub fn shown(&self, channel: Channel) -> Option<&str> {
        self.channels
            .get(&channel)
            .and_then(|s| s.expression.as_ref())
            .map(Expression::as_str)
    }

    fn check(&self) -> Result<(), SinkError> {
        if self.detached {
            Err(SinkError::Detached)
        } else {
            Ok(())
        }
    }
}

impl ActorSink for MemoryActor {
    fn ready(&self) -> Result<(), SinkError> {
        self.check()
    }

    fn expression(&self, channel: Channel) -> Result<ChannelState, SinkError> {
        self.check()?;
        Ok(self.channels.get(&channel).cloned().unwrap_or_default())
    }

    fn set_expression(&mut self, channel: Channel, state: &ChannelState) -> Result<(), SinkError> {
        self.check()?;
        self.channels.insert(channel, state.clone());
        self.writes += 1;
        Ok(())
    }

    fn pose(&self) -> Result<PoseSet, SinkError> {
        self.check()?;
        Ok(self.pose.clone())
    }

    fn set_pose(&mut self, poses: &PoseSet) -> Result<(), SinkError> {
        self.check()?;
        self.pose = poses.clone();
        self.writes += 1;
        Ok(())
    }

    fn arousal(&self) -> Result<ArousalSample, SinkError> {
        self.check()?;
        Ok(self.arousal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_actor_roundtrip() {
        let mut actor = MemoryActor::new();
        let state = ChannelState::new(Some(Expression::new("Closed")), None);
        actor.set_expression(Channel::Eyes, &state).unwrap();
        assert_eq!(actor.expression(Channel::Eyes).unwrap(), state);
        assert_eq!(actor.shown(Channel::Eyes), Some("Closed"));
        assert_eq!(actor.expression(Channel::Mouth).unwrap(), ChannelState::cleared());
        assert_eq!(actor.writes, 1);
    }

    #[test]
    fn test_detached_actor_fails() {
        let mut actor = MemoryActor::new();
        actor.detached = true;
        assert_eq!(actor.ready(), Err(SinkError::Detached));
        assert!(actor.pose().is_err());
        assert!(actor.set_pose(&PoseSet::neutral()).is_err());
        assert_eq!(actor.writes, 0);
    }
}
