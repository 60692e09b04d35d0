//! Expression channels
//!
//! A channel is an independent expressive slot on an actor's face. Each
//! channel holds exactly one resolved value at a time: either an expression
//! id or nothing (the channel's neutral look).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An absolute expression id (e.g. `"Closed"`, `"Medium"`, `"DroolLow"`).
///
/// Expression ids are catalog data and are not validated here; the host
/// decides what a given id looks like on a given channel.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Expression(String);

impl Expression {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Expression {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Independent expressive slot on an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Blush,
    Eyebrows,
    Eyes,
    Eyes2,
    Fluids,
    Mouth,
}

/// Ordered scale for `Blush`. Index 0 is the cleared (neutral) value.
const BLUSH_SCALE: &[Option<&str>] = &[
    None,
    Some("Low"),
    Some("Medium"),
    Some("High"),
    Some("VeryHigh"),
    Some("Extreme"),
    Some("ShortBreath"),
];

impl Channel {
    pub const ALL: [Channel; 6] = [
        Channel::Blush,
        Channel::Eyebrows,
        Channel::Eyes,
        Channel::Eyes2,
        Channel::Fluids,
        Channel::Mouth,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Channel::Blush => "Blush",
            Channel::Eyebrows => "Eyebrows",
            Channel::Eyes => "Eyes",
            Channel::Eyes2 => "Eyes2",
            Channel::Fluids => "Fluids",
            Channel::Mouth => "Mouth",
        }
    }

    /// Ordered enumeration that relative modifiers move along, if the
    /// channel has one.
    pub fn scale(self) -> Option<&'static [Option<&'static str>]> {
        match self {
            Channel::Blush => Some(BLUSH_SCALE),
            Channel::Eyebrows
            | Channel::Eyes
            | Channel::Eyes2
            | Channel::Fluids
            | Channel::Mouth => None,
        }
    }

    /// Position of `value` on this channel's scale.
    ///
    /// Returns `None` if the channel has no scale or the value is not on it.
    pub fn scale_index(self, value: Option<&Expression>) -> Option<usize> {
        let scale = self.scale()?;
        let needle = value.map(Expression::as_str);
        scale.iter().position(|step| *step == needle)
    }

    /// Move `shift` steps along the scale from `value`, clamped to its ends.
    ///
    /// Returns `None` when the move is impossible (no scale, or the current
    /// value is off-scale).
    pub fn shift(self, value: Option<&Expression>, shift: i32) -> Option<Option<Expression>> {
        let scale = self.scale()?;
        let current = self.scale_index(value)? as i64;
        let max = scale.len() as i64 - 1;
        let next = (current + shift as i64).clamp(0, max) as usize;
        Some(scale[next].map(Expression::new))
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error for channel names outside the closed taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown expression channel: {0}")]
pub struct UnknownChannel(pub String);

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownChannel(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("eyes2".parse::<Channel>().unwrap(), Channel::Eyes2);
        assert_eq!("BLUSH".parse::<Channel>().unwrap(), Channel::Blush);
        assert_eq!(" Mouth ".parse::<Channel>().unwrap(), Channel::Mouth);
        assert!("Nose".parse::<Channel>().is_err());
    }

    #[test]
    fn test_blush_shift_clamps() {
        let high = Expression::new("High");
        assert_eq!(
            Channel::Blush.shift(Some(&high), 1),
            Some(Some(Expression::new("VeryHigh")))
        );
        assert_eq!(
            Channel::Blush.shift(Some(&high), 50),
            Some(Some(Expression::new("ShortBreath")))
        );
        assert_eq!(Channel::Blush.shift(Some(&high), -50), Some(None));
        assert_eq!(
            Channel::Blush.shift(None, 2),
            Some(Some(Expression::new("Medium")))
        );
    }

    #[test]
    fn test_shift_impossible_without_scale_or_off_scale() {
        assert_eq!(Channel::Eyes.shift(None, 1), None);
        let odd = Expression::new("Purple");
        assert_eq!(Channel::Blush.shift(Some(&odd), 1), None);
    }
}
