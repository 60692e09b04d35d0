//! Pose taxonomy
//!
//! Poses are grouped into a small fixed set of body-region categories.
//! Within a category only one pose can be active; across categories the
//! static conflict table below decides which categories exclude each other.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Body-region grouping resolved independently each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseCategory {
    BodyUpper,
    BodyLower,
    BodyFull,
}

impl PoseCategory {
    pub const ALL: [PoseCategory; 3] = [
        PoseCategory::BodyUpper,
        PoseCategory::BodyLower,
        PoseCategory::BodyFull,
    ];

    /// Categories that cannot hold a pose at the same time as this one.
    pub fn conflicts(self) -> &'static [PoseCategory] {
        match self {
            PoseCategory::BodyUpper => &[PoseCategory::BodyFull],
            PoseCategory::BodyLower => &[PoseCategory::BodyFull],
            PoseCategory::BodyFull => &[PoseCategory::BodyUpper, PoseCategory::BodyLower],
        }
    }

    pub fn conflicts_with(self, other: PoseCategory) -> bool {
        self.conflicts().contains(&other)
    }

    /// Poses that return this category to its neutral look.
    pub fn neutral(self) -> &'static [Pose] {
        match self {
            PoseCategory::BodyUpper => &[Pose::BaseUpper],
            PoseCategory::BodyLower => &[Pose::BaseLower],
            PoseCategory::BodyFull => &[Pose::BaseUpper, Pose::BaseLower],
        }
    }
}

impl fmt::Display for PoseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PoseCategory::BodyUpper => "BodyUpper",
            PoseCategory::BodyLower => "BodyLower",
            PoseCategory::BodyFull => "BodyFull",
        };
        f.write_str(name)
    }
}

/// A named pose. Every pose belongs to exactly one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Pose {
    BaseUpper,
    Yoked,
    OverTheHead,
    BackBoxTie,
    BackElbowTouch,
    BackCuffs,
    BaseLower,
    Kneel,
    KneelingSpread,
    LegsClosed,
    LegsOpen,
    Spread,
    Hogtied,
    AllFours,
}

impl Pose {
    pub const ALL: [Pose; 14] = [
        Pose::BaseUpper,
        Pose::Yoked,
        Pose::OverTheHead,
        Pose::BackBoxTie,
        Pose::BackElbowTouch,
        Pose::BackCuffs,
        Pose::BaseLower,
        Pose::Kneel,
        Pose::KneelingSpread,
        Pose::LegsClosed,
        Pose::LegsOpen,
        Pose::Spread,
        Pose::Hogtied,
        Pose::AllFours,
    ];

    pub fn category(self) -> PoseCategory {
        match self {
            Pose::BaseUpper
            | Pose::Yoked
            | Pose::OverTheHead
            | Pose::BackBoxTie
            | Pose::BackElbowTouch
            | Pose::BackCuffs => PoseCategory::BodyUpper,
            Pose::BaseLower
            | Pose::Kneel
            | Pose::KneelingSpread
            | Pose::LegsClosed
            | Pose::LegsOpen
            | Pose::Spread => PoseCategory::BodyLower,
            Pose::Hogtied | Pose::AllFours => PoseCategory::BodyFull,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Pose::BaseUpper => "BaseUpper",
            Pose::Yoked => "Yoked",
            Pose::OverTheHead => "OverTheHead",
            Pose::BackBoxTie => "BackBoxTie",
            Pose::BackElbowTouch => "BackElbowTouch",
            Pose::BackCuffs => "BackCuffs",
            Pose::BaseLower => "BaseLower",
            Pose::Kneel => "Kneel",
            Pose::KneelingSpread => "KneelingSpread",
            Pose::LegsClosed => "LegsClosed",
            Pose::LegsOpen => "LegsOpen",
            Pose::Spread => "Spread",
            Pose::Hogtied => "Hogtied",
            Pose::AllFours => "AllFours",
        }
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown pose: {0}")]
pub struct UnknownPose(pub String);

impl FromStr for Pose {
    type Err = UnknownPose;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pose::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownPose(s.to_string()))
    }
}

/// The active pose per category. At most one pose per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoseSet(BTreeMap<PoseCategory, Pose>);

impl PoseSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The neutral stance: base upper body and base lower body.
    pub fn neutral() -> Self {
        [Pose::BaseUpper, Pose::BaseLower].into_iter().collect()
    }

    /// Insert a pose, replacing whatever held its category.
    pub fn insert(&mut self, pose: Pose) -> Option<Pose> {
        self.0.insert(pose.category(), pose)
    }

    /// Insert a pose and evict every category that conflicts with it.
    pub fn assert_pose(&mut self, pose: Pose) {
        for conflict in pose.category().conflicts() {
            self.0.remove(conflict);
        }
        self.insert(pose);
    }

    pub fn get(&self, category: PoseCategory) -> Option<Pose> {
        self.0.get(&category).copied()
    }

    pub fn remove(&mut self, category: PoseCategory) -> Option<Pose> {
        self.0.remove(&category)
    }

    pub fn contains_category(&self, category: PoseCategory) -> bool {
        self.0.contains_key(&category)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Pose> + '_ {
        self.0.values().copied()
    }

    pub fn categories(&self) -> impl Iterator<Item = PoseCategory> + '_ {
        self.0.keys().copied()
    }

    /// True if no two held categories conflict with each other.
    pub fn is_consistent(&self) -> bool {
        self.0
            .keys()
            .all(|a| self.0.keys().all(|b| !a.conflicts_with(*b)))
    }
}

impl FromIterator<Pose> for PoseSet {
    fn from_iter<I: IntoIterator<Item = Pose>>(iter: I) -> Self {
        let mut set = PoseSet::new();
        for pose in iter {
            set.insert(pose);
        }
        set
    }
}

impl fmt::Display for PoseSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Pose::name).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_table_is_symmetric() {
        for a in PoseCategory::ALL {
            for b in PoseCategory::ALL {
                assert_eq!(a.conflicts_with(b), b.conflicts_with(a), "{a} vs {b}");
            }
            assert!(!a.conflicts_with(a));
        }
    }

    #[test]
    fn test_assert_pose_evicts_conflicts() {
        let mut set = PoseSet::neutral();
        set.assert_pose(Pose::Hogtied);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(PoseCategory::BodyFull), Some(Pose::Hogtied));

        set.assert_pose(Pose::Kneel);
        assert_eq!(set.get(PoseCategory::BodyFull), None);
        assert_eq!(set.get(PoseCategory::BodyLower), Some(Pose::Kneel));
        assert!(set.is_consistent());
    }

    #[test]
    fn test_neutral_set_is_consistent() {
        let neutral = PoseSet::neutral();
        assert!(neutral.is_consistent());
        assert_eq!(neutral.get(PoseCategory::BodyUpper), Some(Pose::BaseUpper));
        assert_eq!(neutral.get(PoseCategory::BodyLower), Some(Pose::BaseLower));
    }

    #[test]
    fn test_parse_pose() {
        assert_eq!("kneel".parse::<Pose>().unwrap(), Pose::Kneel);
        assert_eq!("AllFours".parse::<Pose>().unwrap().category(), PoseCategory::BodyFull);
        assert!("Cartwheel".parse::<Pose>().is_err());
    }
}
