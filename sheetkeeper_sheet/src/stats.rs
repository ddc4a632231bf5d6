// Stat engine: the reference tables and the modifier arithmetic.
//
// Reference data is three fixed tables: the six stats, the eighteen skills,
// and the skill → governing stat mapping. They are expressed as enums with
// `const` `ALL` arrays, so the ordering used for rendering is the declaration
// order and there is no runtime initialization step to race on.
//
// The arithmetic follows the tabletop rules the sheets are written for:
//
//   stat modifier     = ceil(raw / 2) - 5
//   proficiency level = ceil(level / 4) + 1
//   skill/save bonus  = 0, prof_level, or 2 * prof_level for proficiency
//                       0, 1, 2 respectively
//
// Both ceilings are true ceilings of the real quotient, including for
// negative inputs (ceil(-1.5) = -1). `ceil_div` computes them exactly in
// integer arithmetic; there is no floating point anywhere in this module.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SheetError;

/// Raw value every stat starts at.
pub const DEFAULT_STAT_VALUE: i32 = 10;

/// The six character stats, in sheet order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stat {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Stat {
    pub const ALL: [Stat; 6] = [
        Stat::Strength,
        Stat::Dexterity,
        Stat::Constitution,
        Stat::Intelligence,
        Stat::Wisdom,
        Stat::Charisma,
    ];

    /// Lowercase name as it appears on the sheet and on the wire.
    pub fn name(self) -> &'static str {
        match self {
            Stat::Strength => "strength",
            Stat::Dexterity => "dexterity",
            Stat::Constitution => "constitution",
            Stat::Intelligence => "intelligence",
            Stat::Wisdom => "wisdom",
            Stat::Charisma => "charisma",
        }
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stat {
    type Err = SheetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stat::ALL
            .into_iter()
            .find(|stat| stat.name() == s)
            .ok_or_else(|| SheetError::UnknownStat(s.to_owned()))
    }
}

/// The eighteen skills, in sheet order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Skill {
    Athletics,
    Acrobatics,
    #[serde(rename = "sleight of hand")]
    SleightOfHand,
    Stealth,
    Arcana,
    History,
    Investigation,
    Nature,
    Religion,
    #[serde(rename = "animal handling")]
    AnimalHandling,
    Insight,
    Medicine,
    Perception,
    Survival,
    Deception,
    Intimidation,
    Performance,
    Persuasion,
}

impl Skill {
    pub const ALL: [Skill; 18] = [
        Skill::Athletics,
        Skill::Acrobatics,
        Skill::SleightOfHand,
        Skill::Stealth,
        Skill::Arcana,
        Skill::History,
        Skill::Investigation,
        Skill::Nature,
        Skill::Religion,
        Skill::AnimalHandling,
        Skill::Insight,
        Skill::Medicine,
        Skill::Perception,
        Skill::Survival,
        Skill::Deception,
        Skill::Intimidation,
        Skill::Performance,
        Skill::Persuasion,
    ];

    /// Lowercase name as it appears on the sheet and on the wire.
    pub fn name(self) -> &'static str {
        match self {
            Skill::Athletics => "athletics",
            Skill::Acrobatics => "acrobatics",
            Skill::SleightOfHand => "sleight of hand",
            Skill::Stealth => "stealth",
            Skill::Arcana => "arcana",
            Skill::History => "history",
            Skill::Investigation => "investigation",
            Skill::Nature => "nature",
            Skill::Religion => "religion",
            Skill::AnimalHandling => "animal handling",
            Skill::Insight => "insight",
            Skill::Medicine => "medicine",
            Skill::Perception => "perception",
            Skill::Survival => "survival",
            Skill::Deception => "deception",
            Skill::Intimidation => "intimidation",
            Skill::Performance => "performance",
            Skill::Persuasion => "persuasion",
        }
    }

    /// The stat whose modifier a skill check starts from.
    pub fn governing_stat(self) -> Stat {
        match self {
            Skill::Athletics => Stat::Strength,
            Skill::Acrobatics | Skill::SleightOfHand | Skill::Stealth => Stat::Dexterity,
            Skill::Arcana | Skill::History | Skill::Investigation => Stat::Intelligence,
            Skill::Nature
            | Skill::Religion
            | Skill::AnimalHandling
            | Skill::Insight
            | Skill::Medicine
            | Skill::Perception
            | Skill::Survival => Stat::Wisdom,
            Skill::Deception | Skill::Intimidation | Skill::Performance | Skill::Persuasion => {
                Stat::Charisma
            }
        }
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Skill {
    type Err = SheetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Skill::ALL
            .into_iter()
            .find(|skill| skill.name() == s)
            .ok_or_else(|| SheetError::UnknownSkill(s.to_owned()))
    }
}

/// `ceil(numerator / denominator)` for a positive denominator, exact for
/// negative numerators. Integer division truncates toward zero, which is
/// already the ceiling whenever the remainder is not positive.
fn ceil_div(numerator: i32, denominator: i32) -> i32 {
    debug_assert!(denominator > 0);
    let quotient = numerator / denominator;
    if numerator % denominator > 0 {
        quotient + 1
    } else {
        quotient
    }
}

/// Stat modifier for a raw stat value: `ceil(raw / 2) - 5`.
pub fn modifier_from_value(raw: i32) -> i32 {
    ceil_div(raw, 2) - 5
}

/// Proficiency level for a character level: `ceil(level / 4) + 1`.
pub fn prof_level(level: i32) -> i32 {
    ceil_div(level, 4) + 1
}

/// Bonus added to a skill or save modifier. Proficiency values other than 1
/// and 2 contribute nothing.
pub fn proficiency_bonus(proficiency: i32, prof_level: i32) -> i32 {
    match proficiency {
        1 => prof_level,
        2 => prof_level.saturating_mul(2),
        _ => 0,
    }
}
