// A character record: identity, hit points, raw stat values, proficiencies,
// and the modifier maps derived from them.
//
// Every mutation goes through a setter that recomputes exactly the derived
// maps depending on what changed:
//
//   set_stat_value        → stat, skill, save modifiers
//   set_skill_proficiency → skill modifiers
//   set_save_proficiency  → save modifiers
//   set_level             → prof level, skill, save modifiers
//
// Hit point setters touch nothing else and are never clamped; a character
// can sit below zero or above max until someone fixes it by hand.
//
// Serialization is field-based camelCase JSON and includes the derived maps,
// so a stored sheet is readable on its own. Deserialization goes through
// `CharacterDocument`, which only reads raw values and then rebuilds every
// derived map, so a stale or hand-edited modifier in the input can never
// survive a load.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SheetError;
use crate::stats::{
    DEFAULT_STAT_VALUE, Skill, Stat, modifier_from_value, prof_level, proficiency_bonus,
};

const DEFAULT_CLASS: &str = "warrior";
const DEFAULT_LEVEL: i32 = 1;
const DEFAULT_MAX_HP: i32 = 6;

/// One character sheet within a campaign.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "CharacterDocument")]
pub struct CharacterRecord {
    name: String,
    player: String,
    character_class: String,
    level: i32,
    prof_level: i32,
    max_hp: i32,
    current_hp: i32,
    stat_values: BTreeMap<Stat, i32>,
    stat_modifiers: BTreeMap<Stat, i32>,
    skill_proficiencies: BTreeMap<Skill, i32>,
    skill_modifiers: BTreeMap<Skill, i32>,
    save_proficiencies: BTreeMap<Stat, i32>,
    save_modifiers: BTreeMap<Stat, i32>,
}

/// The raw, non-derived part of a stored record. Missing table entries fall
/// back to their defaults; derived maps in the input are ignored.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CharacterDocument {
    name: String,
    player: String,
    character_class: String,
    level: i32,
    max_hp: i32,
    current_hp: i32,
    #[serde(default)]
    stat_values: BTreeMap<Stat, i32>,
    #[serde(default)]
    skill_proficiencies: BTreeMap<Skill, i32>,
    #[serde(default)]
    save_proficiencies: BTreeMap<Stat, i32>,
}

impl From<CharacterDocument> for CharacterRecord {
    fn from(doc: CharacterDocument) -> Self {
        let mut record = Self {
            name: doc.name,
            player: doc.player,
            character_class: doc.character_class,
            level: doc.level,
            prof_level: prof_level(doc.level),
            max_hp: doc.max_hp,
            current_hp: doc.current_hp,
            stat_values: doc.stat_values,
            stat_modifiers: BTreeMap::new(),
            skill_proficiencies: doc.skill_proficiencies,
            skill_modifiers: BTreeMap::new(),
            save_proficiencies: doc.save_proficiencies,
            save_modifiers: BTreeMap::new(),
        };
        record.fill_missing_entries();
        record.recompute_all();
        record
    }
}

impl CharacterRecord {
    /// A fresh level 1 character with every stat at 10 and no proficiencies.
    pub fn new(name: impl Into<String>, player: impl Into<String>) -> Self {
        let mut record = Self {
            name: name.into(),
            player: player.into(),
            character_class: DEFAULT_CLASS.into(),
            level: DEFAULT_LEVEL,
            prof_level: prof_level(DEFAULT_LEVEL),
            max_hp: DEFAULT_MAX_HP,
            current_hp: DEFAULT_MAX_HP,
            stat_values: BTreeMap::new(),
            stat_modifiers: BTreeMap::new(),
            skill_proficiencies: BTreeMap::new(),
            skill_modifiers: BTreeMap::new(),
            save_proficiencies: BTreeMap::new(),
            save_modifiers: BTreeMap::new(),
        };
        record.fill_missing_entries();
        record.recompute_all();
        record
    }

    /// Parse a record from JSON, rebuilding all derived values.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Serialize the record, derived maps included.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    // -- Accessors ----------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn player(&self) -> &str {
        &self.player
    }

    pub fn character_class(&self) -> &str {
        &self.character_class
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn prof_level(&self) -> i32 {
        self.prof_level
    }

    pub fn max_hp(&self) -> i32 {
        self.max_hp
    }

    pub fn current_hp(&self) -> i32 {
        self.current_hp
    }

    pub fn stat_value(&self, stat: Stat) -> i32 {
        self.stat_values
            .get(&stat)
            .copied()
            .unwrap_or(DEFAULT_STAT_VALUE)
    }

    pub fn stat_modifier(&self, stat: Stat) -> i32 {
        self.stat_modifiers.get(&stat).copied().unwrap_or_default()
    }

    pub fn skill_proficiency(&self, skill: Skill) -> i32 {
        self.skill_proficiencies
            .get(&skill)
            .copied()
            .unwrap_or_default()
    }

    pub fn skill_modifier(&self, skill: Skill) -> i32 {
        self.skill_modifiers.get(&skill).copied().unwrap_or_default()
    }

    pub fn save_proficiency(&self, stat: Stat) -> i32 {
        self.save_proficiencies
            .get(&stat)
            .copied()
            .unwrap_or_default()
    }

    pub fn save_modifier(&self, stat: Stat) -> i32 {
        self.save_modifiers.get(&stat).copied().unwrap_or_default()
    }

    // -- Setters ------------------------------------------------------------

    /// Set a raw stat value by name. Every modifier depends on stats, so all
    /// three derived maps are rebuilt.
    pub fn set_stat_value(&mut self, stat_name: &str, value: i32) -> Result<(), SheetError> {
        let stat: Stat = stat_name.parse()?;
        self.stat_values.insert(stat, value);
        self.update_stat_modifiers();
        self.update_skill_modifiers();
        self.update_save_modifiers();
        Ok(())
    }

    /// Set a skill proficiency by name. The level is stored as given; only 1
    /// and 2 add a bonus.
    pub fn set_skill_proficiency(&mut self, skill_name: &str, level: i32) -> Result<(), SheetError> {
        let skill: Skill = skill_name.parse()?;
        self.skill_proficiencies.insert(skill, level);
        self.update_skill_modifiers();
        Ok(())
    }

    /// Set a saving throw proficiency by stat name.
    pub fn set_save_proficiency(&mut self, stat_name: &str, level: i32) -> Result<(), SheetError> {
        let stat: Stat = stat_name.parse()?;
        self.save_proficiencies.insert(stat, level);
        self.update_save_modifiers();
        Ok(())
    }

    /// Set the character level. Stat modifiers don't depend on level and are
    /// left alone.
    pub fn set_level(&mut self, level: i32) {
        self.level = level;
        self.prof_level = prof_level(level);
        self.update_skill_modifiers();
        self.update_save_modifiers();
    }

    pub fn set_max_hp(&mut self, max_hp: i32) {
        self.max_hp = max_hp;
    }

    pub fn set_current_hp(&mut self, current_hp: i32) {
        self.current_hp = current_hp;
    }

    pub fn apply_damage(&mut self, amount: i32) {
        self.current_hp = self.current_hp.saturating_sub(amount);
    }

    pub fn apply_heal(&mut self, amount: i32) {
        self.current_hp = self.current_hp.saturating_add(amount);
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_player(&mut self, player: impl Into<String>) {
        self.player = player.into();
    }

    pub fn set_character_class(&mut self, character_class: impl Into<String>) {
        self.character_class = character_class.into();
    }

    /// Human-readable sheet. Equivalent to `to_string()`.
    pub fn render_sheet(&self) -> String {
        self.to_string()
    }

    // -- Derived values -----------------------------------------------------

    fn fill_missing_entries(&mut self) {
        for stat in Stat::ALL {
            self.stat_values.entry(stat).or_insert(DEFAULT_STAT_VALUE);
            self.save_proficiencies.entry(stat).or_insert(0);
        }
        for skill in Skill::ALL {
            self.skill_proficiencies.entry(skill).or_insert(0);
        }
    }

    fn recompute_all(&mut self) {
        self.prof_level = prof_level(self.level);
        self.update_stat_modifiers();
        self.update_skill_modifiers();
        self.update_save_modifiers();
    }

    fn update_stat_modifiers(&mut self) {
        for stat in Stat::ALL {
            let modifier = modifier_from_value(self.stat_value(stat));
            self.stat_modifiers.insert(stat, modifier);
        }
    }

    fn update_skill_modifiers(&mut self) {
        for skill in Skill::ALL {
            let base = self.stat_modifier(skill.governing_stat());
            let bonus = proficiency_bonus(self.skill_proficiency(skill), self.prof_level);
            self.skill_modifiers.insert(skill, base.saturating_add(bonus));
        }
    }

    fn update_save_modifiers(&mut self) {
        for stat in Stat::ALL {
            let base = self.stat_modifier(stat);
            let bonus = proficiency_bonus(self.save_proficiency(stat), self.prof_level);
            self.save_modifiers.insert(stat, base.saturating_add(bonus));
        }
    }
}

impl fmt::Display for CharacterRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "LEVEL: {}", self.level)?;
        writeln!(f, "CLASS: {}", self.character_class)?;
        writeln!(f, "HP: {}/{}", self.current_hp, self.max_hp)?;
        writeln!(f, "---STATS---")?;
        for stat in Stat::ALL {
            writeln!(
                f,
                "{stat} {}:{:+}",
                self.stat_value(stat),
                self.stat_modifier(stat)
            )?;
        }
        writeln!(f, "---SAVES---")?;
        for stat in Stat::ALL {
            writeln!(
                f,
                "{stat} {}:{:+}",
                self.save_proficiency(stat),
                self.save_modifier(stat)
            )?;
        }
        writeln!(f, "---SKILLS---")?;
        for skill in Skill::ALL {
            writeln!(
                f,
                "{skill} {}:{:+}",
                self.skill_proficiency(skill),
                self.skill_modifier(skill)
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_has_defaults() {
        let record = CharacterRecord::new("Aria", "alice");
        assert_eq!(record.name(), "Aria");
        assert_eq!(record.player(), "alice");
        assert_eq!(record.character_class(), "warrior");
        assert_eq!(record.level(), 1);
        assert_eq!(record.prof_level(), 2);
        assert_eq!(record.max_hp(), 6);
        assert_eq!(record.current_hp(), 6);
        for stat in Stat::ALL {
            assert_eq!(record.stat_value(stat), 10);
            assert_eq!(record.stat_modifier(stat), 0);
            assert_eq!(record.save_modifier(stat), 0);
        }
        for skill in Skill::ALL {
            assert_eq!(record.skill_modifier(skill), 0);
        }
    }

    #[test]
    fn stat_change_flows_into_skills_and_saves() {
        let mut record = CharacterRecord::new("Aria", "alice");
        record.set_save_proficiency("dexterity", 1).unwrap();
        record.set_skill_proficiency("stealth", 2).unwrap();

        record.set_stat_value("dexterity", 15).unwrap();

        assert_eq!(record.stat_modifier(Stat::Dexterity), 3);
        assert_eq!(record.skill_modifier(Skill::Acrobatics), 3);
        assert_eq!(record.skill_modifier(Skill::SleightOfHand), 3);
        assert_eq!(record.skill_modifier(Skill::Stealth), 3 + 4);
        assert_eq!(record.save_modifier(Stat::Dexterity), 3 + 2);
        // Unrelated stats are untouched.
        assert_eq!(record.skill_modifier(Skill::Athletics), 0);
    }

    #[test]
    fn level_change_rescales_proficiency_bonuses() {
        let mut record = CharacterRecord::new("Aria", "alice");
        record.set_stat_value("wisdom", 12).unwrap();
        record.set_skill_proficiency("perception", 2).unwrap();
        record.set_save_proficiency("wisdom", 1).unwrap();
        assert_eq!(record.skill_modifier(Skill::Perception), 1 + 4);

        record.set_level(5);

        assert_eq!(record.prof_level(), 3);
        assert_eq!(record.skill_modifier(Skill::Perception), 7);
        assert_eq!(record.save_modifier(Stat::Wisdom), 1 + 3);
        assert_eq!(record.stat_modifier(Stat::Wisdom), 1);
    }

    #[test]
    fn unknown_names_leave_record_unchanged() {
        let mut record = CharacterRecord::new("Aria", "alice");
        let before = record.clone();

        assert_eq!(
            record.set_stat_value("luck", 18),
            Err(SheetError::UnknownStat("luck".into()))
        );
        assert_eq!(
            record.set_skill_proficiency("juggling", 2),
            Err(SheetError::UnknownSkill("juggling".into()))
        );
        assert_eq!(
            record.set_save_proficiency("athletics", 1),
            Err(SheetError::UnknownStat("athletics".into()))
        );
        assert_eq!(record, before);
    }

    #[test]
    fn hit_points_are_not_clamped() {
        let mut record = CharacterRecord::new("Aria", "alice");
        record.apply_damage(10);
        assert_eq!(record.current_hp(), -4);
        record.apply_heal(20);
        assert_eq!(record.current_hp(), 16);
        assert_eq!(record.max_hp(), 6);
        record.set_max_hp(30);
        record.set_current_hp(25);
        assert_eq!((record.current_hp(), record.max_hp()), (25, 30));
    }

    #[test]
    fn sheet_rendering_layout() {
        let mut record = CharacterRecord::new("Aria", "alice");
        record.set_stat_value("strength", 8).unwrap();
        record.set_skill_proficiency("athletics", 1).unwrap();

        let sheet = record.render_sheet();
        let lines: Vec<&str> = sheet.lines().collect();

        assert_eq!(lines[0], "Aria");
        assert_eq!(lines[1], "LEVEL: 1");
        assert_eq!(lines[2], "CLASS: warrior");
        assert_eq!(lines[3], "HP: 6/6");
        assert_eq!(lines[4], "---STATS---");
        assert_eq!(lines[5], "strength 8:-1");
        assert_eq!(lines[6], "dexterity 10:+0");
        assert_eq!(lines[11], "---SAVES---");
        assert_eq!(lines[12], "strength 0:-1");
        assert_eq!(lines[18], "---SKILLS---");
        assert_eq!(lines[19], "athletics 1:+1");
        assert_eq!(lines[21], "sleight of hand 0:+0");
        assert_eq!(lines.len(), 19 + 18);
    }

    #[test]
    fn rendering_is_deterministic() {
        let mut record = CharacterRecord::new("Aria", "alice");
        record.set_stat_value("charisma", 17).unwrap();
        assert_eq!(record.render_sheet(), record.render_sheet());
        assert_eq!(record.render_sheet(), record.clone().render_sheet());
    }

    #[test]
    fn json_roundtrip_preserves_values() {
        let mut record = CharacterRecord::new("Big Bob", "bob");
        record.set_stat_value("constitution", 16).unwrap();
        record.set_skill_proficiency("animal handling", 2).unwrap();
        record.set_level(9);
        record.apply_damage(3);

        let json = record.to_json().unwrap();
        let loaded = CharacterRecord::from_json(&json).unwrap();
        assert_eq!(loaded, record);
    }

    #[test]
    fn json_uses_camel_case_and_stores_derived_maps() {
        let record = CharacterRecord::new("Aria", "alice");
        let value: serde_json::Value = serde_json::from_str(&record.to_json().unwrap()).unwrap();
        assert_eq!(value["characterClass"], "warrior");
        assert_eq!(value["profLevel"], 2);
        assert_eq!(value["statValues"]["strength"], 10);
        assert_eq!(value["skillModifiers"]["sleight of hand"], 0);
        assert_eq!(value["saveProficiencies"]["charisma"], 0);
    }

    #[test]
    fn load_recomputes_stale_derived_values() {
        let json = r#"{
            "name": "Aria",
            "player": "alice",
            "characterClass": "rogue",
            "level": 5,
            "profLevel": 99,
            "maxHp": 20,
            "currentHp": 12,
            "statValues": {"dexterity": 18},
            "statModifiers": {"dexterity": -40},
            "skillProficiencies": {"stealth": 2},
            "skillModifiers": {"stealth": 0}
        }"#;
        let record = CharacterRecord::from_json(json).unwrap();

        assert_eq!(record.prof_level(), 3);
        assert_eq!(record.stat_modifier(Stat::Dexterity), 4);
        assert_eq!(record.skill_modifier(Skill::Stealth), 4 + 6);
        // Entries missing from the document take their defaults.
        assert_eq!(record.stat_value(Stat::Strength), 10);
        assert_eq!(record.skill_proficiency(Skill::Arcana), 0);
        assert_eq!(record.save_modifier(Stat::Dexterity), 4);
    }

    #[test]
    fn load_rejects_unknown_table_keys() {
        let json = r#"{
            "name": "Aria", "player": "alice", "characterClass": "rogue",
            "level": 1, "maxHp": 6, "currentHp": 6,
            "statValues": {"luck": 18}
        }"#;
        assert!(CharacterRecord::from_json(json).is_err());
    }
}
