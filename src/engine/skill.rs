//! Difficulty levels and their translation into engine options.
//!
//! Levels 1 through 8 follow the Lichess scale and are mapped onto the
//! Stockfish `Skill Level` option. A rating limit can be requested on top,
//! which switches the engine to `UCI_LimitStrength` mode.

use std::fmt;

use super::types::EngineOption;

/// Native `Skill Level` values for levels 1..=8.
pub const SKILL_LEVEL_TABLE: [i32; 8] = [-9, -5, -1, 3, 7, 11, 16, 20];

/// Rating sent when strength limiting is on but no rating was chosen.
pub const DEFAULT_UCI_ELO: u32 = 1350;

/// Native skill value sent when no level was chosen.
pub const DEFAULT_NATIVE_SKILL: i32 = 0;

pub const MIN_LEVEL: u8 = 1;
pub const MAX_LEVEL: u8 = SKILL_LEVEL_TABLE.len() as u8;

/// A difficulty level in `1..=8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SkillLevel(u8);

impl SkillLevel {
    pub fn new(level: u8) -> Option<Self> {
        (MIN_LEVEL..=MAX_LEVEL).contains(&level).then_some(Self(level))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn native(self) -> i32 {
        SKILL_LEVEL_TABLE[usize::from(self.0 - MIN_LEVEL)]
    }

    pub fn all() -> impl Iterator<Item = SkillLevel> {
        (MIN_LEVEL..=MAX_LEVEL).map(SkillLevel)
    }
}

impl fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "level {}", self.0)
    }
}

/// Strength settings for one game, fixed at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SkillConfig {
    pub level: Option<SkillLevel>,
    pub limit_strength: bool,
    pub elo: Option<u32>,
}

impl SkillConfig {
    pub fn with_level(level: SkillLevel) -> Self {
        Self {
            level: Some(level),
            ..Self::default()
        }
    }

    pub fn with_elo(elo: u32) -> Self {
        Self {
            level: None,
            limit_strength: true,
            elo: Some(elo),
        }
    }

    pub fn native_skill(&self) -> i32 {
        self.level.map_or(DEFAULT_NATIVE_SKILL, SkillLevel::native)
    }

    /// UCI options in the order they are sent.
    pub fn to_engine_options(&self) -> Vec<EngineOption> {
        vec![
            EngineOption::new("Skill Level", self.native_skill()),
            EngineOption::new("UCI_LimitStrength", self.limit_strength),
            EngineOption::new("UCI_Elo", self.elo.unwrap_or(DEFAULT_UCI_ELO)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_level_maps_to_table() {
        let natives: Vec<i32> = SkillLevel::all().map(SkillLevel::native).collect();
        assert_eq!(natives, SKILL_LEVEL_TABLE.to_vec());
        let unique: HashSet<i32> = natives.iter().copied().collect();
        assert_eq!(unique.len(), 8);

        assert_eq!(SkillLevel::new(1).unwrap().native(), -9);
        assert_eq!(SkillLevel::new(8).unwrap().native(), 20);
    }

    #[test]
    fn out_of_range_levels_rejected() {
        assert!(SkillLevel::new(0).is_none());
        assert!(SkillLevel::new(9).is_none());
    }

    #[test]
    fn options_for_level() {
        let config = SkillConfig::with_level(SkillLevel::new(4).unwrap());
        let options = config.to_engine_options();
        assert_eq!(options[0], EngineOption::new("Skill Level", 3));
        assert_eq!(options[1], EngineOption::new("UCI_LimitStrength", false));
        assert_eq!(options[2], EngineOption::new("UCI_Elo", 1350));
    }

    #[test]
    fn options_for_rating_limit() {
        let options = SkillConfig::with_elo(1800).to_engine_options();
        assert_eq!(options[0].value, "0");
        assert_eq!(options[1].value, "true");
        assert_eq!(options[2].value, "1800");
    }
}
