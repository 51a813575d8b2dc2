use std::path::{Path, PathBuf};

use derivative::Derivative;
use log::debug;
use serde::{Deserialize, Serialize};
use shakmaty::Color;

use crate::board::{BoardModel, Orientation};
pub use crate::board::Variant;
use crate::engine::{EngineOption, SkillConfig, SkillLevel, ThinkLimit, DEFAULT_THINK_TIME_MS};
use crate::error::{Error, Result};

/// Everything needed to set up one game.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct GameOptions {
    pub variant: Variant,
    pub fen: Option<String>,
    pub orientation: Orientation,
    pub computer: Option<ComputerOptions>,
}

/// Computer opponent settings.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Derivative)]
#[derivative(Default)]
#[serde(rename_all = "camelCase")]
pub struct ComputerOptions {
    pub engine_path: PathBuf,
    #[serde(default)]
    pub engine_args: Vec<String>,
    #[serde(default)]
    pub skill_level: Option<u8>,
    #[serde(default)]
    pub limit_strength: bool,
    #[serde(default)]
    pub elo: Option<u32>,
    #[serde(default = "default_think_time")]
    #[derivative(Default(value = "DEFAULT_THINK_TIME_MS"))]
    pub think_time_ms: u32,
}

fn default_think_time() -> u32 {
    DEFAULT_THINK_TIME_MS
}

impl GameOptions {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Reading game options from {:?}", path);
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// The computer takes the side shown at the top of the board.
    pub fn computer_color(&self) -> Option<Color> {
        self.computer
            .as_ref()
            .map(|_| !self.orientation.bottom_color())
    }

    pub fn build_board(&self) -> Result<BoardModel> {
        match &self.fen {
            Some(fen) => BoardModel::from_fen(fen, self.variant, self.orientation),
            None => BoardModel::with_variant(self.variant, self.orientation),
        }
    }

    /// Options sent on top of the skill settings.
    pub fn variant_options(&self) -> Vec<EngineOption> {
        match (self.variant, self.variant.uci_name()) {
            (Variant::Chess960, _) => vec![EngineOption::new("UCI_Chess960", true)],
            (_, Some(name)) => vec![EngineOption::new("UCI_Variant", name)],
            (_, None) => Vec::new(),
        }
    }
}

impl ComputerOptions {
    pub fn skill_config(&self) -> Result<SkillConfig> {
        let level = self
            .skill_level
            .map(|level| {
                SkillLevel::new(level)
                    .ok_or_else(|| Error::Config(format!("skill level must be 1-8, got {level}")))
            })
            .transpose()?;

        Ok(SkillConfig {
            level,
            limit_strength: self.limit_strength || self.elo.is_some(),
            elo: self.elo,
        })
    }

    pub fn think_limit(&self) -> Result<ThinkLimit> {
        if self.think_time_ms == 0 {
            return Err(Error::Config("think time must be positive".to_string()));
        }
        Ok(ThinkLimit::Time(self.think_time_ms))
    }
}
