//! Value types exposed by the board model.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use shakmaty::{CastlingMode, Color, Move, Role, Square};

/// Which side's back rank is drawn at the bottom of the display.
///
/// Orientation only changes presentation-facing views (square order and
/// labels); it never influences game semantics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Orientation {
    #[default]
    #[serde(alias = "white")]
    WhiteBottom,
    #[serde(alias = "black")]
    BlackBottom,
}

impl Orientation {
    /// The color whose pieces start at the bottom edge.
    pub fn bottom_color(self) -> Color {
        match self {
            Orientation::WhiteBottom => Color::White,
            Orientation::BlackBottom => Color::Black,
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            Orientation::WhiteBottom => Orientation::BlackBottom,
            Orientation::BlackBottom => Orientation::WhiteBottom,
        }
    }
}

impl From<Color> for Orientation {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Orientation::WhiteBottom,
            Color::Black => Orientation::BlackBottom,
        }
    }
}

/// Rules a game is played under.
///
/// Chess960 is standard chess with Chess960 castling; every other entry is a
/// separate rule set that engines select through `UCI_Variant`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Variant {
    #[default]
    Standard,
    Chess960,
    Atomic,
    Crazyhouse,
    #[serde(alias = "kingofthehill")]
    KingOfTheHill,
    #[serde(alias = "3check")]
    ThreeCheck,
    Antichess,
    Horde,
    #[serde(alias = "racingkings")]
    RacingKings,
}

impl Variant {
    pub const ALL: [Variant; 9] = [
        Variant::Standard,
        Variant::Chess960,
        Variant::Atomic,
        Variant::Crazyhouse,
        Variant::KingOfTheHill,
        Variant::ThreeCheck,
        Variant::Antichess,
        Variant::Horde,
        Variant::RacingKings,
    ];

    pub fn rules(self) -> shakmaty::variant::Variant {
        use shakmaty::variant::Variant as Rules;
        match self {
            Variant::Standard | Variant::Chess960 => Rules::Chess,
            Variant::Atomic => Rules::Atomic,
            Variant::Crazyhouse => Rules::Crazyhouse,
            Variant::KingOfTheHill => Rules::KingOfTheHill,
            Variant::ThreeCheck => Rules::ThreeCheck,
            Variant::Antichess => Rules::Antichess,
            Variant::Horde => Rules::Horde,
            Variant::RacingKings => Rules::RacingKings,
        }
    }

    pub fn castling_mode(self) -> CastlingMode {
        match self {
            Variant::Chess960 => CastlingMode::Chess960,
            _ => CastlingMode::Standard,
        }
    }

    /// Value for the engine's `UCI_Variant` option; `None` for plain chess.
    pub fn uci_name(self) -> Option<&'static str> {
        match self {
            Variant::Standard | Variant::Chess960 => None,
            Variant::Atomic => Some("atomic"),
            Variant::Crazyhouse => Some("crazyhouse"),
            Variant::KingOfTheHill => Some("kingofthehill"),
            Variant::ThreeCheck => Some("3check"),
            Variant::Antichess => Some("antichess"),
            Variant::Horde => Some("horde"),
            Variant::RacingKings => Some("racingkings"),
        }
    }

    /// Chess960 has no single starting position.
    pub fn needs_fen(self) -> bool {
        self == Variant::Chess960
    }

    pub fn name(self) -> &'static str {
        match self {
            Variant::Standard => "standard",
            Variant::Chess960 => "chess960",
            Variant::Atomic => "atomic",
            Variant::Crazyhouse => "crazyhouse",
            Variant::KingOfTheHill => "kingofthehill",
            Variant::ThreeCheck => "threecheck",
            Variant::Antichess => "antichess",
            Variant::Horde => "horde",
            Variant::RacingKings => "racingkings",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variant {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        if key == "3check" {
            return Ok(Variant::ThreeCheck);
        }
        Variant::ALL
            .into_iter()
            .find(|variant| variant.name() == key)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported variant '{0}'")]
pub struct UnknownVariant(pub String);

/// Termination status of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Ongoing,
    Checkmate { winner: Color },
    Stalemate,
    InsufficientMaterial,
    SeventyFiveMoves,
    FivefoldRepetition,
    /// Won by a variant rule (king of the hill, three checks, exploded king...).
    VariantWin { winner: Color },
    VariantDraw,
    Resigned { winner: Color },
    Aborted,
}

impl GameStatus {
    pub fn is_ongoing(&self) -> bool {
        matches!(self, GameStatus::Ongoing)
    }

    pub fn winner(&self) -> Option<Color> {
        match *self {
            GameStatus::Checkmate { winner }
            | GameStatus::VariantWin { winner }
            | GameStatus::Resigned { winner } => Some(winner),
            _ => None,
        }
    }
}

/// A move that was successfully played on the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    pub color: Color,
    pub role: Role,
    pub from: Option<Square>,
    pub to: Square,
    pub promotion: Option<Role>,
    pub is_capture: bool,
    pub san: String,
    pub uci: String,
    pub(crate) inner: Move,
}

impl AppliedMove {
    /// The underlying rules-engine move.
    pub fn as_move(&self) -> &Move {
        &self.inner
    }
}

/// Why a move text was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IllegalMoveReason {
    /// Neither SAN nor UCI notation could be parsed.
    Unparsable,
    /// Well-formed, but not legal in the current position.
    Illegal,
    /// The game is already over.
    GameOver,
}

impl std::fmt::Display for IllegalMoveReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IllegalMoveReason::Unparsable => f.write_str("not a recognised move"),
            IllegalMoveReason::Illegal => f.write_str("not legal in this position"),
            IllegalMoveReason::GameOver => f.write_str("the game is over"),
        }
    }
}

/// Move input rejected by the rules engine. The board is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal move '{input}': {reason}")]
pub struct IllegalMoveError {
    pub input: String,
    pub reason: IllegalMoveReason,
}

impl IllegalMoveError {
    pub(crate) fn new(input: &str, reason: IllegalMoveReason) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

/// Starting position plus UCI moves, the form the engine consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionSnapshot {
    /// `None` means the standard starting position.
    pub fen: Option<String>,
    pub moves: Vec<String>,
    pub chess960: bool,
}
