//! Authoritative board state for one game.
//!
//! `BoardModel` wraps a shakmaty position together with the move history,
//! any result declared outside the rules (resignation, abort) and the display
//! orientation. Presentation code only ever reads squares and labels through
//! the orientation-aware queries below.

pub mod types;

use std::num::NonZeroU32;

use log::{debug, info};
use shakmaty::{
    fen::Fen, san::SanPlus, uci::UciMove, variant::VariantPosition, CastlingMode, Color,
    EnPassantMode, File, Move, Outcome, Piece, Position, Rank, Setup, Square,
};

use crate::error::{Error, Result};

pub use types::{
    AppliedMove, GameStatus, IllegalMoveError, IllegalMoveReason, Orientation, PositionSnapshot,
    UnknownVariant, Variant,
};

/// Positions reached after this many halfmoves without progress end the game.
const SEVENTY_FIVE_MOVE_HALFMOVES: u32 = 150;

/// Occurrences of one position that end the game without a claim.
const FIVEFOLD_REPETITIONS: usize = 5;

#[derive(Debug, Clone)]
struct HistoryEntry {
    applied: AppliedMove,
    before: VariantPosition,
    before_key: Setup,
}

/// The position with the move counters cleared, so equal positions compare equal.
fn repetition_key(position: &VariantPosition) -> Setup {
    let mut setup = position.clone().into_setup(EnPassantMode::Legal);
    setup.halfmoves = 0;
    setup.fullmoves = NonZeroU32::MIN;
    setup
}

/// The single writable handle to a game's position.
#[derive(Debug, Clone)]
pub struct BoardModel {
    variant: Variant,
    start_fen: Option<String>,
    position: VariantPosition,
    key: Setup,
    history: Vec<HistoryEntry>,
    declared: Option<GameStatus>,
    orientation: Orientation,
}

impl BoardModel {
    /// Standard starting position.
    pub fn new(orientation: Orientation) -> Self {
        Self::from_position(Variant::Standard, None, VariantPosition::new(Variant::Standard.rules()), orientation)
    }

    /// Starting position of `variant`.
    pub fn with_variant(variant: Variant, orientation: Orientation) -> Result<Self> {
        if variant.needs_fen() {
            return Err(Error::Config(format!("{variant} games need a starting FEN")));
        }
        Ok(Self::from_position(variant, None, VariantPosition::new(variant.rules()), orientation))
    }

    /// Start from an explicit FEN.
    pub fn from_fen(fen: &str, variant: Variant, orientation: Orientation) -> Result<Self> {
        let fen = fen.trim();
        let parsed: Fen = fen.parse()?;
        let position =
            VariantPosition::from_setup(variant.rules(), parsed.into_setup(), variant.castling_mode())?;
        debug!("{} board created from FEN: {}", variant, fen);

        Ok(Self::from_position(variant, Some(fen.to_string()), position, orientation))
    }

    fn from_position(
        variant: Variant,
        start_fen: Option<String>,
        position: VariantPosition,
        orientation: Orientation,
    ) -> Self {
        Self {
            variant,
            start_fen,
            key: repetition_key(&position),
            position,
            history: Vec::new(),
            declared: None,
            orientation,
        }
    }

    pub fn position(&self) -> &VariantPosition {
        &self.position
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn castling_mode(&self) -> CastlingMode {
        self.variant.castling_mode()
    }

    pub fn turn(&self) -> Color {
        self.position.turn()
    }

    /// FEN of the current position, with pockets or check counters where
    /// the variant has them.
    pub fn fen(&self) -> String {
        Fen::from_setup(self.position.clone().into_setup(EnPassantMode::Legal)).to_string()
    }

    pub fn piece_at(&self, square: Square) -> Option<Piece> {
        self.position.board().piece_at(square)
    }

    /// Play a move given in SAN (`Nf3`, `exd5`, `O-O`) or UCI (`g1f3`).
    ///
    /// Fails without touching the board when the text cannot be parsed,
    /// names an illegal move, or the game has already ended.
    pub fn apply_move(&mut self, text: &str) -> std::result::Result<AppliedMove, IllegalMoveError> {
        let input = text.trim();
        if !self.status().is_ongoing() {
            return Err(IllegalMoveError::new(input, IllegalMoveReason::GameOver));
        }

        let mv = self.parse_move(input)?;
        Ok(self.play(mv))
    }

    fn parse_move(&self, input: &str) -> std::result::Result<Move, IllegalMoveError> {
        let from_san = input
            .parse::<SanPlus>()
            .ok()
            .map(|san| san.san.to_move(&self.position));
        if let Some(Ok(mv)) = from_san {
            return Ok(mv);
        }

        // `e1g1` parses as SAN too, so coordinate notation is always tried.
        let from_uci = input
            .parse::<UciMove>()
            .ok()
            .map(|uci| uci.to_move(&self.position));

        match (from_san, from_uci) {
            (_, Some(Ok(mv))) => Ok(mv),
            (None, None) => Err(IllegalMoveError::new(input, IllegalMoveReason::Unparsable)),
            _ => Err(IllegalMoveError::new(input, IllegalMoveReason::Illegal)),
        }
    }

    fn play(&mut self, mv: Move) -> AppliedMove {
        let before = self.position.clone();
        let before_key = self.key.clone();
        let mut next = self.position.clone();
        let color = next.turn();
        let san = SanPlus::from_move_and_play_unchecked(&mut next, &mv);

        let applied = AppliedMove {
            color,
            role: mv.role(),
            from: mv.from(),
            to: mv.to(),
            promotion: mv.promotion(),
            is_capture: mv.is_capture(),
            san: san.to_string(),
            uci: mv.to_uci(self.castling_mode()).to_string(),
            inner: mv,
        };

        debug!("Move played: {} ({})", applied.san, applied.uci);
        self.key = repetition_key(&next);
        self.position = next;
        self.history.push(HistoryEntry {
            applied: applied.clone(),
            before,
            before_key,
        });
        applied
    }

    /// Undo the last move. Returns the move that was taken back.
    pub fn takeback(&mut self) -> Option<AppliedMove> {
        let entry = self.history.pop()?;
        self.position = entry.before;
        self.key = entry.before_key;
        info!("Took back {}", entry.applied.san);
        Some(entry.applied)
    }

    /// `color` gives up. No effect once the game is already over.
    pub fn resign(&mut self, color: Color) -> GameStatus {
        if self.status().is_ongoing() {
            info!("{:?} resigned", color);
            self.declared = Some(GameStatus::Resigned { winner: !color });
        }
        self.status()
    }

    pub fn abort(&mut self) -> GameStatus {
        if self.status().is_ongoing() {
            info!("Game aborted");
            self.declared = Some(GameStatus::Aborted);
        }
        self.status()
    }

    pub fn status(&self) -> GameStatus {
        if let Some(declared) = self.declared {
            return declared;
        }

        let pos = &self.position;
        if let Some(outcome) = pos.variant_outcome() {
            return match outcome {
                Outcome::Decisive { winner } => GameStatus::VariantWin { winner },
                Outcome::Draw => GameStatus::VariantDraw,
            };
        }

        if pos.is_checkmate() {
            GameStatus::Checkmate { winner: !pos.turn() }
        } else if pos.is_stalemate() {
            GameStatus::Stalemate
        } else if pos.is_insufficient_material() {
            GameStatus::InsufficientMaterial
        } else if pos.halfmoves() >= SEVENTY_FIVE_MOVE_HALFMOVES {
            GameStatus::SeventyFiveMoves
        } else if self.repetitions() >= FIVEFOLD_REPETITIONS {
            GameStatus::FivefoldRepetition
        } else {
            GameStatus::Ongoing
        }
    }

    /// How often the current position has occurred, counting this time.
    pub fn repetitions(&self) -> usize {
        1 + self
            .history
            .iter()
            .filter(|entry| entry.before_key == self.key)
            .count()
    }

    /// Most recent move, if any.
    pub fn last_move(&self) -> Option<&Move> {
        self.history.last().map(|entry| &entry.applied.inner)
    }

    pub fn history(&self) -> impl Iterator<Item = &AppliedMove> + '_ {
        self.history.iter().map(|entry| &entry.applied)
    }

    pub fn san_history(&self) -> Vec<String> {
        self.history().map(|m| m.san.clone()).collect()
    }

    /// Starting position and UCI moves, as sent to an engine.
    pub fn position_snapshot(&self) -> PositionSnapshot {
        PositionSnapshot {
            fen: self.start_fen.clone(),
            moves: self.history().map(|m| m.uci.clone()).collect(),
            chess960: self.castling_mode() == CastlingMode::Chess960,
        }
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn set_orientation(&mut self, orientation: Orientation) {
        self.orientation = orientation;
    }

    /// All 64 squares in display order.
    ///
    /// Ranks run top to bottom and files left to right as seen from White;
    /// with Black at the bottom the whole sequence is reversed.
    pub fn enumerate_squares(&self) -> Vec<Square> {
        let mut squares: Vec<Square> = (0..8u32)
            .rev()
            .flat_map(|rank| {
                (0..8u32).map(move |file| Square::from_coords(File::new(file), Rank::new(rank)))
            })
            .collect();

        if self.orientation == Orientation::BlackBottom {
            squares.reverse();
        }
        squares
    }

    pub fn file_labels(&self) -> Vec<char> {
        let mut labels: Vec<char> = (0..8u32).map(|file| File::new(file).char()).collect();
        if self.orientation == Orientation::BlackBottom {
            labels.reverse();
        }
        labels
    }

    /// Rank label for squares on the first visible column of a row.
    pub fn rank_label_for(&self, square: Square) -> Option<char> {
        let edge = match self.orientation {
            Orientation::WhiteBottom => File::A,
            Orientation::BlackBottom => File::H,
        };
        (square.file() == edge).then(|| square.rank().char())
    }

    /// Whether `square` holds the king of the side to move while in check.
    pub fn square_in_check(&self, square: Square) -> bool {
        let pos = &self.position;
        pos.is_check() && pos.board().king_of(pos.turn()) == Some(square)
    }
}

impl Default for BoardModel {
    fn default() -> Self {
        Self::new(Orientation::default())
    }
}
