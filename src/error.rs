use crate::board::{GameStatus, IllegalMoveError, UnknownVariant};
use crate::engine::{EngineError, EngineLaunchError};

/// Crate-wide error, aggregating the board, engine and configuration layers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    IllegalMove(#[from] IllegalMoveError),

    #[error(transparent)]
    EngineLaunch(#[from] EngineLaunchError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Variant(#[from] UnknownVariant),

    #[error("FEN parsing error: {0}")]
    Fen(#[from] shakmaty::fen::ParseFenError),

    #[error("Position setup error: {0}")]
    Position(#[from] shakmaty::PositionError<shakmaty::variant::VariantPosition>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No active game with id '{0}'")]
    GameNotFound(String),

    #[error("No computer opponent in this game")]
    NoComputerOpponent,

    #[error("It is not the computer's turn")]
    NotComputerTurn,

    #[error("The game is over: {0:?}")]
    GameOver(GameStatus),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
