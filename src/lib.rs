pub mod board;
pub mod config;
pub mod engine;
pub mod error;
pub mod game;

pub use board::{AppliedMove, BoardModel, GameStatus, IllegalMoveError, Orientation, PositionSnapshot};
pub use config::{ComputerOptions, GameOptions, Variant};
pub use error::{Error, Result};
pub use game::{ComputerMove, GameEvent, GameManager, GameSession};
