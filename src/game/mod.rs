//! Running games: board plus optional engine, and the coordination between
//! a thinking engine and a board that keeps changing.

pub mod coordinator;
pub mod manager;
pub mod session;

pub use coordinator::{
    BestMoveProvider, ComputerMove, CoordinatorState, MoveCoordinator, NoMoveReason, SnapshotMarker,
    StaleReason,
};
pub use manager::GameManager;
pub use session::{GameEvent, GameEvents, GameSession};
