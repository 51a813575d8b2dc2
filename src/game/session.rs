//! One game: the board, an optional computer opponent and the coordinator
//! between them.
//!
//! The board sits behind a mutex that is only held for short synchronous
//! sections. A computer think is requested under the lock, awaited without
//! it and settled under the lock again, so user input, takebacks and remote
//! moves keep working while the engine thinks.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use log::{debug, error, info, warn};
use shakmaty::Color;
use tokio::{sync::mpsc, task::JoinHandle};

use super::coordinator::{ComputerMove, CoordinatorState, MoveCoordinator, NoMoveReason};
use crate::board::{AppliedMove, BoardModel, GameStatus, IllegalMoveError, PositionSnapshot};
use crate::config::GameOptions;
use crate::engine::{EngineError, EngineSession, PendingMove, ThinkLimit};
use crate::error::{Error, Result};

/// Notifications for the presentation layer.
#[derive(Debug)]
pub enum GameEvent {
    /// A background computer turn finished, with or without a move.
    ComputerMove(ComputerMove),
    /// A background computer turn could not be started.
    ComputerError(Error),
}

pub type GameEvents = mpsc::UnboundedReceiver<GameEvent>;

#[derive(Debug)]
pub struct GameSession {
    id: String,
    board: Arc<Mutex<BoardModel>>,
    coordinator: Mutex<MoveCoordinator>,
    engine: Option<EngineSession>,
    computer_color: Option<Color>,
    engine_failed: AtomicBool,
    events: mpsc::UnboundedSender<GameEvent>,
}

impl GameSession {
    /// Build the board and, if requested, launch and configure the engine.
    pub async fn start(id: impl Into<String>, options: &GameOptions) -> Result<(Self, GameEvents)> {
        let id = id.into();
        let board = options.build_board()?;

        let Some(computer) = &options.computer else {
            info!("Starting game {} without a computer opponent", id);
            return Ok(Self::new(id, board, None, None, ThinkLimit::default()));
        };

        let skill = computer.skill_config()?;
        let limit = computer.think_limit()?;
        let engine = EngineSession::start_with_args(&computer.engine_path, computer.engine_args.clone()).await?;

        let configured = async {
            engine.configure(&skill).await?;
            let variant_options = options.variant_options();
            if !variant_options.is_empty() {
                engine.set_options(variant_options).await?;
            }
            Ok::<_, EngineError>(())
        };
        if let Err(e) = configured.await {
            error!("Failed to configure engine for game {}: {}", id, e);
            engine.quit().await;
            return Err(e.into());
        }

        info!(
            "Starting game {} against {} ({:?} level {:?})",
            id,
            engine.info().name,
            options.computer_color(),
            skill.level
        );
        Ok(Self::new(id, board, Some(engine), options.computer_color(), limit))
    }

    pub fn new(
        id: impl Into<String>,
        board: BoardModel,
        engine: Option<EngineSession>,
        computer_color: Option<Color>,
        limit: ThinkLimit,
    ) -> (Self, GameEvents) {
        let (events, receiver) = mpsc::unbounded_channel();
        let session = Self {
            id: id.into(),
            board: Arc::new(Mutex::new(board)),
            coordinator: Mutex::new(MoveCoordinator::new(limit)),
            engine,
            computer_color,
            engine_failed: AtomicBool::new(false),
            events,
        };
        (session, receiver)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Read access for rendering. Do not hold across an await.
    pub fn board(&self) -> MutexGuard<'_, BoardModel> {
        self.board.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Shared handle for a transport that feeds moves from elsewhere.
    pub fn board_handle(&self) -> Arc<Mutex<BoardModel>> {
        Arc::clone(&self.board)
    }

    pub fn engine(&self) -> Option<&EngineSession> {
        self.engine.as_ref()
    }

    pub fn computer_color(&self) -> Option<Color> {
        self.computer_color
    }

    pub fn coordinator_state(&self) -> CoordinatorState {
        self.coordinator().state().clone()
    }

    pub fn status(&self) -> GameStatus {
        self.board().status()
    }

    pub fn snapshot(&self) -> PositionSnapshot {
        self.board().position_snapshot()
    }

    pub fn is_computer_turn(&self) -> bool {
        let board = self.board();
        self.computer_color == Some(board.turn()) && board.status().is_ongoing()
    }

    pub fn submit_move(&self, text: &str) -> Result<AppliedMove, IllegalMoveError> {
        let mut board = self.board();
        if self.computer_color == Some(board.turn()) {
            debug!("User move '{}' entered on the computer's turn", text);
        }
        board.apply_move(text)
    }

    pub fn apply_remote_move(&self, text: &str) -> Result<AppliedMove, IllegalMoveError> {
        debug!("Remote move in game {}: {}", self.id, text);
        self.board().apply_move(text)
    }

    /// Undo back to the user's turn: one ply, or two when the computer has
    /// already replied.
    pub fn takeback(&self) -> Vec<AppliedMove> {
        let mut board = self.board();
        let mut undone = Vec::new();
        if let Some(mv) = board.takeback() {
            let computer_moved = Some(mv.color) == self.computer_color;
            undone.push(mv);
            if computer_moved {
                undone.extend(board.takeback());
            }
        }
        debug!("Took back {} move(s) in game {}", undone.len(), self.id);
        undone
    }

    /// The user gives up. Against the computer the user's side resigns,
    /// otherwise the side to move.
    pub fn resign(&self) -> GameStatus {
        let mut board = self.board();
        let color = self.computer_color.map_or_else(|| board.turn(), |computer| !computer);
        info!("{:?} resigns game {}", color, self.id);
        board.resign(color)
    }

    pub fn abort(&self) -> GameStatus {
        self.board().abort()
    }

    pub fn flip_board(&self) {
        let mut board = self.board();
        let flipped = board.orientation().flipped();
        board.set_orientation(flipped);
    }

    /// Ask the engine for a move and apply it if the board has not moved on
    /// in the meantime.
    ///
    /// Dropping the returned future before it completes abandons the think
    /// and returns the coordinator to `Idle`.
    pub async fn play_computer_turn(&self) -> Result<ComputerMove> {
        let pending = self.begin_computer_think()?;
        let mut cancel = ThinkCancel::new(self);
        let outcome = pending.await;
        cancel.disarm();

        let result = {
            let mut board = self.board();
            self.coordinator().finish_think(&mut board, outcome)
        };

        if let ComputerMove::NoMove(NoMoveReason::EngineFailed(e)) = &result {
            error!("Engine failed in game {}: {}", self.id, e);
            self.engine_failed.store(true, Ordering::SeqCst);
        }
        Ok(result)
    }

    /// Run a computer turn in the background and report it as a `GameEvent`.
    pub fn spawn_computer_turn(self: &Arc<Self>) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let event = match session.play_computer_turn().await {
                Ok(result) => GameEvent::ComputerMove(result),
                Err(e) => {
                    warn!("Computer turn in game {} not started: {}", session.id, e);
                    GameEvent::ComputerError(e)
                }
            };
            if session.events.send(event).is_err() {
                debug!("No listener for events of game {}", session.id);
            }
        })
    }

    /// Shut down the engine, if any.
    pub async fn close(&self) {
        if let Some(engine) = &self.engine {
            engine.quit().await;
        }
        debug!("Game {} closed", self.id);
    }

    fn begin_computer_think(&self) -> Result<PendingMove> {
        let engine = self.engine.as_ref().ok_or(Error::NoComputerOpponent)?;
        if self.engine_failed.load(Ordering::SeqCst) {
            return Err(EngineError::Terminated.into());
        }

        let board = self.board();
        let status = board.status();
        if !status.is_ongoing() {
            return Err(Error::GameOver(status));
        }
        if self.computer_color != Some(board.turn()) {
            return Err(Error::NotComputerTurn);
        }

        let mut coordinator = self.coordinator();
        Ok(coordinator.begin_think(&board, engine)?)
    }

    fn coordinator(&self) -> MutexGuard<'_, MoveCoordinator> {
        self.coordinator.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resets the coordinator if a computer turn is dropped mid-think.
struct ThinkCancel<'a> {
    session: &'a GameSession,
    armed: bool,
}

impl<'a> ThinkCancel<'a> {
    fn new(session: &'a GameSession) -> Self {
        Self { session, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ThinkCancel<'_> {
    fn drop(&mut self) {
        if self.armed && self.session.coordinator().cancel_think() {
            warn!("Computer turn in game {} abandoned while thinking", self.session.id);
        }
    }
}
