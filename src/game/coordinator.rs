//! Deciding whether an engine answer still applies to the board.
//!
//! The engine thinks while the board stays open to other writers: the user
//! can take a move back or resign, an online opponent can move. Instead of
//! interrupting the engine, the coordinator remembers the last move at the
//! moment the think was requested and re-checks the board when the answer
//! arrives. Only the last move is compared, so a takeback followed by the
//! same move again is not noticed.

use log::{debug, info, warn};
use shakmaty::Move;

use crate::board::{AppliedMove, BoardModel, GameStatus, IllegalMoveError, PositionSnapshot};
use crate::engine::{EngineError, EngineResult, EngineSession, PendingMove, ThinkLimit, ThinkOutcome};

/// Something that can be asked for a move.
pub trait BestMoveProvider {
    fn request_best_move(&self, position: PositionSnapshot, limit: ThinkLimit) -> EngineResult<PendingMove>;
}

impl BestMoveProvider for EngineSession {
    fn request_best_move(&self, position: PositionSnapshot, limit: ThinkLimit) -> EngineResult<PendingMove> {
        EngineSession::request_best_move(self, position, limit)
    }
}

/// Last move in the history when a think was requested.
pub type SnapshotMarker = Option<Move>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CoordinatorState {
    #[default]
    Idle,
    Thinking(SnapshotMarker),
    Applying,
}

/// Why an engine move was thrown away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    /// The history changed during the think.
    HistoryChanged,
    /// The game ended during the think.
    GameOver(GameStatus),
}

/// Why no move was played although nothing went stale.
#[derive(Debug)]
pub enum NoMoveReason {
    /// The engine answered without a move.
    EngineDeclined,
    /// The engine process failed.
    EngineFailed(EngineError),
    /// The engine's move was not legal on the board.
    Rejected(IllegalMoveError),
    /// No think was outstanding.
    NotRequested,
}

/// Result of one think cycle.
#[derive(Debug)]
pub enum ComputerMove {
    Applied(AppliedMove),
    Discarded(StaleReason),
    NoMove(NoMoveReason),
}

impl ComputerMove {
    pub fn applied(&self) -> Option<&AppliedMove> {
        match self {
            ComputerMove::Applied(mv) => Some(mv),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct MoveCoordinator {
    state: CoordinatorState,
    limit: ThinkLimit,
}

impl MoveCoordinator {
    pub fn new(limit: ThinkLimit) -> Self {
        Self {
            state: CoordinatorState::Idle,
            limit,
        }
    }

    pub fn state(&self) -> &CoordinatorState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == CoordinatorState::Idle
    }

    pub fn limit(&self) -> ThinkLimit {
        self.limit
    }

    /// Remember the current last move and ask the provider to think.
    pub fn begin_think<P>(&mut self, board: &BoardModel, provider: &P) -> EngineResult<PendingMove>
    where
        P: BestMoveProvider + ?Sized,
    {
        if !self.is_idle() {
            return Err(EngineError::ThinkInProgress);
        }

        let marker = board.last_move().cloned();
        let pending = provider.request_best_move(board.position_snapshot(), self.limit)?;
        debug!("Think requested, last move {:?}", marker);
        self.state = CoordinatorState::Thinking(marker);
        Ok(pending)
    }

    /// Validate the answer against the board as it is now and apply it if
    /// it still fits. Always returns to `Idle`.
    pub fn finish_think(&mut self, board: &mut BoardModel, outcome: ThinkOutcome) -> ComputerMove {
        let marker = match std::mem::replace(&mut self.state, CoordinatorState::Applying) {
            CoordinatorState::Thinking(marker) => marker,
            other => {
                warn!("Think result arrived in state {:?}, ignoring", other);
                self.state = other;
                return ComputerMove::NoMove(NoMoveReason::NotRequested);
            }
        };

        let result = Self::settle(board, &marker, outcome);
        self.state = CoordinatorState::Idle;

        match &result {
            ComputerMove::Applied(mv) => info!("Computer played {}", mv.san),
            ComputerMove::Discarded(reason) => debug!("Discarded stale engine move: {:?}", reason),
            ComputerMove::NoMove(reason) => info!("Computer made no move: {:?}", reason),
        }
        result
    }

    /// Forget an outstanding think whose answer will never be collected.
    /// Returns false if nothing was outstanding.
    pub fn cancel_think(&mut self) -> bool {
        match self.state {
            CoordinatorState::Thinking(_) => {
                debug!("Think abandoned before its answer was collected");
                self.state = CoordinatorState::Idle;
                true
            }
            _ => false,
        }
    }

    fn settle(board: &mut BoardModel, marker: &SnapshotMarker, outcome: ThinkOutcome) -> ComputerMove {
        let uci = match outcome {
            ThinkOutcome::BestMove(uci) => uci,
            ThinkOutcome::NoMove => return ComputerMove::NoMove(NoMoveReason::EngineDeclined),
            ThinkOutcome::Failed(e) => return ComputerMove::NoMove(NoMoveReason::EngineFailed(e)),
        };

        if board.last_move() != marker.as_ref() {
            return ComputerMove::Discarded(StaleReason::HistoryChanged);
        }
        let status = board.status();
        if !status.is_ongoing() {
            return ComputerMove::Discarded(StaleReason::GameOver(status));
        }

        match board.apply_move(&uci) {
            Ok(applied) => ComputerMove::Applied(applied),
            Err(e) => ComputerMove::NoMove(NoMoveReason::Rejected(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use shakmaty::Color;
    use tokio::sync::oneshot;

    #[derive(Default)]
    struct ScriptedProvider {
        replies: Mutex<Vec<oneshot::Sender<ThinkOutcome>>>,
        requests: Mutex<Vec<PositionSnapshot>>,
    }

    impl ScriptedProvider {
        fn answer(&self, outcome: ThinkOutcome) {
            let reply = self.replies.lock().unwrap().pop().expect("no outstanding request");
            reply.send(outcome).unwrap();
        }
    }

    impl BestMoveProvider for ScriptedProvider {
        fn request_best_move(&self, position: PositionSnapshot, _limit: ThinkLimit) -> EngineResult<PendingMove> {
            let (reply, pending) = PendingMove::channel();
            self.replies.lock().unwrap().push(reply);
            self.requests.lock().unwrap().push(position);
            Ok(pending)
        }
    }

    fn board_after(moves: &[&str]) -> BoardModel {
        let mut board = BoardModel::default();
        for mv in moves {
            board.apply_move(mv).unwrap();
        }
        board
    }

    #[tokio::test]
    async fn fresh_answer_is_applied() {
        let mut board = board_after(&["e4"]);
        let provider = ScriptedProvider::default();
        let mut coordinator = MoveCoordinator::default();

        let pending = coordinator.begin_think(&board, &provider).unwrap();
        assert_eq!(coordinator.state(), &CoordinatorState::Thinking(board.last_move().cloned()));
        assert_eq!(provider.requests.lock().unwrap()[0].moves, vec!["e2e4"]);

        provider.answer(ThinkOutcome::BestMove("e7e5".into()));
        let result = coordinator.finish_think(&mut board, pending.await);

        let applied = result.applied().expect("move should be applied");
        assert_eq!(applied.san, "e5");
        assert_eq!(applied.color, Color::Black);
        assert_eq!(board.san_history(), vec!["e4", "e5"]);
        assert!(coordinator.is_idle());
    }

    #[tokio::test]
    async fn takeback_during_think_discards_answer() {
        let mut board = board_after(&["e4"]);
        let provider = ScriptedProvider::default();
        let mut coordinator = MoveCoordinator::default();

        let pending = coordinator.begin_think(&board, &provider).unwrap();
        board.takeback();
        provider.answer(ThinkOutcome::BestMove("e7e5".into()));

        let result = coordinator.finish_think(&mut board, pending.await);
        assert!(matches!(result, ComputerMove::Discarded(StaleReason::HistoryChanged)));
        assert!(board.last_move().is_none());
        assert!(coordinator.is_idle());
    }

    #[tokio::test]
    async fn resignation_during_think_discards_answer() {
        let mut board = board_after(&["e4"]);
        let provider = ScriptedProvider::default();
        let mut coordinator = MoveCoordinator::default();

        let pending = coordinator.begin_think(&board, &provider).unwrap();
        board.resign(Color::White);
        provider.answer(ThinkOutcome::BestMove("e7e5".into()));

        let result = coordinator.finish_think(&mut board, pending.await);
        assert!(matches!(
            result,
            ComputerMove::Discarded(StaleReason::GameOver(GameStatus::Resigned { winner: Color::Black }))
        ));
        assert_eq!(board.san_history(), vec!["e4"]);
        assert!(coordinator.is_idle());
    }

    #[tokio::test]
    async fn history_check_runs_before_termination_check() {
        let mut board = board_after(&["e4"]);
        let provider = ScriptedProvider::default();
        let mut coordinator = MoveCoordinator::default();

        let pending = coordinator.begin_think(&board, &provider).unwrap();
        board.takeback();
        board.abort();
        provider.answer(ThinkOutcome::BestMove("e7e5".into()));

        let result = coordinator.finish_think(&mut board, pending.await);
        assert!(matches!(result, ComputerMove::Discarded(StaleReason::HistoryChanged)));
    }

    #[tokio::test]
    async fn replayed_last_move_is_not_detected() {
        let mut board = board_after(&["e4"]);
        let provider = ScriptedProvider::default();
        let mut coordinator = MoveCoordinator::default();

        let pending = coordinator.begin_think(&board, &provider).unwrap();
        board.takeback();
        board.apply_move("e4").unwrap();
        provider.answer(ThinkOutcome::BestMove("e7e5".into()));

        let result = coordinator.finish_think(&mut board, pending.await);
        assert!(result.applied().is_some());
    }

    #[tokio::test]
    async fn no_move_is_distinct_from_staleness() {
        let mut board = board_after(&["e4"]);
        let provider = ScriptedProvider::default();
        let mut coordinator = MoveCoordinator::default();

        let pending = coordinator.begin_think(&board, &provider).unwrap();
        provider.answer(ThinkOutcome::NoMove);
        let result = coordinator.finish_think(&mut board, pending.await);
        assert!(matches!(result, ComputerMove::NoMove(NoMoveReason::EngineDeclined)));

        let pending = coordinator.begin_think(&board, &provider).unwrap();
        provider.answer(ThinkOutcome::Failed(EngineError::ProcessExited));
        let result = coordinator.finish_think(&mut board, pending.await);
        assert!(matches!(
            result,
            ComputerMove::NoMove(NoMoveReason::EngineFailed(EngineError::ProcessExited))
        ));
        assert_eq!(board.san_history(), vec!["e4"]);
    }

    #[tokio::test]
    async fn dropped_provider_resolves_as_failure() {
        let mut board = board_after(&["e4"]);
        let provider = ScriptedProvider::default();
        let mut coordinator = MoveCoordinator::default();

        let pending = coordinator.begin_think(&board, &provider).unwrap();
        drop(provider);
        let result = coordinator.finish_think(&mut board, pending.await);
        assert!(matches!(
            result,
            ComputerMove::NoMove(NoMoveReason::EngineFailed(EngineError::Terminated))
        ));
    }

    #[tokio::test]
    async fn illegal_engine_move_is_rejected() {
        let mut board = board_after(&["e4"]);
        let provider = ScriptedProvider::default();
        let mut coordinator = MoveCoordinator::default();

        let pending = coordinator.begin_think(&board, &provider).unwrap();
        provider.answer(ThinkOutcome::BestMove("e2e4".into()));
        let result = coordinator.finish_think(&mut board, pending.await);
        assert!(matches!(result, ComputerMove::NoMove(NoMoveReason::Rejected(_))));
        assert!(coordinator.is_idle());
    }

    #[test]
    fn one_think_at_a_time() {
        let board = board_after(&["e4"]);
        let provider = ScriptedProvider::default();
        let mut coordinator = MoveCoordinator::new(ThinkLimit::Depth(5));

        let _pending = coordinator.begin_think(&board, &provider).unwrap();
        assert!(matches!(
            coordinator.begin_think(&board, &provider),
            Err(EngineError::ThinkInProgress)
        ));
        assert_eq!(provider.requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn unrequested_result_leaves_state_alone() {
        let mut board = BoardModel::default();
        let mut coordinator = MoveCoordinator::default();
        let result = coordinator.finish_think(&mut board, ThinkOutcome::BestMove("e2e4".into()));
        assert!(matches!(result, ComputerMove::NoMove(NoMoveReason::NotRequested)));
        assert!(coordinator.is_idle());
        assert!(board.last_move().is_none());
    }

    #[tokio::test]
    async fn cancelled_think_frees_the_coordinator() {
        let mut board = board_after(&["e4"]);
        let provider = ScriptedProvider::default();
        let mut coordinator = MoveCoordinator::default();

        let abandoned = coordinator.begin_think(&board, &provider).unwrap();
        drop(abandoned);
        assert!(coordinator.cancel_think());
        assert!(coordinator.is_idle());
        assert!(!coordinator.cancel_think());

        let late = coordinator.finish_think(&mut board, ThinkOutcome::BestMove("e7e5".into()));
        assert!(matches!(late, ComputerMove::NoMove(NoMoveReason::NotRequested)));

        let pending = coordinator.begin_think(&board, &provider).unwrap();
        provider.answer(ThinkOutcome::BestMove("c7c5".into()));
        let result = coordinator.finish_think(&mut board, pending.await);
        assert_eq!(result.applied().unwrap().san, "c5");
    }
}
