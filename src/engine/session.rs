//! One engine process for the lifetime of one game.
//!
//! After the handshake the process is moved into a background task that owns
//! it exclusively. The session talks to that task over a command channel and
//! every think request is answered through its own oneshot channel, so a
//! request resolves exactly once: with the engine's move, with "no move", or
//! with a failure when the process dies or the session is shut down.

use std::{
    future::Future,
    path::{Path, PathBuf},
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, PoisonError,
    },
    task::{Context, Poll},
};

use log::{debug, error, info, warn};
use tokio::{
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
    time::timeout,
};

use super::communication::{parse_reply, EngineReply, UciCommunicator};
use super::process::{EngineProcess, SharedLogs};
use super::skill::SkillConfig;
use super::types::{
    EngineError, EngineInfo, EngineLaunchError, EngineLog, EngineOption, EngineResult,
    ThinkLimit, ThinkOutcome, ENGINE_READY_TIMEOUT,
};
use crate::board::PositionSnapshot;

#[derive(Debug)]
enum SessionCommand {
    Configure {
        options: Vec<EngineOption>,
        ack: oneshot::Sender<EngineResult<()>>,
    },
    Think {
        position: PositionSnapshot,
        limit: ThinkLimit,
        reply: oneshot::Sender<ThinkOutcome>,
    },
    Quit,
}

/// An outstanding think. Resolves to the engine's answer.
#[derive(Debug)]
pub struct PendingMove {
    receiver: oneshot::Receiver<ThinkOutcome>,
}

impl PendingMove {
    pub(crate) fn channel() -> (oneshot::Sender<ThinkOutcome>, Self) {
        let (sender, receiver) = oneshot::channel();
        (sender, Self { receiver })
    }
}

impl Future for PendingMove {
    type Output = ThinkOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // a dropped sender means the session task is gone
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.unwrap_or(ThinkOutcome::Failed(EngineError::Terminated)))
    }
}

/// Handle on a running engine
#[derive(Debug)]
pub struct EngineSession {
    path: PathBuf,
    info: EngineInfo,
    commands: mpsc::UnboundedSender<SessionCommand>,
    thinking: Arc<AtomicBool>,
    logs: SharedLogs,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EngineSession {
    /// Spawn the engine binary and complete the UCI handshake.
    pub async fn start(path: impl Into<PathBuf>) -> Result<Self, EngineLaunchError> {
        Self::start_with_args(path, Vec::new()).await
    }

    pub async fn start_with_args(
        path: impl Into<PathBuf>,
        args: Vec<String>,
    ) -> Result<Self, EngineLaunchError> {
        let path = path.into();
        let (process, communicator, info) = EngineProcess::new(&path, &args)
            .await
            .map_err(|cause| EngineLaunchError {
                path: path.clone(),
                cause,
            })?;

        let (commands, receiver) = mpsc::unbounded_channel();
        let thinking = Arc::new(AtomicBool::new(false));
        let logs = process.logs();
        let task = tokio::spawn(run_session_loop(
            process,
            communicator,
            receiver,
            Arc::clone(&thinking),
        ));

        info!("Engine session started: {} ({:?})", info.name, path);
        Ok(Self {
            path,
            info,
            commands,
            thinking,
            logs,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> &EngineInfo {
        &self.info
    }

    pub fn is_thinking(&self) -> bool {
        self.thinking.load(Ordering::SeqCst)
    }

    /// False once the session task has stopped.
    pub fn is_alive(&self) -> bool {
        !self.commands.is_closed()
    }

    pub fn logs(&self) -> Vec<EngineLog> {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Send the skill and strength settings.
    pub async fn configure(&self, skill: &SkillConfig) -> EngineResult<()> {
        self.set_options(skill.to_engine_options()).await
    }

    /// Send options and wait for the engine's `readyok`.
    pub async fn set_options(&self, options: Vec<EngineOption>) -> EngineResult<()> {
        for option in &options {
            if !self.info.supports_option(&option.name) {
                debug!("Engine {} does not advertise option '{}'", self.info.name, option.name);
            }
        }

        let (ack, acknowledged) = oneshot::channel();
        self.commands
            .send(SessionCommand::Configure { options, ack })
            .map_err(|_| EngineError::Terminated)?;

        match timeout(ENGINE_READY_TIMEOUT, acknowledged).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(EngineError::Terminated),
            Err(_) => Err(EngineError::ReadyTimeout),
        }
    }

    /// Ask for a move. Returns at once; the answer arrives through the handle.
    ///
    /// Only one request may be outstanding at a time.
    pub fn request_best_move(&self, position: PositionSnapshot, limit: ThinkLimit) -> EngineResult<PendingMove> {
        if self
            .thinking
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::ThinkInProgress);
        }

        let (reply, pending) = PendingMove::channel();
        if self
            .commands
            .send(SessionCommand::Think { position, limit, reply })
            .is_err()
        {
            self.thinking.store(false, Ordering::SeqCst);
            return Err(EngineError::Terminated);
        }
        Ok(pending)
    }

    /// Shut the engine down. Safe to call more than once.
    pub async fn quit(&self) {
        let Some(task) = self.task.lock().await.take() else {
            debug!("Engine session already shut down: {:?}", self.path);
            return;
        };

        let _ = self.commands.send(SessionCommand::Quit);
        if let Err(e) = task.await {
            error!("Engine session task failed: {}", e);
        }
        info!("Engine session closed: {:?}", self.path);
    }
}

fn resolve(thinking: &AtomicBool, reply: oneshot::Sender<ThinkOutcome>, outcome: ThinkOutcome) {
    debug!("Think resolved: {:?}", outcome);
    thinking.store(false, Ordering::SeqCst);
    if reply.send(outcome).is_err() {
        debug!("Think result dropped, requester went away");
    }
}

enum LoopExit {
    Quit,
    Closed,
    ReadFailed(EngineError),
}

async fn run_session_loop(
    mut process: EngineProcess,
    mut communicator: UciCommunicator,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    thinking: Arc<AtomicBool>,
) {
    let mut pending_think: Option<oneshot::Sender<ThinkOutcome>> = None;
    let mut pending_ack: Option<oneshot::Sender<EngineResult<()>>> = None;
    let mut new_game_sent = false;

    let exit = loop {
        tokio::select! {
            command = commands.recv() => match command {
                None | Some(SessionCommand::Quit) => break LoopExit::Quit,
                Some(SessionCommand::Configure { options, ack }) => {
                    if pending_think.is_some() {
                        let _ = ack.send(Err(EngineError::ThinkInProgress));
                        continue;
                    }
                    match send_options(&mut process, &options).await {
                        Ok(()) => pending_ack = Some(ack),
                        Err(e) => {
                            warn!("Failed to configure engine: {}", e);
                            let _ = ack.send(Err(e));
                        }
                    }
                }
                Some(SessionCommand::Think { position, limit, reply }) => {
                    if !new_game_sent {
                        if let Err(e) = process.new_game().await {
                            resolve(&thinking, reply, ThinkOutcome::Failed(e));
                            continue;
                        }
                        new_game_sent = true;
                    }
                    match process.start_think(&position, &limit).await {
                        Ok(()) => pending_think = Some(reply),
                        Err(e) => {
                            warn!("Failed to start think: {}", e);
                            resolve(&thinking, reply, ThinkOutcome::Failed(e));
                        }
                    }
                }
            },
            line = communicator.next_line() => match line {
                Ok(Some(line)) => {
                    process.add_log(EngineLog::Engine(line.clone()));
                    match parse_reply(&line) {
                        EngineReply::ReadyOk => {
                            if let Some(ack) = pending_ack.take() {
                                let _ = ack.send(Ok(()));
                            }
                        }
                        EngineReply::BestMove(mv) => {
                            finish_think(&mut process, &thinking, &mut pending_think, ThinkOutcome::BestMove(mv));
                        }
                        EngineReply::NoBestMove => {
                            finish_think(&mut process, &thinking, &mut pending_think, ThinkOutcome::NoMove);
                        }
                        _ => {}
                    }
                }
                Ok(None) => {
                    warn!("Engine closed its output");
                    break LoopExit::Closed;
                }
                Err(e) => break LoopExit::ReadFailed(e),
            }
        }
    };

    let (think_error, ack_error) = match exit {
        LoopExit::Quit => (EngineError::Terminated, EngineError::Terminated),
        LoopExit::Closed => (EngineError::ProcessExited, EngineError::ProcessExited),
        LoopExit::ReadFailed(e) => (e, EngineError::ProcessExited),
    };
    if let Some(reply) = pending_think.take() {
        error!("Engine session ended during a think: {}", think_error);
        resolve(&thinking, reply, ThinkOutcome::Failed(think_error));
    }
    if let Some(ack) = pending_ack.take() {
        let _ = ack.send(Err(ack_error));
    }

    // requests that raced with shutdown still get an answer
    commands.close();
    while let Ok(command) = commands.try_recv() {
        match command {
            SessionCommand::Think { reply, .. } => {
                resolve(&thinking, reply, ThinkOutcome::Failed(EngineError::Terminated))
            }
            SessionCommand::Configure { ack, .. } => {
                let _ = ack.send(Err(EngineError::Terminated));
            }
            SessionCommand::Quit => {}
        }
    }

    process.quit().await;
}

async fn send_options(process: &mut EngineProcess, options: &[EngineOption]) -> EngineResult<()> {
    for option in options {
        process.set_option(option).await?;
    }
    process.is_ready().await
}

fn finish_think(
    process: &mut EngineProcess,
    thinking: &AtomicBool,
    pending_think: &mut Option<oneshot::Sender<ThinkOutcome>>,
    outcome: ThinkOutcome,
) {
    if let Err(e) = process.handle_bestmove() {
        warn!("Failed to handle bestmove state transition: {}", e);
    }
    match pending_think.take() {
        Some(reply) => resolve(thinking, reply, outcome),
        None => warn!("Ignoring bestmove without an outstanding think"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::engine::skill::SkillLevel;
    use crate::engine::testing::{FakeEngine, ANSWER_E5};
    use std::time::Duration;

    const NO_HANG: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn handshake_collects_engine_info() {
        let fake = FakeEngine::new(ANSWER_E5);
        let session = fake.start().await.unwrap();
        assert_eq!(session.info().name, "FakeFish");
        assert!(session.info().supports_option("Skill Level"));
        assert!(session.logs().contains(&EngineLog::Engine("uciok".into())));
        session.quit().await;
    }

    #[tokio::test]
    async fn best_move_round_trip() {
        let fake = FakeEngine::new(ANSWER_E5);
        let session = fake.start().await.unwrap();

        let snapshot = PositionSnapshot {
            moves: vec!["e2e4".into()],
            ..PositionSnapshot::default()
        };
        let pending = session.request_best_move(snapshot, ThinkLimit::Time(100)).unwrap();
        assert!(session.is_thinking());
        let outcome = timeout(NO_HANG, pending).await.unwrap();
        assert_eq!(outcome, ThinkOutcome::BestMove("e7e5".into()));
        assert!(!session.is_thinking());

        let sent = session.logs();
        assert!(sent.contains(&EngineLog::Gui("position startpos moves e2e4\n".into())));
        assert!(sent.contains(&EngineLog::Gui("go movetime 100\n".into())));
        session.quit().await;
    }

    #[tokio::test]
    async fn configure_sends_mapped_skill() {
        let fake = FakeEngine::new(ANSWER_E5);
        let session = fake.start().await.unwrap();

        let skill = SkillConfig::with_level(SkillLevel::new(1).unwrap());
        session.configure(&skill).await.unwrap();

        let sent = session.logs();
        assert!(sent.contains(&EngineLog::Gui("setoption name Skill Level value -9\n".into())));
        assert!(sent.contains(&EngineLog::Gui("setoption name UCI_LimitStrength value false\n".into())));
        assert!(sent.contains(&EngineLog::Gui("setoption name UCI_Elo value 1350\n".into())));
        session.quit().await;
    }

    #[tokio::test]
    async fn engine_without_move_resolves_no_move() {
        let fake = FakeEngine::new("echo 'bestmove (none)'");
        let session = fake.start().await.unwrap();
        let pending = session
            .request_best_move(PositionSnapshot::default(), ThinkLimit::Depth(1))
            .unwrap();
        assert_eq!(timeout(NO_HANG, pending).await.unwrap(), ThinkOutcome::NoMove);
        session.quit().await;
    }

    #[tokio::test]
    async fn second_request_while_thinking_is_rejected() {
        let fake = FakeEngine::new("sleep 1; echo 'bestmove e7e5'");
        let session = fake.start().await.unwrap();

        let first = session
            .request_best_move(PositionSnapshot::default(), ThinkLimit::Time(1000))
            .unwrap();
        let second = session.request_best_move(PositionSnapshot::default(), ThinkLimit::Time(1000));
        assert!(matches!(second, Err(EngineError::ThinkInProgress)));

        assert_eq!(timeout(NO_HANG, first).await.unwrap(), ThinkOutcome::BestMove("e7e5".into()));
        session.quit().await;
    }

    #[tokio::test]
    async fn crash_mid_think_resolves_failure() {
        let fake = FakeEngine::new("exit 3");
        let session = fake.start().await.unwrap();
        let pending = session
            .request_best_move(PositionSnapshot::default(), ThinkLimit::Time(100))
            .unwrap();

        let outcome = timeout(NO_HANG, pending).await.expect("pending think must not hang");
        assert!(matches!(outcome, ThinkOutcome::Failed(_)));
        assert!(!session.is_thinking());
        session.quit().await;
    }

    #[tokio::test]
    async fn quit_during_think_resolves_pending() {
        let fake = FakeEngine::new("sleep 5; echo 'bestmove e7e5'");
        let session = fake.start().await.unwrap();
        let pending = session
            .request_best_move(PositionSnapshot::default(), ThinkLimit::Time(5000))
            .unwrap();

        session.quit().await;
        let outcome = timeout(NO_HANG, pending).await.unwrap();
        assert_eq!(outcome, ThinkOutcome::Failed(EngineError::Terminated));
        assert!(!session.is_alive());
    }

    #[tokio::test]
    async fn quit_twice_is_harmless() {
        let fake = FakeEngine::new(ANSWER_E5);
        let session = fake.start().await.unwrap();
        session.quit().await;
        session.quit().await;

        let after = session.request_best_move(PositionSnapshot::default(), ThinkLimit::Time(100));
        assert!(matches!(after, Err(EngineError::Terminated)));
    }

    #[tokio::test]
    async fn missing_binary_is_launch_error() {
        let err = EngineSession::start("/nonexistent/path/to/engine").await.unwrap_err();
        assert_eq!(err.path, PathBuf::from("/nonexistent/path/to/engine"));
        assert!(matches!(err.cause, EngineError::Io(_)));
    }

    #[tokio::test]
    async fn engine_dying_in_handshake_is_launch_error() {
        let fake = FakeEngine::with_script("read -r line\nexit 1");
        let err = fake.start().await.unwrap_err();
        assert!(matches!(err.cause, EngineError::ClosedDuring(_)));
    }
}
