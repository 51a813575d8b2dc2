use std::{
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::{Child, ChildStdin, Command},
    time::timeout,
};

use super::communication::{parse_reply, EngineReply, UciCommunicator};
use super::types::{
    EngineError, EngineInfo, EngineLog, EngineOption, EngineResult, EngineState, ThinkLimit,
    ENGINE_INIT_TIMEOUT, ENGINE_QUIT_TIMEOUT,
};
use crate::board::PositionSnapshot;

#[cfg(target_os = "windows")]
use super::types::CREATE_NO_WINDOW;

/// Protocol log shared between the process and whoever owns the session
pub type SharedLogs = Arc<Mutex<Vec<EngineLog>>>;

/// Low-level handle on a running engine process
///
/// Owns the child and its stdin, tracks the protocol state and records every
/// line written. Output is read through the `UciCommunicator` returned by
/// `EngineProcess::new`.
#[derive(Debug)]
pub struct EngineProcess {
    stdin: ChildStdin,
    child: Option<Child>,
    state: EngineState,
    logs: SharedLogs,
}

impl EngineProcess {
    /// Spawn the engine and run the `uci` / `isready` handshake
    pub async fn new(
        path: &Path,
        args: &[String],
    ) -> EngineResult<(Self, UciCommunicator, EngineInfo)> {
        info!("Initializing engine from path: {:?}", path);

        let mut child = Self::spawn_engine_process(path, args)?;
        let stdin = child.stdin.take().ok_or_else(|| {
            error!("Failed to get stdin handle from engine process");
            EngineError::NoStdin
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            error!("Failed to get stdout handle from engine process");
            EngineError::NoStdout
        })?;
        Self::spawn_stderr_handler(child.stderr.take());

        let mut process = Self {
            stdin,
            child: Some(child),
            state: EngineState::Idle,
            logs: SharedLogs::default(),
        };
        let mut communicator = UciCommunicator::new(BufReader::new(stdout).lines());

        let info = match timeout(ENGINE_INIT_TIMEOUT, process.initialize_uci(&mut communicator)).await {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => {
                error!("Failed to initialize engine {:?}: {}", path, e);
                process.force_kill().await;
                return Err(e);
            }
            Err(_) => {
                error!("Engine initialization timeout: {:?}", path);
                process.force_kill().await;
                return Err(EngineError::InitTimeout);
            }
        };

        info!("Engine initialized successfully: {} ({:?})", info.name, path);
        Ok((process, communicator, info))
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn logs(&self) -> SharedLogs {
        Arc::clone(&self.logs)
    }

    pub fn add_log(&self, log: EngineLog) {
        self.logs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(log);
    }

    pub async fn set_option(&mut self, option: &EngineOption) -> EngineResult<()> {
        debug!("Setting engine option: {} = {}", option.name, option.value);
        self.send_command(&format!("setoption name {} value {}\n", option.name, option.value))
            .await
    }

    pub async fn is_ready(&mut self) -> EngineResult<()> {
        self.send_command("isready\n").await
    }

    pub async fn new_game(&mut self) -> EngineResult<()> {
        self.send_command("ucinewgame\n").await
    }

    /// Send the position and start thinking
    pub async fn start_think(&mut self, position: &PositionSnapshot, limit: &ThinkLimit) -> EngineResult<()> {
        if self.state != EngineState::Idle {
            return Err(EngineError::ThinkInProgress);
        }

        self.send_command(&format_position_command(position)).await?;
        self.transition_state(EngineState::Thinking)?;
        let command = format_go_command(limit);
        info!("Starting engine think: {}", command.trim());
        self.send_command(&command).await
    }

    /// The engine answered the outstanding think
    pub fn handle_bestmove(&mut self) -> EngineResult<()> {
        self.transition_state(EngineState::Idle)
    }

    /// Send `quit`, wait briefly, then kill whatever is left
    pub async fn quit(&mut self) {
        info!("Terminating engine process");
        if let Err(e) = self.transition_state(EngineState::Terminated) {
            warn!("Failed to transition to terminated state: {}", e);
        }

        match self.send_command("quit\n").await {
            Ok(()) => debug!("Quit command sent successfully"),
            Err(EngineError::BrokenPipe) => debug!("Broken pipe while sending quit command, engine already dead"),
            Err(e) => warn!("Failed to send quit command: {}, will force kill", e),
        }

        if let Some(mut child) = self.child.take() {
            match timeout(ENGINE_QUIT_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => info!("Engine process exited with status: {:?}", status),
                Ok(Err(e)) => {
                    warn!("Error waiting for engine process: {}", e);
                    let _ = child.kill().await;
                }
                Err(_) => {
                    warn!("Engine did not exit gracefully, force-killing");
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill engine process: {}", e);
                    }
                }
            }
        }
    }

    async fn force_kill(&mut self) {
        self.state = EngineState::Terminated;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
        }
    }

    // =============================================================================
    // Private Implementation
    // =============================================================================

    fn spawn_engine_process(path: &Path, args: &[String]) -> EngineResult<Child> {
        debug!("Spawning engine process: {:?} {:?}", path, args);

        let mut command = Command::new(path);
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        command
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .env("TERM", "dumb");

        #[cfg(target_os = "windows")]
        command.creation_flags(CREATE_NO_WINDOW);

        command.spawn().map_err(|e| {
            error!("Failed to spawn engine process {:?}: {}", path, e);
            EngineError::Io(e)
        })
    }

    async fn initialize_uci(&mut self, communicator: &mut UciCommunicator) -> EngineResult<EngineInfo> {
        debug!("Starting UCI initialization");
        let mut info = EngineInfo::default();

        self.send_command("uci\n").await?;
        loop {
            let line = communicator
                .next_line()
                .await?
                .ok_or(EngineError::ClosedDuring("uci handshake"))?;
            self.add_log(EngineLog::Engine(line.clone()));

            match parse_reply(&line) {
                EngineReply::Id { name, author } => {
                    if let Some(name) = name {
                        info.name = name;
                    }
                    if author.is_some() {
                        info.author = author;
                    }
                }
                EngineReply::Option(option) => info.options.push(option),
                EngineReply::UciOk => break,
                _ => {}
            }
        }

        debug!("Received uciok, sending isready");
        self.is_ready().await?;
        loop {
            let line = communicator
                .next_line()
                .await?
                .ok_or(EngineError::ClosedDuring("isready handshake"))?;
            self.add_log(EngineLog::Engine(line.clone()));
            if parse_reply(&line) == EngineReply::ReadyOk {
                debug!("Engine is ready");
                return Ok(info);
            }
        }
    }

    fn spawn_stderr_handler(stderr: Option<tokio::process::ChildStderr>) {
        if let Some(stderr) = stderr {
            tokio::spawn(async move {
                let mut stderr_lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = stderr_lines.next_line().await {
                    warn!("Engine stderr: {}", line);
                }
            });
        }
    }

    async fn send_command(&mut self, command: &str) -> EngineResult<()> {
        debug!("Sending UCI command: {}", command.trim());

        if let Err(e) = self.stdin.write_all(command.as_bytes()).await {
            return Err(classify_write_error(command, e));
        }
        if let Err(e) = self.stdin.flush().await {
            return Err(classify_write_error(command, e));
        }

        self.add_log(EngineLog::Gui(command.to_string()));
        Ok(())
    }

    fn transition_state(&mut self, new_state: EngineState) -> EngineResult<()> {
        let valid_transition = matches!(
            (self.state, new_state),
            (EngineState::Idle, EngineState::Thinking)
                | (EngineState::Thinking, EngineState::Idle)
                | (_, EngineState::Terminated)
        );

        if !valid_transition {
            return Err(EngineError::InvalidTransition {
                from: self.state,
                to: new_state,
            });
        }

        debug!("Engine state transition: {:?} -> {:?}", self.state, new_state);
        self.state = new_state;
        Ok(())
    }
}

fn classify_write_error(command: &str, e: std::io::Error) -> EngineError {
    error!("Failed to send command '{}': {}", command.trim(), e);
    match e.kind() {
        std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::ConnectionReset => EngineError::BrokenPipe,
        _ => EngineError::Io(e),
    }
}

pub fn format_position_command(position: &PositionSnapshot) -> String {
    let base = match &position.fen {
        Some(fen) => format!("position fen {fen}"),
        None => "position startpos".to_string(),
    };

    if position.moves.is_empty() {
        format!("{base}\n")
    } else {
        format!("{base} moves {}\n", position.moves.join(" "))
    }
}

pub fn format_go_command(limit: &ThinkLimit) -> String {
    match limit {
        ThinkLimit::Time(time) => format!("go movetime {time}\n"),
        ThinkLimit::Depth(depth) => format!("go depth {depth}\n"),
        ThinkLimit::Nodes(nodes) => format!("go nodes {nodes}\n"),
    }
}
