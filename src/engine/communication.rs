use log::{error, trace, warn};
use tokio::{
    io::{BufReader, Lines},
    process::ChildStdout,
};
use vampirc_uci::{parse_one, UciMessage, UciOptionConfig};

use super::types::{EngineError, EngineResult};

/// What engines send instead of a move when they have none
const NULL_MOVES: [&str; 2] = ["(none)", "0000"];

/// Engine output, reduced to what the client acts on
#[derive(Debug, Clone, PartialEq)]
pub enum EngineReply {
    Id { name: Option<String>, author: Option<String> },
    Option(UciOptionConfig),
    UciOk,
    ReadyOk,
    /// Best move in UCI notation
    BestMove(String),
    /// `bestmove (none)` or equivalent
    NoBestMove,
    Info,
    Other,
}

/// Reads engine stdout line by line
#[derive(Debug)]
pub struct UciCommunicator {
    reader: Lines<BufReader<ChildStdout>>,
}

impl UciCommunicator {
    pub fn new(reader: Lines<BufReader<ChildStdout>>) -> Self {
        Self { reader }
    }

    /// Next line of output, `None` once the engine closed stdout.
    ///
    /// Cancel safe, so it can sit in a `select!` loop.
    pub async fn next_line(&mut self) -> EngineResult<Option<String>> {
        match self.reader.next_line().await {
            Ok(line) => {
                if let Some(line) = &line {
                    trace!("Engine output: {}", line);
                }
                Ok(line)
            }
            Err(e) => {
                error!("Error reading from engine stdout: {}", e);
                Err(classify_read_error(e))
            }
        }
    }
}

fn classify_read_error(e: std::io::Error) -> EngineError {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::ConnectionReset => {
            warn!("Connection issue detected: {:?}", e.kind());
            EngineError::BrokenPipe
        }
        std::io::ErrorKind::UnexpectedEof => {
            warn!("Unexpected EOF, engine process may have died");
            EngineError::ProcessExited
        }
        _ => EngineError::Io(e),
    }
}

/// Parse one line of engine output.
pub fn parse_reply(line: &str) -> EngineReply {
    let trimmed = line.trim();
    match parse_one(trimmed) {
        UciMessage::Id { name, author } => EngineReply::Id { name, author },
        UciMessage::Option(config) => EngineReply::Option(config),
        UciMessage::UciOk => EngineReply::UciOk,
        UciMessage::ReadyOk => EngineReply::ReadyOk,
        UciMessage::BestMove { best_move, .. } => bestmove_reply(&best_move.to_string()),
        UciMessage::Info(_) => EngineReply::Info,
        // the UCI grammar rejects `bestmove (none)`, so fall back to tokens
        _ if trimmed.split_whitespace().next() == Some("bestmove") => {
            bestmove_reply(trimmed.split_whitespace().nth(1).unwrap_or("(none)"))
        }
        _ => EngineReply::Other,
    }
}

fn bestmove_reply(token: &str) -> EngineReply {
    if NULL_MOVES.contains(&token) {
        EngineReply::NoBestMove
    } else {
        EngineReply::BestMove(token.to_string())
    }
}
