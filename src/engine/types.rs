use std::{path::PathBuf, time::Duration};

use derivative::Derivative;
use serde::{Deserialize, Serialize};
use vampirc_uci::UciOptionConfig;

// =============================================================================
// Constants
// =============================================================================

/// Timeout for the `uci`/`isready` handshake
pub const ENGINE_INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for `readyok` after configuration
pub const ENGINE_READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace period after `quit` before the process is force-killed
pub const ENGINE_QUIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default thinking time per computer move, in milliseconds
pub const DEFAULT_THINK_TIME_MS: u32 = 2000;

// =============================================================================
// Error Types
// =============================================================================

/// Errors raised while talking to an engine process
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine initialization timeout")]
    InitTimeout,

    #[error("Engine did not acknowledge with readyok")]
    ReadyTimeout,

    #[error("Engine closed its output during {0}")]
    ClosedDuring(&'static str),

    #[error("No stdin handle available")]
    NoStdin,

    #[error("No stdout handle available")]
    NoStdout,

    #[error("Broken pipe")]
    BrokenPipe,

    #[error("Engine process exited unexpectedly")]
    ProcessExited,

    #[error("A think request is already outstanding")]
    ThinkInProgress,

    #[error("Engine session has been terminated")]
    Terminated,

    #[error("Invalid state transition: from {from:?} to {to:?}")]
    InvalidTransition { from: EngineState, to: EngineState },
}

pub type EngineResult<T> = Result<T, EngineError>;

/// The engine could not be started; the computer opponent is unusable.
#[derive(Debug, thiserror::Error)]
#[error("Failed to launch engine {path:?}: {cause}")]
pub struct EngineLaunchError {
    pub path: PathBuf,
    #[source]
    pub cause: EngineError,
}

// =============================================================================
// Core Engine Types
// =============================================================================

/// Engine session states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Ready for a think request
    Idle,
    /// A think is outstanding
    Thinking,
    /// Process has been told to quit or has died
    Terminated,
}

/// Bound on a single think
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "t", content = "c")]
pub enum ThinkLimit {
    /// Think for a fixed time in milliseconds
    Time(u32),
    /// Search to a fixed depth
    Depth(u32),
    /// Search a fixed number of nodes
    Nodes(u32),
}

impl Default for ThinkLimit {
    fn default() -> Self {
        ThinkLimit::Time(DEFAULT_THINK_TIME_MS)
    }
}

/// Individual UCI option
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct EngineOption {
    pub name: String,
    pub value: String,
}

impl EngineOption {
    pub fn new(name: &str, value: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// Identity and advertised options, collected during the handshake
#[derive(Default, Debug, Clone)]
pub struct EngineInfo {
    pub name: String,
    pub author: Option<String>,
    pub options: Vec<UciOptionConfig>,
}

impl EngineInfo {
    pub fn supports_option(&self, name: &str) -> bool {
        self.options.iter().any(|opt| option_name(opt) == name)
    }
}

pub fn option_name(option: &UciOptionConfig) -> &str {
    match option {
        UciOptionConfig::Check { name, .. }
        | UciOptionConfig::Spin { name, .. }
        | UciOptionConfig::Combo { name, .. }
        | UciOptionConfig::Button { name }
        | UciOptionConfig::String { name, .. } => name,
    }
}

/// Protocol traffic, kept for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum EngineLog {
    Gui(String),
    Engine(String),
}

/// How a think request resolved
#[derive(Debug, Derivative)]
#[derivative(PartialEq)]
pub enum ThinkOutcome {
    /// The engine's move in UCI notation
    BestMove(String),
    /// The engine reported that it has no move
    NoMove,
    /// The process failed before answering
    Failed(#[derivative(PartialEq(compare_with = "same_error_kind"))] EngineError),
}

fn same_error_kind(a: &EngineError, b: &EngineError) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

#[cfg(target_os = "windows")]
pub const CREATE_NO_WINDOW: u32 = 0x08000000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_think_limit_is_two_seconds() {
        assert_eq!(ThinkLimit::default(), ThinkLimit::Time(2000));
    }

    #[test]
    fn outcome_equality_ignores_error_payload() {
        let a = ThinkOutcome::Failed(EngineError::ClosedDuring("uci handshake"));
        let b = ThinkOutcome::Failed(EngineError::ClosedDuring("isready handshake"));
        assert_eq!(a, b);
        assert_ne!(ThinkOutcome::NoMove, ThinkOutcome::Failed(EngineError::ProcessExited));
    }

    #[test]
    fn logs_serialize_as_tagged_json() {
        let logs = vec![EngineLog::Gui("isready".into()), EngineLog::Engine("readyok".into())];
        assert_eq!(
            serde_json::to_string(&logs).unwrap(),
            r#"[{"type":"gui","value":"isready"},{"type":"engine","value":"readyok"}]"#
        );
    }

    #[test]
    fn option_lookup_by_name() {
        let info = EngineInfo {
            name: "Fake".into(),
            author: None,
            options: vec![UciOptionConfig::Spin {
                name: "Skill Level".into(),
                default: Some(20),
                min: Some(-20),
                max: Some(20),
            }],
        };
        assert!(info.supports_option("Skill Level"));
        assert!(!info.supports_option("UCI_Elo"));
    }
}
