//! A scripted stand-in for a UCI engine, run through `/bin/sh`.

use std::path::PathBuf;

use tempfile::TempDir;

use super::session::EngineSession;
use super::types::EngineLaunchError;

/// `go` handler that answers 1...e5 after a short think
pub const ANSWER_E5: &str = "sleep 0.1; echo 'bestmove e7e5'";

pub struct FakeEngine {
    _dir: TempDir,
    script: PathBuf,
}

impl FakeEngine {
    /// An engine that completes the handshake and runs `on_go` for every `go`.
    pub fn new(on_go: &str) -> Self {
        Self::with_script(&format!(
            r#"while IFS= read -r line; do
  case "$line" in
    uci)
      echo "id name FakeFish"
      echo "id author Test Suite"
      echo "option name Skill Level type spin default 20 min -20 max 20"
      echo "uciok"
      ;;
    isready) echo "readyok" ;;
    go*) {on_go} ;;
    quit) exit 0 ;;
  esac
done
"#
        ))
    }

    /// An engine made of an arbitrary shell script.
    pub fn with_script(body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake_engine.sh");
        std::fs::write(&script, body).unwrap();
        Self { _dir: dir, script }
    }

    pub async fn start(&self) -> Result<EngineSession, EngineLaunchError> {
        EngineSession::start_with_args("/bin/sh", self.args()).await
    }

    /// Arguments for launching the script through `/bin/sh`.
    pub fn args(&self) -> Vec<String> {
        vec![self.script.display().to_string()]
    }
}
