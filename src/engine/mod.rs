// =============================================================================
// Engine Module
// =============================================================================
//
// Everything needed to run one external UCI engine as a computer opponent.
//
// ## Architecture Overview
//
// ```
// ┌─────────────────┐    ┌─────────────────┐
// │    Session      │    │     Skill       │
// │ (Actor, thinks) │────│ (Level mapping) │
// └─────────────────┘    └─────────────────┘
//          │
// ┌─────────────────┐    ┌─────────────────┐
// │    Process      │    │ Communication   │
// │ (Spawn, write)  │────│ (Read, parse)   │
// └─────────────────┘    └─────────────────┘
//          │
// ┌─────────────────┐
// │     Types       │
// │ (Errors, enums) │
// └─────────────────┘
// ```
//
// ## Module Responsibilities
//
// - **types**: errors, constants, think limits, protocol log entries
// - **process**: spawning, the `uci`/`isready` handshake, writing commands
// - **communication**: reading stdout and reducing lines to `EngineReply`
// - **skill**: the fixed 1-8 difficulty table and strength options
// - **session**: the background task owning the process, `PendingMove`
//
// ## Usage
//
// ```rust
// let engine = EngineSession::start("/usr/bin/stockfish").await?;
// engine.configure(&SkillConfig::with_level(SkillLevel::new(3).unwrap())).await?;
// let pending = engine.request_best_move(board.position_snapshot(), ThinkLimit::default())?;
// match pending.await {
//     ThinkOutcome::BestMove(uci) => { /* ... */ }
//     ThinkOutcome::NoMove | ThinkOutcome::Failed(_) => { /* ... */ }
// }
// engine.quit().await;
// ```

pub mod communication;
pub mod process;
pub mod session;
pub mod skill;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use types::{
    // Error handling
    EngineError, EngineLaunchError, EngineResult,

    // Engine states and requests
    EngineState, ThinkLimit, ThinkOutcome,

    // Configuration and diagnostics
    EngineInfo, EngineLog, EngineOption,

    // Constants
    DEFAULT_THINK_TIME_MS, ENGINE_INIT_TIMEOUT, ENGINE_QUIT_TIMEOUT, ENGINE_READY_TIMEOUT,
};

pub use communication::{parse_reply, EngineReply};
pub use session::{EngineSession, PendingMove};
pub use skill::{SkillConfig, SkillLevel, SKILL_LEVEL_TABLE};
