use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, info};

use super::session::{GameEvents, GameSession};
use crate::config::GameOptions;
use crate::error::{Error, Result};

/// Active games indexed by id
///
/// Starting a game under an id that is already in use closes the old game
/// and its engine first.
#[derive(Debug, Default)]
pub struct GameManager {
    games: DashMap<String, Arc<GameSession>>,
}

impl GameManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn start_game(&self, id: &str, options: &GameOptions) -> Result<(Arc<GameSession>, GameEvents)> {
        if let Some((_, previous)) = self.games.remove(id) {
            info!("Replacing running game {}", id);
            previous.close().await;
        }

        let (session, events) = GameSession::start(id, options).await?;
        let session = Arc::new(session);
        self.games.insert(id.to_string(), Arc::clone(&session));
        Ok((session, events))
    }

    pub fn get(&self, id: &str) -> Result<Arc<GameSession>> {
        self.games
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::GameNotFound(id.to_string()))
    }

    pub fn game_ids(&self) -> Vec<String> {
        self.games.iter().map(|entry| entry.key().clone()).collect()
    }

    pub async fn end_game(&self, id: &str) -> Result<()> {
        let (_, session) = self
            .games
            .remove(id)
            .ok_or_else(|| Error::GameNotFound(id.to_string()))?;
        session.close().await;
        debug!("Game {} ended", id);
        Ok(())
    }

    /// Close every game, e.g. on shutdown.
    pub async fn end_all(&self) {
        let sessions: Vec<Arc<GameSession>> = self
            .games
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        self.games.clear();

        for session in sessions {
            session.close().await;
        }
        info!("All games closed");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::ComputerOptions;
    use crate::engine::testing::{FakeEngine, ANSWER_E5};

    #[tokio::test]
    async fn start_get_and_end() {
        let manager = GameManager::new();
        let (session, _events) = manager.start_game("local", &GameOptions::default()).await.unwrap();
        session.submit_move("d4").unwrap();

        let fetched = manager.get("local").unwrap();
        assert_eq!(fetched.board().san_history(), vec!["d4"]);
        assert_eq!(manager.game_ids(), vec!["local".to_string()]);

        manager.end_game("local").await.unwrap();
        assert!(matches!(manager.get("local"), Err(Error::GameNotFound(_))));
        assert!(matches!(manager.end_game("local").await, Err(Error::GameNotFound(_))));
    }

    #[tokio::test]
    async fn restarting_an_id_closes_the_old_engine() {
        let fake = FakeEngine::new(ANSWER_E5);
        let options = GameOptions {
            computer: Some(ComputerOptions {
                engine_path: "/bin/sh".into(),
                engine_args: fake.args(),
                ..ComputerOptions::default()
            }),
            ..GameOptions::default()
        };

        let manager = GameManager::new();
        let (first, _events) = manager.start_game("vs", &options).await.unwrap();
        let (second, _events) = manager.start_game("vs", &options).await.unwrap();

        assert!(!first.engine().unwrap().is_alive());
        assert!(second.engine().unwrap().is_alive());
        manager.end_all().await;
        assert!(!second.engine().unwrap().is_alive());
        assert!(manager.game_ids().is_empty());
    }
}
