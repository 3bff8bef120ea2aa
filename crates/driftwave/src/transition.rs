//! Foreground/background handoff
//!
//! Node objects can't cross contexts, so every migration rebuilds an
//! equivalent graph from a `TransitionRecord` in the destination context.
//! Both directions are make-before-break: the new graph's generators are
//! running before the old context is closed, so a playing session always
//! has exactly one context producing audio.

use std::sync::Arc;

use tracing::{info, warn};

use crate::context::{ContextFactory, ContextRole};
use crate::error::EngineError;
use crate::manager::{AudioGraphManager, ManagerSettings, StartOutcome};
use crate::media::MediaSession;
use crate::mode::SessionMode;

/// What's needed to rebuild an equivalent graph in another context
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRecord {
    pub mode: SessionMode,
}

impl TransitionRecord {
    /// Capture the mode a manager is currently playing
    pub fn capture(manager: &AudioGraphManager) -> Option<Self> {
        manager.mode().map(|mode| Self { mode })
    }
}

pub struct BackgroundTransitionHandler {
    background: AudioGraphManager,
}

impl BackgroundTransitionHandler {
    pub fn new(
        factory: Arc<dyn ContextFactory>,
        media: Arc<dyn MediaSession>,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            background: AudioGraphManager::new(ContextRole::Background, factory, media, settings),
        }
    }

    /// Move playback from `foreground` into the background context.
    ///
    /// If the background graph can't be started the foreground keeps
    /// playing and `BackgroundUnavailable` is returned.
    pub async fn enter_background(&self, foreground: &AudioGraphManager) -> Result<(), EngineError> {
        let record = TransitionRecord::capture(foreground).ok_or(EngineError::NotRunning)?;

        match self.background.start(&record.mode).await {
            Ok(StartOutcome::Started | StartOutcome::AlreadyRunning) => {}
            Ok(StartOutcome::Superseded) => {
                return Err(EngineError::BackgroundUnavailable(
                    "background start was cancelled".to_string(),
                ))
            }
            Err(e) => {
                warn!("background handoff failed, staying in foreground: {}", e);
                self.background.stop().await;
                return Err(match e {
                    EngineError::BackgroundUnavailable(_) => e,
                    other => EngineError::BackgroundUnavailable(other.to_string()),
                });
            }
        }

        foreground.stop().await;
        info!(mode = %record.mode, "playback moved to background");
        Ok(())
    }

    /// Rebuild the background graph in `foreground`, then close the
    /// background context. On failure the background keeps playing.
    pub async fn return_to_foreground(
        &self,
        foreground: &AudioGraphManager,
    ) -> Result<(), EngineError> {
        let record = TransitionRecord::capture(&self.background).ok_or(EngineError::NotRunning)?;

        match foreground.start(&record.mode).await? {
            StartOutcome::Started | StartOutcome::AlreadyRunning => {}
            StartOutcome::Superseded => {
                return Err(EngineError::ContextUnavailable(
                    "foreground start was cancelled".to_string(),
                ))
            }
        }

        self.background.stop().await;
        info!(mode = %record.mode, "playback moved to foreground");
        Ok(())
    }

    /// Close the background context if one is open
    pub async fn teardown(&self) {
        self.background.stop().await;
    }

    pub fn manager(&self) -> &AudioGraphManager {
        &self.background
    }

    pub fn is_active(&self) -> bool {
        self.background.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContextState, OfflineContextFactory};
    use crate::media::NullMediaSession;

    fn setup() -> (Arc<OfflineContextFactory>, AudioGraphManager, BackgroundTransitionHandler) {
        let factory = Arc::new(OfflineContextFactory::new(8000));
        let media: Arc<dyn MediaSession> = Arc::new(NullMediaSession);
        let foreground = AudioGraphManager::new(
            ContextRole::Foreground,
            factory.clone(),
            media.clone(),
            ManagerSettings::default(),
        );
        let handler =
            BackgroundTransitionHandler::new(factory.clone(), media, ManagerSettings::default());
        (factory, foreground, handler)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (factory, foreground, handler) = setup();
        foreground.start(&SessionMode::tone_pair(10.0)).await.unwrap();
        let first_fg = foreground.context().unwrap();

        handler.enter_background(&foreground).await.unwrap();
        assert_eq!(foreground.node_count(), 0);
        assert_eq!(first_fg.state(), ContextState::Closed);
        assert_eq!(handler.manager().frequencies(), Some((200.0, 210.0)));
        assert_eq!(factory.registry().open_count(), 1);

        let bg = handler.manager().context().unwrap();
        handler.return_to_foreground(&foreground).await.unwrap();
        assert!(!handler.is_active());
        assert_eq!(bg.state(), ContextState::Closed);
        assert_eq!(foreground.frequencies(), Some((200.0, 210.0)));
        assert_eq!(
            factory.registry().open_context(ContextRole::Foreground),
            foreground.context_id()
        );
        assert_eq!(factory.registry().open_count(), 1);
    }

    #[tokio::test]
    async fn test_denied_background_keeps_foreground() {
        let (factory, foreground, handler) = setup();
        factory.deny(ContextRole::Background);
        foreground.start(&SessionMode::tone_pair(10.0)).await.unwrap();
        let ids = foreground.node_ids();

        let err = handler.enter_background(&foreground).await.unwrap_err();
        assert!(matches!(err, EngineError::BackgroundUnavailable(_)));
        assert_eq!(foreground.node_ids(), ids);
        assert!(!handler.is_active());
    }

    #[tokio::test]
    async fn test_failed_return_keeps_background() {
        let (factory, foreground, handler) = setup();
        foreground.start(&SessionMode::tone_pair(10.0)).await.unwrap();
        handler.enter_background(&foreground).await.unwrap();

        factory.deny(ContextRole::Foreground);
        let err = handler.return_to_foreground(&foreground).await.unwrap_err();
        assert!(matches!(err, EngineError::ContextUnavailable(_)));
        assert!(handler.is_active());
        assert_eq!(handler.manager().context_state(), Some(ContextState::Running));
    }

    #[tokio::test]
    async fn test_nothing_to_migrate() {
        let (_, foreground, handler) = setup();
        assert_eq!(
            handler.enter_background(&foreground).await,
            Err(EngineError::NotRunning)
        );
    }
}
