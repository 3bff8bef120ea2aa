//! Session controller
//!
//! The top-level state machine. Every input, whether a user intent, a
//! visibility edge, a media key or a timer tick, arrives as a
//! `SessionEvent` and goes through `handle`.
//!
//! ```text
//! Idle ──select──► Selecting ──play──► Playing ◄──visible── Backgrounded
//!  ▲                  │  ▲               │ │ ──hidden──────────►  │
//!  │                  └──┘ select        │ └──stop──► Idle        │
//!  └──────── Completed ◄──timer done─────┴────────────────────────┘
//! ```
//! `Completed` is momentary: the completion callback observes it, then the
//! controller settles in `Idle`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use driftconf::DriftConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::context::{ContextFactory, ContextRole};
use crate::error::EngineError;
use crate::manager::{AudioGraphManager, ManagerSettings, StartOutcome};
use crate::media::{MediaAction, MediaSession};
use crate::mode::SessionMode;
use crate::timer::{Clock, SessionTimer};
use crate::transition::BackgroundTransitionHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Selecting,
    Playing,
    Backgrounded,
    Completed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Selecting => "selecting",
            SessionState::Playing => "playing",
            SessionState::Backgrounded => "backgrounded",
            SessionState::Completed => "completed",
        }
    }

    /// A session is live (sound should be coming out)
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Playing | SessionState::Backgrounded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Hidden,
    Visible,
}

/// What the UI asks for
#[derive(Debug, Clone)]
pub enum Intent {
    SelectMode(SessionMode),
    Play,
    Stop,
    /// New beat frequency for the running tone pair
    Retune(f64),
    /// None = open-ended
    SetDuration(Option<Duration>),
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Intent(Intent),
    Visibility(Visibility),
    Media(MediaAction),
    Tick,
}

/// The logical session
#[derive(Debug, Clone, Default)]
pub struct AudioSession {
    pub mode: Option<SessionMode>,
    /// None = open-ended count-up
    pub duration: Option<Duration>,
    pub elapsed: Duration,
}

/// Read-only view for rendering a UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub mode: Option<String>,
    pub title: Option<String>,
    pub beat_frequency: Option<f64>,
    pub elapsed_seconds: f64,
    pub duration_seconds: Option<f64>,
    /// Non-fatal problem, e.g. background audio was refused
    pub warning: Option<String>,
}

/// Handed to the completion callback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedSession {
    pub mode: String,
    pub label: String,
    pub duration_seconds: Option<f64>,
    pub elapsed_seconds: f64,
    pub completed_at: DateTime<Utc>,
}

pub type CompletionCallback = Box<dyn Fn(&CompletedSession) + Send + Sync>;
type TickSink = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerOptions {
    pub manager: ManagerSettings,
    pub default_duration: Option<Duration>,
    pub retain_mode_on_end: bool,
    pub tick_interval: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self::from_config(&DriftConfig::default())
    }
}

impl ControllerOptions {
    pub fn from_config(config: &DriftConfig) -> Self {
        let seconds = config.session.default_duration_seconds;
        Self {
            manager: ManagerSettings::from_config(config),
            default_duration: (seconds > 0).then(|| Duration::from_secs(seconds)),
            retain_mode_on_end: config.session.retain_mode_on_end,
            tick_interval: Duration::from_millis(config.session.tick_interval_ms.max(1)),
        }
    }
}

pub struct SessionController {
    state: SessionState,
    session: AudioSession,
    foreground: AudioGraphManager,
    transitions: BackgroundTransitionHandler,
    timer: SessionTimer,
    media: Arc<dyn MediaSession>,
    options: ControllerOptions,
    on_complete: Option<CompletionCallback>,
    tick_sink: Option<TickSink>,
    warning: Option<String>,
}

impl SessionController {
    pub fn new(
        factory: Arc<dyn ContextFactory>,
        media: Arc<dyn MediaSession>,
        clock: Arc<dyn Clock>,
        options: ControllerOptions,
    ) -> Self {
        let foreground = AudioGraphManager::new(
            ContextRole::Foreground,
            Arc::clone(&factory),
            Arc::clone(&media),
            options.manager.clone(),
        );
        let transitions =
            BackgroundTransitionHandler::new(factory, Arc::clone(&media), options.manager.clone());

        Self {
            state: SessionState::Idle,
            session: AudioSession {
                duration: options.default_duration,
                ..AudioSession::default()
            },
            foreground,
            transitions,
            timer: SessionTimer::new(clock),
            media,
            options,
            on_complete: None,
            tick_sink: None,
            warning: None,
        }
    }

    /// Called once per completed session
    pub fn with_completion(
        mut self,
        callback: impl Fn(&CompletedSession) + Send + Sync + 'static,
    ) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// While a session runs, call `sink` every tick interval. The sink
    /// returns false once nobody is listening.
    pub fn set_tick_sink(&mut self, sink: impl Fn() -> bool + Send + Sync + 'static) {
        self.tick_sink = Some(Arc::new(sink));
    }

    /// The single transition function
    pub async fn handle(&mut self, event: SessionEvent) -> Result<(), EngineError> {
        match event {
            SessionEvent::Intent(intent) => match intent {
                Intent::SelectMode(mode) => self.select_mode(mode).await,
                Intent::Play => self.play().await,
                Intent::Stop => self.stop().await,
                Intent::Retune(beat_hz) => self.retune(beat_hz),
                Intent::SetDuration(duration) => self.set_duration(duration),
            },
            SessionEvent::Visibility(Visibility::Hidden) => self.on_hidden().await,
            SessionEvent::Visibility(Visibility::Visible) => self.on_visible().await,
            SessionEvent::Media(MediaAction::Play) => self.play().await,
            SessionEvent::Media(MediaAction::Pause | MediaAction::Stop) => self.stop().await,
            SessionEvent::Tick => {
                self.tick().await;
                Ok(())
            }
        }
    }

    fn invalid(&self, intent: &'static str) -> EngineError {
        EngineError::InvalidTransition {
            state: self.state.as_str(),
            intent,
        }
    }

    /// The manager currently producing audio
    fn active_manager(&self) -> &AudioGraphManager {
        if self.state == SessionState::Backgrounded {
            self.transitions.manager()
        } else {
            &self.foreground
        }
    }

    /// Choose what to play. While a session runs this switches the sound
    /// live without restarting the timer. A failed switch that leaves no
    /// graph playing ends the session.
    pub async fn select_mode(&mut self, mode: SessionMode) -> Result<(), EngineError> {
        mode.validate()?;

        match self.state {
            SessionState::Idle | SessionState::Selecting => {
                self.session.mode = Some(mode);
                self.state = SessionState::Selecting;
            }
            SessionState::Playing | SessionState::Backgrounded => {
                let switched = self.active_manager().start(&mode).await;
                if let Err(e) = switched {
                    // The old graph is gone by now if the context was recycled
                    if !self.active_manager().is_running() {
                        warn!(%mode, "mode switch left nothing playing, ending session: {}", e);
                        self.end_session().await;
                        self.state = SessionState::Idle;
                    }
                    return Err(e);
                }
                info!(%mode, "mode switched live");
                self.session.mode = Some(mode);
            }
            SessionState::Completed => return Err(self.invalid("select a mode")),
        }
        Ok(())
    }

    /// Start the selected (or retained) mode. A no-op while already playing.
    pub async fn play(&mut self) -> Result<(), EngineError> {
        match self.state {
            SessionState::Playing | SessionState::Backgrounded => Ok(()),
            SessionState::Selecting => self.begin().await,
            SessionState::Idle if self.session.mode.is_some() => self.begin().await,
            _ => Err(self.invalid("play")),
        }
    }

    async fn begin(&mut self) -> Result<(), EngineError> {
        let Some(mode) = self.session.mode.clone() else {
            return Err(self.invalid("play"));
        };

        if self.foreground.start(&mode).await? == StartOutcome::Superseded {
            return Err(EngineError::ContextUnavailable(
                "start was cancelled".to_string(),
            ));
        }

        self.timer.start(self.session.duration);
        if let Some(sink) = &self.tick_sink {
            let sink = Arc::clone(sink);
            self.timer.spawn_ticker(self.options.tick_interval, move || sink());
        }
        self.session.elapsed = Duration::ZERO;
        self.warning = None;
        self.state = SessionState::Playing;
        info!(%mode, duration = ?self.session.duration, "session playing");
        Ok(())
    }

    /// End the session. Harmless when nothing is playing.
    pub async fn stop(&mut self) -> Result<(), EngineError> {
        if self.state.is_active() {
            self.end_session().await;
            self.state = SessionState::Idle;
            info!("session stopped");
        }
        Ok(())
    }

    async fn end_session(&mut self) {
        self.timer.stop();
        self.foreground.stop().await;
        self.transitions.teardown().await;
        self.media.clear();
        self.session.elapsed = Duration::ZERO;
        if !self.options.retain_mode_on_end {
            self.session.mode = None;
        }
    }

    async fn on_hidden(&mut self) -> Result<(), EngineError> {
        if self.state != SessionState::Playing {
            return Ok(());
        }

        match self.transitions.enter_background(&self.foreground).await {
            Ok(()) => {
                self.state = SessionState::Backgrounded;
                Ok(())
            }
            Err(EngineError::BackgroundUnavailable(reason)) => {
                warn!(%reason, "continuing in foreground only");
                self.warning = Some(format!("background audio unavailable: {}", reason));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn on_visible(&mut self) -> Result<(), EngineError> {
        if self.state != SessionState::Backgrounded {
            return Ok(());
        }
        self.transitions.return_to_foreground(&self.foreground).await?;
        self.state = SessionState::Playing;
        Ok(())
    }

    async fn tick(&mut self) {
        if !self.state.is_active() {
            return;
        }
        let tick = self.timer.tick();
        self.session.elapsed = tick.elapsed;
        if tick.completed {
            self.complete().await;
        }
    }

    async fn complete(&mut self) {
        let record = CompletedSession {
            mode: self
                .session
                .mode
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_default(),
            label: self
                .session
                .mode
                .as_ref()
                .map(|m| m.title())
                .unwrap_or_default(),
            duration_seconds: self.session.duration.map(|d| d.as_secs_f64()),
            elapsed_seconds: self.session.elapsed.as_secs_f64(),
            completed_at: Utc::now(),
        };

        self.end_session().await;
        self.state = SessionState::Completed;
        info!(mode = %record.mode, elapsed_secs = record.elapsed_seconds, "session completed");
        if let Some(callback) = &self.on_complete {
            callback(&record);
        }
        self.state = SessionState::Idle;
    }

    /// Change the beat frequency of the running tone pair in place
    pub fn retune(&mut self, beat_hz: f64) -> Result<(), EngineError> {
        if !self.state.is_active() {
            return Err(EngineError::NotRunning);
        }
        let manager = self.active_manager();
        manager.retune(beat_hz)?;
        let retuned = manager.mode();
        self.session.mode = retuned;
        Ok(())
    }

    /// Set the length of the next session. `None` runs open-ended.
    pub fn set_duration(&mut self, duration: Option<Duration>) -> Result<(), EngineError> {
        match self.state {
            SessionState::Idle | SessionState::Selecting => {
                self.session.duration = duration.filter(|d| !d.is_zero());
                Ok(())
            }
            _ => Err(self.invalid("change duration")),
        }
    }

    /// Stop anything still playing before the controller is dropped
    pub async fn shutdown(&mut self) {
        if self.state.is_active() {
            self.end_session().await;
            self.state = SessionState::Idle;
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let mode = self.session.mode.as_ref();
        SessionSnapshot {
            state: self.state,
            mode: mode.map(|m| m.to_string()),
            title: mode.map(|m| m.title()),
            beat_frequency: mode.and_then(|m| m.beat_frequency()),
            elapsed_seconds: self.session.elapsed.as_secs_f64(),
            duration_seconds: self.session.duration.map(|d| d.as_secs_f64()),
            warning: self.warning.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> &AudioSession {
        &self.session
    }

    pub fn foreground(&self) -> &AudioGraphManager {
        &self.foreground
    }

    pub fn background(&self) -> &AudioGraphManager {
        self.transitions.manager()
    }

    pub fn timer(&self) -> &SessionTimer {
        &self.timer
    }
}
