//! Event loop driver
//!
//! Runs a `SessionController` on its own tokio task. UI and platform code
//! talk to it through a cloneable `SessionHandle`; the controller's state
//! comes back as `SessionSnapshot`s on a watch channel. The session timer's
//! ticker feeds `Tick` events into the same queue, so every transition is
//! applied one at a time in arrival order.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::controller::{
    Intent, SessionController, SessionEvent, SessionSnapshot, SessionState, Visibility,
};
use crate::error::EngineError;
use crate::media::MediaAction;
use crate::mode::SessionMode;

/// Snapshot plus the outcome of the last event
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DriverStatus {
    #[serde(flatten)]
    pub snapshot: SessionSnapshot,
    pub last_error: Option<String>,
}

/// Sender side for UI and platform events
#[derive(Clone)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<SessionEvent>,
    status: watch::Receiver<DriverStatus>,
}

impl SessionHandle {
    pub fn send(&self, event: SessionEvent) -> Result<(), EngineError> {
        self.events.send(event).map_err(|_| EngineError::DriverClosed)
    }

    pub fn select_mode(&self, mode: SessionMode) -> Result<(), EngineError> {
        self.send(SessionEvent::Intent(Intent::SelectMode(mode)))
    }

    pub fn play(&self) -> Result<(), EngineError> {
        self.send(SessionEvent::Intent(Intent::Play))
    }

    pub fn stop(&self) -> Result<(), EngineError> {
        self.send(SessionEvent::Intent(Intent::Stop))
    }

    pub fn retune(&self, beat_hz: f64) -> Result<(), EngineError> {
        self.send(SessionEvent::Intent(Intent::Retune(beat_hz)))
    }

    pub fn set_duration(&self, duration: Option<Duration>) -> Result<(), EngineError> {
        self.send(SessionEvent::Intent(Intent::SetDuration(duration)))
    }

    pub fn set_visibility(&self, visibility: Visibility) -> Result<(), EngineError> {
        self.send(SessionEvent::Visibility(visibility))
    }

    pub fn media_key(&self, action: MediaAction) -> Result<(), EngineError> {
        self.send(SessionEvent::Media(action))
    }

    /// Latest published status
    pub fn status(&self) -> DriverStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DriverStatus> {
        self.status.clone()
    }

    /// Wait until the session reaches `state`
    pub async fn wait_for_state(&self, state: SessionState) -> Result<DriverStatus, EngineError> {
        let mut rx = self.status.clone();
        let status = rx
            .wait_for(|s| s.snapshot.state == state)
            .await
            .map_err(|_| EngineError::DriverClosed)?;
        Ok(status.clone())
    }
}

pub struct SessionDriver {
    controller: SessionController,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    status: watch::Sender<DriverStatus>,
}

impl SessionDriver {
    pub fn new(mut controller: SessionController) -> (Self, SessionHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(DriverStatus {
            snapshot: controller.snapshot(),
            last_error: None,
        });

        // The ticker holds a weak sender so it never keeps the loop alive
        let ticks = events_tx.downgrade();
        controller.set_tick_sink(move || {
            ticks
                .upgrade()
                .is_some_and(|tx| tx.send(SessionEvent::Tick).is_ok())
        });

        let driver = Self {
            controller,
            events: events_rx,
            status: status_tx,
        };
        let handle = SessionHandle {
            events: events_tx,
            status: status_rx,
        };
        (driver, handle)
    }

    /// Spawn the loop onto the current runtime
    pub fn spawn(controller: SessionController) -> (SessionHandle, JoinHandle<SessionController>) {
        let (driver, handle) = Self::new(controller);
        (handle, tokio::spawn(driver.run()))
    }

    /// Process events until every handle is dropped, then stop whatever is
    /// still playing and hand the controller back.
    pub async fn run(mut self) -> SessionController {
        while let Some(event) = self.events.recv().await {
            let is_tick = matches!(event, SessionEvent::Tick);
            let last_error = match self.controller.handle(event).await {
                Ok(()) => None,
                Err(e) => {
                    warn!("session event rejected: {}", e);
                    Some(e.to_string())
                }
            };

            let status = DriverStatus {
                snapshot: self.controller.snapshot(),
                last_error,
            };
            // Ticks only publish when something changed
            if is_tick {
                self.status.send_if_modified(|current| {
                    if *current == status {
                        false
                    } else {
                        *current = status;
                        true
                    }
                });
            } else {
                self.status.send_replace(status);
            }
        }

        debug!("all session handles dropped, shutting down");
        self.controller.shutdown().await;
        self.status.send_replace(DriverStatus {
            snapshot: self.controller.snapshot(),
            last_error: None,
        });
        self.controller
    }
}
