//! Audio graph manager
//!
//! Owns one processing context (for one role) and at most one live
//! `SignalGraphHandle` inside it.
//!
//! Suspension and cancellation:
//! - `start` suspends while the context is created and resumed. Every call
//!   bumps a generation counter and remembers its own value; after each
//!   await it checks that nobody has bumped the counter since. If a `stop`
//!   or a newer `start` arrived meanwhile, the late start tears down what it
//!   built and reports `StartOutcome::Superseded`.
//! - Lifecycle work (create, resume, build, teardown, close) is serialized
//!   by an async lock, so a context for this role is always fully closed
//!   before its replacement is created.
//! - The state mutex is never held across an await.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use driftconf::DriftConfig;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::builder::{self, GraphSettings, SignalGraphHandle};
use crate::context::{AudioContext, ContextError, ContextFactory, ContextRole, ContextState};
use crate::error::EngineError;
use crate::media::{MediaMetadata, MediaSession};
use crate::mode::{validate_beat, SessionMode};
use crate::nodes::Meters;
use crate::primitives::AudioBuffer;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManagerSettings {
    pub graph: GraphSettings,
    /// Recreate the context on a graph replacement once it is this old
    pub max_context_age: Option<Duration>,
}

impl ManagerSettings {
    pub fn from_config(config: &DriftConfig) -> Self {
        Self {
            graph: GraphSettings::from(&config.audio),
            max_context_age: config.session.max_context_age_seconds.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new graph is playing
    Started,
    /// The same mode was already playing; nothing was rebuilt
    AlreadyRunning,
    /// A stop or newer start overtook this one while it was suspended
    Superseded,
}

#[derive(Default)]
struct ManagerInner {
    context: Option<Arc<AudioContext>>,
    handle: Option<SignalGraphHandle>,
    generation: u64,
}

pub struct AudioGraphManager {
    role: ContextRole,
    factory: Arc<dyn ContextFactory>,
    media: Arc<dyn MediaSession>,
    settings: ManagerSettings,
    inner: Mutex<ManagerInner>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl AudioGraphManager {
    pub fn new(
        role: ContextRole,
        factory: Arc<dyn ContextFactory>,
        media: Arc<dyn MediaSession>,
        settings: ManagerSettings,
    ) -> Self {
        Self {
            role,
            factory,
            media,
            settings,
            inner: Mutex::new(ManagerInner::default()),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    fn inner(&self) -> MutexGuard<'_, ManagerInner> {
        self.inner.lock().expect("graph manager mutex poisoned")
    }

    fn is_current(&self, token: u64) -> bool {
        self.inner().generation == token
    }

    fn unavailable(&self, e: ContextError) -> EngineError {
        match self.role {
            ContextRole::Foreground => EngineError::ContextUnavailable(e.to_string()),
            ContextRole::Background => EngineError::BackgroundUnavailable(e.to_string()),
        }
    }

    /// Start playing `mode`, creating or resuming the context as needed.
    ///
    /// Starting the mode that is already playing is a no-op. Starting a
    /// different mode replaces the running graph.
    pub async fn start(&self, mode: &SessionMode) -> Result<StartOutcome, EngineError> {
        mode.validate()?;

        if self.is_playing(mode) {
            debug!(role = ?self.role, %mode, "already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let token = {
            let mut inner = self.inner();
            inner.generation += 1;
            inner.generation
        };

        let _lifecycle = self.lifecycle.lock().await;
        if !self.is_current(token) {
            return Ok(StartOutcome::Superseded);
        }

        // Take-and-replace whatever is currently playing
        let (previous, existing) = {
            let mut inner = self.inner();
            (inner.handle.take(), inner.context.clone())
        };
        let replacing = previous.is_some();
        if let (Some(handle), Some(ctx)) = (previous, existing.as_ref()) {
            handle.teardown(ctx);
        }

        let ctx = match existing {
            Some(ctx) if ctx.state() != ContextState::Closed && !(replacing && self.expired(&ctx)) => {
                ctx
            }
            stale => {
                if let Some(old) = stale {
                    info!(context = %old.id(), age_secs = old.age().as_secs(), "recycling context");
                    self.inner().context = None;
                    close_context(&old).await;
                }
                let ctx = self
                    .factory
                    .create(self.role)
                    .await
                    .map_err(|e| self.unavailable(e))?;
                self.inner().context = Some(Arc::clone(&ctx));
                ctx
            }
        };

        if !self.is_current(token) {
            self.teardown_locked().await;
            return Ok(StartOutcome::Superseded);
        }

        if ctx.state() == ContextState::Suspended {
            if let Err(e) = ctx.resume().await {
                self.teardown_locked().await;
                return Err(self.unavailable(e));
            }
            if !self.is_current(token) {
                self.teardown_locked().await;
                return Ok(StartOutcome::Superseded);
            }
        }

        // Wiring and generator start are synchronous; no await below
        let handle = builder::build(mode, &self.settings.graph, &ctx)?;
        if let Err(e) = handle.start(&ctx) {
            handle.teardown(&ctx);
            return Err(e);
        }
        self.inner().handle = Some(handle);

        self.media.publish(&MediaMetadata::for_mode(mode));
        info!(role = ?self.role, context = %ctx.id(), %mode, "graph started");
        Ok(StartOutcome::Started)
    }

    /// Move the right oscillator to `carrier + beat_hz` in place
    pub fn retune(&self, beat_hz: f64) -> Result<(), EngineError> {
        validate_beat(beat_hz)?;

        let mut inner = self.inner();
        let ManagerInner {
            context, handle, ..
        } = &mut *inner;
        let (Some(ctx), Some(handle)) = (context.as_ref(), handle.as_mut()) else {
            return Err(EngineError::NotRunning);
        };

        handle.retune(ctx, beat_hz)?;
        self.media.publish(&MediaMetadata::for_mode(handle.mode()));
        debug!(role = ?self.role, beat_hz, "retuned");
        Ok(())
    }

    /// Stop every node, disconnect, then close the context. Never fails;
    /// teardown problems are logged. Calling it again is harmless.
    pub async fn stop(&self) {
        self.inner().generation += 1;
        let _lifecycle = self.lifecycle.lock().await;
        self.teardown_locked().await;
    }

    async fn teardown_locked(&self) {
        let (handle, ctx) = {
            let mut inner = self.inner();
            (inner.handle.take(), inner.context.take())
        };

        let Some(ctx) = ctx else {
            return;
        };
        if let Some(handle) = handle {
            handle.teardown(&ctx);
        }
        close_context(&ctx).await;
        debug!(role = ?self.role, context = %ctx.id(), "manager stopped");
    }

    fn expired(&self, ctx: &AudioContext) -> bool {
        self.settings
            .max_context_age
            .is_some_and(|max| ctx.age() >= max)
    }

    pub fn role(&self) -> ContextRole {
        self.role
    }

    /// True when `mode` is what's currently playing
    pub fn is_playing(&self, mode: &SessionMode) -> bool {
        let inner = self.inner();
        let running = inner
            .context
            .as_ref()
            .is_some_and(|ctx| ctx.state() == ContextState::Running);
        running && inner.handle.as_ref().is_some_and(|h| h.mode() == mode)
    }

    pub fn is_running(&self) -> bool {
        self.inner().handle.is_some()
    }

    /// Nodes owned by the live graph handle
    pub fn node_count(&self) -> usize {
        self.inner().handle.as_ref().map_or(0, |h| h.node_count())
    }

    pub fn node_ids(&self) -> Vec<Uuid> {
        self.inner()
            .handle
            .as_ref()
            .map(|h| h.node_ids().to_vec())
            .unwrap_or_default()
    }

    /// (left, right) oscillator frequencies when a tone mode is playing
    pub fn frequencies(&self) -> Option<(f64, f64)> {
        let inner = self.inner();
        inner.handle.as_ref()?.frequencies(inner.context.as_ref()?)
    }

    pub fn mode(&self) -> Option<SessionMode> {
        self.inner().handle.as_ref().map(|h| h.mode().clone())
    }

    pub fn context(&self) -> Option<Arc<AudioContext>> {
        self.inner().context.clone()
    }

    pub fn context_id(&self) -> Option<Uuid> {
        self.inner().context.as_ref().map(|ctx| ctx.id())
    }

    pub fn context_state(&self) -> Option<ContextState> {
        self.inner().context.as_ref().map(|ctx| ctx.state())
    }

    pub fn meters(&self) -> Option<Arc<Meters>> {
        self.inner().handle.as_ref().and_then(|h| h.meters())
    }

    /// Pull `frames` of output from the context
    pub fn render(&self, frames: usize) -> Result<AudioBuffer, EngineError> {
        let ctx = self.context().ok_or(EngineError::NotRunning)?;
        Ok(ctx.render(frames)?)
    }
}

/// Close a context, forcing a disconnect first if something was left wired.
async fn close_context(ctx: &AudioContext) {
    match ctx.close().await {
        Ok(()) => {}
        Err(ContextError::NodesStillConnected(edges)) => {
            warn!(context = %ctx.id(), edges, "closing with live connections, forcing disconnect");
            ctx.disconnect_all();
            if let Err(e) = ctx.close().await {
                error!(context = %ctx.id(), "failed to close context: {}", e);
            }
        }
        Err(e) => error!(context = %ctx.id(), "failed to close context: {}", e),
    }
}
