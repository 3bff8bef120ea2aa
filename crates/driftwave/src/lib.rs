//! Driftwave: Binaural Beat and Ambient Noise Session Engine
//!
//! Builds small signal graphs (two detuned sine oscillators merged to stereo,
//! or a looping noise buffer) inside simulated audio contexts, and drives
//! them from a session state machine that handles timers, mode switches and
//! the handoff between a foreground and a background context.
//!
//! - **Signal graph** (`graph`, `nodes`, `builder`): petgraph-backed node
//!   graph with port and channel checks
//! - **Contexts** (`context`, `manager`): lifecycle of one audio context per
//!   role and the graph playing in it
//! - **Session** (`controller`, `transition`, `timer`, `driver`): the state
//!   machine, background handoff and countdown
//! - **Offline** (`noise`, `render`): noise synthesis and WAV rendering

pub mod builder;
pub mod context;
pub mod controller;
pub mod driver;
pub mod error;
pub mod graph;
pub mod manager;
pub mod media;
pub mod mode;
pub mod nodes;
pub mod noise;
pub mod primitives;
pub mod render;
pub mod timer;
pub mod transition;

pub use builder::{build, GraphSettings, SignalGraphHandle};
pub use context::{
    AudioContext, ContextError, ContextFactory, ContextRegistry, ContextRole, ContextState,
    OfflineContextFactory,
};
pub use controller::{
    AudioSession, CompletedSession, ControllerOptions, Intent, SessionController, SessionEvent,
    SessionSnapshot, SessionState, Visibility,
};
pub use driver::{DriverStatus, SessionDriver, SessionHandle};
pub use error::{EngineError, Result};
pub use graph::{Graph, GraphError, GraphSnapshot};
pub use manager::{AudioGraphManager, ManagerSettings, StartOutcome};
pub use media::{
    LoggingMediaSession, MediaAction, MediaMetadata, MediaSession, MemoryMediaSession,
    NullMediaSession,
};
pub use mode::{BrainwaveBand, CarrierPreset, NoiseVariant, SessionMode};
pub use nodes::{decode_wav, Meters, SampleBuffer};
pub use primitives::{AudioBuffer, Node, NodeDescriptor, NodeError, NodeKind, Param, PlaybackState};
pub use render::{render_to_wav, RenderError, RenderStats};
pub use timer::{Clock, ManualClock, MonotonicClock, SessionTimer, TimerTick};
pub use transition::{BackgroundTransitionHandler, TransitionRecord};
