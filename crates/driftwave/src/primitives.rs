//! Core primitives for driftwave
//!
//! Buffer, port, and node types that form the foundation of the signal
//! graph. Nodes are synchronous; everything here runs on the control thread
//! or inside a context's render pass.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// SIGNAL TYPES
// =============================================================================

/// Audio buffer with interleaved samples
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub channels: u8,
}

impl AudioBuffer {
    pub fn new(frames: usize, channels: u8) -> Self {
        Self {
            samples: vec![0.0; frames * channels as usize],
            channels,
        }
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Sum `other` into this buffer.
    ///
    /// Equal layouts add sample by sample. A mono source is duplicated into
    /// every channel of a wider buffer. Anything else is ignored.
    pub fn mix(&mut self, other: &AudioBuffer, gain: f32) {
        if self.samples.len() == other.samples.len() && self.channels == other.channels {
            for (s, o) in self.samples.iter_mut().zip(other.samples.iter()) {
                *s += o * gain;
            }
        } else if other.channels == 1 && other.frames() == self.frames() {
            let channels = self.channels as usize;
            for (frame, o) in other.samples.iter().enumerate() {
                for ch in 0..channels {
                    self.samples[frame * channels + ch] += o * gain;
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.samples.fill(0.0);
    }

    /// Samples of one channel, de-interleaved
    pub fn channel(&self, index: u8) -> Vec<f32> {
        if index >= self.channels {
            return Vec::new();
        }
        self.samples
            .iter()
            .skip(index as usize)
            .step_by(self.channels as usize)
            .copied()
            .collect()
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.samples.iter().map(|s| s * s).sum();
        (sum / self.samples.len() as f32).sqrt()
    }
}

// =============================================================================
// NODE TYPES
// =============================================================================

/// Kind of processing node. Closed set so graph code can match exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Oscillator,
    ChannelMerger,
    Gain,
    Analyser,
    BufferSource,
    Destination,
}

impl NodeKind {
    /// Generators produce sound on their own and must be started explicitly.
    pub fn is_generator(&self) -> bool {
        matches!(self, NodeKind::Oscillator | NodeKind::BufferSource)
    }
}

/// Port definition for a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub name: String,
    pub channels: u8,
}

impl Port {
    pub fn new(name: impl Into<String>, channels: u8) -> Self {
        Self {
            name: name.into(),
            channels,
        }
    }
}

/// Descriptor for a node in the graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: Uuid,
    pub name: String,
    pub kind: NodeKind,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
}

impl NodeDescriptor {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_input(mut self, port: Port) -> Self {
        self.inputs.push(port);
        self
    }

    pub fn with_output(mut self, port: Port) -> Self {
        self.outputs.push(port);
        self
    }
}

/// Automatable node parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Param {
    Frequency,
    Gain,
}

/// Start/stop lifecycle of a generator node. Generators start at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Stopped,
}

/// Context passed to nodes during a render pass
#[derive(Debug, Clone, Copy)]
pub struct ProcessContext {
    pub sample_rate: u32,
    pub buffer_size: usize,
}

/// Errors raised by individual nodes
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NodeError {
    #[error("{kind:?} node cannot {action} while {state:?}")]
    InvalidState {
        kind: NodeKind,
        action: &'static str,
        state: PlaybackState,
    },

    #[error("{kind:?} node has no {param:?} parameter")]
    UnknownParam { kind: NodeKind, param: Param },

    #[error("{value} is not a valid {param:?} value")]
    InvalidValue { param: Param, value: f64 },

    #[error("processing failed: {0}")]
    Failed(String),
}

/// Trait for signal graph nodes
pub trait Node: Send + Sync {
    fn descriptor(&self) -> &NodeDescriptor;

    /// Render one block. `inputs` holds one buffer per input port, already
    /// summed from every connected edge; `outputs` one per output port.
    fn process(
        &mut self,
        ctx: &ProcessContext,
        inputs: &[AudioBuffer],
        outputs: &mut [AudioBuffer],
    ) -> Result<(), NodeError>;

    /// Begin producing sound. Only meaningful for generators.
    fn start(&mut self) -> Result<(), NodeError> {
        Ok(())
    }

    /// Stop producing sound. Only meaningful for generators.
    fn stop(&mut self) -> Result<(), NodeError> {
        Ok(())
    }

    fn playback_state(&self) -> Option<PlaybackState> {
        None
    }

    fn set_param(&mut self, param: Param, _value: f64) -> Result<(), NodeError> {
        Err(NodeError::UnknownParam {
            kind: self.descriptor().kind,
            param,
        })
    }

    fn param(&self, _param: Param) -> Option<f64> {
        None
    }
}

/// Type alias for boxed node
pub type BoxedNode = Box<dyn Node>;

/// Shared start/stop bookkeeping for generator nodes.
pub(crate) fn transition_playback(
    kind: NodeKind,
    state: &mut PlaybackState,
    target: PlaybackState,
) -> Result<(), NodeError> {
    match (*state, target) {
        (PlaybackState::Idle, PlaybackState::Playing) => {
            *state = PlaybackState::Playing;
            Ok(())
        }
        (PlaybackState::Idle | PlaybackState::Playing, PlaybackState::Stopped) => {
            *state = PlaybackState::Stopped;
            Ok(())
        }
        // stop() twice is harmless
        (PlaybackState::Stopped, PlaybackState::Stopped) => Ok(()),
        (current, target) => Err(NodeError::InvalidState {
            kind,
            action: if target == PlaybackState::Playing {
                "start"
            } else {
                "stop"
            },
            state: current,
        }),
    }
}
