//! Signal graph construction
//!
//! `build` wires the nodes for one mode into a context and hands back a
//! `SignalGraphHandle` listing exactly what it added. Building never starts
//! playback and never touches nodes outside the handle (beyond feeding the
//! context's destination).
//!
//! Tone modes:
//! ```text
//! left osc ──► merger.in0 ─┐
//!                          ├─► gain ─► [analyser] ─► destination
//! right osc ─► merger.in1 ─┘
//! ```
//! Noise and chant modes:
//! ```text
//! looping buffer source ─► gain ─► [analyser] ─► destination
//! ```

use std::sync::Arc;

use driftconf::AudioConfig;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::context::{AudioContext, ContextError};
use crate::error::EngineError;
use crate::mode::SessionMode;
use crate::noise;
use crate::nodes::{
    AnalyserNode, BufferSourceNode, ChannelMergerNode, GainNode, Meters, OscillatorNode,
    SampleBuffer,
};
use crate::primitives::{BoxedNode, Param};

/// Construction parameters that don't depend on the mode
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSettings {
    pub tone_gain: f32,
    pub noise_gain: f32,
    pub chant_gain: f32,
    pub noise_buffer_seconds: f64,
    pub analyser: bool,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self::from(&AudioConfig::default())
    }
}

impl From<&AudioConfig> for GraphSettings {
    fn from(config: &AudioConfig) -> Self {
        Self {
            tone_gain: config.tone_gain,
            noise_gain: config.noise_gain,
            chant_gain: config.chant_gain,
            noise_buffer_seconds: config.noise_buffer_seconds,
            analyser: config.analyser,
        }
    }
}

/// The live nodes for one mode in one context
#[derive(Debug)]
pub struct SignalGraphHandle {
    context_id: Uuid,
    mode: SessionMode,
    nodes: Vec<Uuid>,
    generators: Vec<Uuid>,
    left: Option<Uuid>,
    right: Option<Uuid>,
    gain: Uuid,
    meters: Option<Arc<Meters>>,
}

impl SignalGraphHandle {
    pub fn mode(&self) -> &SessionMode {
        &self.mode
    }

    pub fn context_id(&self) -> Uuid {
        self.context_id
    }

    /// Every node this handle owns, in build order
    pub fn node_ids(&self) -> &[Uuid] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn generators(&self) -> &[Uuid] {
        &self.generators
    }

    pub fn left(&self) -> Option<Uuid> {
        self.left
    }

    pub fn right(&self) -> Option<Uuid> {
        self.right
    }

    pub fn gain(&self) -> Uuid {
        self.gain
    }

    pub fn meters(&self) -> Option<Arc<Meters>> {
        self.meters.clone()
    }

    /// Current (left, right) oscillator frequencies in tone modes
    pub fn frequencies(&self, ctx: &AudioContext) -> Option<(f64, f64)> {
        let left = ctx.param(self.left?, Param::Frequency)?;
        let right = ctx.param(self.right?, Param::Frequency)?;
        Some((left, right))
    }

    /// Start every generator
    pub fn start(&self, ctx: &AudioContext) -> Result<(), EngineError> {
        for id in &self.generators {
            ctx.start_node(*id)?;
        }
        Ok(())
    }

    /// Move the right oscillator to `carrier + beat_hz`, keeping every node.
    pub(crate) fn retune(&mut self, ctx: &AudioContext, beat_hz: f64) -> Result<(), EngineError> {
        let SessionMode::TonePair { carrier, .. } = self.mode else {
            return Err(EngineError::UnsupportedMode(format!(
                "cannot retune {} mode",
                self.mode
            )));
        };
        let right = self.right.ok_or(EngineError::NotRunning)?;
        ctx.set_param(right, Param::Frequency, carrier.hz() + beat_hz)?;
        self.mode = SessionMode::TonePair { carrier, beat_hz };
        Ok(())
    }

    /// Stop, disconnect and remove every node. Failures are logged and
    /// skipped so one bad node can't strand the rest.
    pub fn teardown(self, ctx: &AudioContext) {
        for id in &self.generators {
            match ctx.stop_node(*id) {
                Ok(()) | Err(ContextError::Closed) => {}
                Err(e) => warn!(node = %id, "failed to stop node: {}", e),
            }
        }
        for id in &self.nodes {
            ctx.disconnect_node(*id);
            ctx.remove_node(*id);
        }
        debug!(context = %self.context_id, nodes = self.nodes.len(), "graph torn down");
    }
}

/// Build the graph for `mode` inside `ctx`. On failure everything added so
/// far is removed again.
pub fn build(
    mode: &SessionMode,
    settings: &GraphSettings,
    ctx: &AudioContext,
) -> Result<SignalGraphHandle, EngineError> {
    mode.validate()?;

    let mut added = Vec::new();
    let result = wire(mode, settings, ctx, &mut added);
    match result {
        Ok(handle) => {
            debug!(context = %ctx.id(), %mode, nodes = handle.node_count(), "graph built");
            Ok(handle)
        }
        Err(e) => {
            for id in &added {
                ctx.disconnect_node(*id);
                ctx.remove_node(*id);
            }
            Err(e)
        }
    }
}

fn wire(
    mode: &SessionMode,
    settings: &GraphSettings,
    ctx: &AudioContext,
    added: &mut Vec<Uuid>,
) -> Result<SignalGraphHandle, EngineError> {
    let mut add = |node: BoxedNode| -> Result<Uuid, EngineError> {
        let id = ctx.add_node(node)?;
        added.push(id);
        Ok(id)
    };

    let (generators, left, right, gain) = match mode {
        SessionMode::TonePair { carrier, beat_hz } => {
            let (l, r) = (carrier.hz(), carrier.hz() + beat_hz);
            wire_tone_pair(&mut add, ctx, l, r, settings.tone_gain)?
        }
        SessionMode::PureTone { frequency_hz } => {
            wire_tone_pair(&mut add, ctx, *frequency_hz, *frequency_hz, settings.tone_gain)?
        }
        SessionMode::Noise { variant } => {
            let buffer = noise::synthesize(
                *variant,
                settings.noise_buffer_seconds,
                ctx.sample_rate(),
            );
            wire_buffer(&mut add, ctx, "noise", Arc::new(buffer), settings.noise_gain)?
        }
        SessionMode::Chant { track } => {
            wire_buffer(&mut add, ctx, "chant", Arc::clone(track), settings.chant_gain)?
        }
    };

    let mut meters = None;
    if settings.analyser {
        let analyser = AnalyserNode::new("analyser");
        meters = Some(analyser.meters());
        let analyser = add(Box::new(analyser))?;
        ctx.connect(gain, "output", analyser, "input")?;
        ctx.connect_to_destination(analyser, "output")?;
    } else {
        ctx.connect_to_destination(gain, "output")?;
    }

    Ok(SignalGraphHandle {
        context_id: ctx.id(),
        mode: mode.clone(),
        nodes: added.clone(),
        generators,
        left,
        right,
        gain,
        meters,
    })
}

type Wired = (Vec<Uuid>, Option<Uuid>, Option<Uuid>, Uuid);

fn wire_tone_pair(
    add: &mut impl FnMut(BoxedNode) -> Result<Uuid, EngineError>,
    ctx: &AudioContext,
    left_hz: f64,
    right_hz: f64,
    gain: f32,
) -> Result<Wired, EngineError> {
    let left = add(Box::new(OscillatorNode::new("left", left_hz)?))?;
    let right = add(Box::new(OscillatorNode::new("right", right_hz)?))?;
    let merger = add(Box::new(ChannelMergerNode::new("merger")))?;
    let gain = add(Box::new(GainNode::new("gain", gain)))?;

    ctx.connect(left, "output", merger, "in0")?;
    ctx.connect(right, "output", merger, "in1")?;
    ctx.connect(merger, "output", gain, "input")?;

    Ok((vec![left, right], Some(left), Some(right), gain))
}

fn wire_buffer(
    add: &mut impl FnMut(BoxedNode) -> Result<Uuid, EngineError>,
    ctx: &AudioContext,
    name: &str,
    buffer: Arc<SampleBuffer>,
    gain: f32,
) -> Result<Wired, EngineError> {
    let source = add(Box::new(BufferSourceNode::new(name, buffer, true)))?;
    let gain = add(Box::new(GainNode::new("gain", gain)))?;
    ctx.connect(source, "output", gain, "input")?;
    Ok((vec![source], None, None, gain))
}
