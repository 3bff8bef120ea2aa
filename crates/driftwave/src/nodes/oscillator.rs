//! Sine oscillator
//!
//! Phase-continuous: changing the frequency while playing keeps the phase
//! accumulator, so a retune never clicks or restarts the waveform.

use std::f64::consts::TAU;

use crate::primitives::{
    transition_playback, AudioBuffer, Node, NodeDescriptor, NodeError, NodeKind, Param,
    PlaybackState, Port, ProcessContext,
};

pub struct OscillatorNode {
    descriptor: NodeDescriptor,
    frequency: f64,
    phase: f64,
    state: PlaybackState,
}

impl OscillatorNode {
    pub fn new(name: impl Into<String>, frequency: f64) -> Result<Self, NodeError> {
        validate_frequency(frequency)?;
        Ok(Self {
            descriptor: NodeDescriptor::new(name, NodeKind::Oscillator)
                .with_output(Port::new("output", 1)),
            frequency,
            phase: 0.0,
            state: PlaybackState::Idle,
        })
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }
}

fn validate_frequency(frequency: f64) -> Result<(), NodeError> {
    if frequency.is_finite() && frequency > 0.0 {
        Ok(())
    } else {
        Err(NodeError::InvalidValue {
            param: Param::Frequency,
            value: frequency,
        })
    }
}

impl Node for OscillatorNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    fn process(
        &mut self,
        ctx: &ProcessContext,
        _inputs: &[AudioBuffer],
        outputs: &mut [AudioBuffer],
    ) -> Result<(), NodeError> {
        let Some(out) = outputs.first_mut() else {
            return Err(NodeError::Failed("no output buffer".to_string()));
        };
        out.clear();

        if self.state != PlaybackState::Playing {
            return Ok(());
        }

        let step = TAU * self.frequency / ctx.sample_rate as f64;
        for sample in out.samples.iter_mut() {
            *sample = self.phase.sin() as f32;
            self.phase = (self.phase + step) % TAU;
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), NodeError> {
        transition_playback(self.descriptor.kind, &mut self.state, PlaybackState::Playing)
    }

    fn stop(&mut self) -> Result<(), NodeError> {
        transition_playback(self.descriptor.kind, &mut self.state, PlaybackState::Stopped)
    }

    fn playback_state(&self) -> Option<PlaybackState> {
        Some(self.state)
    }

    fn set_param(&mut self, param: Param, value: f64) -> Result<(), NodeError> {
        match param {
            Param::Frequency => {
                validate_frequency(value)?;
                self.frequency = value;
                Ok(())
            }
            other => Err(NodeError::UnknownParam {
                kind: self.descriptor.kind,
                param: other,
            }),
        }
    }

    fn param(&self, param: Param) -> Option<f64> {
        (param == Param::Frequency).then_some(self.frequency)
    }
}
