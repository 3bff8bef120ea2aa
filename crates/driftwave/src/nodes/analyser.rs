//! Analysis tap
//!
//! Passes audio through unchanged and publishes block RMS and peak levels
//! through lock-free meters that a UI thread can poll.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use portable_atomic::AtomicF32;

use crate::primitives::{AudioBuffer, Node, NodeDescriptor, NodeError, NodeKind, Port, ProcessContext};

/// Most recent block levels
#[derive(Debug, Default)]
pub struct Meters {
    rms: AtomicF32,
    peak: AtomicF32,
}

impl Meters {
    pub fn rms(&self) -> f32 {
        self.rms.load(Ordering::Relaxed)
    }

    pub fn peak(&self) -> f32 {
        self.peak.load(Ordering::Relaxed)
    }

    fn record(&self, buffer: &AudioBuffer) {
        self.rms.store(buffer.rms(), Ordering::Relaxed);
        self.peak.store(buffer.peak(), Ordering::Relaxed);
    }
}

pub struct AnalyserNode {
    descriptor: NodeDescriptor,
    meters: Arc<Meters>,
}

impl AnalyserNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            descriptor: NodeDescriptor::new(name, NodeKind::Analyser)
                .with_input(Port::new("input", 2))
                .with_output(Port::new("output", 2)),
            meters: Arc::new(Meters::default()),
        }
    }

    pub fn meters(&self) -> Arc<Meters> {
        Arc::clone(&self.meters)
    }
}

impl Node for AnalyserNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        inputs: &[AudioBuffer],
        outputs: &mut [AudioBuffer],
    ) -> Result<(), NodeError> {
        let (Some(input), Some(out)) = (inputs.first(), outputs.first_mut()) else {
            return Err(NodeError::Failed("analyser needs one input and one output".to_string()));
        };
        out.clear();
        out.mix(input, 1.0);
        self.meters.record(out);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_through_updates_meters() {
        let mut analyser = AnalyserNode::new("tap");
        let meters = analyser.meters();
        let input = AudioBuffer {
            samples: vec![0.5, -0.5, 0.5, -0.5],
            channels: 2,
        };
        let mut out = vec![AudioBuffer::new(2, 2)];
        let ctx = ProcessContext {
            sample_rate: 44100,
            buffer_size: 2,
        };

        analyser.process(&ctx, &[input.clone()], &mut out).unwrap();
        assert_eq!(out[0], input);
        assert!((meters.peak() - 0.5).abs() < 1e-6);
        assert!((meters.rms() - 0.5).abs() < 1e-6);
    }
}
