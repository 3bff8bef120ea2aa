//! Two-input channel merger: `in0` becomes the left channel, `in1` the right.

use crate::primitives::{AudioBuffer, Node, NodeDescriptor, NodeError, NodeKind, Port, ProcessContext};

pub struct ChannelMergerNode {
    descriptor: NodeDescriptor,
}

impl ChannelMergerNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            descriptor: NodeDescriptor::new(name, NodeKind::ChannelMerger)
                .with_input(Port::new("in0", 1))
                .with_input(Port::new("in1", 1))
                .with_output(Port::new("output", 2)),
        }
    }
}

impl Node for ChannelMergerNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        inputs: &[AudioBuffer],
        outputs: &mut [AudioBuffer],
    ) -> Result<(), NodeError> {
        let Some(out) = outputs.first_mut() else {
            return Err(NodeError::Failed("no output buffer".to_string()));
        };
        out.clear();

        let channels = out.channels as usize;
        for (ch, input) in inputs.iter().enumerate().take(channels) {
            for (frame, sample) in input.samples.iter().enumerate() {
                if let Some(slot) = out.samples.get_mut(frame * channels + ch) {
                    *slot = *sample;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaves_inputs() {
        let mut merger = ChannelMergerNode::new("merge");
        let left = AudioBuffer {
            samples: vec![1.0, 2.0],
            channels: 1,
        };
        let right = AudioBuffer {
            samples: vec![-1.0, -2.0],
            channels: 1,
        };
        let mut out = vec![AudioBuffer::new(2, 2)];
        let ctx = ProcessContext {
            sample_rate: 44100,
            buffer_size: 2,
        };

        merger.process(&ctx, &[left, right], &mut out).unwrap();
        assert_eq!(out[0].samples, vec![1.0, -1.0, 2.0, -2.0]);
    }
}
