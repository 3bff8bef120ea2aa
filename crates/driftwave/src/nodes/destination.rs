//! Context output. Whatever reaches this node is what the context plays.

use crate::primitives::{AudioBuffer, Node, NodeDescriptor, NodeError, NodeKind, Port, ProcessContext};

pub struct DestinationNode {
    descriptor: NodeDescriptor,
}

impl DestinationNode {
    pub fn new() -> Self {
        Self {
            descriptor: NodeDescriptor::new("destination", NodeKind::Destination)
                .with_input(Port::new("input", 2))
                .with_output(Port::new("output", 2)),
        }
    }
}

impl Default for DestinationNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for DestinationNode {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        inputs: &[AudioBuffer],
        outputs: &mut [AudioBuffer],
    ) -> Result<(), NodeError> {
        if let (Some(input), Some(out)) = (inputs.first(), outputs.first_mut()) {
            out.clear();
            out.mix(input, 1.0);
        }
        Ok(())
    }
}
