//! Linear gain stage.

use crate::primitives::{
    AudioBuffer, Node, NodeDescriptor, NodeError, NodeKind, Param, Port, ProcessContext,
};

pub struct GainNode {
    descriptor: NodeDescriptor,
    gain: f32,
}

impl GainNode {
    pub fn new(name: impl Into<String>, gain: f32) -> Self {
        Self {
            descriptor: NodeDescriptor::new(name, NodeKind::Gain)
                .with_input(Port::new("input", 2))
                .with_output(Port::new("output", 2)),
            gain,
        }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }
}

impl Node for GainNode {
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
        if let Some(input) = inputs.first() {
            out.mix(input, self.gain);
        }
        Ok(())
    }

    fn set_param(&mut self, param: Param, value: f64) -> Result<(), NodeError> {
        match param {
            Param::Gain if value.is_finite() && value >= 0.0 => {
                self.gain = value as f32;
                Ok(())
            }
            Param::Gain => Err(NodeError::InvalidValue { param, value }),
            other => Err(NodeError::UnknownParam {
                kind: self.descriptor.kind,
                param: other,
            }),
        }
    }

    fn param(&self, param: Param) -> Option<f64> {
        (param == Param::Gain).then_some(self.gain as f64)
    }
}
