//! Audio processing nodes
//!
//! Concrete node implementations used by the signal graph builder.

mod analyser;
mod buffer_source;
mod destination;
mod gain;
mod merger;
mod oscillator;

pub use analyser::{AnalyserNode, Meters};
pub use buffer_source::{decode_wav, BufferSourceNode, SampleBuffer};
pub use destination::DestinationNode;
pub use gain::GainNode;
pub use merger::ChannelMergerNode;
pub use oscillator::OscillatorNode;
