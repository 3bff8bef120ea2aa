//! Looping buffer playback node
//!
//! Plays a pre-rendered sample buffer (generated noise or a decoded chant
//! track). Key points:
//! - Buffers are decoded or synthesized before the node is built, never in
//!   the render path
//! - Mono buffers are duplicated to both output channels
//! - A non-looping source outputs silence once it runs out, it doesn't fail
//! - Samples are played at the buffer's own rate; no resampling

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::primitives::{
    transition_playback, AudioBuffer, Node, NodeDescriptor, NodeError, NodeKind, PlaybackState,
    Port, ProcessContext,
};

/// Decoded or synthesized audio ready for playback
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    /// Interleaved samples (L, R, L, R, ...)
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u8,
}

impl SampleBuffer {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Total number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Load a WAV file from disk
    pub fn from_wav_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let decoded = decode_wav(&data).with_context(|| format!("failed to decode {}", path.display()))?;
        tracing::debug!(
            path = %path.display(),
            frames = decoded.frames(),
            sample_rate = decoded.sample_rate,
            channels = decoded.channels,
            "track loaded"
        );
        Ok(decoded)
    }
}

/// Decode WAV audio using hound, normalising integer PCM to [-1, 1]
pub fn decode_wav(data: &[u8]) -> Result<SampleBuffer> {
    let cursor = Cursor::new(data);
    let reader = hound::WavReader::new(cursor).context("failed to parse WAV header")?;

    let spec = reader.spec();
    let channels = spec.channels as u8;
    let sample_rate = spec.sample_rate;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read float samples")?,
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            let max_val = (1i64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()
                .context("failed to read int samples")?
        }
    };

    Ok(SampleBuffer {
        samples,
        sample_rate,
        channels,
    })
}

/// Plays a shared sample buffer, optionally looping forever
pub struct BufferSourceNode {
    descriptor: NodeDescriptor,
    buffer: Arc<SampleBuffer>,

    /// Current playhead position (in frames, not samples)
    playhead: usize,

    looping: bool,
    state: PlaybackState,
}

impl BufferSourceNode {
    pub fn new(name: impl Into<String>, buffer: Arc<SampleBuffer>, looping: bool) -> Self {
        Self {
            descriptor: NodeDescriptor::new(name, NodeKind::BufferSource)
                .with_output(Port::new("output", 2)),
            buffer,
            playhead: 0,
            looping,
            state: PlaybackState::Idle,
        }
    }

    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        &self.buffer
    }

    pub fn playhead(&self) -> usize {
        self.playhead
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Check if playback has reached the end of the buffer (non-looping)
    pub fn is_finished(&self) -> bool {
        !self.looping && self.playhead >= self.buffer.frames()
    }
}

impl Node for BufferSourceNode {
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

        let audio = &self.buffer;
        let total_frames = audio.frames();
        if total_frames == 0 {
            return Ok(());
        }

        let frames_to_write = ctx.buffer_size.min(out.frames());
        let out_channels = out.channels as usize;
        let src_channels = audio.channels as usize;

        let mut frame_idx = 0;
        while frame_idx < frames_to_write {
            if self.playhead >= total_frames {
                if self.looping {
                    self.playhead = 0;
                } else {
                    break;
                }
            }

            let frames_available = total_frames - self.playhead;
            let frames_remaining = frames_to_write - frame_idx;
            let frames_to_copy = frames_available.min(frames_remaining);

            for f in 0..frames_to_copy {
                let src_frame = self.playhead + f;
                let dst_frame = frame_idx + f;

                for out_ch in 0..out_channels {
                    let src_ch = if src_channels == 1 {
                        0
                    } else {
                        out_ch % src_channels
                    };
                    out.samples[dst_frame * out_channels + out_ch] =
                        audio.samples[src_frame * src_channels + src_ch];
                }
            }

            self.playhead += frames_to_copy;
            frame_idx += frames_to_copy;
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
}
