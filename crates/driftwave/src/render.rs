//! Offline rendering
//!
//! Builds a mode's graph in an offline context and pulls it block by block
//! into a 16-bit stereo WAV file. Useful for auditioning modes and for
//! checking the signal path end to end without an audio device.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::context::{ContextRole, OfflineContextFactory};
use crate::error::EngineError;
use crate::manager::{AudioGraphManager, ManagerSettings};
use crate::media::NullMediaSession;
use crate::mode::SessionMode;

/// Frames pulled per render pass
pub const RENDER_BLOCK_FRAMES: usize = 1024;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("wav output failed: {0}")]
    Wav(#[from] hound::Error),

    #[error("render length must be positive, got {0} s")]
    InvalidDuration(f64),
}

/// Summary of a finished render
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RenderStats {
    pub frames: usize,
    pub sample_rate: u32,
    pub peak: f32,
    pub rms: f32,
}

/// Render `seconds` of `mode` to `path`
pub async fn render_to_wav(
    mode: &SessionMode,
    seconds: f64,
    sample_rate: u32,
    settings: ManagerSettings,
    path: impl AsRef<Path>,
) -> Result<RenderStats, RenderError> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(RenderError::InvalidDuration(seconds));
    }

    let factory = Arc::new(OfflineContextFactory::new(sample_rate));
    let manager = AudioGraphManager::new(
        ContextRole::Foreground,
        factory,
        Arc::new(NullMediaSession),
        settings,
    );
    render_with(&manager, mode, seconds, sample_rate, path.as_ref()).await
}

/// Start `mode` on `manager`, write the file, and stop the manager whether
/// or not the write succeeded.
async fn render_with(
    manager: &AudioGraphManager,
    mode: &SessionMode,
    seconds: f64,
    sample_rate: u32,
    path: &Path,
) -> Result<RenderStats, RenderError> {
    let result = match manager.start(mode).await {
        Ok(_) => write_wav(manager, seconds, sample_rate, path),
        Err(e) => Err(e.into()),
    };
    manager.stop().await;

    let stats = result?;
    info!(%mode, frames = stats.frames, path = %path.display(), "rendered");
    Ok(stats)
}

fn write_wav(
    manager: &AudioGraphManager,
    seconds: f64,
    sample_rate: u32,
    path: &Path,
) -> Result<RenderStats, RenderError> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;

    let total = (seconds * sample_rate as f64).round() as usize;
    let mut written = 0;
    let mut peak = 0.0f32;
    let mut sum_squares = 0.0f64;

    while written < total {
        let frames = RENDER_BLOCK_FRAMES.min(total - written);
        let output = manager.render(frames)?;

        for &sample in &output.samples {
            peak = peak.max(sample.abs());
            sum_squares += (sample as f64) * (sample as f64);
            let int_sample = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(int_sample)?;
        }
        written += frames;
    }

    writer.finalize()?;

    let rms = if total == 0 {
        0.0
    } else {
        (sum_squares / (total * 2) as f64).sqrt() as f32
    };

    Ok(RenderStats {
        frames: total,
        sample_rate,
        peak,
        rms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_zero_length() {
        let dir = tempfile::tempdir().unwrap();
        let err = render_to_wav(
            &SessionMode::tone_pair(10.0),
            0.0,
            8000,
            ManagerSettings::default(),
            dir.path().join("out.wav"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RenderError::InvalidDuration(_)));
    }

    #[tokio::test]
    async fn test_tone_render_writes_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alpha.wav");
        let stats = render_to_wav(
            &SessionMode::tone_pair(10.0),
            0.5,
            8000,
            ManagerSettings::default(),
            &path,
        )
        .await
        .unwrap();

        assert_eq!(stats.frames, 4000);
        assert!(stats.peak > 0.0);

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.len(), 8000);
    }

    #[tokio::test]
    async fn test_unwritable_path_still_closes_context() {
        let dir = tempfile::tempdir().unwrap();
        let factory = Arc::new(OfflineContextFactory::new(8000));
        let manager = AudioGraphManager::new(
            ContextRole::Foreground,
            factory.clone(),
            Arc::new(NullMediaSession),
            ManagerSettings::default(),
        );

        let path = dir.path().join("missing").join("out.wav");
        let err = render_with(&manager, &SessionMode::tone_pair(10.0), 0.5, 8000, &path)
            .await
            .unwrap_err();

        assert!(matches!(err, RenderError::Wav(_)));
        assert!(manager.context().is_none());
        assert_eq!(factory.registry().open_count(), 0);
    }
}
