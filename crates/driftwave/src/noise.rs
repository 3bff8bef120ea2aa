//! Noise synthesis
//!
//! Generates the looping mono buffer used by noise mode. White noise is
//! independent uniform samples in [-1, 1]. Pink, brown, blue and violet are
//! shaped from that white source and normalised back to full scale. Green,
//! gray and rain have no agreed spectral definition and render as white.

use rand::Rng;
use tracing::debug;

use crate::mode::NoiseVariant;
use crate::nodes::SampleBuffer;

/// Shortest loop ever produced, whatever the caller asks for
pub const MIN_BUFFER_SECONDS: f64 = 1.0;

/// Synthesize a noise loop using the thread-local RNG
pub fn synthesize(variant: NoiseVariant, duration_seconds: f64, sample_rate: u32) -> SampleBuffer {
    synthesize_with(&mut rand::rng(), variant, duration_seconds, sample_rate)
}

/// Synthesize a noise loop from a caller-supplied RNG
pub fn synthesize_with<R: Rng>(
    rng: &mut R,
    variant: NoiseVariant,
    duration_seconds: f64,
    sample_rate: u32,
) -> SampleBuffer {
    let seconds = if duration_seconds.is_finite() {
        duration_seconds.max(MIN_BUFFER_SECONDS)
    } else {
        MIN_BUFFER_SECONDS
    };
    let len = (seconds * sample_rate as f64).ceil() as usize;
    let white: Vec<f32> = (0..len).map(|_| rng.random_range(-1.0f32..=1.0)).collect();

    let samples = match variant {
        NoiseVariant::White => white,
        NoiseVariant::Pink => normalize(pink(&white)),
        NoiseVariant::Brown => normalize(brown(&white)),
        NoiseVariant::Blue => normalize(differentiate(&pink(&white))),
        NoiseVariant::Violet => normalize(differentiate(&white)),
        NoiseVariant::Green | NoiseVariant::Gray | NoiseVariant::Rain => {
            debug!(variant = variant.as_str(), "no spectral shaping defined, using white noise");
            white
        }
    };

    SampleBuffer::mono(samples, sample_rate)
}

/// Paul Kellet's refined pink filter (-3 dB/octave)
fn pink(white: &[f32]) -> Vec<f32> {
    let (mut b0, mut b1, mut b2, mut b3, mut b4, mut b5, mut b6) =
        (0.0f32, 0.0f32, 0.0f32, 0.0f32, 0.0f32, 0.0f32, 0.0f32);
    white
        .iter()
        .map(|&w| {
            b0 = 0.99886 * b0 + w * 0.0555179;
            b1 = 0.99332 * b1 + w * 0.0750759;
            b2 = 0.96900 * b2 + w * 0.1538520;
            b3 = 0.86650 * b3 + w * 0.3104856;
            b4 = 0.55000 * b4 + w * 0.5329522;
            b5 = -0.7616 * b5 - w * 0.0168980;
            let out = b0 + b1 + b2 + b3 + b4 + b5 + b6 + w * 0.5362;
            b6 = w * 0.115926;
            out
        })
        .collect()
}

/// Leaky integrator (-6 dB/octave)
fn brown(white: &[f32]) -> Vec<f32> {
    let mut last = 0.0f32;
    white
        .iter()
        .map(|&w| {
            last = (last + 0.02 * w) / 1.02;
            last
        })
        .collect()
}

/// First difference (+6 dB/octave)
fn differentiate(input: &[f32]) -> Vec<f32> {
    let mut prev = 0.0f32;
    input
        .iter()
        .map(|&x| {
            let out = x - prev;
            prev = x;
            out
        })
        .collect()
}

fn normalize(mut samples: Vec<f32>) -> Vec<f32> {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak > 0.0 {
        samples.iter_mut().for_each(|s| *s /= peak);
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const RATE: u32 = 44100;

    fn seeded(variant: NoiseVariant) -> SampleBuffer {
        synthesize_with(&mut StdRng::seed_from_u64(7), variant, 1.0, RATE)
    }

    /// Lag-one autocorrelation: near 0 for white, near 1 for heavily
    /// low-passed noise, negative for high-passed noise.
    fn lag_one(samples: &[f32]) -> f64 {
        let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / samples.len() as f64;
        let centered: Vec<f64> = samples.iter().map(|&s| s as f64 - mean).collect();
        let var: f64 = centered.iter().map(|x| x * x).sum();
        let cov: f64 = centered.windows(2).map(|w| w[0] * w[1]).sum();
        cov / var
    }

    #[test]
    fn test_white_is_uniform_in_range() {
        let buffer = seeded(NoiseVariant::White);
        assert_eq!(buffer.channels, 1);
        assert_eq!(buffer.frames(), RATE as usize);
        assert!(buffer.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
        assert!(lag_one(&buffer.samples).abs() < 0.05);

        let mean: f32 = buffer.samples.iter().sum::<f32>() / buffer.samples.len() as f32;
        assert!(mean.abs() < 0.05);
    }

    #[test]
    fn test_buffer_is_at_least_one_second() {
        let buffer = synthesize(NoiseVariant::White, 0.25, 8000);
        assert_eq!(buffer.frames(), 8000);
        let buffer = synthesize(NoiseVariant::White, f64::NAN, 8000);
        assert_eq!(buffer.frames(), 8000);
        let buffer = synthesize(NoiseVariant::Pink, 2.5, 8000);
        assert_eq!(buffer.frames(), 20000);
        assert_eq!(buffer.duration_seconds(), 2.5);
    }

    #[test]
    fn test_shaped_variants_stay_in_range() {
        for variant in [
            NoiseVariant::Pink,
            NoiseVariant::Brown,
            NoiseVariant::Blue,
            NoiseVariant::Violet,
        ] {
            let buffer = seeded(variant);
            let peak = buffer.samples.iter().fold(0.0f32, |a, s| a.max(s.abs()));
            assert!((peak - 1.0).abs() < 1e-5, "{variant:?} peak {peak}");
        }
    }

    #[test]
    fn test_spectral_tilt() {
        let pink = lag_one(&seeded(NoiseVariant::Pink).samples);
        let brown = lag_one(&seeded(NoiseVariant::Brown).samples);
        let blue = lag_one(&seeded(NoiseVariant::Blue).samples);
        let violet = lag_one(&seeded(NoiseVariant::Violet).samples);

        assert!(brown > 0.9, "brown {brown}");
        assert!(pink > 0.3, "pink {pink}");
        assert!(brown > pink);
        assert!(blue < pink, "blue {blue} pink {pink}");
        assert!(violet < -0.3, "violet {violet}");
    }

    #[test]
    fn test_unshaped_variants_match_white() {
        let white = seeded(NoiseVariant::White);
        for variant in [NoiseVariant::Green, NoiseVariant::Gray, NoiseVariant::Rain] {
            assert_eq!(seeded(variant), white);
        }
    }
}
