//! Session mode vocabulary
//!
//! Modes are a closed enum so graph construction matches exhaustively.
//! The compact string form (`tone:10`, `tone:10@productivity`, `pure:432`,
//! `noise:pink`, `chant`) is what the CLI and snapshots use.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use driftconf::{AudioConfig, CarrierName};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::nodes::SampleBuffer;

pub const MIN_BEAT_HZ: f64 = 1.0;
pub const MAX_BEAT_HZ: f64 = 40.0;

/// Carrier tone for tone-pair sessions. The left ear hears the carrier.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CarrierPreset {
    /// 200 Hz
    #[default]
    Ambient,
    /// 250 Hz
    Productivity,
    Custom(f64),
}

impl CarrierPreset {
    pub fn hz(&self) -> f64 {
        match self {
            CarrierPreset::Ambient => 200.0,
            CarrierPreset::Productivity => 250.0,
            CarrierPreset::Custom(hz) => *hz,
        }
    }

    pub fn from_config(config: &AudioConfig) -> Self {
        match config.carrier {
            CarrierName::Ambient => CarrierPreset::Ambient,
            CarrierName::Productivity => CarrierPreset::Productivity,
            CarrierName::Custom => CarrierPreset::Custom(config.custom_carrier_hz),
        }
    }
}

/// Named noise colours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseVariant {
    White,
    Pink,
    Brown,
    Green,
    Blue,
    Violet,
    Gray,
    Rain,
}

impl NoiseVariant {
    pub const ALL: [NoiseVariant; 8] = [
        NoiseVariant::White,
        NoiseVariant::Pink,
        NoiseVariant::Brown,
        NoiseVariant::Green,
        NoiseVariant::Blue,
        NoiseVariant::Violet,
        NoiseVariant::Gray,
        NoiseVariant::Rain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NoiseVariant::White => "white",
            NoiseVariant::Pink => "pink",
            NoiseVariant::Brown => "brown",
            NoiseVariant::Green => "green",
            NoiseVariant::Blue => "blue",
            NoiseVariant::Violet => "violet",
            NoiseVariant::Gray => "gray",
            NoiseVariant::Rain => "rain",
        }
    }

    fn title(&self) -> &'static str {
        match self {
            NoiseVariant::White => "White",
            NoiseVariant::Pink => "Pink",
            NoiseVariant::Brown => "Brown",
            NoiseVariant::Green => "Green",
            NoiseVariant::Blue => "Blue",
            NoiseVariant::Violet => "Violet",
            NoiseVariant::Gray => "Gray",
            NoiseVariant::Rain => "Rain",
        }
    }
}

impl FromStr for NoiseVariant {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        let wanted = if wanted == "grey" { "gray".to_string() } else { wanted };
        NoiseVariant::ALL
            .into_iter()
            .find(|v| v.as_str() == wanted)
            .ok_or_else(|| EngineError::UnsupportedMode(format!("unknown noise variant '{}'", s)))
    }
}

/// Brainwave band a beat frequency entrains toward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BrainwaveBand {
    Delta,
    Theta,
    Alpha,
    Beta,
}

impl BrainwaveBand {
    pub fn classify(beat_hz: f64) -> Self {
        if beat_hz <= 4.0 {
            BrainwaveBand::Delta
        } else if beat_hz <= 8.0 {
            BrainwaveBand::Theta
        } else if beat_hz <= 13.0 {
            BrainwaveBand::Alpha
        } else {
            BrainwaveBand::Beta
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BrainwaveBand::Delta => "Delta",
            BrainwaveBand::Theta => "Theta",
            BrainwaveBand::Alpha => "Alpha",
            BrainwaveBand::Beta => "Beta",
        }
    }
}

/// What a session plays
#[derive(Debug, Clone)]
pub enum SessionMode {
    /// Left ear at the carrier, right ear at carrier + beat
    TonePair { carrier: CarrierPreset, beat_hz: f64 },
    /// Both ears at one frequency; no binaural beat
    PureTone { frequency_hz: f64 },
    Noise { variant: NoiseVariant },
    Chant { track: Arc<SampleBuffer> },
}

impl SessionMode {
    /// Tone pair on the ambient carrier
    pub fn tone_pair(beat_hz: f64) -> Self {
        SessionMode::TonePair {
            carrier: CarrierPreset::Ambient,
            beat_hz,
        }
    }

    pub fn noise(variant: NoiseVariant) -> Self {
        SessionMode::Noise { variant }
    }

    /// Parse the compact string form. `carrier` applies to `tone:` modes
    /// without an explicit `@carrier`; `track` supplies the audio for `chant`.
    pub fn parse(
        s: &str,
        carrier: CarrierPreset,
        track: Option<Arc<SampleBuffer>>,
    ) -> Result<Self, EngineError> {
        let s = s.trim();
        let (tag, arg) = match s.split_once(':') {
            Some((tag, arg)) => (tag, Some(arg)),
            None => (s, None),
        };

        let mode = match (tag.to_ascii_lowercase().as_str(), arg) {
            ("tone", Some(arg)) => {
                let (beat, carrier) = match arg.split_once('@') {
                    Some((beat, name)) => (beat, parse_carrier(name)?),
                    None => (arg, carrier),
                };
                SessionMode::TonePair {
                    carrier,
                    beat_hz: parse_hz(beat)?,
                }
            }
            ("pure", Some(arg)) => SessionMode::PureTone {
                frequency_hz: parse_hz(arg)?,
            },
            ("noise", Some(arg)) => SessionMode::Noise {
                variant: arg.parse()?,
            },
            ("noise", None) => SessionMode::noise(NoiseVariant::White),
            ("chant", None) => match track {
                Some(track) => SessionMode::Chant { track },
                None => {
                    return Err(EngineError::UnsupportedMode(
                        "chant mode needs a track".to_string(),
                    ))
                }
            },
            _ => return Err(EngineError::UnsupportedMode(s.to_string())),
        };

        mode.validate()?;
        Ok(mode)
    }

    /// Reject parameter combinations the graph builder cannot honour
    pub fn validate(&self) -> Result<(), EngineError> {
        match self {
            SessionMode::TonePair { carrier, beat_hz } => {
                let carrier_hz = carrier.hz();
                if !carrier_hz.is_finite() || carrier_hz <= 0.0 {
                    return Err(EngineError::InvalidFrequency(carrier_hz));
                }
                validate_beat(*beat_hz)
            }
            SessionMode::PureTone { frequency_hz } => {
                if frequency_hz.is_finite() && *frequency_hz > 0.0 {
                    Ok(())
                } else {
                    Err(EngineError::InvalidFrequency(*frequency_hz))
                }
            }
            SessionMode::Noise { .. } => Ok(()),
            SessionMode::Chant { track } => {
                if track.is_empty() {
                    Err(EngineError::UnsupportedMode("chant track is empty".to_string()))
                } else {
                    Ok(())
                }
            }
        }
    }

    pub fn beat_frequency(&self) -> Option<f64> {
        match self {
            SessionMode::TonePair { beat_hz, .. } => Some(*beat_hz),
            _ => None,
        }
    }

    pub fn noise_variant(&self) -> Option<NoiseVariant> {
        match self {
            SessionMode::Noise { variant } => Some(*variant),
            _ => None,
        }
    }

    pub fn band(&self) -> Option<BrainwaveBand> {
        self.beat_frequency().map(BrainwaveBand::classify)
    }

    /// Human title, e.g. "Alpha Binaural Beats - 10 Hz"
    pub fn title(&self) -> String {
        match self {
            SessionMode::TonePair { beat_hz, .. } => format!(
                "{} Binaural Beats - {} Hz",
                BrainwaveBand::classify(*beat_hz).as_str(),
                beat_hz
            ),
            SessionMode::PureTone { frequency_hz } => format!("Pure Tone - {} Hz", frequency_hz),
            SessionMode::Noise { variant } => format!("{} Noise", variant.title()),
            SessionMode::Chant { .. } => "Chant".to_string(),
        }
    }

    /// Category label encoding the mode and its band or variant
    pub fn category(&self) -> String {
        match self {
            SessionMode::TonePair { beat_hz, .. } => format!(
                "Binaural Beats ({})",
                BrainwaveBand::classify(*beat_hz).as_str()
            ),
            SessionMode::PureTone { .. } => "Pure Tone".to_string(),
            SessionMode::Noise { variant } => format!("Ambient Noise ({})", variant.title()),
            SessionMode::Chant { .. } => "Chant".to_string(),
        }
    }
}

/// Chant tracks compare by identity; everything else by value.
impl PartialEq for SessionMode {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                SessionMode::TonePair { carrier, beat_hz },
                SessionMode::TonePair {
                    carrier: c2,
                    beat_hz: b2,
                },
            ) => carrier.hz() == c2.hz() && beat_hz == b2,
            (
                SessionMode::PureTone { frequency_hz },
                SessionMode::PureTone { frequency_hz: f2 },
            ) => frequency_hz == f2,
            (SessionMode::Noise { variant }, SessionMode::Noise { variant: v2 }) => variant == v2,
            (SessionMode::Chant { track }, SessionMode::Chant { track: t2 }) => Arc::ptr_eq(track, t2),
            _ => false,
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::TonePair { carrier, beat_hz } => match carrier {
                CarrierPreset::Ambient => write!(f, "tone:{}", beat_hz),
                CarrierPreset::Productivity => write!(f, "tone:{}@productivity", beat_hz),
                CarrierPreset::Custom(hz) => write!(f, "tone:{}@{}", beat_hz, hz),
            },
            SessionMode::PureTone { frequency_hz } => write!(f, "pure:{}", frequency_hz),
            SessionMode::Noise { variant } => write!(f, "noise:{}", variant.as_str()),
            SessionMode::Chant { .. } => write!(f, "chant"),
        }
    }
}

impl FromStr for SessionMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SessionMode::parse(s, CarrierPreset::Ambient, None)
    }
}

pub fn validate_beat(beat_hz: f64) -> Result<(), EngineError> {
    if (MIN_BEAT_HZ..=MAX_BEAT_HZ).contains(&beat_hz) {
        Ok(())
    } else {
        Err(EngineError::InvalidFrequency(beat_hz))
    }
}

fn parse_hz(value: &str) -> Result<f64, EngineError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| EngineError::UnsupportedMode(format!("'{}' is not a frequency", value)))
}

fn parse_carrier(value: &str) -> Result<CarrierPreset, EngineError> {
    if let Some(name) = CarrierName::parse(value) {
        return match name {
            CarrierName::Ambient => Ok(CarrierPreset::Ambient),
            CarrierName::Productivity => Ok(CarrierPreset::Productivity),
            CarrierName::Custom => Err(EngineError::UnsupportedMode(
                "custom carrier needs a frequency, e.g. tone:10@180".to_string(),
            )),
        };
    }
    parse_hz(value).map(CarrierPreset::Custom)
}
