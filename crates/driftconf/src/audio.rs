//! Audio configuration - sample rate, carrier preset, and stage gains.

use serde::{Deserialize, Serialize};

/// Named carrier presets for tone-pair sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CarrierName {
    /// 200 Hz, used by the ambient-beats experience.
    #[default]
    Ambient,
    /// 250 Hz, used by the productivity profile.
    Productivity,
    /// Uses `custom_carrier_hz`.
    Custom,
}

impl CarrierName {
    pub fn as_str(&self) -> &'static str {
        match self {
            CarrierName::Ambient => "ambient",
            CarrierName::Productivity => "productivity",
            CarrierName::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ambient" => Some(CarrierName::Ambient),
            "productivity" => Some(CarrierName::Productivity),
            "custom" => Some(CarrierName::Custom),
            _ => None,
        }
    }
}

/// Settings for signal graph construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Rendering sample rate for new processing contexts.
    /// Default: 44100
    pub sample_rate: u32,

    /// Carrier preset for tone-pair mode.
    /// Default: ambient
    pub carrier: CarrierName,

    /// Carrier frequency when `carrier = "custom"`.
    /// Default: 200.0
    pub custom_carrier_hz: f64,

    /// Linear gain applied after the channel merge in tone modes.
    /// Default: 0.25
    pub tone_gain: f32,

    /// Linear gain applied to the generated noise loop.
    /// Default: 0.15
    pub noise_gain: f32,

    /// Linear gain applied to the chant track. Recordings sit well below
    /// full scale, unlike the normalised noise loop.
    /// Default: 0.6
    pub chant_gain: f32,

    /// Length of the generated noise loop. Must be at least one second.
    /// Default: 4.0
    pub noise_buffer_seconds: f64,

    /// Insert an analysis tap before the destination.
    /// Default: false
    pub analyser: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            carrier: CarrierName::Ambient,
            custom_carrier_hz: 200.0,
            tone_gain: 0.25,
            noise_gain: 0.15,
            chant_gain: 0.6,
            noise_buffer_seconds: 4.0,
            analyser: false,
        }
    }
}
