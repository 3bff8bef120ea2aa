//! Session and telemetry configuration.

use serde::{Deserialize, Serialize};

/// Session timing and lifecycle policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session length used until the UI sets one. `0` means open-ended
    /// (count-up, never completes).
    /// Default: 900 (15 minutes)
    pub default_duration_seconds: u64,

    /// How often the session timer posts a tick to the controller.
    /// Default: 250
    pub tick_interval_ms: u64,

    /// Recreate the foreground context on a graph rebuild once it is older
    /// than this. Absent disables the policy.
    /// Default: none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_context_age_seconds: Option<u64>,

    /// Keep the selected mode after a session ends so `play` can restart it.
    /// Default: true
    pub retain_mode_on_end: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_duration_seconds: 900,
            tick_interval_ms: 250,
            max_context_age_seconds: None,
            retain_mode_on_end: true,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `tracing_subscriber::EnvFilter` directive string.
    /// Default: "info"
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
