//! Config file discovery, loading, and environment variable overlay.

use crate::{CarrierName, ConfigError, DriftConfig};
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/driftwave/config.toml");
    if system.exists() {
        files.push(system);
    }

    // User config (XDG_CONFIG_HOME or ~/.config)
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("driftwave/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("driftwave.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file into a raw table.
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_table(&contents, path)
}

fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    contents
        .parse()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Merge `overlay` into `base`. Nested tables merge key by key; any other
/// value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        let toml::Value::Table(incoming) = value else {
            base.insert(key, value);
            continue;
        };

        if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
            merge_tables(existing, incoming);
            continue;
        }
        base.insert(key, toml::Value::Table(incoming));
    }
}

/// Apply environment variable overrides to config.
///
/// `env` looks up a variable by name; production passes `std::env::var`.
pub fn apply_env_overrides(
    config: &mut DriftConfig,
    sources: &mut ConfigSources,
    env: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(v) = env("DRIFTWAVE_SAMPLE_RATE") {
        config.audio.sample_rate = parse_env("DRIFTWAVE_SAMPLE_RATE", "audio.sample_rate", &v)?;
        sources.env_overrides.push("DRIFTWAVE_SAMPLE_RATE".to_string());
    }
    if let Some(v) = env("DRIFTWAVE_CARRIER") {
        config.audio.carrier = CarrierName::parse(&v).ok_or_else(|| ConfigError::Invalid {
            field: "audio.carrier",
            message: format!("DRIFTWAVE_CARRIER={v} is not ambient, productivity or custom"),
        })?;
        sources.env_overrides.push("DRIFTWAVE_CARRIER".to_string());
    }
    if let Some(v) = env("DRIFTWAVE_CUSTOM_CARRIER_HZ") {
        config.audio.custom_carrier_hz =
            parse_env("DRIFTWAVE_CUSTOM_CARRIER_HZ", "audio.custom_carrier_hz", &v)?;
        sources.env_overrides.push("DRIFTWAVE_CUSTOM_CARRIER_HZ".to_string());
    }
    if let Some(v) = env("DRIFTWAVE_TONE_GAIN") {
        config.audio.tone_gain = parse_env("DRIFTWAVE_TONE_GAIN", "audio.tone_gain", &v)?;
        sources.env_overrides.push("DRIFTWAVE_TONE_GAIN".to_string());
    }
    if let Some(v) = env("DRIFTWAVE_NOISE_GAIN") {
        config.audio.noise_gain = parse_env("DRIFTWAVE_NOISE_GAIN", "audio.noise_gain", &v)?;
        sources.env_overrides.push("DRIFTWAVE_NOISE_GAIN".to_string());
    }
    if let Some(v) = env("DRIFTWAVE_CHANT_GAIN") {
        config.audio.chant_gain = parse_env("DRIFTWAVE_CHANT_GAIN", "audio.chant_gain", &v)?;
        sources.env_overrides.push("DRIFTWAVE_CHANT_GAIN".to_string());
    }
    if let Some(v) = env("DRIFTWAVE_DEFAULT_DURATION") {
        config.session.default_duration_seconds = parse_env(
            "DRIFTWAVE_DEFAULT_DURATION",
            "session.default_duration_seconds",
            &v,
        )?;
        sources.env_overrides.push("DRIFTWAVE_DEFAULT_DURATION".to_string());
    }
    if let Some(v) = env("DRIFTWAVE_TICK_INTERVAL_MS") {
        config.session.tick_interval_ms =
            parse_env("DRIFTWAVE_TICK_INTERVAL_MS", "session.tick_interval_ms", &v)?;
        sources.env_overrides.push("DRIFTWAVE_TICK_INTERVAL_MS".to_string());
    }
    if let Some(v) = env("DRIFTWAVE_MAX_CONTEXT_AGE") {
        // Empty or zero disables the policy
        let seconds: u64 = if v.trim().is_empty() {
            0
        } else {
            parse_env("DRIFTWAVE_MAX_CONTEXT_AGE", "session.max_context_age_seconds", &v)?
        };
        config.session.max_context_age_seconds = (seconds > 0).then_some(seconds);
        sources.env_overrides.push("DRIFTWAVE_MAX_CONTEXT_AGE".to_string());
    }

    if let Some(v) = env("DRIFTWAVE_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("DRIFTWAVE_LOG_LEVEL".to_string());
    }
    // RUST_LOG wins over everything
    if let Some(v) = env("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }

    Ok(())
}

fn parse_env<T: std::str::FromStr>(
    var: &str,
    field: &'static str,
    value: &str,
) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        field,
        message: format!("{var}={value} could not be parsed"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn write_config(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_discover_config_files() {
        // Just verify it doesn't panic
        let _files = discover_config_files();
    }

    #[test]
    fn test_cli_override_is_last() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "custom.toml", "[audio]\nsample_rate = 48000\n");
        let files = discover_config_files_with_override(Some(&path));
        assert_eq!(files.last(), Some(&path));
    }

    #[test]
    fn test_later_file_wins_key_by_key() {
        let dir = tempfile::tempdir().unwrap();
        let system = write_config(
            &dir,
            "system.toml",
            "[audio]\nsample_rate = 48000\ntone_gain = 0.4\n",
        );
        let local = write_config(&dir, "local.toml", "[audio]\ntone_gain = 0.1\n");

        let (config, sources) = DriftConfig::load_files(&[system, local], |_| None).unwrap();
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.audio.tone_gain, 0.1);
        assert_eq!(sources.files.len(), 2);
    }

    #[test]
    fn test_parse_full_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "full.toml",
            r#"
[audio]
sample_rate = 48000
carrier = "productivity"
noise_gain = 0.2
chant_gain = 0.8
noise_buffer_seconds = 2.0
analyser = true

[session]
default_duration_seconds = 1200
tick_interval_ms = 100
max_context_age_seconds = 3600
retain_mode_on_end = false

[telemetry]
log_level = "driftwave=debug"
"#,
        );

        let (config, _) = DriftConfig::load_files(&[path], |_| None).unwrap();
        assert_eq!(config.audio.carrier, CarrierName::Productivity);
        assert_eq!(config.audio.noise_gain, 0.2);
        assert_eq!(config.audio.chant_gain, 0.8);
        assert!(config.audio.analyser);
        assert_eq!(config.session.default_duration_seconds, 1200);
        assert_eq!(config.session.tick_interval_ms, 100);
        assert_eq!(config.session.max_context_age_seconds, Some(3600));
        assert!(!config.session.retain_mode_on_end);
        assert_eq!(config.telemetry.log_level, "driftwave=debug");
    }

    #[test]
    fn test_malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "broken.toml", "[audio\nsample_rate = ");
        let err = DriftConfig::load_files(&[path.clone()], |_| None).unwrap_err();
        match err {
            ConfigError::Parse { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("DRIFTWAVE_SAMPLE_RATE", "48000"),
            ("DRIFTWAVE_CARRIER", "productivity"),
            ("DRIFTWAVE_MAX_CONTEXT_AGE", "3600"),
            ("RUST_LOG", "trace"),
        ]);

        let (config, sources) =
            DriftConfig::load_files(&[], |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.audio.carrier, CarrierName::Productivity);
        assert_eq!(config.session.max_context_age_seconds, Some(3600));
        assert_eq!(config.telemetry.log_level, "trace");
        assert_eq!(sources.env_overrides.len(), 4);
    }

    #[test]
    fn test_zero_context_age_disables_policy() {
        let mut config = DriftConfig::default();
        config.session.max_context_age_seconds = Some(60);
        let mut sources = ConfigSources::default();
        apply_env_overrides(&mut config, &mut sources, |k| {
            (k == "DRIFTWAVE_MAX_CONTEXT_AGE").then(|| "0".to_string())
        })
        .unwrap();
        assert!(config.session.max_context_age_seconds.is_none());
    }

    #[test]
    fn test_bad_env_value_is_rejected() {
        let mut config = DriftConfig::default();
        let mut sources = ConfigSources::default();
        let err = apply_env_overrides(&mut config, &mut sources, |k| {
            (k == "DRIFTWAVE_TONE_GAIN").then(|| "loud".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "audio.tone_gain", .. }));
    }
}
