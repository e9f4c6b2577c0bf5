//! Configuration Vault – reads/writes `~/.rover/config.toml`.

use rover_runtime::RuntimeConfig;
use rover_types::RoverError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings for the simulated world the CLI drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed for the world, the detector and the explore walk.
    pub seed: u64,
    pub start_battery: f32,
    /// Battery percent lost per second while the motors run.
    pub drain_per_sec: f32,
    /// Telemetry period.
    pub telemetry_ms: u64,
    /// Mean time between reasoning-model suggestions.
    pub suggestion_every_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 7,
            start_battery: 100.0,
            drain_per_sec: 0.5,
            telemetry_ms: 100,
            suggestion_every_ms: 5_000,
        }
    }
}

/// Persisted configuration stored in `~/.rover/config.toml`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sim: SimConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Return the path to `~/.rover/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rover").join("config.toml")
}

/// Load the config, falling back to defaults when no file exists, then apply
/// environment overrides and validate.
pub fn load() -> Result<Config, RoverError> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    cfg.runtime.validate()?;
    Ok(cfg)
}

/// Load the config from a specific path.  `None` if the file does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, RoverError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        RoverError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| RoverError::Config(format!("failed to parse config: {e}")))?;
    Ok(Some(cfg))
}

/// Apply `ROVER_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROVER_TICK_MS` | `runtime.tick_ms` |
/// | `ROVER_EMOTION_TICK_MS` | `runtime.emotion_tick_ms` |
/// | `ROVER_MAX_SPEED` | `runtime.fusion.safety.max_speed` |
/// | `ROVER_SIM_SEED` | `sim.seed` and the explore-walk seed |
///
/// Unparsable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ROVER_TICK_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.runtime.tick_ms = ms;
    }
    if let Ok(v) = std::env::var("ROVER_EMOTION_TICK_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.runtime.emotion_tick_ms = ms;
    }
    if let Ok(v) = std::env::var("ROVER_MAX_SPEED")
        && let Ok(speed) = v.parse::<i32>()
    {
        cfg.runtime.set_max_speed(speed);
    }
    if let Ok(v) = std::env::var("ROVER_SIM_SEED")
        && let Ok(seed) = v.parse::<u64>()
    {
        cfg.sim.seed = seed;
        cfg.runtime.fusion.goals.seed = seed;
    }
}

/// Save the config to `~/.rover/config.toml`.
pub fn save(cfg: &Config) -> Result<PathBuf, RoverError> {
    let path = config_path();
    save_to(cfg, &path)?;
    Ok(path)
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), RoverError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            RoverError::Config(format!("failed to create config directory: {e}"))
        })?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| RoverError::Serialization(format!("failed to serialize config: {e}")))?;

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| {
                RoverError::Config(format!("failed to write config at {}: {e}", path.display()))
            })?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| {
        RoverError::Config(format!("failed to write config at {}: {e}", path.display()))
    })?;
    Ok(())
}
