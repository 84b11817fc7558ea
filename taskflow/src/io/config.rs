//! Engine configuration stored in `taskflow.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::collaborators::Settings;

/// Engine configuration (TOML).
///
/// Edited by experimenters between sessions. Missing fields default to
/// values suitable for a 60 Hz desktop run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Scheduler tick delta in milliseconds.
    pub tick_ms: u64,

    /// Stop and report a stall after this many ticks. 0 means unbounded.
    pub max_ticks: u64,

    /// Seed for randomized timers.
    pub seed: u64,

    /// Directory receiving the event log and datasets.
    pub output_dir: PathBuf,

    /// Dataset column delimiter.
    pub delimiter: String,

    pub settings: Settings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_ms: 16,
            max_ticks: 0,
            seed: 0,
            output_dir: PathBuf::from("output"),
            delimiter: ",".to_string(),
            settings: Settings::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick_ms == 0 {
            return Err(anyhow!("tick_ms must be > 0"));
        }
        if self.delimiter.is_empty() {
            return Err(anyhow!("delimiter must not be empty"));
        }
        if self.settings.participant_id.trim().is_empty() {
            return Err(anyhow!("settings.participant_id must not be empty"));
        }
        if !self.settings.hud_distance.is_finite() || self.settings.hud_distance < 0.0 {
            return Err(anyhow!("settings.hud_distance must be finite and >= 0"));
        }
        Ok(())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Tick limit, `None` when unbounded.
    pub fn tick_limit(&self) -> Option<u64> {
        (self.max_ticks > 0).then_some(self.max_ticks)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `EngineConfig::default()`.
pub fn load_config(path: &Path) -> Result<EngineConfig> {
    if !path.exists() {
        let cfg = EngineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: EngineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &EngineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collaborators::DisplayMode;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.tick(), Duration::from_millis(16));
        assert_eq!(cfg.tick_limit(), None);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("taskflow.toml");
        let mut cfg = EngineConfig::default();
        cfg.settings.display_mode = DisplayMode::Vr;
        cfg.max_ticks = 600;
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("taskflow.toml");
        fs::write(&path, "seed = 7\n[settings]\nparticipant_id = \"p01\"\n").expect("write");

        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.tick_ms, 16);
        assert_eq!(cfg.settings.participant_id, "p01");
        assert_eq!(cfg.settings.display_mode, DisplayMode::Desktop);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("taskflow.toml");
        fs::write(&path, "tick_ms = 0\n").expect("write");
        let err = load_config(&path).expect_err("zero tick");
        assert!(format!("{err:#}").contains("tick_ms must be > 0"));

        let mut cfg = EngineConfig::default();
        cfg.settings.hud_distance = -1.0;
        assert!(cfg.validate().is_err());
    }
}
