//! Assessor configuration stored in `assessor.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::core::progress::DEFAULT_PROGRESS_CAPACITY;
use crate::orchestrator::SessionSettings;

/// Assessor configuration (TOML).
///
/// This file is intended to be edited by humans. Missing fields default to
/// values matching a backend running locally on port 3000.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AssessorConfig {
    /// Base URL of the assessment API (quality model, start call, channels).
    pub base_url: String,

    /// Number of progress lines kept per session.
    pub progress_capacity: usize,

    /// Deadline for the start call in seconds (`0` waits indefinitely).
    pub start_timeout_secs: u64,

    /// TCP connect timeout for every request in seconds.
    pub connect_timeout_secs: u64,

    /// Consecutive undecodable frames a channel tolerates before failing.
    pub max_consecutive_decode_failures: u32,
}

impl Default for AssessorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            progress_capacity: DEFAULT_PROGRESS_CAPACITY,
            start_timeout_secs: 30,
            connect_timeout_secs: 10,
            max_consecutive_decode_failures: 10,
        }
    }
}

impl AssessorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(anyhow!("base_url must be non-empty"));
        }
        Url::parse(&self.base_url).with_context(|| format!("base_url '{}'", self.base_url))?;
        if self.progress_capacity == 0 {
            return Err(anyhow!("progress_capacity must be > 0"));
        }
        if self.connect_timeout_secs == 0 {
            return Err(anyhow!("connect_timeout_secs must be > 0"));
        }
        if self.max_consecutive_decode_failures == 0 {
            return Err(anyhow!("max_consecutive_decode_failures must be > 0"));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Orchestrator settings derived from this config.
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            progress_capacity: self.progress_capacity,
            start_timeout: (self.start_timeout_secs > 0)
                .then(|| Duration::from_secs(self.start_timeout_secs)),
            max_consecutive_decode_failures: self.max_consecutive_decode_failures,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AssessorConfig::default()`.
pub fn load_config(path: &Path) -> Result<AssessorConfig> {
    if !path.exists() {
        let cfg = AssessorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AssessorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AssessorConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, AssessorConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("assessor.toml");
        let cfg = AssessorConfig {
            base_url: "http://127.0.0.1:9000/api".to_string(),
            start_timeout_secs: 0,
            ..AssessorConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.session_settings().start_timeout, None);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("assessor.toml");
        fs::write(&path, "progress_capacity = 5\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.progress_capacity, 5);
        assert_eq!(cfg.base_url, AssessorConfig::default().base_url);
        assert_eq!(
            cfg.session_settings().start_timeout,
            Some(Duration::from_secs(30))
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let cfg = AssessorConfig {
            progress_capacity: 0,
            ..AssessorConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = AssessorConfig {
            base_url: "not a url".to_string(),
            ..AssessorConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = AssessorConfig {
            max_consecutive_decode_failures: 0,
            ..AssessorConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
