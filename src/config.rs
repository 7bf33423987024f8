use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::archive::DEFAULT_COMPRESSION_LEVEL;
use crate::cli::DaemonOpts;
use crate::locate;
use crate::protocol::DEFAULT_ARTIFACT;

pub const DEFAULT_BIND: &str = "127.0.0.1:9032";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub bind: String,
    /// File whose directory anchors device requests
    pub artifact_name: String,
    /// Replaces the built-in probe list when set
    pub known_dirs: Option<Vec<PathBuf>>,
    pub probe_depth: usize,
    /// 0 disables the full-scan timeout
    pub scan_timeout_secs: u64,
    pub compression_level: i32,
    pub log_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            artifact_name: DEFAULT_ARTIFACT.to_string(),
            known_dirs: None,
            probe_depth: 8,
            scan_timeout_secs: 600,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            log_file: None,
        }
    }
}

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("devpack");
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join("devpack");
    }
    PathBuf::from(".devpack")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("devpack.toml")
}

impl Settings {
    /// Read settings from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let s: Settings =
            toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
        Ok(s)
    }

    /// Command-line values win over the file
    pub fn apply_cli(&mut self, opts: &DaemonOpts) {
        if let Some(bind) = &opts.bind {
            self.bind = bind.clone();
        }
        if let Some(name) = &opts.artifact {
            self.artifact_name = name.clone();
        }
        if let Some(secs) = opts.scan_timeout_secs {
            self.scan_timeout_secs = secs;
        }
        if let Some(path) = &opts.log_file {
            self.log_file = Some(path.clone());
        }
    }

    pub fn scan_timeout(&self) -> Option<Duration> {
        (self.scan_timeout_secs > 0).then(|| Duration::from_secs(self.scan_timeout_secs))
    }

    pub fn known_dirs(&self) -> Vec<PathBuf> {
        self.known_dirs
            .clone()
            .unwrap_or_else(locate::known_directories)
    }
}
