use crate::{
    error::HookError,
    host::{HostParams, parse_bool},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub hook: Hook,
    #[serde(default)]
    pub integrity: Integrity,
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// Script options set in the queue manager's settings win over the file.
    pub fn apply_host_options(&mut self, host: &HostParams) -> Result<(), HookError> {
        if let Some(v) = host_bool(host, "DownloadAnotherRelease")? {
            self.hook.download_another_release = v;
        }
        if let Some(v) = host_bool(host, "Delete")? {
            self.hook.delete_failed = v;
        }
        if let Some(v) = host_bool(host, "Verbose")? {
            self.logging.verbose = v;
        }
        if let Some(v) = host_bool(host, "CheckVid")? {
            self.integrity.enabled = v;
        }
        if let Some(raw) = host.option("FFprobe") {
            self.integrity.prober_path = raw.trim().to_string();
        }
        if let Some(raw) = host.option("TestItem") {
            self.integrity.test_file = raw.trim().to_string();
        }
        if let Some(raw) = host.option("MediaExtensions") {
            self.integrity.media_extensions = split_extensions(raw);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Hook {
    pub download_another_release: bool,
    pub delete_failed: bool,
}
impl Default for Hook {
    fn default() -> Self {
        Self {
            download_another_release: true,
            delete_failed: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Integrity {
    pub enabled: bool,
    /// Blank means discover on PATH.
    pub prober_path: String,
    pub test_file: String,
    pub media_extensions: Vec<String>,
    pub probe_timeout_seconds: u64,
}
impl Default for Integrity {
    fn default() -> Self {
        Self {
            enabled: false,
            prober_path: "".into(),
            test_file: "".into(),
            media_extensions: split_extensions(
                ".mkv,.avi,.divx,.xvid,.mov,.wmv,.mp4,.mpg,.mpeg,.vob,.iso,.m4v",
            ),
            probe_timeout_seconds: 120,
        }
    }
}

impl Integrity {
    pub fn allows_extension(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.');
        self.media_extensions
            .iter()
            .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Network {
    pub http_timeout_seconds: u64,
    pub rpc_timeout_seconds: u64,
}
impl Default for Network {
    fn default() -> Self {
        Self {
            http_timeout_seconds: 60,
            rpc_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    /// Lowers the level to debug unless RUST_LOG or --log-level say otherwise.
    pub verbose: bool,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            verbose: false,
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}

pub fn split_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn host_bool(host: &HostParams, name: &str) -> Result<Option<bool>, HookError> {
    match host.option(name) {
        None => Ok(None),
        Some(raw) => parse_bool(raw)
            .map(Some)
            .ok_or_else(|| HookError::InvalidParameter {
                name: format!("NZBPO_{}", name.to_ascii_uppercase()),
                value: raw.to_string(),
            }),
    }
}
