pub mod ffprobe;

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub use ffprobe::{FfprobeProber, discover_prober};

pub trait Prober {
    fn probe(&self, path: &Path) -> ProbeOutcome;
}

/// What one inspection run reported about a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub video_streams: u32,
    pub audio_streams: u32,
    pub error: Option<String>,
    pub exit_code: i32,
}

impl ProbeResult {
    pub fn is_good(&self) -> bool {
        self.video_streams > 0 && self.audio_streams > 0 && self.error.is_none() && self.exit_code == 0
    }

    /// Builds a result from the prober's JSON report. `None` if the output
    /// is not a JSON object.
    pub fn from_report(stdout: &[u8], exit_code: i32) -> Option<Self> {
        let report: Report = serde_json::from_slice(stdout).ok()?;
        let count = |kind: &str| {
            report
                .streams
                .iter()
                .filter(|s| s.codec_type.as_deref() == Some(kind))
                .count() as u32
        };
        let error = report.error.map(|e| match &e {
            serde_json::Value::Object(obj) => obj
                .get("string")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| e.to_string()),
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        Some(Self {
            video_streams: count("video"),
            audio_streams: count("audio"),
            error,
            exit_code,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Report {
    #[serde(default)]
    streams: Vec<ReportStream>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ReportStream {
    #[serde(default)]
    codec_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    ExtensionNotListed,
    NoProber,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum ProbeError {
    #[error("prober could not be started: {0}")]
    ToolAbsent(String),
    #[error("prober terminated abnormally: {0}")]
    Crashed(String),
    #[error("prober exceeded timeout of {0}s")]
    TimedOut(u64),
    #[error("prober output could not be parsed")]
    Unparseable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ProbeOutcome {
    Skipped(SkipReason),
    Inspected(ProbeResult),
    Failed(ProbeError),
}

impl ProbeOutcome {
    /// Only an inspection that actually ran can mark a file bad.
    pub fn is_good(&self) -> bool {
        match self {
            ProbeOutcome::Inspected(r) => r.is_good(),
            ProbeOutcome::Skipped(_) | ProbeOutcome::Failed(_) => true,
        }
    }

    pub fn was_inspected(&self) -> bool {
        matches!(self, ProbeOutcome::Inspected(_))
    }
}
