use crate::scan::CorruptionVerdict;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

const CORRUPT_MARKER: &str = "corrupt=true";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParStatus {
    NotChecked,
    Failed,
    Repaired,
    RepairableSkipped,
    Skipped,
}

impl ParStatus {
    pub fn from_code(raw: &str) -> Option<Self> {
        match raw.trim() {
            "0" => Some(ParStatus::NotChecked),
            "1" => Some(ParStatus::Failed),
            "2" => Some(ParStatus::Repaired),
            "3" => Some(ParStatus::RepairableSkipped),
            "4" => Some(ParStatus::Skipped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnpackStatus {
    Skipped,
    Failed,
    Succeeded,
}

impl UnpackStatus {
    pub fn from_code(raw: &str) -> Option<Self> {
        match raw.trim() {
            "0" => Some(UnpackStatus::Skipped),
            "1" => Some(UnpackStatus::Failed),
            "2" => Some(UnpackStatus::Succeeded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobOutcome {
    pub par_status: ParStatus,
    pub unpack_status: UnpackStatus,
    pub forced_failure: bool,
    pub directory: Option<PathBuf>,
    pub nzb_filename: String,
    pub category: String,
}

impl JobOutcome {
    /// Repair, extraction or a forced failure settle the job without
    /// looking at the media.
    pub fn definitive_failure(&self) -> Option<FailureCause> {
        if self.par_status == ParStatus::Failed {
            Some(FailureCause::Repair)
        } else if self.unpack_status == UnpackStatus::Failed {
            Some(FailureCause::Extraction)
        } else if self.forced_failure {
            Some(FailureCause::Forced)
        } else {
            None
        }
    }

    pub fn is_definitive_failure(&self) -> bool {
        self.definitive_failure().is_some()
    }
}

/// Indexer endpoint for reporting this job's failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureLink(String);

impl FailureLink {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            None
        } else {
            Some(Self(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_corruption_marked(&self) -> bool {
        let without_fragment = self.0.split('#').next().unwrap_or_default();
        without_fragment
            .split_once('?')
            .is_some_and(|(_, query)| query.split('&').any(|p| p == CORRUPT_MARKER))
    }

    /// Appends `corrupt=true` to the query, once.
    pub fn with_corruption_marker(&self) -> Self {
        if self.is_corruption_marked() {
            return self.clone();
        }
        let (base, fragment) = match self.0.split_once('#') {
            Some((b, f)) => (b, Some(f)),
            None => (self.0.as_str(), None),
        };
        let sep = if !base.contains('?') {
            "?"
        } else if base.ends_with('?') || base.ends_with('&') {
            ""
        } else {
            "&"
        };
        let mut out = format!("{base}{sep}{CORRUPT_MARKER}");
        if let Some(f) = fragment {
            out.push('#');
            out.push_str(f);
        }
        Self(out)
    }
}

impl fmt::Display for FailureLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureCause {
    Repair,
    Extraction,
    Forced,
    Corruption,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub failure: bool,
    pub cause: Option<FailureCause>,
    pub link: Option<FailureLink>,
}

pub fn classify(
    outcome: &JobOutcome,
    verdict: &CorruptionVerdict,
    link: Option<&FailureLink>,
) -> Classification {
    if let Some(cause) = outcome.definitive_failure() {
        return Classification {
            failure: true,
            cause: Some(cause),
            link: link.cloned(),
        };
    }

    if verdict.corrupt {
        return Classification {
            failure: true,
            cause: Some(FailureCause::Corruption),
            link: link.map(FailureLink::with_corruption_marker),
        };
    }

    Classification {
        failure: false,
        cause: None,
        link: link.cloned(),
    }
}
