use crate::{
    config::Integrity,
    probe::{ProbeOutcome, Prober},
};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ScanSkip {
    Disabled,
    SelfTestFailed,
    DefinitiveFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorruptionVerdict {
    pub corrupt: bool,
    pub files_scanned: usize,
    pub files_passed: usize,
    pub skipped: Option<ScanSkip>,
}

impl CorruptionVerdict {
    pub fn not_checked(reason: ScanSkip) -> Self {
        Self {
            corrupt: false,
            files_scanned: 0,
            files_passed: 0,
            skipped: Some(reason),
        }
    }

    fn from_counts(files_scanned: usize, files_passed: usize) -> Self {
        Self {
            corrupt: files_scanned > 0 && files_passed < files_scanned,
            files_scanned,
            files_passed,
            skipped: None,
        }
    }
}

pub struct IntegrityScanner<'a, P: Prober + ?Sized> {
    integrity: &'a Integrity,
    prober: &'a P,
}

impl<'a, P: Prober + ?Sized> IntegrityScanner<'a, P> {
    pub fn new(integrity: &'a Integrity, prober: &'a P) -> Self {
        Self { integrity, prober }
    }

    /// A prober that cannot pass the reference file is not trusted with the job.
    pub fn self_test(&self) -> bool {
        let test_file = self.integrity.test_file.trim();
        if test_file.is_empty() {
            return true;
        }
        let outcome = self.prober.probe(Path::new(test_file));
        let ok = matches!(&outcome, ProbeOutcome::Inspected(r) if r.is_good());
        if ok {
            debug!("prober self-test passed on {test_file}");
        } else {
            warn!("prober self-test failed on {test_file} ({outcome:?}); corruption check disabled");
        }
        ok
    }

    pub fn scan(&self, dir: &Path) -> CorruptionVerdict {
        if !self.integrity.enabled {
            return CorruptionVerdict::not_checked(ScanSkip::Disabled);
        }
        if !self.self_test() {
            return CorruptionVerdict::not_checked(ScanSkip::SelfTestFailed);
        }

        let mut scanned = 0usize;
        let mut passed = 0usize;
        let walker = WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden_dir(e));
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("error reading directory entry: {e}");
                    continue;
                }
            };
            // Symlinked files count; symlinked directories are not followed.
            if !entry.path().is_file() {
                continue;
            }

            let outcome = self.prober.probe(entry.path());
            if !outcome.was_inspected() {
                continue;
            }
            scanned += 1;
            if outcome.is_good() {
                passed += 1;
            } else {
                info!("corrupt media file: {}", entry.path().display());
            }
        }

        let verdict = CorruptionVerdict::from_counts(scanned, passed);
        info!(
            "integrity scan {}: scanned={} passed={} corrupt={}",
            dir.display(),
            verdict.files_scanned,
            verdict.files_passed,
            verdict.corrupt
        );
        verdict
    }
}

fn is_hidden_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name().to_str().is_some_and(|s| s.starts_with('.'))
}
