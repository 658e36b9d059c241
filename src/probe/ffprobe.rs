use super::{ProbeError, ProbeOutcome, ProbeResult, Prober, SkipReason};
use crate::config::Integrity;
use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const FULL_SECTIONS: &[&str] = &["-show_format", "-show_streams", "-show_error"];
// Older builds reject -show_error.
const REDUCED_SECTIONS: &[&str] = &["-show_format", "-show_streams"];

const PROBER_NAMES: &[&str] = &["ffprobe", "avprobe"];
const COMMON_DIRS: &[&str] = &["/usr/bin", "/usr/local/bin", "/opt/homebrew/bin"];

pub struct FfprobeProber {
    exe: Option<PathBuf>,
    integrity: Integrity,
    timeout: Duration,
}

impl FfprobeProber {
    pub fn new(exe: Option<PathBuf>, integrity: &Integrity) -> Self {
        Self {
            exe,
            integrity: integrity.clone(),
            timeout: Duration::from_secs(integrity.probe_timeout_seconds.max(1)),
        }
    }

    pub fn executable(&self) -> Option<&Path> {
        self.exe.as_deref()
    }

    fn inspect(&self, exe: &Path, sections: &[&str], path: &Path) -> Result<RunOutput, ProbeError> {
        let mut cmd = Command::new(exe);
        cmd.args(["-v", "quiet", "-print_format", "json"]);
        cmd.args(sections);
        cmd.arg(path);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        debug!("probe {} {:?}", path.display(), sections);
        let mut child = cmd
            .spawn()
            .map_err(|e| ProbeError::ToolAbsent(format!("{}: {e}", exe.display())))?;
        wait_with_timeout(&mut child, self.timeout)
    }
}

impl Prober for FfprobeProber {
    fn probe(&self, path: &Path) -> ProbeOutcome {
        let Some(exe) = self.exe.as_deref() else {
            return ProbeOutcome::Skipped(SkipReason::NoProber);
        };
        let listed = path
            .extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| self.integrity.allows_extension(ext));
        if !listed {
            return ProbeOutcome::Skipped(SkipReason::ExtensionNotListed);
        }

        let mut last_exit = 0;
        for sections in [FULL_SECTIONS, REDUCED_SECTIONS] {
            let output = match self.inspect(exe, sections, path) {
                Ok(o) => o,
                Err(err) => {
                    warn!("probe {}: {err}", path.display());
                    return ProbeOutcome::Failed(err);
                }
            };
            let Some(code) = output.status.code() else {
                let err = ProbeError::Crashed(output.status.to_string());
                warn!("probe {}: {err}", path.display());
                return ProbeOutcome::Failed(err);
            };
            if let Some(result) = ProbeResult::from_report(&output.stdout, code) {
                debug!(
                    "probe {} video={} audio={} error={:?} exit={}",
                    path.display(),
                    result.video_streams,
                    result.audio_streams,
                    result.error,
                    result.exit_code
                );
                return ProbeOutcome::Inspected(result);
            }
            if !output.stderr.is_empty() {
                debug!(
                    "probe stderr {}: {}",
                    path.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            last_exit = code;
        }

        if last_exit != 0 {
            return ProbeOutcome::Inspected(ProbeResult {
                video_streams: 0,
                audio_streams: 0,
                error: None,
                exit_code: last_exit,
            });
        }
        warn!("probe {}: no parseable report", path.display());
        ProbeOutcome::Failed(ProbeError::Unparseable)
    }
}

/// Resolves the prober executable once per run.
pub fn discover_prober(configured: &str) -> Option<PathBuf> {
    discover_prober_in(configured, std::env::var_os("PATH").as_deref())
}

pub fn discover_prober_in(configured: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    let configured = configured.trim();
    if !configured.is_empty() {
        let p = PathBuf::from(configured);
        if p.is_file() {
            return Some(p);
        }
        if let Some(found) = find_on_path(configured, search_path) {
            return Some(found);
        }
        warn!("configured prober not found: {configured}; falling back to discovery");
    }

    for name in PROBER_NAMES {
        if let Some(found) = find_on_path(name, search_path) {
            return Some(found);
        }
    }
    for dir in COMMON_DIRS {
        for name in PROBER_NAMES {
            let candidate = Path::new(dir).join(exe_name(name));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

fn find_on_path(name: &str, search_path: Option<&OsStr>) -> Option<PathBuf> {
    if name.contains(std::path::MAIN_SEPARATOR) {
        return None;
    }
    std::env::split_paths(search_path?)
        .map(|dir| dir.join(exe_name(name)))
        .find(|candidate| candidate.is_file())
}

fn exe_name(name: &str) -> String {
    let suffix = std::env::consts::EXE_SUFFIX;
    if suffix.is_empty() || name.ends_with(suffix) {
        name.to_string()
    } else {
        format!("{name}{suffix}")
    }
}

struct RunOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<RunOutput, ProbeError> {
    // Drain both pipes while waiting so a chatty prober can't block on a full buffer.
    let stdout_reader = child.stdout.take();
    let stderr_reader = child.stderr.take();

    let stdout_thread = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut out) = stdout_reader {
            let _ = out.read_to_end(&mut buf);
        }
        buf
    });
    let stderr_thread = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut err) = stderr_reader {
            let _ = err.read_to_end(&mut buf);
        }
        buf
    });

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => {
                abandon(child);
                return Err(ProbeError::Crashed(e.to_string()));
            }
        }

        if start.elapsed() > timeout {
            warn!("prober timed out after {:?}", timeout);
            abandon(child);
            return Err(ProbeError::TimedOut(timeout.as_secs()));
        }

        std::thread::sleep(Duration::from_millis(50));
    };

    let (stdout, stderr) = join_drain(stdout_thread, stderr_thread);
    Ok(RunOutput {
        status,
        stdout,
        stderr,
    })
}

/// Kills the direct child only. The reader threads are left detached: a
/// wrapper script's own children can hold the pipes open long after this.
fn abandon(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn join_drain(
    stdout: std::thread::JoinHandle<Vec<u8>>,
    stderr: std::thread::JoinHandle<Vec<u8>>,
) -> (Vec<u8>, Vec<u8>) {
    (stdout.join().unwrap_or_default(), stderr.join().unwrap_or_default())
}
