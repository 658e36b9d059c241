use crate::{
    config::Config,
    error::HookError,
    fetch::HttpIndexer,
    host::HostParams,
    logging::init_logging,
    probe::{FfprobeProber, Prober, discover_prober},
    queue::JsonRpcQueue,
    scan::IntegrityScanner,
    workflow::Hook,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "failure-link")]
#[command(about = "Report failed downloads to the indexer and queue a replacement (NZBGet post-processing)")]
pub struct Args {
    /// Defaults to `run`, which is what NZBGet invokes.
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Path to config TOML. If omitted, uses ./failure-link.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Post-process the job described by the NZBGet environment.
    Run {},
    /// Probe a single media file and print the outcome.
    Probe {
        #[arg(long)]
        input: PathBuf,
    },
    /// Scan a directory for corrupt media and print the verdict.
    Scan {
        #[arg(long)]
        dir: PathBuf,
    },
    /// Show which prober would be used and whether it passes the self-test.
    Doctor {},
}

/// Returns the process exit code.
pub fn dispatch(args: Args) -> Result<i32> {
    let host = HostParams::from_env();
    let cfg = match load_config(args.config.as_deref(), &host) {
        Ok(cfg) => cfg,
        Err(err) => {
            let _ = init_logging(args.log_level.as_deref(), &Config::default(), None);
            return Err(err);
        }
    };
    let log_path = resolve_log_path(&cfg);
    let _guard: Option<WorkerGuard> =
        init_logging(args.log_level.as_deref(), &cfg, log_path.as_deref())?;

    match args.cmd.unwrap_or(Command::Run {}) {
        Command::Run {} => run(&cfg, &host),
        Command::Probe { input } => {
            let prober = build_prober(&cfg);
            let outcome = prober.probe(&input);
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "input": input,
                    "good": outcome.is_good(),
                    "outcome": outcome,
                }))?
            );
            Ok(0)
        }
        Command::Scan { dir } => {
            let mut integrity = cfg.integrity.clone();
            integrity.enabled = true;
            let prober = build_prober(&cfg);
            let verdict = IntegrityScanner::new(&integrity, &prober).scan(&dir);
            println!("{}", serde_json::to_string_pretty(&verdict)?);
            Ok(0)
        }
        Command::Doctor {} => {
            let prober = build_prober(&cfg);
            let self_test = IntegrityScanner::new(&cfg.integrity, &prober).self_test();
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "prober": prober.executable(),
                    "test_file": cfg.integrity.test_file,
                    "self_test_passed": self_test,
                    "media_extensions": cfg.integrity.media_extensions,
                }))?
            );
            Ok(0)
        }
    }
}

fn run(cfg: &Config, host: &HostParams) -> Result<i32> {
    if host.check_invoked_by_host().is_err() {
        info!("*** NZBGet post-processing script ***");
        info!("This script is supposed to be called from nzbget (13.0 or later).");
    }
    let prober = if cfg.integrity.enabled {
        build_prober(cfg)
    } else {
        FfprobeProber::new(None, &cfg.integrity)
    };
    let indexer = HttpIndexer::new(&cfg.network).map_err(HookError::from)?;
    let hook = Hook::new(cfg, &prober, &indexer);
    let status = hook.run(host, || {
        let endpoint = host.control_endpoint()?;
        debug!("queue manager at {}", endpoint.rpc_url());
        Ok(JsonRpcQueue::new(endpoint, &cfg.network)?)
    })?;
    debug!("exit status {:?}", status);
    Ok(status.code())
}

fn load_config(user: Option<&Path>, host: &HostParams) -> Result<Config> {
    let mut cfg = match resolve_config_path(user) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };
    cfg.apply_host_options(host)
        .map_err(anyhow::Error::from)
        .context("applying NZBGet script options")?;
    Ok(cfg)
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    let default = PathBuf::from("failure-link.toml");
    default.exists().then_some(default)
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file || cfg.logging.file_path.is_empty() {
        return None;
    }
    Some(PathBuf::from(&cfg.logging.file_path))
}

fn build_prober(cfg: &Config) -> FfprobeProber {
    let exe = discover_prober(&cfg.integrity.prober_path);
    match &exe {
        Some(p) => debug!("using prober {}", p.display()),
        None => info!("no ffprobe found; media files will not be inspected"),
    }
    FfprobeProber::new(exe, &cfg.integrity)
}
