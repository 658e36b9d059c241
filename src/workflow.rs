use crate::{
    classify::{FailureLink, JobOutcome, classify},
    config::Config,
    error::HookError,
    fetch::{Indexer, IndexerReply, ReplacementPayload},
    host::{ExitStatus, HostParams},
    probe::Prober,
    queue::{QueueManager, QueueResubmitter},
    scan::{CorruptionVerdict, IntegrityScanner, ScanSkip},
    util::remove_dir,
};
use tracing::{debug, info, warn};

pub struct Hook<'a, P: Prober + ?Sized, I: Indexer + ?Sized> {
    cfg: &'a Config,
    prober: &'a P,
    indexer: &'a I,
}

impl<'a, P: Prober + ?Sized, I: Indexer + ?Sized> Hook<'a, P, I> {
    pub fn new(cfg: &'a Config, prober: &'a P, indexer: &'a I) -> Self {
        Self {
            cfg,
            prober,
            indexer,
        }
    }

    /// `connect` is only called once a replacement is actually going to be queued.
    pub fn run<Q, F>(&self, host: &HostParams, connect: F) -> Result<ExitStatus, HookError>
    where
        Q: QueueManager,
        F: FnOnce() -> Result<Q, HookError>,
    {
        host.check_invoked_by_host()?;
        let outcome = host.job_outcome()?;
        let link = host.failure_link();
        self.process(&outcome, link, connect)
    }

    pub fn process<Q, F>(
        &self,
        outcome: &JobOutcome,
        link: Option<FailureLink>,
        connect: F,
    ) -> Result<ExitStatus, HookError>
    where
        Q: QueueManager,
        F: FnOnce() -> Result<Q, HookError>,
    {
        debug!(?outcome, "job outcome");
        let verdict = self.verdict(outcome);
        let decision = classify(outcome, &verdict, link.as_ref());
        debug!(?decision, "classification");

        if !decision.failure {
            info!("download is usable; nothing to do");
            return Ok(ExitStatus::Success);
        }
        info!("download failed: {:?}", decision.cause);

        if self.cfg.hook.delete_failed {
            if let Some(dir) = &outcome.directory {
                match remove_dir(dir) {
                    Ok(()) => info!("deleted failed download directory {}", dir.display()),
                    Err(e) => warn!("{e:#}"),
                }
            }
        }

        let Some(link) = decision.link else {
            info!("no failure link for this download; indexer not informed");
            return Ok(ExitStatus::None);
        };

        let want_replacement = self.cfg.hook.download_another_release;
        if want_replacement {
            info!("Requesting another release from indexer site");
        } else {
            info!("Sending failure status to indexer site");
        }

        let reply = self.indexer.fetch(&link, want_replacement)?.into_reply()?;
        if !want_replacement {
            info!("indexer informed about the failure");
            return Ok(ExitStatus::Success);
        }
        let (headers, body) = match reply {
            IndexerReply::NoRelease(_) => {
                info!("No other releases found");
                return Ok(ExitStatus::Success);
            }
            IndexerReply::Acknowledged { headers, body } => (headers, body),
        };
        for (name, value) in headers.iter() {
            debug!("{name}: {value}");
        }

        let Some(payload) = ReplacementPayload::from_reply(&headers, body, outcome) else {
            info!("No other releases found");
            return Ok(ExitStatus::Success);
        };
        info!("Another release found, adding to queue");
        debug!("filename: {} category: {}", payload.filename, payload.category);

        let queue = connect()?;
        let resubmitter = QueueResubmitter::new(&queue);
        let handle = resubmitter.submit(&payload.filename, &payload.category, &payload.content)?;
        drop(payload.content);
        resubmitter.propagate_headers(handle, &payload.dnzb_headers)?;
        resubmitter.resume(handle)?;
        Ok(ExitStatus::Success)
    }

    fn verdict(&self, outcome: &JobOutcome) -> CorruptionVerdict {
        if let Some(cause) = outcome.definitive_failure() {
            debug!("{cause:?} failure; corruption check skipped");
            return CorruptionVerdict::not_checked(ScanSkip::DefinitiveFailure);
        }
        if !self.cfg.integrity.enabled {
            return CorruptionVerdict::not_checked(ScanSkip::Disabled);
        }
        match &outcome.directory {
            Some(dir) => IntegrityScanner::new(&self.cfg.integrity, self.prober).scan(dir),
            None => {
                warn!("no download directory given; corruption check skipped");
                CorruptionVerdict::not_checked(ScanSkip::Disabled)
            }
        }
    }
}
