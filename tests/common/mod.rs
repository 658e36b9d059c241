#![allow(dead_code)]

use failure_link::{
    classify::FailureLink,
    fetch::{FetchError, Indexer, IndexerResponse, ResponseHeaders},
    probe::{ProbeOutcome, ProbeResult, Prober, SkipReason},
    queue::{AppendRequest, GroupSummary, QueueManager, RpcError},
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub fn good() -> ProbeOutcome {
    ProbeOutcome::Inspected(ProbeResult {
        video_streams: 1,
        audio_streams: 2,
        error: None,
        exit_code: 0,
    })
}

pub fn bad() -> ProbeOutcome {
    ProbeOutcome::Inspected(ProbeResult {
        video_streams: 1,
        audio_streams: 0,
        error: None,
        exit_code: 0,
    })
}

/// Answers by file name; unknown files are skipped like non-media.
#[derive(Default)]
pub struct FakeProber {
    by_name: HashMap<String, ProbeOutcome>,
    pub calls: RefCell<Vec<PathBuf>>,
}

impl FakeProber {
    pub fn with(mut self, name: &str, outcome: ProbeOutcome) -> Self {
        self.by_name.insert(name.to_string(), outcome);
        self
    }
}

impl Prober for FakeProber {
    fn probe(&self, path: &Path) -> ProbeOutcome {
        self.calls.borrow_mut().push(path.to_path_buf());
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        self.by_name
            .get(name)
            .cloned()
            .unwrap_or(ProbeOutcome::Skipped(SkipReason::ExtensionNotListed))
    }
}

pub enum Reply {
    Http {
        status: u16,
        headers: Vec<(&'static str, &'static str)>,
        body: &'static [u8],
    },
    TransportFailure,
}

pub struct FakeIndexer {
    reply: Reply,
    pub calls: RefCell<Vec<(String, bool)>>,
}

impl FakeIndexer {
    pub fn new(reply: Reply) -> Self {
        Self {
            reply,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn unused() -> Self {
        Self::new(Reply::TransportFailure)
    }
}

impl Indexer for FakeIndexer {
    fn fetch(&self, link: &FailureLink, want_body: bool) -> Result<IndexerResponse, FetchError> {
        self.calls
            .borrow_mut()
            .push((link.as_str().to_string(), want_body));
        match &self.reply {
            Reply::TransportFailure => Err(FetchError::Transport("connection refused".into())),
            Reply::Http {
                status,
                headers,
                body,
            } => Ok(IndexerResponse {
                status: *status,
                headers: ResponseHeaders::from_pairs(headers.iter().copied()),
                body: (want_body && (200..300).contains(status)).then(|| body.to_vec()),
            }),
        }
    }
}

#[derive(Default)]
pub struct QueueLog {
    pub appends: Vec<AppendRequest>,
    pub edits: Vec<(String, String, Vec<i64>)>,
}

#[derive(Clone, Default)]
pub struct FakeQueue {
    pub groups: Vec<GroupSummary>,
    pub log: Rc<RefCell<QueueLog>>,
}

impl FakeQueue {
    pub fn listing(groups: &[(&str, i64)]) -> Self {
        Self {
            groups: groups
                .iter()
                .map(|(name, id)| GroupSummary {
                    nzb_filename: name.to_string(),
                    nzb_id: *id,
                })
                .collect(),
            log: Rc::default(),
        }
    }
}

impl QueueManager for FakeQueue {
    fn append(&self, req: &AppendRequest) -> Result<bool, RpcError> {
        self.log.borrow_mut().appends.push(req.clone());
        Ok(true)
    }

    fn list_groups(&self) -> Result<Vec<GroupSummary>, RpcError> {
        Ok(self.groups.clone())
    }

    fn edit_queue(&self, command: &str, param: &str, ids: &[i64]) -> Result<bool, RpcError> {
        self.log
            .borrow_mut()
            .edits
            .push((command.to_string(), param.to_string(), ids.to_vec()));
        Ok(true)
    }
}
