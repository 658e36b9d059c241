use crate::{
    classify::{FailureLink, JobOutcome},
    config::Network,
};
use regex::Regex;
use reqwest::blocking::{Client, Response};
use reqwest::header::HeaderMap;
use serde::Serialize;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const USER_AGENT: &str = concat!("NZBGet / FailureLink / ", env!("CARGO_PKG_VERSION"));
pub const DNZB_PREFIX: &str = "X-DNZB-";
const CATEGORY_HEADER: &str = "X-DNZB-Category";
const NZB_SIGNATURE: &[u8] = b"<?xml";

static FILENAME_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:^|;)\s*filename\s*=\s*(?:"((?:[^"\\]|\\.)*)"|([^;\s]+))"#)
        .expect("valid filename regex")
});

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("building http client: {0}")]
    Client(String),
    #[error("request to indexer failed: {0}")]
    Transport(String),
    #[error("indexer returned HTTP {0}")]
    Status(u16),
    #[error("reading indexer response: {0}")]
    Body(String),
}

/// Response headers grouped by name in order of first appearance, as
/// `HeaderMap` yields them; lookups ignore case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResponseHeaders(Vec<(String, String)>);

impl ResponseHeaders {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    fn from_header_map(map: &HeaderMap) -> Self {
        Self(
            map.iter()
                .map(|(k, v)| {
                    let value = match v.to_str() {
                        Ok(s) => s.to_string(),
                        Err(_) => String::from_utf8_lossy(v.as_bytes()).into_owned(),
                    };
                    (k.as_str().to_string(), value)
                })
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `X-DNZB-*` headers with the prefix stripped.
    pub fn dnzb(&self) -> Vec<(String, String)> {
        self.iter()
            .filter_map(|(k, v)| {
                let head = k.get(..DNZB_PREFIX.len())?;
                if !head.eq_ignore_ascii_case(DNZB_PREFIX) {
                    return None;
                }
                let name = canonical_name(&k[DNZB_PREFIX.len()..]);
                (!name.is_empty()).then(|| (name, v.to_string()))
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct IndexerResponse {
    pub status: u16,
    pub headers: ResponseHeaders,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub enum IndexerReply {
    Acknowledged {
        headers: ResponseHeaders,
        body: Option<Vec<u8>>,
    },
    NoRelease(ResponseHeaders),
}

impl IndexerResponse {
    /// 404 is how an indexer says it has nothing else; anything else
    /// outside 2xx is fatal.
    pub fn into_reply(self) -> Result<IndexerReply, FetchError> {
        match self.status {
            404 => Ok(IndexerReply::NoRelease(self.headers)),
            200..=299 => Ok(IndexerReply::Acknowledged {
                headers: self.headers,
                body: self.body,
            }),
            other => Err(FetchError::Status(other)),
        }
    }
}

pub trait Indexer {
    fn fetch(&self, link: &FailureLink, want_body: bool) -> Result<IndexerResponse, FetchError>;
}

pub struct HttpIndexer {
    verified: Client,
    unverified: Client,
}

impl HttpIndexer {
    pub fn new(network: &Network) -> Result<Self, FetchError> {
        let timeout = Duration::from_secs(network.http_timeout_seconds.max(1));
        let build = |accept_invalid: bool| {
            Client::builder()
                .user_agent(USER_AGENT)
                .timeout(timeout)
                .danger_accept_invalid_certs(accept_invalid)
                .build()
                .map_err(|e| FetchError::Client(e.to_string()))
        };
        Ok(Self {
            verified: build(false)?,
            unverified: build(true)?,
        })
    }
}

impl Indexer for HttpIndexer {
    fn fetch(&self, link: &FailureLink, want_body: bool) -> Result<IndexerResponse, FetchError> {
        debug!("GET {link}");
        let resp = match self.verified.get(link.as_str()).send() {
            Ok(r) => r,
            Err(first) => {
                warn!("request to indexer failed ({first}); retrying without certificate validation");
                self.unverified
                    .get(link.as_str())
                    .send()
                    .map_err(|e| FetchError::Transport(e.to_string()))?
            }
        };

        let status = resp.status().as_u16();
        let headers = ResponseHeaders::from_header_map(resp.headers());
        let body = if want_body && resp.status().is_success() {
            let bytes = resp.bytes().map_err(|e| FetchError::Body(e.to_string()))?;
            Some(bytes.to_vec())
        } else {
            drain(resp);
            None
        };
        debug!("indexer replied HTTP {status}");
        Ok(IndexerResponse {
            status,
            headers,
            body,
        })
    }
}

fn drain(mut resp: Response) {
    if let Err(e) = std::io::copy(&mut resp, &mut std::io::sink()) {
        debug!("discarding indexer response body: {e}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementPayload {
    pub content: Vec<u8>,
    pub filename: String,
    pub category: String,
    pub dnzb_headers: Vec<(String, String)>,
}

impl ReplacementPayload {
    /// `None` unless the body is an XML document; missing filename and
    /// category are taken from the failed job.
    pub fn from_reply(
        headers: &ResponseHeaders,
        body: Option<Vec<u8>>,
        original: &JobOutcome,
    ) -> Option<Self> {
        let content = body.filter(|b| looks_like_nzb(b))?;

        let filename = headers
            .get("Content-Disposition")
            .and_then(disposition_filename)
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| original.nzb_filename.clone());
        let category = headers
            .get(CATEGORY_HEADER)
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| original.category.clone());

        Some(Self {
            content,
            filename,
            category,
            dnzb_headers: headers.dnzb(),
        })
    }
}

pub fn looks_like_nzb(body: &[u8]) -> bool {
    !body.is_empty() && body.starts_with(NZB_SIGNATURE)
}

pub fn disposition_filename(value: &str) -> Option<String> {
    let caps = FILENAME_PARAM.captures(value)?;
    if let Some(quoted) = caps.get(1) {
        return Some(quoted.as_str().replace("\\\"", "\"").replace("\\\\", "\\"));
    }
    caps.get(2).map(|m| m.as_str().to_string())
}

/// Header names come back lowercased; restore `Word-Word` casing.
fn canonical_name(raw: &str) -> String {
    raw.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
