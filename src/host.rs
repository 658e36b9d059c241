use crate::{
    classify::{FailureLink, JobOutcome, ParStatus, UnpackStatus},
    error::HookError,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Set by NZBGet for every script it launches.
pub const HOST_MARKER: &str = "NZBOP_SCRIPTDIR";

pub const PAR_STATUS: &str = "NZBPP_PARSTATUS";
pub const UNPACK_STATUS: &str = "NZBPP_UNPACKSTATUS";
pub const TOTAL_STATUS: &str = "NZBPP_STATUS";
pub const FORCE_FAILURE: &str = "NZBPR_FAILURELINK_FORCE";
pub const DIRECTORY: &str = "NZBPP_DIRECTORY";
pub const NZB_FILENAME: &str = "NZBPP_NZBFILENAME";
pub const CATEGORY: &str = "NZBPP_CATEGORY";
pub const FAILURE_LINK: &str = "NZBPR__DNZB_FAILURE";

const OPTION_PREFIX: &str = "NZBPO_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitStatus {
    Success,
    Error,
    None,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 93,
            ExitStatus::Error => 94,
            ExitStatus::None => 95,
        }
    }
}

/// Named parameters injected by the queue manager, captured once at startup.
#[derive(Debug, Clone, Default)]
pub struct HostParams {
    vars: BTreeMap<String, String>,
}

impl HostParams {
    pub fn from_env() -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();
        Self { vars }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn require(&self, name: &str) -> Result<&str, HookError> {
        self.get(name)
            .ok_or_else(|| HookError::MissingParameter(name.to_string()))
    }

    /// A script option (`NZBPO_<NAME>`).
    pub fn option(&self, name: &str) -> Option<&str> {
        self.get(&format!("{OPTION_PREFIX}{}", name.to_ascii_uppercase()))
    }

    pub fn check_invoked_by_host(&self) -> Result<(), HookError> {
        match self.get(HOST_MARKER) {
            Some(_) => Ok(()),
            None => Err(HookError::NotInvokedByHost(HOST_MARKER)),
        }
    }

    pub fn job_outcome(&self) -> Result<JobOutcome, HookError> {
        let par_raw = self.require(PAR_STATUS)?;
        let par_status = ParStatus::from_code(par_raw).ok_or_else(|| invalid(PAR_STATUS, par_raw))?;

        let unpack_raw = self.require(UNPACK_STATUS)?;
        let unpack_status =
            UnpackStatus::from_code(unpack_raw).ok_or_else(|| invalid(UNPACK_STATUS, unpack_raw))?;

        let marked_bad = self
            .get(TOTAL_STATUS)
            .is_some_and(|s| s.trim().eq_ignore_ascii_case("FAILURE/BAD"));
        let forced = match self.get(FORCE_FAILURE) {
            Some(raw) if !raw.trim().is_empty() => {
                parse_bool(raw).ok_or_else(|| invalid(FORCE_FAILURE, raw))?
            }
            _ => false,
        };

        Ok(JobOutcome {
            par_status,
            unpack_status,
            forced_failure: marked_bad || forced,
            directory: self.get(DIRECTORY).map(PathBuf::from),
            nzb_filename: self.get(NZB_FILENAME).unwrap_or_default().to_string(),
            category: self.get(CATEGORY).unwrap_or_default().to_string(),
        })
    }

    pub fn failure_link(&self) -> Option<FailureLink> {
        FailureLink::parse(self.get(FAILURE_LINK)?)
    }

    pub fn control_endpoint(&self) -> Result<ControlEndpoint, HookError> {
        let port_raw = self.require("NZBOP_CONTROLPORT")?;
        let port = port_raw
            .trim()
            .parse::<u16>()
            .map_err(|_| invalid("NZBOP_CONTROLPORT", port_raw))?;
        Ok(ControlEndpoint::new(
            self.require("NZBOP_CONTROLIP")?,
            port,
            self.get("NZBOP_CONTROLUSERNAME").unwrap_or_default(),
            self.get("NZBOP_CONTROLPASSWORD").unwrap_or_default(),
        ))
    }
}

/// Where the queue manager's RPC service listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlEndpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl ControlEndpoint {
    /// Wildcard bind addresses are not connectable; they are replaced by loopback.
    pub fn new(host: &str, port: u16, username: &str, password: &str) -> Self {
        let host = match host.trim() {
            "" | "0.0.0.0" => "127.0.0.1".to_string(),
            "::" | "[::]" => "::1".to_string(),
            other => other.to_string(),
        };
        Self {
            host,
            port,
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    pub fn rpc_url(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("http://[{}]:{}/jsonrpc", self.host, self.port)
        } else {
            format!("http://{}:{}/jsonrpc", self.host, self.port)
        }
    }
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" | "on" => Some(true),
        "no" | "false" | "0" | "off" => Some(false),
        _ => None,
    }
}

fn invalid(name: &str, value: &str) -> HookError {
    HookError::InvalidParameter {
        name: name.to_string(),
        value: value.to_string(),
    }
}
