use crate::{config::Network, error::HookError, host::ControlEndpoint};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const PARAM_PREFIX: &str = "*DNZB:";

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("rpc {method}: transport error: {message}")]
    Transport { method: String, message: String },
    #[error("rpc {method}: HTTP {status}")]
    Status { method: String, status: u16 },
    #[error("rpc {method} failed: {message}")]
    Remote { method: String, message: String },
    #[error("rpc {method}: unexpected response shape: {message}")]
    Schema { method: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppendRequest {
    pub filename: String,
    pub category: String,
    pub content_base64: String,
    pub priority: i32,
    pub add_to_top: bool,
    pub add_paused: bool,
    pub dupe_key: String,
    pub dupe_score: i32,
    pub dupe_mode: String,
}

/// One entry of the queue manager's active download list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawGroup")]
pub struct GroupSummary {
    pub nzb_filename: String,
    pub nzb_id: i64,
}

#[derive(Deserialize)]
struct RawGroup {
    #[serde(rename = "NZBFilename")]
    nzb_filename: String,
    #[serde(rename = "NZBID", default)]
    nzb_id: Option<i64>,
    // Managers before v13 only report the id of the last file in the group.
    #[serde(rename = "LastID", default)]
    last_id: Option<i64>,
}

impl TryFrom<RawGroup> for GroupSummary {
    type Error = String;

    fn try_from(raw: RawGroup) -> Result<Self, Self::Error> {
        let nzb_id = raw
            .nzb_id
            .or(raw.last_id)
            .ok_or_else(|| format!("group {:?} has neither NZBID nor LastID", raw.nzb_filename))?;
        Ok(Self {
            nzb_filename: raw.nzb_filename,
            nzb_id,
        })
    }
}

pub trait QueueManager {
    /// `Ok(false)` means the manager refused the file.
    fn append(&self, req: &AppendRequest) -> Result<bool, RpcError>;
    fn list_groups(&self) -> Result<Vec<GroupSummary>, RpcError>;
    fn edit_queue(&self, command: &str, param: &str, ids: &[i64]) -> Result<bool, RpcError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueuedJobHandle(i64);

impl QueuedJobHandle {
    pub fn new(id: i64) -> Option<Self> {
        (id != 0).then_some(Self(id))
    }

    pub fn id(self) -> i64 {
        self.0
    }
}

pub struct QueueResubmitter<'a, Q: QueueManager + ?Sized> {
    queue: &'a Q,
}

impl<'a, Q: QueueManager + ?Sized> QueueResubmitter<'a, Q> {
    pub fn new(queue: &'a Q) -> Self {
        Self { queue }
    }

    /// Queues the file paused at the top and finds the id it was given.
    pub fn submit(
        &self,
        filename: &str,
        category: &str,
        content: &[u8],
    ) -> Result<QueuedJobHandle, HookError> {
        let req = AppendRequest {
            filename: filename.to_string(),
            category: category.to_string(),
            content_base64: STANDARD.encode(content),
            priority: 0,
            add_to_top: true,
            add_paused: true,
            dupe_key: String::new(),
            dupe_score: 0,
            dupe_mode: "ALL".to_string(),
        };
        if !self.queue.append(&req)? {
            return Err(RpcError::Remote {
                method: "append".into(),
                message: format!("queue manager rejected {filename:?}"),
            }
            .into());
        }

        let groups = self.queue.list_groups()?;
        for group in &groups {
            debug!("queued group id={} file={}", group.nzb_id, group.nzb_filename);
        }
        // Not safe if something else appends the same filename concurrently.
        let handle = groups
            .iter()
            .rev()
            .find(|g| g.nzb_filename == filename)
            .and_then(|g| QueuedJobHandle::new(g.nzb_id));
        match handle {
            Some(h) => {
                debug!("GroupID: {}", h.id());
                Ok(h)
            }
            None => Err(HookError::JobNotFound {
                filename: filename.to_string(),
            }),
        }
    }

    pub fn propagate_headers(
        &self,
        handle: QueuedJobHandle,
        headers: &[(String, String)],
    ) -> Result<(), RpcError> {
        for (name, value) in headers {
            let param = format!("{PARAM_PREFIX}{name}={value}");
            debug!("set parameter {param}");
            self.edit(handle, "GroupSetParameter", &param)?;
        }
        Ok(())
    }

    pub fn resume(&self, handle: QueuedJobHandle) -> Result<(), RpcError> {
        self.edit(handle, "GroupResume", "")?;
        info!("resumed job {}", handle.id());
        Ok(())
    }

    fn edit(&self, handle: QueuedJobHandle, command: &str, param: &str) -> Result<(), RpcError> {
        if self.queue.edit_queue(command, param, &[handle.id()])? {
            Ok(())
        } else {
            Err(RpcError::Remote {
                method: format!("editqueue {command}"),
                message: format!("refused for job {}", handle.id()),
            })
        }
    }
}

/// NZBGet's JSON-RPC endpoint.
pub struct JsonRpcQueue {
    client: Client,
    endpoint: ControlEndpoint,
}

/// A JSON-RPC reply before its `result` is decoded.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

impl JsonRpcQueue {
    pub fn new(endpoint: ControlEndpoint, network: &Network) -> Result<Self, RpcError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(network.rpc_timeout_seconds.max(1)))
            .build()
            .map_err(|e| RpcError::Transport {
                method: "connect".into(),
                message: e.to_string(),
            })?;
        Ok(Self { client, endpoint })
    }

    fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, RpcError> {
        let body = serde_json::json!({
            "version": "1.1",
            "id": 1,
            "method": method,
            "params": params,
        });
        let mut req = self.client.post(self.endpoint.rpc_url()).json(&body);
        if !self.endpoint.username.is_empty() {
            req = req.basic_auth(&self.endpoint.username, Some(&self.endpoint.password));
        }
        let resp = req.send().map_err(|e| RpcError::Transport {
            method: method.to_string(),
            message: e.to_string(),
        })?;
        if !resp.status().is_success() {
            return Err(RpcError::Status {
                method: method.to_string(),
                status: resp.status().as_u16(),
            });
        }
        let envelope: Envelope = resp.json().map_err(|e| RpcError::Schema {
            method: method.to_string(),
            message: e.to_string(),
        })?;
        decode_envelope(method, envelope)
    }
}

pub fn decode_envelope<T: DeserializeOwned>(method: &str, envelope: Envelope) -> Result<T, RpcError> {
    if let Some(err) = envelope.error.filter(|e| !e.is_null()) {
        let message = err
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Err(RpcError::Remote {
            method: method.to_string(),
            message,
        });
    }
    let result = envelope.result.ok_or_else(|| RpcError::Schema {
        method: method.to_string(),
        message: "missing result".into(),
    })?;
    serde_json::from_value(result).map_err(|e| RpcError::Schema {
        method: method.to_string(),
        message: e.to_string(),
    })
}

/// Older managers answer `append` with a bool, newer ones with the new id.
pub fn append_accepted(ack: &serde_json::Value) -> bool {
    match ack {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_i64().is_some_and(|id| id > 0),
        _ => false,
    }
}

impl QueueManager for JsonRpcQueue {
    fn append(&self, req: &AppendRequest) -> Result<bool, RpcError> {
        let ack: serde_json::Value = self.call(
            "append",
            serde_json::json!([
                req.filename,
                req.content_base64,
                req.category,
                req.priority,
                req.add_to_top,
                req.add_paused,
                req.dupe_key,
                req.dupe_score,
                req.dupe_mode,
                [],
            ]),
        )?;
        debug!("append ack: {ack}");
        Ok(append_accepted(&ack))
    }

    fn list_groups(&self) -> Result<Vec<GroupSummary>, RpcError> {
        self.call("listgroups", serde_json::json!([0]))
    }

    fn edit_queue(&self, command: &str, param: &str, ids: &[i64]) -> Result<bool, RpcError> {
        self.call("editqueue", serde_json::json!([command, param, ids]))
    }
}
