use crate::{fetch::FetchError, host::ExitStatus, queue::RpcError};
use thiserror::Error;

/// Fatal conditions of a hook run. Every variant ends the run with
/// [`ExitStatus::Error`].
#[derive(Debug, Error)]
pub enum HookError {
    #[error("not invoked by the queue manager: {0} is not set")]
    NotInvokedByHost(&'static str),

    #[error("missing host parameter {0}")]
    MissingParameter(String),

    #[error("invalid host parameter {name}={value:?}")]
    InvalidParameter { name: String, value: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("could not find added nzb-file {filename:?} in the list of downloads")]
    JobNotFound { filename: String },
}

impl HookError {
    pub fn exit_status(&self) -> ExitStatus {
        ExitStatus::Error
    }
}
