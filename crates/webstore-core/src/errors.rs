use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::path::PathError;

/// Structured rejection carried by an `RPC_EXCEPTION` frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("remote exception: {error_message}")]
pub struct RemoteError {
    #[serde(default)]
    pub exception: Value,
    #[serde(default)]
    pub error_message: String,
}

impl RemoteError {
    pub fn new(exception: impl Into<Value>, error_message: impl Into<String>) -> Self {
        Self {
            exception: exception.into(),
            error_message: error_message.into(),
        }
    }

    /// Exception classification when the backend sent it as a plain string.
    pub fn kind(&self) -> Option<&str> {
        self.exception.as_str()
    }
}

/// Failure of a single remote call, observed only by its caller.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum RpcError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),
    #[error("call abandoned before it settled")]
    Abandoned,
    #[error("unexpected result: {0}")]
    Decode(String),
}

impl RpcError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Remote(_) => "remote",
            Self::InvalidPath(_) => "invalid_path",
            Self::Abandoned => "abandoned",
            Self::Decode(_) => "decode",
        }
    }
}

/// Session-level failure. Never attached to a pending call.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection closed")]
    Closed,
    #[error("protocol error: {0}")]
    Protocol(String),
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame has no type tag")]
    MissingType,
    #[error("unknown frame type: {0}")]
    UnknownType(String),
}
