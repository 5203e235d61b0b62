//! JSON text frames exchanged between the multiplexer and a backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{FrameError, RemoteError};
use crate::ids::InvokeId;

/// Outbound call. Carries no `type` tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeFrame {
    pub invoke_id: InvokeId,
    pub rpc_name: String,
    pub method_name: String,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default)]
    pub types: Option<Vec<String>>,
}

impl InvokeFrame {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_text(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Frames travelling from the backend to the client, discriminated by `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundFrame {
    #[serde(rename = "RPC_RETURN", rename_all = "camelCase")]
    Return {
        invoke_id: InvokeId,
        #[serde(default)]
        value: Value,
    },
    #[serde(rename = "RPC_EXCEPTION", rename_all = "camelCase")]
    Exception {
        invoke_id: InvokeId,
        #[serde(default)]
        error_message: String,
        #[serde(default)]
        exception: Value,
    },
    #[serde(rename = "RPC_INVOKE", rename_all = "camelCase")]
    Invoke {
        rpc_name: String,
        method_name: String,
        #[serde(default)]
        params: Vec<Value>,
    },
}

const KNOWN_TYPES: [&str; 3] = ["RPC_RETURN", "RPC_EXCEPTION", "RPC_INVOKE"];

impl InboundFrame {
    /// Parse one text frame, distinguishing an unrecognised `type` tag from
    /// a malformed body.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let raw: Value = serde_json::from_str(text)?;
        let tag = raw
            .get("type")
            .and_then(Value::as_str)
            .ok_or(FrameError::MissingType)?;
        if !KNOWN_TYPES.contains(&tag) {
            return Err(FrameError::UnknownType(tag.to_string()));
        }
        Ok(serde_json::from_value(raw)?)
    }

    pub fn to_text(&self) -> Result<String, FrameError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn returned(invoke_id: InvokeId, value: Value) -> Self {
        Self::Return { invoke_id, value }
    }

    pub fn exception(invoke_id: InvokeId, error: RemoteError) -> Self {
        Self::Exception {
            invoke_id,
            error_message: error.error_message,
            exception: error.exception,
        }
    }

    pub fn invoke(rpc_name: impl Into<String>, method_name: impl Into<String>, params: Vec<Value>) -> Self {
        Self::Invoke {
            rpc_name: rpc_name.into(),
            method_name: method_name.into(),
            params,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Return { .. } => "RPC_RETURN",
            Self::Exception { .. } => "RPC_EXCEPTION",
            Self::Invoke { .. } => "RPC_INVOKE",
        }
    }
}
