//! Pending results, inbound call targets and the `Rpc` capability.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use webstore_core::RpcError;

pub type CallResult = Result<Value, RpcError>;

/// Settling side of a [`PendingCall`].
pub type Settle = oneshot::Sender<CallResult>;

/// Result of an outbound call.
///
/// Resolves once the matching return or exception arrives. There is no
/// timeout: a call whose response never arrives stays pending until the
/// settling side is dropped, which resolves it to [`RpcError::Abandoned`].
#[must_use = "a pending call does nothing unless awaited or detached"]
pub struct PendingCall {
    state: PendingState,
}

enum PendingState {
    Waiting(oneshot::Receiver<CallResult>),
    Ready(Option<CallResult>),
}

impl PendingCall {
    pub fn channel() -> (Settle, Self) {
        let (tx, rx) = oneshot::channel();
        (
            tx,
            Self {
                state: PendingState::Waiting(rx),
            },
        )
    }

    /// An already-settled call.
    pub fn ready(result: CallResult) -> Self {
        Self {
            state: PendingState::Ready(Some(result)),
        }
    }

    /// Await and deserialize the result value.
    pub async fn decode<T: DeserializeOwned>(self) -> Result<T, RpcError> {
        let value = self.await?;
        serde_json::from_value(value).map_err(|e| RpcError::Decode(e.to_string()))
    }

    /// Fire-and-forget. A rejection is logged under `what`.
    ///
    /// Outside a tokio runtime a call that has not settled yet is dropped
    /// without logging.
    pub fn detach(mut self, what: &'static str) {
        if let Some(result) = (&mut self).now_or_never() {
            log_outcome(what, result);
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                drop(handle.spawn(async move { log_outcome(what, self.await) }));
            }
            Err(_) => debug!(what, "detached call outside a runtime"),
        }
    }
}

fn log_outcome(what: &'static str, result: CallResult) {
    match result {
        Ok(_) => debug!(what, "detached call settled"),
        Err(error) => warn!(what, %error, "detached call failed"),
    }
}

impl Future for PendingCall {
    type Output = CallResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            PendingState::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(RpcError::Abandoned))),
            PendingState::Ready(slot) => Poll::Ready(slot.take().unwrap_or(Err(RpcError::Abandoned))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CallError {
    #[error("unknown method: {0}")]
    UnknownMethod(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
}

/// A local object reachable by inbound invocations.
pub trait CallTarget: Send + Sync {
    fn call(&self, method: &str, params: Vec<Value>) -> Result<(), CallError>;
}

/// Outbound calls plus registration of inbound call targets.
pub trait Rpc: Send + Sync {
    fn invoke(
        &self,
        rpc_name: &str,
        method: &str,
        params: Vec<Value>,
        types: Option<Vec<String>>,
    ) -> PendingCall;

    fn register(&self, rpc_name: &str, target: Arc<dyn CallTarget>);

    fn unregister(&self, rpc_name: &str);
}

/// Name-keyed table of call targets.
#[derive(Default)]
pub struct CallTargets {
    targets: RwLock<HashMap<String, Arc<dyn CallTarget>>>,
}

impl CallTargets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, rpc_name: &str, target: Arc<dyn CallTarget>) {
        let _ = self.targets.write().insert(rpc_name.to_string(), target);
    }

    pub fn unregister(&self, rpc_name: &str) {
        let _ = self.targets.write().remove(rpc_name);
    }

    pub fn contains(&self, rpc_name: &str) -> bool {
        self.targets.read().contains_key(rpc_name)
    }

    /// Invoke `method` on the named target. Missing targets, unknown
    /// methods and bad params are logged and dropped.
    pub fn dispatch(&self, rpc_name: &str, method: &str, params: Vec<Value>) {
        let target = self.targets.read().get(rpc_name).cloned();
        let Some(target) = target else {
            warn!(rpc_name, method, "inbound call to unregistered target dropped");
            return;
        };
        if let Err(error) = target.call(method, params) {
            warn!(rpc_name, method, %error, "inbound call dropped");
        }
    }
}
