//! In-process stand-in for a remote backend.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, warn};
use webstore_core::{RemoteError, WEBSTORE_RPC_NAME};
use webstore_rpc::{CallTarget, CallTargets, PendingCall, Rpc};

use crate::engine::{Dispatched, StoreEngine};

/// Owner name under which local subscriptions are recorded.
pub const LOCAL_OWNER: &str = "local";

/// Serves the `webstore` surface from a [`StoreEngine`] without a network.
///
/// Calls settle before `invoke` returns. Pushes are delivered to the locally
/// registered `webstore` target first, outside the engine lock, so targets
/// may call back in.
#[derive(Default)]
pub struct LocalServer {
    engine: Mutex<StoreEngine>,
    targets: CallTargets,
}

impl LocalServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(engine: StoreEngine) -> Self {
        Self {
            engine: Mutex::new(engine),
            targets: CallTargets::new(),
        }
    }

    pub fn watch_count(&self) -> usize {
        self.engine.lock().watch_count()
    }

    /// Forget every subscription, as if the backend lost its state.
    pub fn drop_all_watches(&self) {
        self.engine.lock().clear_watches();
    }

    pub fn set_dev_mode(&self, enabled: bool) {
        self.engine.lock().set_dev_mode(enabled);
    }

    /// Run `f` against the engine while holding its lock.
    pub fn with_engine_ref<R>(&self, f: impl FnOnce(&StoreEngine) -> R) -> R {
        let engine = self.engine.lock();
        f(&*engine)
    }
}

impl Rpc for LocalServer {
    fn invoke(
        &self,
        rpc_name: &str,
        method: &str,
        params: Vec<Value>,
        _types: Option<Vec<String>>,
    ) -> PendingCall {
        if rpc_name != WEBSTORE_RPC_NAME {
            warn!(rpc_name, method, "local server has no such call target");
            return PendingCall::ready(Err(RemoteError::new(
                "UnknownTarget",
                format!("no call target named {rpc_name}"),
            )
            .into()));
        }

        let outcome = self.engine.lock().dispatch(LOCAL_OWNER, method, params);
        match outcome {
            Ok(Dispatched { value, pushes }) => {
                debug!(method, pushes = pushes.len(), "local call settled");
                for push in pushes {
                    self.targets
                        .dispatch(WEBSTORE_RPC_NAME, push.method, push.params);
                }
                PendingCall::ready(Ok(value))
            }
            Err(error) => {
                warn!(method, %error, "local call failed");
                let message = format!("{rpc_name}.{method} failed: {error}");
                PendingCall::ready(Err(error.to_remote(message).into()))
            }
        }
    }

    fn register(&self, rpc_name: &str, target: Arc<dyn CallTarget>) {
        self.targets.register(rpc_name, target);
    }

    fn unregister(&self, rpc_name: &str) {
        self.targets.unregister(rpc_name);
    }
}
