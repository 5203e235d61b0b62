//! Invocation multiplexer: correlates outbound calls with their responses
//! and routes inbound calls to registered targets.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, warn};
use webstore_core::{IdGenerator, InvokeFrame, InvokeId, RandomIds, RemoteError, RpcError, TransportError};

use crate::call::{CallTarget, CallTargets, PendingCall, Rpc, Settle};
use crate::session::{HandlerKind, Session, SessionHandler};

struct Inner {
    session: RwLock<Arc<dyn Session>>,
    pending: Mutex<HashMap<InvokeId, Settle>>,
    targets: CallTargets,
    ids: Arc<dyn IdGenerator>,
}

/// Multiplexes calls over one session.
///
/// Pending calls are never timed out, retried or rejected on disconnect; a
/// call stays pending until a matching response arrives or the multiplexer
/// is dropped.
pub struct WebRpc {
    inner: Arc<Inner>,
}

impl WebRpc {
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self::with_ids(session, Arc::new(RandomIds::default()))
    }

    pub fn with_ids(session: Arc<dyn Session>, ids: Arc<dyn IdGenerator>) -> Self {
        let inner = Arc::new(Inner {
            session: RwLock::new(session.clone()),
            pending: Mutex::new(HashMap::new()),
            targets: CallTargets::new(),
            ids,
        });
        bind(&inner, session.as_ref());
        Self { inner }
    }

    pub fn session(&self) -> Arc<dyn Session> {
        self.inner.session.read().clone()
    }

    /// Replace the transport. Pending calls stay pending and may still be
    /// settled by the new session.
    pub fn set_session(&self, session: Arc<dyn Session>) {
        let previous = self.session();
        for kind in [HandlerKind::Return, HandlerKind::Exception, HandlerKind::Invoke] {
            previous.off(kind);
        }
        bind(&self.inner, session.as_ref());
        *self.inner.session.write() = session;
    }

    pub async fn open(&self) -> Result<(), TransportError> {
        self.session().open().await
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }
}

fn bind(inner: &Arc<Inner>, session: &dyn Session) {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    let w = weak.clone();
    session.on(SessionHandler::Return(Arc::new(move |id, value| {
        if let Some(inner) = w.upgrade() {
            inner.settle(id, Ok(value));
        }
    })));
    let w = weak.clone();
    session.on(SessionHandler::Exception(Arc::new(move |id, error: RemoteError| {
        if let Some(inner) = w.upgrade() {
            inner.settle(id, Err(RpcError::Remote(error)));
        }
    })));
    session.on(SessionHandler::Invoke(Arc::new(move |rpc_name, method, params| {
        if let Some(inner) = weak.upgrade() {
            debug!(%rpc_name, %method, "inbound invoke");
            inner.targets.dispatch(&rpc_name, &method, params);
        }
    })));
}

impl Inner {
    fn settle(&self, id: InvokeId, result: Result<Value, RpcError>) {
        let settle = self.pending.lock().remove(&id);
        match settle {
            Some(settle) => {
                debug!(invoke_id = %id, ok = result.is_ok(), "call settled");
                // The caller may have dropped its end; nothing to do then.
                let _ = settle.send(result);
            }
            None => warn!(invoke_id = %id, "unmatched response dropped"),
        }
    }
}

impl Rpc for WebRpc {
    fn invoke(
        &self,
        rpc_name: &str,
        method: &str,
        params: Vec<Value>,
        types: Option<Vec<String>>,
    ) -> PendingCall {
        let invoke_id = InvokeId::generate(self.inner.ids.as_ref());
        let (settle, call) = PendingCall::channel();
        let _ = self.inner.pending.lock().insert(invoke_id.clone(), settle);

        debug!(%invoke_id, rpc_name, method, "invoke");
        let frame = InvokeFrame {
            invoke_id,
            rpc_name: rpc_name.to_string(),
            method_name: method.to_string(),
            params,
            types,
        };
        self.session().invoke(frame);
        call
    }

    fn register(&self, rpc_name: &str, target: Arc<dyn CallTarget>) {
        self.inner.targets.register(rpc_name, target);
    }

    fn unregister(&self, rpc_name: &str) {
        self.inner.targets.unregister(rpc_name);
    }
}
