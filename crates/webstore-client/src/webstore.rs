//! The client facade.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use serde_json::{json, Value};
use tracing::{debug, warn};
use webstore_core::{IdGenerator, JsonPath, ListenerId, RandomIds, RpcError, WEBSTORE_RPC_NAME};
use webstore_rpc::{CallError, CallTarget, Rpc};
use webstore_store::{LocalServer, ON_CHANGE, ON_CHANGE_DOC_DEV_MODE};

use crate::diagnostics::{DiagnosticsSink, DocChangeReport, TracingSink};
use crate::doc::DocRef;
use crate::watch::{WatchKey, WatchRegistry};

/// Entry point of the document store client.
///
/// Registers itself on the RPC layer as the `webstore` call target so the
/// backend can push `onChange` and `onChangeDocDevMode`. Cloning shares the
/// same registration; it is released when the last clone is dropped.
#[derive(Clone)]
pub struct Webstore {
    inner: Arc<Inner>,
}

struct Inner {
    rpc: Arc<dyn Rpc>,
    watches: Arc<WatchRegistry>,
    sink: Arc<dyn DiagnosticsSink>,
    dev_mode: AtomicBool,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.rpc.unregister(WEBSTORE_RPC_NAME);
    }
}

impl Webstore {
    pub fn new(rpc: Arc<dyn Rpc>) -> Self {
        Self::builder().rpc(rpc).build()
    }

    /// A store served by an in-process [`LocalServer`].
    pub fn in_process() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> WebstoreBuilder {
        WebstoreBuilder::default()
    }

    pub fn get_ref(&self, collection: &str, doc_id: &str) -> DocRef {
        DocRef::new(
            collection,
            doc_id,
            self.inner.rpc.clone(),
            self.inner.watches.clone(),
        )
    }

    /// Handles to every document of `collection` whose id lies in
    /// `start..=end`, in id order.
    pub async fn find_ref(&self, collection: &str, start: &str, end: &str) -> Result<Vec<DocRef>, RpcError> {
        let ids: Vec<String> = self
            .inner
            .rpc
            .invoke(
                WEBSTORE_RPC_NAME,
                "findDocId",
                vec![json!(collection), json!(start), json!(end)],
                None,
            )
            .decode()
            .await?;
        Ok(ids.iter().map(|id| self.get_ref(collection, id)).collect())
    }

    /// Deliver a change pushed by the backend to the listeners of its key.
    pub fn on_change(
        &self,
        listener: &ListenerId,
        collection: &str,
        doc_id: &str,
        path: JsonPath,
        value: Value,
    ) -> bool {
        let key = WatchKey {
            collection: collection.to_string(),
            doc_id: doc_id.to_string(),
            path,
        };
        self.inner.watches.on_change(listener, &key, value)
    }

    /// Re-issue every remote subscription. Call after the transport has
    /// (re)connected; nothing calls this automatically.
    pub fn register_all_watches(&self) {
        self.inner.watches.register_all_watches();
    }

    pub fn dev_mode(&self, enabled: bool) {
        self.inner.dev_mode.store(enabled, Ordering::Relaxed);
    }

    pub fn is_dev_mode(&self) -> bool {
        self.inner.dev_mode.load(Ordering::Relaxed)
    }

    pub fn watches(&self) -> &Arc<WatchRegistry> {
        &self.inner.watches
    }

    pub fn rpc(&self) -> &Arc<dyn Rpc> {
        &self.inner.rpc
    }
}

impl Inner {
    fn on_change_doc_dev_mode(&self, collection: &str, doc_id: &str, action: Option<&str>, changes: &[Value]) {
        if !self.dev_mode.load(Ordering::Relaxed) {
            return;
        }
        match DocChangeReport::from_changes(collection, doc_id, action, changes) {
            Some(report) => self.sink.report(&report),
            None => warn!(collection, doc_id, "dev-mode change without entries dropped"),
        }
    }
}

#[derive(Default)]
pub struct WebstoreBuilder {
    rpc: Option<Arc<dyn Rpc>>,
    ids: Option<Arc<dyn IdGenerator>>,
    sink: Option<Arc<dyn DiagnosticsSink>>,
}

impl WebstoreBuilder {
    pub fn rpc(mut self, rpc: Arc<dyn Rpc>) -> Self {
        self.rpc = Some(rpc);
        self
    }

    /// Generator for listener ids. Defaults to [`RandomIds`].
    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Receiver of development-mode reports. Defaults to [`TracingSink`].
    pub fn sink(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Webstore {
        let rpc = self.rpc.unwrap_or_else(|| Arc::new(LocalServer::new()));
        let ids = self.ids.unwrap_or_else(|| Arc::new(RandomIds::default()));
        let inner = Arc::new(Inner {
            watches: Arc::new(WatchRegistry::new(rpc.clone(), ids)),
            sink: self.sink.unwrap_or_else(|| Arc::new(TracingSink)),
            dev_mode: AtomicBool::new(false),
            rpc,
        });
        inner.rpc.register(
            WEBSTORE_RPC_NAME,
            Arc::new(PushTarget {
                inner: Arc::downgrade(&inner),
            }),
        );
        Webstore { inner }
    }
}

/// Inbound side of the facade. Holds the facade weakly so the RPC layer's
/// target table does not keep it alive.
struct PushTarget {
    inner: Weak<Inner>,
}

impl CallTarget for PushTarget {
    fn call(&self, method: &str, params: Vec<Value>) -> Result<(), CallError> {
        let Some(inner) = self.inner.upgrade() else {
            debug!(method, "push for a dropped store ignored");
            return Ok(());
        };
        match method {
            ON_CHANGE => {
                let listener = ListenerId::from_raw(str_param(&params, 0, "listenerId")?);
                let collection = str_param(&params, 1, "collection")?;
                let doc_id = str_param(&params, 2, "docId")?;
                let path = JsonPath::parse(str_param(&params, 3, "path")?)
                    .map_err(|e| CallError::InvalidParams(format!("path: {e}")))?;
                let value = params.get(4).cloned().unwrap_or(Value::Null);
                let key = WatchKey {
                    collection: collection.to_string(),
                    doc_id: doc_id.to_string(),
                    path,
                };
                let _ = inner.watches.on_change(&listener, &key, value);
                Ok(())
            }
            ON_CHANGE_DOC_DEV_MODE => {
                let collection = str_param(&params, 0, "collection")?;
                let doc_id = str_param(&params, 1, "docId")?;
                let action = params.get(2).and_then(Value::as_str);
                let changes = params
                    .get(3)
                    .and_then(Value::as_array)
                    .ok_or_else(|| CallError::InvalidParams("changes must be an array".into()))?;
                inner.on_change_doc_dev_mode(collection, doc_id, action, changes);
                Ok(())
            }
            other => Err(CallError::UnknownMethod(other.to_string())),
        }
    }
}

fn str_param<'a>(params: &'a [Value], index: usize, name: &str) -> Result<&'a str, CallError> {
    params
        .get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| CallError::InvalidParams(format!("{name} must be a string")))
}
