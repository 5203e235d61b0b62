//! Document handles and operation batches.

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};
use webstore_core::{DocOp, JsonPath, PathError, RpcError, WEBSTORE_RPC_NAME};
use webstore_rpc::{PendingCall, Rpc};

use crate::watch::{WatchCallback, WatchHandle, WatchKey, WatchNotice, WatchRegistry};

/// Handle to one document. Cheap to clone; holds no document data.
#[derive(Clone)]
pub struct DocRef {
    collection: String,
    doc_id: String,
    rpc: Arc<dyn Rpc>,
    watches: Arc<WatchRegistry>,
}

impl fmt::Debug for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocRef")
            .field("collection", &self.collection)
            .field("doc_id", &self.doc_id)
            .finish_non_exhaustive()
    }
}

impl DocRef {
    pub(crate) fn new(
        collection: impl Into<String>,
        doc_id: impl Into<String>,
        rpc: Arc<dyn Rpc>,
        watches: Arc<WatchRegistry>,
    ) -> Self {
        Self {
            collection: collection.into(),
            doc_id: doc_id.into(),
            rpc,
            watches,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn batch(&self) -> DocOps {
        DocOps {
            doc: self.clone(),
            ops: Vec::new(),
            error: None,
        }
    }

    pub fn get(&self, path: &str) -> DocOps {
        self.batch().get(path)
    }

    pub fn set(&self, path: &str, value: impl Into<Value>) -> DocOps {
        self.batch().set(path, value)
    }

    pub fn set_date(&self, path: &str) -> DocOps {
        self.batch().set_date(path)
    }

    pub fn delete(&self, path: &str) -> DocOps {
        self.batch().delete(path)
    }

    pub fn move_value(&self, from: &str, to: &str) -> DocOps {
        self.batch().move_value(from, to)
    }

    /// Subscribe to the value at `path`.
    ///
    /// Listeners on the same (collection, document, path) share one remote
    /// subscription. Paths are compared in canonical form, so `$.a` and
    /// `$['a']` are the same key.
    pub fn watch<F>(&self, path: &str, callback: F) -> Result<WatchHandle, PathError>
    where
        F: Fn(&WatchNotice<'_>) + Send + Sync + 'static,
    {
        let key = WatchKey {
            collection: self.collection.clone(),
            doc_id: self.doc_id.clone(),
            path: JsonPath::parse(path)?,
        };
        let callback: WatchCallback = Arc::new(callback);
        Ok(self.watches.watch(key, callback))
    }
}

/// Ordered operation batch against one document, submitted as a single
/// `apply` call.
///
/// A path that fails to parse poisons the batch: [`apply`](Self::apply)
/// then settles with [`RpcError::InvalidPath`] and nothing is sent.
#[must_use = "a batch does nothing until applied"]
pub struct DocOps {
    doc: DocRef,
    ops: Vec<DocOp>,
    error: Option<PathError>,
}

impl DocOps {
    pub fn get(self, path: &str) -> Self {
        self.push(path, |path| DocOp::Get { path })
    }

    pub fn set(self, path: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        self.push(path, move |path| DocOp::Set { path, value })
    }

    /// Store the server's current time, as an RFC 3339 string, at `path`.
    pub fn set_date(self, path: &str) -> Self {
        self.push(path, |path| DocOp::SetDate { path })
    }

    pub fn delete(self, path: &str) -> Self {
        self.push(path, |path| DocOp::Delete { path })
    }

    pub fn move_value(mut self, from: &str, to: &str) -> Self {
        match (JsonPath::parse(from), JsonPath::parse(to)) {
            (Ok(from), Ok(to)) => self.ops.push(DocOp::Move { from, to }),
            (Err(e), _) | (_, Err(e)) => self.poison(e),
        }
        self
    }

    pub fn ops(&self) -> &[DocOp] {
        &self.ops
    }

    pub fn apply(self) -> PendingCall {
        self.submit(None)
    }

    /// Like [`apply`](Self::apply), labelled with an action name for
    /// development-mode reports.
    pub fn apply_action(self, action_name: &str) -> PendingCall {
        self.submit(Some(action_name))
    }

    fn submit(self, action_name: Option<&str>) -> PendingCall {
        if let Some(error) = self.error {
            return PendingCall::ready(Err(RpcError::InvalidPath(error)));
        }
        let DocRef {
            collection,
            doc_id,
            rpc,
            ..
        } = self.doc;
        rpc.invoke(
            WEBSTORE_RPC_NAME,
            "apply",
            vec![
                json!(collection),
                json!(doc_id),
                json!(self.ops),
                json!(action_name),
            ],
            None,
        )
    }

    fn push(mut self, path: &str, make: impl FnOnce(JsonPath) -> DocOp) -> Self {
        match JsonPath::parse(path) {
            Ok(path) => self.ops.push(make(path)),
            Err(e) => self.poison(e),
        }
        self
    }

    fn poison(&mut self, error: PathError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}
