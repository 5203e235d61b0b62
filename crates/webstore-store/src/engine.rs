//! Reference store engine: the remote method surface over a [`LocalCache`]
//! plus the watch table that decides who is notified of a change.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Value};
use tracing::debug;
use webstore_core::{DocOp, JsonPath, ListenerId, PathError, RemoteError};

use crate::cache::{LocalCache, Lookup};

pub const ON_CHANGE: &str = "onChange";
pub const ON_CHANGE_DOC_DEV_MODE: &str = "onChangeDocDevMode";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("unknown method: {0}")]
    UnknownMethod(String),
    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),
}

impl StoreError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidParams(_) => "InvalidParams",
            Self::UnknownMethod(_) => "UnknownMethod",
            Self::InvalidPath(_) => "InvalidPath",
        }
    }

    pub fn to_remote(&self, error_message: impl Into<String>) -> RemoteError {
        RemoteError::new(self.error_kind(), error_message)
    }
}

/// A server-to-client call produced by a dispatch, addressed to the
/// connection that owns the subscription.
#[derive(Clone, Debug, PartialEq)]
pub struct Push {
    pub owner: String,
    pub method: &'static str,
    pub params: Vec<Value>,
}

/// Result value of a dispatched call and the pushes it triggered.
#[derive(Clone, Debug, PartialEq)]
pub struct Dispatched {
    pub value: Value,
    pub pushes: Vec<Push>,
}

#[derive(Clone, Debug)]
struct Watch {
    collection: String,
    doc_id: String,
    path: JsonPath,
}

#[derive(Debug, Default)]
pub struct StoreEngine {
    cache: LocalCache,
    watches: BTreeMap<(String, ListenerId), Watch>,
    dev_mode: bool,
}

impl StoreEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    pub fn dev_mode(&self) -> bool {
        self.dev_mode
    }

    pub fn set_dev_mode(&mut self, enabled: bool) {
        self.dev_mode = enabled;
    }

    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    /// Forget every subscription, as a backend restart would.
    pub fn clear_watches(&mut self) {
        self.watches.clear();
    }

    /// Drop every subscription held by `owner`. Returns how many were removed.
    pub fn remove_owner(&mut self, owner: &str) -> usize {
        let before = self.watches.len();
        self.watches.retain(|(o, _), _| o != owner);
        before - self.watches.len()
    }

    /// Run one remote method with positional params on behalf of `owner`.
    pub fn dispatch(&mut self, owner: &str, method: &str, params: Vec<Value>) -> Result<Dispatched, StoreError> {
        match method {
            "apply" => {
                let collection = str_param(&params, 0, "collection")?;
                let doc_id = str_param(&params, 1, "docId")?;
                let ops: Vec<DocOp> = serde_json::from_value(params.get(2).cloned().unwrap_or(Value::Null))
                    .map_err(|e| StoreError::InvalidParams(format!("ops: {e}")))?;
                let action = params.get(3).and_then(Value::as_str);
                Ok(self.apply(collection, doc_id, &ops, action))
            }
            "watch" => {
                let listener = ListenerId::from_raw(str_param(&params, 0, "listenerId")?);
                let collection = str_param(&params, 1, "collection")?;
                let doc_id = str_param(&params, 2, "docId")?;
                let path = JsonPath::parse(str_param(&params, 3, "path")?)?;
                Ok(self.watch(owner, listener, collection, doc_id, path))
            }
            "removeWatch" => {
                let listener = ListenerId::from_raw(str_param(&params, 0, "listenerId")?);
                self.remove_watch(owner, &listener);
                Ok(Dispatched {
                    value: Value::Null,
                    pushes: Vec::new(),
                })
            }
            "findDocId" => {
                let collection = str_param(&params, 0, "collection")?;
                let start = str_param(&params, 1, "start")?;
                let end = str_param(&params, 2, "end")?;
                let ids = self.cache.find_doc_ids(collection, start, end);
                Ok(Dispatched {
                    value: json!(ids),
                    pushes: Vec::new(),
                })
            }
            other => Err(StoreError::UnknownMethod(other.to_string())),
        }
    }

    /// Execute a batch and compute notifications.
    ///
    /// Watches on the same document whose path overlaps the longest common
    /// prefix of every path touched by a mutation are pushed their current
    /// value. Watches over uncached paths are skipped.
    pub fn apply(&mut self, collection: &str, doc_id: &str, ops: &[DocOp], action: Option<&str>) -> Dispatched {
        let original = self
            .dev_mode
            .then(|| self.cache.snapshot(collection, doc_id).unwrap_or(Value::Null));
        let mut changes = Vec::new();
        let dev_mode = self.dev_mode;
        let result = self.cache.apply_with(collection, doc_id, ops, |op, result| {
            if dev_mode && op.is_mutation() {
                changes.push(json!({"op": op, "before": result.clone().into_wire()}));
            }
        });

        let mut pushes = Vec::new();
        let mut touched = ops.iter().flat_map(DocOp::touched_paths);
        if let Some(first) = touched.next() {
            let prefix = touched.fold(first.clone(), |acc, path| acc.common_prefix(path));
            debug!(collection, doc_id, %prefix, "notifying overlapping watches");
            pushes.extend(self.notify(collection, doc_id, &prefix));

            if let Some(original) = original {
                let after = self.cache.snapshot(collection, doc_id).unwrap_or(Value::Null);
                changes.push(json!({
                    "op": DocOp::Set { path: JsonPath::root(), value: after },
                    "before": original,
                }));
                pushes.extend(self.dev_pushes(collection, doc_id, action, changes));
            }
        }

        Dispatched {
            value: result.into_wire(),
            pushes,
        }
    }

    /// Register (or re-register) a subscription and push the current value to
    /// this listener only, when the path is cached.
    pub fn watch(
        &mut self,
        owner: &str,
        listener: ListenerId,
        collection: &str,
        doc_id: &str,
        path: JsonPath,
    ) -> Dispatched {
        let lookup = self.cache.get(collection, doc_id, &path);
        let mut pushes = Vec::new();
        if lookup.is_hit() {
            pushes.push(change_push(owner, &listener, collection, doc_id, &path, lookup));
        }
        let _ = self.watches.insert(
            (owner.to_string(), listener),
            Watch {
                collection: collection.to_string(),
                doc_id: doc_id.to_string(),
                path,
            },
        );
        Dispatched {
            value: Value::Null,
            pushes,
        }
    }

    pub fn remove_watch(&mut self, owner: &str, listener: &ListenerId) -> bool {
        self.watches
            .remove(&(owner.to_string(), listener.clone()))
            .is_some()
    }

    fn notify(&self, collection: &str, doc_id: &str, prefix: &JsonPath) -> Vec<Push> {
        self.watches
            .iter()
            .filter(|(_, w)| w.collection == collection && w.doc_id == doc_id && w.path.overlaps(prefix))
            .filter_map(|((owner, listener), w)| {
                let lookup = self.cache.get(collection, doc_id, &w.path);
                lookup
                    .is_hit()
                    .then(|| change_push(owner, listener, collection, doc_id, &w.path, lookup))
            })
            .collect()
    }

    fn dev_pushes(&self, collection: &str, doc_id: &str, action: Option<&str>, changes: Vec<Value>) -> Vec<Push> {
        let owners: BTreeSet<&str> = self
            .watches
            .iter()
            .filter(|(_, w)| w.collection == collection && w.doc_id == doc_id)
            .map(|((owner, _), _)| owner.as_str())
            .collect();
        let changes = Value::Array(changes);
        owners
            .into_iter()
            .map(|owner| Push {
                owner: owner.to_string(),
                method: ON_CHANGE_DOC_DEV_MODE,
                params: vec![json!(collection), json!(doc_id), json!(action), changes.clone()],
            })
            .collect()
    }
}

fn change_push(
    owner: &str,
    listener: &ListenerId,
    collection: &str,
    doc_id: &str,
    path: &JsonPath,
    lookup: Lookup,
) -> Push {
    Push {
        owner: owner.to_string(),
        method: ON_CHANGE,
        params: vec![
            json!(listener),
            json!(collection),
            json!(doc_id),
            json!(path),
            lookup.into_wire(),
        ],
    }
}

fn str_param<'a>(params: &'a [Value], index: usize, name: &str) -> Result<&'a str, StoreError> {
    params
        .get(index)
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::InvalidParams(format!("{name} (param {index}) must be a string")))
}
