//! Partial, prefix-scoped snapshot of documents.
//!
//! Each document keeps a JSON tree plus the set of path prefixes known to be
//! authoritative. A path is a hit iff some stored prefix and the path are
//! related by prefix containment in either direction. Entries are created on
//! first write and never evicted.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};
use webstore_core::{timestamp_now, DocOp, JsonPath};

/// Outcome of a cache read.
///
/// `Hit(None)` is a cached absence; `Miss` means nothing is known.
#[derive(Clone, Debug, PartialEq)]
pub enum Lookup {
    Miss,
    Hit(Option<Value>),
}

impl Lookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Hit(value) => value.as_ref(),
            Self::Miss => None,
        }
    }

    /// Wire form: the value, or `null` for a miss or a cached absence.
    pub fn into_wire(self) -> Value {
        match self {
            Self::Hit(Some(value)) => value,
            Self::Hit(None) | Self::Miss => Value::Null,
        }
    }
}

#[derive(Clone, Debug)]
struct CacheEntry {
    doc: Value,
    prefixes: Vec<JsonPath>,
}

impl Default for CacheEntry {
    fn default() -> Self {
        Self {
            doc: Value::Object(Map::new()),
            prefixes: Vec::new(),
        }
    }
}

impl CacheEntry {
    fn get(&self, path: &JsonPath) -> Lookup {
        if self.prefixes.iter().any(|prefix| prefix.overlaps(path)) {
            Lookup::Hit(path.lookup(&self.doc).cloned())
        } else {
            Lookup::Miss
        }
    }

    fn has_data(&self) -> bool {
        !matches!(&self.doc, Value::Object(map) if map.is_empty())
    }
}

#[derive(Debug, Default)]
pub struct LocalCache {
    collections: HashMap<String, BTreeMap<String, CacheEntry>>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, collection: &str, doc_id: &str, path: &JsonPath) -> Lookup {
        self.entry(collection, doc_id)
            .map_or(Lookup::Miss, |entry| entry.get(path))
    }

    /// Store `value` at `path`, or remove the node when `value` is `None`.
    /// Returns what was known at `path` before the write.
    pub fn set(
        &mut self,
        collection: &str,
        doc_id: &str,
        path: &JsonPath,
        value: Option<Value>,
    ) -> Lookup {
        let entry = self.entry_mut(collection, doc_id);
        let prior = entry.get(path);
        match value {
            Some(value) => {
                if !path.assign(&mut entry.doc, value) {
                    return prior;
                }
            }
            None => {
                let _ = path.remove(&mut entry.doc);
            }
        }

        entry.prefixes.retain(|prefix| !prefix.starts_with(path));
        if !entry.prefixes.iter().any(|prefix| path.starts_with(prefix)) {
            entry.prefixes.push(path.clone());
        }
        prior
    }

    pub fn set_date(&mut self, collection: &str, doc_id: &str, path: &JsonPath) -> Lookup {
        self.set(collection, doc_id, path, Some(Value::String(timestamp_now())))
    }

    pub fn delete(&mut self, collection: &str, doc_id: &str, path: &JsonPath) -> Lookup {
        self.set(collection, doc_id, path, None)
    }

    /// Move the value at `from` to `to`. A no-op returning `Miss` when `from`
    /// holds nothing; otherwise returns the destination's prior value.
    pub fn move_value(
        &mut self,
        collection: &str,
        doc_id: &str,
        from: &JsonPath,
        to: &JsonPath,
    ) -> Lookup {
        let Lookup::Hit(Some(value)) = self.get(collection, doc_id, from) else {
            return Lookup::Miss;
        };
        let _ = self.delete(collection, doc_id, from);
        self.set(collection, doc_id, to, Some(value))
    }

    pub fn apply_op(&mut self, collection: &str, doc_id: &str, op: &DocOp) -> Lookup {
        match op {
            DocOp::Set { path, value } => self.set(collection, doc_id, path, Some(value.clone())),
            DocOp::SetDate { path } => self.set_date(collection, doc_id, path),
            DocOp::Get { path } => self.get(collection, doc_id, path),
            DocOp::Move { from, to } => self.move_value(collection, doc_id, from, to),
            DocOp::Delete { path } => self.delete(collection, doc_id, path),
        }
    }

    /// Run a batch in order. Returns the last GET's lookup when the batch
    /// has a GET, otherwise the last mutation's pre-value; `Miss` for an
    /// empty batch.
    pub fn apply(&mut self, collection: &str, doc_id: &str, ops: &[DocOp]) -> Lookup {
        self.apply_with(collection, doc_id, ops, |_, _| {})
    }

    /// Like [`apply`](Self::apply), reporting each op and its own result to
    /// `observe` as it runs.
    pub fn apply_with<F>(&mut self, collection: &str, doc_id: &str, ops: &[DocOp], mut observe: F) -> Lookup
    where
        F: FnMut(&DocOp, &Lookup),
    {
        let mut last_get = None;
        let mut last_mutation = Lookup::Miss;
        for op in ops {
            let result = self.apply_op(collection, doc_id, op);
            observe(op, &result);
            if op.is_mutation() {
                last_mutation = result;
            } else {
                last_get = Some(result);
            }
        }
        last_get.unwrap_or(last_mutation)
    }

    /// Ids of documents holding data in `[start, end]`, in order.
    pub fn find_doc_ids(&self, collection: &str, start: &str, end: &str) -> Vec<String> {
        if start > end {
            return Vec::new();
        }
        self.collections
            .get(collection)
            .map(|docs| {
                docs.range(start.to_string()..=end.to_string())
                    .filter(|(_, entry)| entry.has_data())
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn authoritative_paths(&self, collection: &str, doc_id: &str) -> Vec<JsonPath> {
        self.entry(collection, doc_id)
            .map(|entry| entry.prefixes.clone())
            .unwrap_or_default()
    }

    /// The whole cached tree of a document, if it was ever written.
    pub fn snapshot(&self, collection: &str, doc_id: &str) -> Option<Value> {
        self.entry(collection, doc_id).map(|entry| entry.doc.clone())
    }

    fn entry(&self, collection: &str, doc_id: &str) -> Option<&CacheEntry> {
        self.collections.get(collection)?.get(doc_id)
    }

    fn entry_mut(&mut self, collection: &str, doc_id: &str) -> &mut CacheEntry {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .entry(doc_id.to_string())
            .or_default()
    }
}
