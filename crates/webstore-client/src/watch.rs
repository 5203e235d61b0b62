//! Watch registry: one remote subscription per (collection, docId, path),
//! fanned out to any number of local listeners.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, warn};
use webstore_core::{IdGenerator, JsonPath, ListenerId, WEBSTORE_RPC_NAME};
use webstore_rpc::Rpc;

/// What a listener is told about a change.
#[derive(Clone, Copy, Debug)]
pub struct WatchNotice<'a> {
    pub collection: &'a str,
    pub doc_id: &'a str,
    pub path: &'a JsonPath,
    /// `None` until the first push for this key has arrived.
    pub value: Option<&'a Value>,
}

pub type WatchCallback = Arc<dyn Fn(&WatchNotice<'_>) + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct WatchKey {
    pub collection: String,
    pub doc_id: String,
    pub path: JsonPath,
}

struct WatchRecord {
    /// Listener id the remote subscription was registered under.
    registration: ListenerId,
    listeners: Vec<(ListenerId, WatchCallback)>,
    value: Option<Value>,
}

pub struct WatchRegistry {
    rpc: Arc<dyn Rpc>,
    ids: Arc<dyn IdGenerator>,
    records: Mutex<BTreeMap<WatchKey, WatchRecord>>,
}

impl WatchRegistry {
    pub fn new(rpc: Arc<dyn Rpc>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            rpc,
            ids,
            records: Mutex::new(BTreeMap::new()),
        }
    }

    /// Attach `callback` to `key`.
    ///
    /// The first listener on a key opens the remote subscription; later ones
    /// are attached locally and called right away with the last known value.
    pub fn watch(self: &Arc<Self>, key: WatchKey, callback: WatchCallback) -> WatchHandle {
        let listener = ListenerId::generate(self.ids.as_ref());
        let handle = WatchHandle {
            registry: Arc::downgrade(self),
            listener: listener.clone(),
        };

        let mut records = self.records.lock();
        if let Some(record) = records.get_mut(&key) {
            record.listeners.push((listener, callback.clone()));
            let value = record.value.clone();
            drop(records);
            callback(&WatchNotice {
                collection: &key.collection,
                doc_id: &key.doc_id,
                path: &key.path,
                value: value.as_ref(),
            });
            return handle;
        }

        debug!(collection = %key.collection, doc_id = %key.doc_id, path = %key.path, %listener, "opening watch");
        let _ = records.insert(
            key.clone(),
            WatchRecord {
                registration: listener.clone(),
                listeners: vec![(listener.clone(), callback)],
                value: None,
            },
        );
        drop(records);
        self.send_watch(&listener, &key);
        handle
    }

    /// Remove `listener` from every record holding it. Records left empty are
    /// dropped and their remote subscription released.
    pub fn unsubscribe(&self, listener: &ListenerId) {
        let mut released = Vec::new();
        self.records.lock().retain(|_, record| {
            record.listeners.retain(|(id, _)| id != listener);
            if record.listeners.is_empty() {
                released.push(record.registration.clone());
                false
            } else {
                true
            }
        });

        for registration in released {
            debug!(%registration, "releasing watch");
            self.rpc
                .invoke(WEBSTORE_RPC_NAME, "removeWatch", vec![json!(registration)], None)
                .detach("removeWatch");
        }
    }

    /// Inbound push. Stores the value, then calls every listener on the key.
    /// Returns `false` when no record matches.
    pub fn on_change(&self, listener: &ListenerId, key: &WatchKey, value: Value) -> bool {
        let callbacks: Vec<WatchCallback> = {
            let mut records = self.records.lock();
            let Some(record) = records.get_mut(key) else {
                warn!(%listener, collection = %key.collection, doc_id = %key.doc_id, path = %key.path, "change for unknown watch dropped");
                return false;
            };
            record.value = Some(value.clone());
            record.listeners.iter().map(|(_, cb)| cb.clone()).collect()
        };

        let notice = WatchNotice {
            collection: &key.collection,
            doc_id: &key.doc_id,
            path: &key.path,
            value: Some(&value),
        };
        for callback in callbacks {
            callback(&notice);
        }
        true
    }

    /// Re-issue one remote `watch` per live record under its original
    /// registration id. Local listeners are untouched.
    pub fn register_all_watches(&self) {
        let live: Vec<(ListenerId, WatchKey)> = self
            .records
            .lock()
            .iter()
            .map(|(key, record)| (record.registration.clone(), key.clone()))
            .collect();
        debug!(count = live.len(), "re-registering watches");
        for (registration, key) in live {
            self.send_watch(&registration, &key);
        }
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().len()
    }

    pub fn listener_count(&self, key: &WatchKey) -> usize {
        self.records
            .lock()
            .get(key)
            .map_or(0, |record| record.listeners.len())
    }

    fn send_watch(&self, registration: &ListenerId, key: &WatchKey) {
        self.rpc
            .invoke(
                WEBSTORE_RPC_NAME,
                "watch",
                vec![
                    json!(registration),
                    json!(key.collection),
                    json!(key.doc_id),
                    json!(key.path),
                ],
                None,
            )
            .detach("watch");
    }
}

/// Ties a listener to its registry. Dropping the handle keeps the listener
/// attached; call [`unsubscribe`](Self::unsubscribe) to detach it.
pub struct WatchHandle {
    registry: Weak<WatchRegistry>,
    listener: ListenerId,
}

impl WatchHandle {
    pub fn listener_id(&self) -> &ListenerId {
        &self.listener
    }

    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(&self.listener);
        }
    }
}
