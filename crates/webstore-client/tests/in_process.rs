//! Client behaviour against the in-process backend.

use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use webstore_client::{DocOps, WatchNotice, Webstore};
use webstore_core::SequentialIds;
use webstore_store::LocalServer;

fn store() -> (Arc<LocalServer>, Webstore) {
    let server = Arc::new(LocalServer::new());
    let store = Webstore::builder()
        .rpc(server.clone())
        .ids(Arc::new(SequentialIds::new("w")))
        .build();
    (server, store)
}

fn run(ops: DocOps) -> Value {
    ops.apply()
        .now_or_never()
        .expect("local calls settle immediately")
        .expect("apply succeeds")
}

type Seen = Arc<Mutex<Option<Value>>>;

fn recorder() -> (Seen, impl Fn(&WatchNotice<'_>) + Send + Sync + 'static) {
    let seen: Seen = Arc::new(Mutex::new(None));
    let slot = seen.clone();
    (seen, move |notice: &WatchNotice<'_>| {
        *slot.lock() = notice.value.cloned();
    })
}

#[test]
fn basic_crud() {
    let (_server, store) = store();
    let doc = store.get_ref("collection1", "doc1");

    assert_eq!(run(doc.get("$.name")), Value::Null);

    run(doc.set("$.name", "moon"));
    assert_eq!(run(doc.get("$.name")), json!("moon"));

    run(doc.set("$.name", "sun"));
    assert_eq!(run(doc.get("$.name")), json!("sun"));

    run(doc.move_value("$.name", "$.newName"));
    assert_eq!(run(doc.get("$.newName")), json!("sun"));
    assert_eq!(run(doc.get("$.name")), Value::Null);

    run(doc.delete("$.newName"));
    assert_eq!(run(doc.get("$.newName")), Value::Null);
}

#[test]
fn set_returns_previous_value_and_get_wins_in_mixed_batch() {
    let (_server, store) = store();
    let doc = store.get_ref("c", "d");

    assert_eq!(run(doc.set("$.n", 1)), Value::Null);
    assert_eq!(run(doc.set("$.n", 2)), json!(1));
    assert_eq!(run(doc.get("$.n").set("$.n", 3)), json!(2));
    assert_eq!(run(doc.set("$.n", 4).set("$.m", 5)), Value::Null);
}

#[test]
fn set_date_stores_a_timestamp() {
    let (_server, store) = store();
    let doc = store.get_ref("c", "d");
    run(doc.set_date("$.at"));
    let at = run(doc.get("$.at"));
    let at = at.as_str().expect("timestamp is a string");
    assert!(chrono_like(at), "unexpected timestamp {at}");
}

fn chrono_like(s: &str) -> bool {
    s.len() == 24 && s.ends_with('Z') && s.as_bytes()[10] == b'T'
}

#[test]
fn watch() {
    let (_server, store) = store();
    let doc = store.get_ref("collection1", "doc1");
    run(doc.set("$.name", "moon"));

    let (seen, callback) = recorder();
    let handle = doc.watch("$.name", callback).unwrap();
    assert_eq!(*seen.lock(), Some(json!("moon")));

    run(doc.set("$.name", "sun"));
    assert_eq!(*seen.lock(), Some(json!("sun")));
    handle.unsubscribe();
}

#[test]
fn two_watches() {
    let (server, store) = store();
    let doc = store.get_ref("collection1", "doc1");
    run(doc.set("$.name", "moon"));

    let (seen1, cb1) = recorder();
    let (seen2, cb2) = recorder();
    let h1 = doc.watch("$.name", cb1).unwrap();
    let h2 = doc.watch("$.name", cb2).unwrap();
    assert_eq!(*seen1.lock(), Some(json!("moon")));
    assert_eq!(*seen2.lock(), Some(json!("moon")));
    assert_eq!(server.watch_count(), 1);

    run(doc.set("$.name", "sun"));
    assert_eq!(*seen1.lock(), Some(json!("sun")));
    assert_eq!(*seen2.lock(), Some(json!("sun")));

    h1.unsubscribe();
    h2.unsubscribe();
    assert_eq!(server.watch_count(), 0);
}

#[test]
fn watcher_re_registration() {
    let (server, store) = store();
    let doc = store.get_ref("collection1", "doc1");
    run(doc.set("$.name", "moon"));

    let (seen1, cb1) = recorder();
    let (seen2, cb2) = recorder();
    let h1 = doc.watch("$.name", cb1).unwrap();
    let h2 = doc.watch("$.name", cb2).unwrap();

    *seen1.lock() = None;
    *seen2.lock() = None;
    server.drop_all_watches();
    store.register_all_watches();

    assert_eq!(*seen1.lock(), Some(json!("moon")));
    assert_eq!(*seen2.lock(), Some(json!("moon")));

    run(doc.set("$.name", "sun"));
    assert_eq!(*seen1.lock(), Some(json!("sun")));
    assert_eq!(*seen2.lock(), Some(json!("sun")));

    h1.unsubscribe();
    h2.unsubscribe();
}

#[test]
fn watcher_re_registration_and_remove() {
    let (server, store) = store();
    let doc = store.get_ref("collection1", "doc1");
    run(doc.set("$.name", "moon"));
    assert_eq!(server.watch_count(), 0);

    let h1 = doc.watch("$.name", |_| {}).unwrap();
    assert_eq!(server.watch_count(), 1);
    let h2 = doc.watch("$.name", |_| {}).unwrap();
    assert_eq!(server.watch_count(), 1);

    server.drop_all_watches();
    store.register_all_watches();
    assert_eq!(server.watch_count(), 1);

    h1.unsubscribe();
    assert_eq!(server.watch_count(), 1);
    h2.unsubscribe();
    assert_eq!(server.watch_count(), 0);
}

#[test]
fn parent_watch_sees_child_changes_and_unrelated_watch_does_not() {
    let (_server, store) = store();
    let doc = store.get_ref("c", "d");
    run(doc.set("$", json!({"user": {"name": "a"}, "other": 1})));

    let (parent, cb) = recorder();
    let _p = doc.watch("$.user", cb).unwrap();
    let calls = Arc::new(Mutex::new(0));
    let c = calls.clone();
    let _o = doc
        .watch("$.other", move |_| {
            *c.lock() += 1;
        })
        .unwrap();
    assert_eq!(*calls.lock(), 1);

    run(doc.set("$.user.name", "b"));
    assert_eq!(*parent.lock(), Some(json!({"name": "b"})));
    assert_eq!(*calls.lock(), 1);
}

#[test]
fn watch_on_uncached_path_waits_for_first_write() {
    let (_server, store) = store();
    let doc = store.get_ref("c", "fresh");

    let calls = Arc::new(Mutex::new(Vec::new()));
    let c = calls.clone();
    let _h = doc
        .watch("$.title", move |n| c.lock().push(n.value.cloned()))
        .unwrap();
    assert!(calls.lock().is_empty());

    // A second listener on a key with no value yet is told so right away.
    let (seen, cb) = recorder();
    *seen.lock() = Some(json!("sentinel"));
    let _h2 = doc.watch("$['title']", cb).unwrap();
    assert_eq!(*seen.lock(), None);

    run(doc.set("$.title", "hello"));
    assert_eq!(*calls.lock(), vec![Some(json!("hello"))]);
}

#[test]
fn listener_may_write_back_from_its_callback() {
    let (_server, store) = store();
    let doc = store.get_ref("c", "d");
    run(doc.set("$.count", 1));

    let writer = doc.clone();
    let _h = doc
        .watch("$.count", move |n| {
            if n.value == Some(&json!(2)) {
                let _ = writer.set("$.mirror", 2).apply().now_or_never();
            }
        })
        .unwrap();

    run(doc.set("$.count", 2));
    assert_eq!(run(doc.get("$.mirror")), json!(2));
}
