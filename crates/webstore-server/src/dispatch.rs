//! Turns inbound invoke frames into engine calls and outbound frames.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webstore_core::{InboundFrame, InvokeFrame, RemoteError, WEBSTORE_RPC_NAME};
use webstore_store::{Dispatched, StoreEngine};

use crate::client::{ClientId, ClientRegistry, Inbound};

/// One frame addressed to one client.
#[derive(Clone, Debug, PartialEq)]
pub struct Outbound {
    pub to: ClientId,
    pub frame: InboundFrame,
}

/// Handle one text frame from `owner`.
///
/// Pushes triggered by the call come first, the caller's return or
/// exception last. A frame that does not parse yields nothing.
pub fn handle_frame(engine: &Mutex<StoreEngine>, owner: &ClientId, text: &str) -> Vec<Outbound> {
    let frame = match InvokeFrame::parse(text) {
        Ok(frame) => frame,
        Err(error) => {
            warn!(client_id = %owner, %error, "malformed frame dropped");
            return Vec::new();
        }
    };
    let InvokeFrame {
        invoke_id,
        rpc_name,
        method_name,
        params,
        ..
    } = frame;
    debug!(client_id = %owner, %invoke_id, %rpc_name, %method_name, "invocation");

    let outcome = if rpc_name == WEBSTORE_RPC_NAME {
        engine
            .lock()
            .dispatch(owner.as_str(), &method_name, params)
            .map_err(|error| (error.error_kind(), error.to_string()))
    } else {
        Err(("UnknownTarget", format!("no call target named {rpc_name}")))
    };

    match outcome {
        Ok(Dispatched { value, pushes }) => {
            let mut out: Vec<Outbound> = pushes
                .into_iter()
                .map(|push| Outbound {
                    to: ClientId(push.owner),
                    frame: InboundFrame::invoke(WEBSTORE_RPC_NAME, push.method, push.params),
                })
                .collect();
            out.push(Outbound {
                to: owner.clone(),
                frame: InboundFrame::returned(invoke_id, value),
            });
            out
        }
        Err((kind, reason)) => {
            warn!(client_id = %owner, %invoke_id, %rpc_name, %method_name, %reason, "invocation failed");
            let message = format!("Invocation ({invoke_id}) {rpc_name}.{method_name} failed: {reason}");
            vec![Outbound {
                to: owner.clone(),
                frame: InboundFrame::exception(invoke_id, RemoteError::new(kind, message)),
            }]
        }
    }
}

/// Drain inbound events until every connection's sender is gone.
pub async fn process_frames(
    mut rx: mpsc::Receiver<Inbound>,
    engine: Arc<Mutex<StoreEngine>>,
    registry: Arc<ClientRegistry>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            Inbound::Frame(owner, text) => {
                for Outbound { to, frame } in handle_frame(&engine, &owner, &text) {
                    match frame.to_text() {
                        Ok(text) => {
                            let _ = registry.send_to(&to, text);
                        }
                        Err(error) => warn!(client_id = %to, %error, "failed to encode frame"),
                    }
                }
            }
            Inbound::Disconnected(owner) => {
                let removed = engine.lock().remove_owner(owner.as_str());
                info!(client_id = %owner, removed, "released watches of departed client");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use webstore_core::InvokeId;

    fn invoke(id: &str, rpc: &str, method: &str, params: Value) -> String {
        json!({
            "invokeId": id,
            "rpcName": rpc,
            "methodName": method,
            "params": params,
            "types": null,
        })
        .to_string()
    }

    fn client(name: &str) -> ClientId {
        ClientId(name.into())
    }

    #[test]
    fn pushes_precede_the_return() {
        let engine = Mutex::new(StoreEngine::new());
        let a = client("a");
        let b = client("b");

        handle_frame(&engine, &b, &invoke("1", "webstore", "watch", json!(["lb", "c", "d", "$.name"])));
        handle_frame(&engine, &a, &invoke("2", "webstore", "watch", json!(["la", "c", "d", "$"])));

        let ops = json!([{"type": "SET", "path": "$.name", "value": "moon"}]);
        let out = handle_frame(&engine, &a, &invoke("3", "webstore", "apply", json!(["c", "d", ops, null])));
        assert_eq!(out.len(), 3);
        assert_eq!(
            out.last().unwrap(),
            &Outbound {
                to: a.clone(),
                frame: InboundFrame::returned(InvokeId::from_raw("3"), Value::Null),
            }
        );
        let recipients: Vec<&str> = out[..2].iter().map(|o| o.to.as_str()).collect();
        assert!(recipients.contains(&"a"));
        assert!(recipients.contains(&"b"));
        assert!(out[..2]
            .iter()
            .all(|o| matches!(&o.frame, InboundFrame::Invoke { method_name, .. } if method_name == "onChange")));
    }

    #[test]
    fn failures_become_exceptions() {
        let engine = Mutex::new(StoreEngine::new());
        let out = handle_frame(&engine, &client("a"), &invoke("x1", "webstore", "truncate", json!([])));
        match &out[..] {
            [Outbound {
                frame: InboundFrame::Exception { invoke_id, error_message, exception },
                ..
            }] => {
                assert_eq!(invoke_id.as_str(), "x1");
                assert!(error_message.starts_with("Invocation (x1) webstore.truncate failed: "));
                assert_eq!(exception, &json!("UnknownMethod"));
            }
            other => panic!("unexpected: {other:?}"),
        }

        let out = handle_frame(&engine, &client("a"), &invoke("x2", "elsewhere", "apply", json!([])));
        assert!(matches!(
            &out[0].frame,
            InboundFrame::Exception { exception, .. } if exception == &json!("UnknownTarget")
        ));
    }

    #[test]
    fn malformed_frames_yield_nothing() {
        let engine = Mutex::new(StoreEngine::new());
        assert!(handle_frame(&engine, &client("a"), "not json").is_empty());
        assert!(handle_frame(&engine, &client("a"), r#"{"invokeId": "1"}"#).is_empty());
    }

    #[tokio::test]
    async fn disconnect_releases_watches() {
        let engine = Arc::new(Mutex::new(StoreEngine::new()));
        let registry = Arc::new(ClientRegistry::new(8));
        let (id, mut client_rx) = registry.register();
        let (tx, rx) = mpsc::channel(8);
        let processor = tokio::spawn(process_frames(rx, engine.clone(), registry.clone()));

        tx.send(Inbound::Frame(id.clone(), invoke("1", "webstore", "watch", json!(["l", "c", "d", "$"]))))
            .await
            .unwrap();
        let reply = client_rx.recv().await.unwrap();
        assert!(reply.contains("RPC_RETURN"));
        assert_eq!(engine.lock().watch_count(), 1);

        tx.send(Inbound::Disconnected(id)).await.unwrap();
        drop(tx);
        processor.await.unwrap();
        assert_eq!(engine.lock().watch_count(), 0);
    }
}
