//! WebSocket session against a minimal echo backend.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use webstore_core::{InboundFrame, InvokeFrame, SequentialIds};
use webstore_rpc::{Rpc, Session, SessionHandler, WebRpc, WsSession, WsSessionConfig};

/// Accepts connections forever; answers every invoke with its method name and
/// reports each received invoke id.
async fn spawn_echo_backend() -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let seen_tx = seen_tx.clone();
            tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                while let Some(Ok(msg)) = ws.next().await {
                    let Message::Text(text) = msg else { continue };
                    let frame = InvokeFrame::parse(text.as_str()).unwrap();
                    let _ = seen_tx.send(frame.invoke_id.to_string());
                    let reply = InboundFrame::returned(frame.invoke_id, json!(frame.method_name));
                    if ws
                        .send(Message::Text(reply.to_text().unwrap().into()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            });
        }
    });

    (format!("ws://{addr}/ws"), seen_rx)
}

#[tokio::test]
async fn queued_frames_flush_in_order_before_open() {
    let (url, mut seen) = spawn_echo_backend().await;
    let session = Arc::new(WsSession::new(WsSessionConfig::new(url)));
    let rpc = WebRpc::with_ids(session.clone(), Arc::new(SequentialIds::new("w")));

    let events = Arc::new(Mutex::new(Vec::new()));
    let e = events.clone();
    let s = session.clone();
    session.on(SessionHandler::Open(Arc::new(move || {
        e.lock().push(format!("open queued={}", s.queued_len()));
    })));

    let first = rpc.invoke("webstore", "first", vec![], None);
    let second = rpc.invoke("webstore", "second", vec![], None);
    assert_eq!(session.queued_len(), 2);

    rpc.open().await.unwrap();
    assert_eq!(*events.lock(), vec!["open queued=0"]);
    assert_eq!(first.await.unwrap(), json!("first"));
    assert_eq!(second.await.unwrap(), json!("second"));
    assert_eq!(seen.recv().await.unwrap(), "w-1");
    assert_eq!(seen.recv().await.unwrap(), "w-2");
}

#[tokio::test]
async fn reopen_after_close_flushes_backlog() {
    let (url, _seen) = spawn_echo_backend().await;
    let session = Arc::new(WsSession::new(WsSessionConfig::new(url)));
    let rpc = WebRpc::with_ids(session.clone(), Arc::new(SequentialIds::new("r")));

    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel();
    session.on(SessionHandler::Close(Arc::new(move |_| {
        let _ = closed_tx.send(());
    })));

    rpc.open().await.unwrap();
    assert_eq!(rpc.invoke("webstore", "ping", vec![], None).await.unwrap(), json!("ping"));

    session.close().await;
    assert!(!session.is_connected());
    tokio::time::timeout(Duration::from_secs(5), closed_rx.recv())
        .await
        .unwrap()
        .unwrap();

    let late = rpc.invoke("webstore", "late", vec![], None);
    assert_eq!(session.queued_len(), 1);
    rpc.open().await.unwrap();
    assert_eq!(late.await.unwrap(), json!("late"));
    assert_eq!(rpc.pending_count(), 0);
}

#[tokio::test]
async fn quick_reopen_reports_each_loss_once() {
    let (url, _seen) = spawn_echo_backend().await;
    let session = Arc::new(WsSession::new(WsSessionConfig::new(url)));
    let rpc = WebRpc::with_ids(session.clone(), Arc::new(SequentialIds::new("q")));

    let events = Arc::new(Mutex::new(Vec::new()));
    let e = events.clone();
    session.on(SessionHandler::Open(Arc::new(move || e.lock().push("open"))));
    let e = events.clone();
    session.on(SessionHandler::Close(Arc::new(move |_| e.lock().push("close"))));

    rpc.open().await.unwrap();
    session.close().await;
    rpc.open().await.unwrap();

    // Give the first connection's reader time to observe its end.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(*events.lock(), vec!["open", "close", "open"]);
    assert!(session.is_connected());
    assert_eq!(rpc.invoke("webstore", "ping", vec![], None).await.unwrap(), json!("ping"));
}

#[tokio::test]
async fn concurrent_opens_share_one_connection() {
    let (url, _seen) = spawn_echo_backend().await;
    let session = Arc::new(WsSession::new(WsSessionConfig::new(url)));

    let opens = Arc::new(Mutex::new(0));
    let o = opens.clone();
    session.on(SessionHandler::Open(Arc::new(move || *o.lock() += 1)));

    let (a, b) = tokio::join!(session.open(), session.open());
    a.unwrap();
    b.unwrap();
    assert_eq!(*opens.lock(), 1);
    assert!(session.is_connected());
}
