//! WebSocket session over `tokio-tungstenite`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use webstore_core::{InvokeFrame, TransportError};

use crate::session::{HandlerKind, Session, SessionCallbacks, SessionHandler};

#[derive(Clone, Debug)]
pub struct WsSessionConfig {
    /// Backend endpoint, e.g. `ws://127.0.0.1:8787/ws`.
    pub url: String,
    pub connect_timeout: Duration,
}

impl WsSessionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Default)]
struct Outbox {
    queue: VecDeque<String>,
    writer: Option<mpsc::UnboundedSender<String>>,
}

/// Socket-backed session. The connection is only created by `open`.
pub struct WsSession {
    config: WsSessionConfig,
    callbacks: Arc<SessionCallbacks>,
    outbox: Arc<Mutex<Outbox>>,
    connected: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
}

impl WsSession {
    pub fn new(config: WsSessionConfig) -> Self {
        Self {
            config,
            callbacks: Arc::new(SessionCallbacks::new()),
            outbox: Arc::new(Mutex::new(Outbox::default())),
            connected: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Frames waiting for the next successful `open`.
    pub fn queued_len(&self) -> usize {
        self.outbox.lock().queue.len()
    }

    fn fail(&self, error: TransportError) -> TransportError {
        warn!(url = %self.config.url, %error, "websocket connect failed");
        self.callbacks.emit_close(Some(error.to_string()));
        error
    }
}

#[async_trait]
impl Session for WsSession {
    async fn open(&self) -> Result<(), TransportError> {
        if self.is_connected() {
            return Ok(());
        }

        let connect = connect_async(self.config.url.as_str());
        let (ws, _) = match tokio::time::timeout(self.config.connect_timeout, connect).await {
            Err(_) => return Err(self.fail(TransportError::Timeout(self.config.connect_timeout))),
            Ok(Err(e)) => return Err(self.fail(TransportError::Connect(e.to_string()))),
            Ok(Ok(pair)) => pair,
        };
        let (mut sink, mut stream) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        // Flush under the lock so no new frame can overtake the backlog. When
        // a concurrent `open` got there first, this socket is dropped.
        let (generation, flushed) = {
            let mut outbox = self.outbox.lock();
            if outbox.writer.is_some() {
                debug!(url = %self.config.url, "already connected, dropping second socket");
                return Ok(());
            }
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let flushed = outbox.queue.len();
            for text in outbox.queue.drain(..) {
                let _ = tx.send(text);
            }
            outbox.writer = Some(tx);
            self.connected.store(true, Ordering::SeqCst);
            (generation, flushed)
        };
        info!(url = %self.config.url, flushed, "websocket session open");

        drop(tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        }));

        let callbacks = self.callbacks.clone();
        let outbox = self.outbox.clone();
        let connected = self.connected.clone();
        let current = self.generation.clone();
        drop(tokio::spawn(async move {
            let mut reason = None;
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => callbacks.dispatch_text(text.as_str()),
                    Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                        Ok(text) => callbacks.dispatch_text(text),
                        Err(_) => warn!(len = bytes.len(), "dropping non-utf8 binary frame"),
                    },
                    Ok(Message::Close(frame)) => {
                        reason = frame.map(|f| f.reason.as_str().to_string());
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        reason = Some(e.to_string());
                        break;
                    }
                }
            }

            // A stale reader belongs to a connection already reported closed.
            let live = {
                let mut outbox = outbox.lock();
                let live = current.load(Ordering::SeqCst) == generation;
                if live {
                    outbox.writer = None;
                    connected.store(false, Ordering::SeqCst);
                    let _ = current.fetch_add(1, Ordering::SeqCst);
                }
                live
            };
            debug!(generation, live, ?reason, "websocket session closed");
            if live {
                callbacks.emit_close(reason);
            }
        }));

        self.callbacks.emit_open();
        Ok(())
    }

    async fn close(&self) {
        let writer = {
            let mut outbox = self.outbox.lock();
            self.connected.store(false, Ordering::SeqCst);
            let writer = outbox.writer.take();
            if writer.is_some() {
                let _ = self.generation.fetch_add(1, Ordering::SeqCst);
            }
            writer
        };
        // Dropping the writer ends the write task, which sends a close frame.
        if let Some(writer) = writer {
            drop(writer);
            self.callbacks.emit_close(None);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn invoke(&self, frame: InvokeFrame) {
        let text = match frame.to_text() {
            Ok(text) => text,
            Err(error) => {
                warn!(invoke_id = %frame.invoke_id, %error, "dropping unserializable frame");
                return;
            }
        };
        let mut outbox = self.outbox.lock();
        let undelivered = match &outbox.writer {
            Some(writer) => match writer.send(text) {
                Ok(()) => return,
                Err(mpsc::error::SendError(text)) => text,
            },
            None => text,
        };
        // A dead writer means the socket went away without a reader close yet.
        if outbox.writer.take().is_some() {
            self.connected.store(false, Ordering::SeqCst);
        }
        outbox.queue.push_back(undelivered);
    }

    fn on(&self, handler: SessionHandler) {
        self.callbacks.install(handler);
    }

    fn off(&self, kind: HandlerKind) {
        self.callbacks.remove(kind);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webstore_core::InvokeId;

    #[test]
    fn config_defaults() {
        let config = WsSessionConfig::new("ws://localhost:1/ws");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn invoke_before_open_queues() {
        let session = WsSession::new(WsSessionConfig::new("ws://localhost:1/ws"));
        session.invoke(InvokeFrame {
            invoke_id: InvokeId::from_raw("q1"),
            rpc_name: "webstore".into(),
            method_name: "watch".into(),
            params: vec![],
            types: None,
        });
        assert_eq!(session.queued_len(), 1);
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn failed_connect_emits_close() {
        let session = WsSession::new(WsSessionConfig {
            url: "ws://127.0.0.1:1/ws".into(),
            connect_timeout: Duration::from_secs(2),
        });
        let closed = Arc::new(AtomicBool::new(false));
        let c = closed.clone();
        session.on(SessionHandler::Close(Arc::new(move |_| c.store(true, Ordering::SeqCst))));

        assert!(session.open().await.is_err());
        assert!(closed.load(Ordering::SeqCst));
        assert!(!session.is_connected());
    }
}
