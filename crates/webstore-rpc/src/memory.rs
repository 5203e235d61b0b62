//! In-process session. Frames go to a peer closure instead of a socket.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use webstore_core::{InboundFrame, InvokeFrame, TransportError};

use crate::session::{HandlerKind, Session, SessionCallbacks, SessionHandler};

/// Receives every frame the session flushes.
pub type Peer = Arc<dyn Fn(InvokeFrame) + Send + Sync>;

#[derive(Default)]
struct MemoryState {
    connected: bool,
    /// Frames submitted while disconnected.
    queued: VecDeque<InvokeFrame>,
    /// Frames accepted for delivery but not yet handed to the peer.
    outgoing: VecDeque<InvokeFrame>,
    draining: bool,
    sent: Vec<InvokeFrame>,
}

/// Session over a closure, with the same queue and flush behaviour as a
/// socket session.
///
/// The peer runs outside the session lock and may call back into the
/// session (deliver a response, invoke again); re-entrant frames are
/// delivered after the current one, keeping submission order.
#[derive(Default)]
pub struct MemorySession {
    callbacks: SessionCallbacks,
    state: Mutex<MemoryState>,
    peer: Option<Peer>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_peer(peer: Peer) -> Self {
        Self {
            peer: Some(peer),
            ..Self::default()
        }
    }

    /// Inject an inbound frame as if it arrived from the transport.
    pub fn deliver(&self, frame: InboundFrame) {
        self.callbacks.dispatch(frame);
    }

    pub fn deliver_text(&self, text: &str) {
        self.callbacks.dispatch_text(text);
    }

    /// Simulate transport loss. Emits close once if connected.
    pub fn drop_connection(&self) {
        self.disconnect(Some("connection dropped".to_string()));
    }

    /// Every frame handed to the peer so far, in order.
    pub fn sent_frames(&self) -> Vec<InvokeFrame> {
        self.state.lock().sent.clone()
    }

    pub fn queued_len(&self) -> usize {
        self.state.lock().queued.len()
    }

    fn disconnect(&self, reason: Option<String>) {
        let was_connected = std::mem::replace(&mut self.state.lock().connected, false);
        if was_connected {
            self.callbacks.emit_close(reason);
        }
    }

    fn drain(&self) {
        {
            let mut state = self.state.lock();
            if state.draining {
                return;
            }
            state.draining = true;
        }
        loop {
            let frame = {
                let mut state = self.state.lock();
                match state.outgoing.pop_front() {
                    Some(frame) => {
                        state.sent.push(frame.clone());
                        frame
                    }
                    None => {
                        state.draining = false;
                        return;
                    }
                }
            };
            if let Some(peer) = &self.peer {
                peer(frame);
            }
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn open(&self) -> Result<(), TransportError> {
        {
            let mut state = self.state.lock();
            if state.connected {
                return Ok(());
            }
            state.connected = true;
            let queued = std::mem::take(&mut state.queued);
            state.outgoing.extend(queued);
        }
        debug!("memory session open");
        self.drain();
        self.callbacks.emit_open();
        Ok(())
    }

    async fn close(&self) {
        self.disconnect(None);
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn invoke(&self, frame: InvokeFrame) {
        {
            let mut state = self.state.lock();
            if !state.connected {
                state.queued.push_back(frame);
                return;
            }
            state.outgoing.push_back(frame);
        }
        self.drain();
    }

    fn on(&self, handler: SessionHandler) {
        self.callbacks.install(handler);
    }

    fn off(&self, kind: HandlerKind) {
        self.callbacks.remove(kind);
    }
}
