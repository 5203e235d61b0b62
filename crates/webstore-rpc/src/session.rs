//! Transport contract shared by every session variant.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, warn};
use webstore_core::{InboundFrame, InvokeFrame, InvokeId, RemoteError, TransportError};

pub type OpenHandler = Arc<dyn Fn() + Send + Sync>;
pub type CloseHandler = Arc<dyn Fn(Option<String>) + Send + Sync>;
pub type ReturnHandler = Arc<dyn Fn(InvokeId, Value) + Send + Sync>;
pub type ExceptionHandler = Arc<dyn Fn(InvokeId, RemoteError) + Send + Sync>;
pub type InvokeHandler = Arc<dyn Fn(String, String, Vec<Value>) + Send + Sync>;

/// A callback for one of the five session events.
#[derive(Clone)]
pub enum SessionHandler {
    Open(OpenHandler),
    /// Receives a human-readable reason when one is known.
    Close(CloseHandler),
    Return(ReturnHandler),
    Exception(ExceptionHandler),
    Invoke(InvokeHandler),
}

impl SessionHandler {
    pub fn kind(&self) -> HandlerKind {
        match self {
            Self::Open(_) => HandlerKind::Open,
            Self::Close(_) => HandlerKind::Close,
            Self::Return(_) => HandlerKind::Return,
            Self::Exception(_) => HandlerKind::Exception,
            Self::Invoke(_) => HandlerKind::Invoke,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerKind {
    Open,
    Close,
    Return,
    Exception,
    Invoke,
}

/// Bidirectional frame transport.
///
/// `invoke` never blocks: while disconnected frames are queued and flushed,
/// in submission order, when `open` next succeeds and before the open
/// handler runs.
#[async_trait]
pub trait Session: Send + Sync {
    async fn open(&self) -> Result<(), TransportError>;

    async fn close(&self);

    fn is_connected(&self) -> bool;

    fn invoke(&self, frame: InvokeFrame);

    /// Install a handler, replacing any previous handler of the same kind.
    fn on(&self, handler: SessionHandler);

    fn off(&self, kind: HandlerKind);
}

#[derive(Default)]
struct Handlers {
    open: Option<OpenHandler>,
    close: Option<CloseHandler>,
    ret: Option<ReturnHandler>,
    exception: Option<ExceptionHandler>,
    invoke: Option<InvokeHandler>,
}

/// Handler table and inbound routing used by the session variants.
///
/// Handlers are cloned out of the table before they run, so a handler may
/// install or remove handlers itself.
#[derive(Default)]
pub struct SessionCallbacks {
    handlers: RwLock<Handlers>,
}

impl SessionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, handler: SessionHandler) {
        let mut handlers = self.handlers.write();
        match handler {
            SessionHandler::Open(h) => handlers.open = Some(h),
            SessionHandler::Close(h) => handlers.close = Some(h),
            SessionHandler::Return(h) => handlers.ret = Some(h),
            SessionHandler::Exception(h) => handlers.exception = Some(h),
            SessionHandler::Invoke(h) => handlers.invoke = Some(h),
        }
    }

    pub fn remove(&self, kind: HandlerKind) {
        let mut handlers = self.handlers.write();
        match kind {
            HandlerKind::Open => handlers.open = None,
            HandlerKind::Close => handlers.close = None,
            HandlerKind::Return => handlers.ret = None,
            HandlerKind::Exception => handlers.exception = None,
            HandlerKind::Invoke => handlers.invoke = None,
        }
    }

    pub fn emit_open(&self) {
        let handler = self.handlers.read().open.clone();
        if let Some(handler) = handler {
            handler();
        }
    }

    pub fn emit_close(&self, reason: Option<String>) {
        let handler = self.handlers.read().close.clone();
        if let Some(handler) = handler {
            handler(reason);
        }
    }

    /// Route one parsed frame to exactly one inbound handler.
    pub fn dispatch(&self, frame: InboundFrame) {
        match frame {
            InboundFrame::Return { invoke_id, value } => {
                let handler = self.handlers.read().ret.clone();
                match handler {
                    Some(handler) => handler(invoke_id, value),
                    None => debug!(%invoke_id, "no return handler installed"),
                }
            }
            InboundFrame::Exception {
                invoke_id,
                error_message,
                exception,
            } => {
                let handler = self.handlers.read().exception.clone();
                match handler {
                    Some(handler) => handler(
                        invoke_id,
                        RemoteError {
                            exception,
                            error_message,
                        },
                    ),
                    None => debug!(%invoke_id, "no exception handler installed"),
                }
            }
            InboundFrame::Invoke {
                rpc_name,
                method_name,
                params,
            } => {
                let handler = self.handlers.read().invoke.clone();
                match handler {
                    Some(handler) => handler(rpc_name, method_name, params),
                    None => debug!(%rpc_name, %method_name, "no invoke handler installed"),
                }
            }
        }
    }

    /// Parse and route a text frame. Unrecognised or malformed frames are
    /// logged and dropped.
    pub fn dispatch_text(&self, text: &str) {
        match InboundFrame::parse(text) {
            Ok(frame) => self.dispatch(frame),
            Err(error) => warn!(%error, len = text.len(), "dropping inbound frame"),
        }
    }
}
