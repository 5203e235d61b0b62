//! # webstore-rpc
//!
//! Bidirectional RPC over an abstract [`Session`]: the WebSocket and
//! in-memory transports, the [`WebRpc`] multiplexer, and the [`Rpc`]
//! capability the document store is written against.

pub mod call;
pub mod memory;
pub mod multiplexer;
pub mod session;
pub mod ws;

pub use call::{CallError, CallResult, CallTarget, CallTargets, PendingCall, Rpc, Settle};
pub use memory::{MemorySession, Peer};
pub use multiplexer::WebRpc;
pub use session::{HandlerKind, Session, SessionCallbacks, SessionHandler};
pub use ws::{WsSession, WsSessionConfig};
