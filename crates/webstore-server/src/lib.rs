//! # webstore-server
//!
//! Networked reference backend: serves the `webstore` call target over
//! WebSocket, one shared [`StoreEngine`](webstore_store::StoreEngine) for
//! all clients.
//!
//! - `/ws`: invoke frames in; returns, exceptions and pushes out
//! - `/health`: status, connection and watch counts
//! - Per-client bounded send queues and heartbeat pings
//! - A client's watches are released when it disconnects

#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod dispatch;
pub mod health;
pub mod server;

pub use client::{ClientId, ClientRegistry};
pub use config::ServerConfig;
pub use server::{start, ServerHandle};
