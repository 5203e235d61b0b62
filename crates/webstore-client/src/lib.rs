//! # webstore-client
//!
//! Client side of the document store: [`Webstore`] hands out [`DocRef`]s,
//! batches operations into single `apply` calls with [`DocOps`], and
//! deduplicates subscriptions through the [`WatchRegistry`].

pub mod diagnostics;
pub mod doc;
pub mod watch;
pub mod webstore;

pub use diagnostics::{DiagnosticsSink, DocChangeReport, TracingSink};
pub use doc::{DocOps, DocRef};
pub use watch::{WatchCallback, WatchHandle, WatchKey, WatchNotice, WatchRegistry};
pub use webstore::{Webstore, WebstoreBuilder};
