//! # webstore-store
//!
//! The prefix-scoped [`LocalCache`], the [`StoreEngine`] implementing the
//! `webstore` remote surface with its notification rule, and the in-process
//! [`LocalServer`].

pub mod cache;
pub mod engine;
pub mod local;

pub use cache::{LocalCache, Lookup};
pub use engine::{Dispatched, Push, StoreEngine, StoreError, ON_CHANGE, ON_CHANGE_DOC_DEV_MODE};
pub use local::{LocalServer, LOCAL_OWNER};
