use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

macro_rules! token_id {
    ($name:ident) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn generate(ids: &dyn IdGenerator) -> Self {
                Self(ids.next_id())
            }

            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

token_id!(InvokeId);
token_id!(ListenerId);

/// Source of correlation tokens for invocations and watch listeners.
///
/// Tokens are not checked for collisions anywhere; a generator that hands out
/// the same token twice will cross-wire settlements.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Short random alphanumeric tokens.
#[derive(Clone, Debug)]
pub struct RandomIds {
    len: usize,
}

impl RandomIds {
    pub const DEFAULT_LEN: usize = 7;

    pub fn with_len(len: usize) -> Self {
        Self { len }
    }
}

impl Default for RandomIds {
    fn default() -> Self {
        Self::with_len(Self::DEFAULT_LEN)
    }
}

impl IdGenerator for RandomIds {
    fn next_id(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.len)
            .map(char::from)
            .collect()
    }
}

/// Deterministic `prefix-N` tokens.
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{n}", self.prefix)
    }
}
