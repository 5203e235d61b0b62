pub mod errors;
pub mod frames;
pub mod ids;
pub mod ops;
pub mod path;

pub use errors::{FrameError, RemoteError, RpcError, TransportError};
pub use frames::{InboundFrame, InvokeFrame};
pub use ids::{IdGenerator, InvokeId, ListenerId, RandomIds, SequentialIds};
pub use ops::{format_timestamp, timestamp_now, DocOp};
pub use path::{JsonPath, PathError, Segment, MAX_INDEX};

/// Call target name under which the document store is exposed.
pub const WEBSTORE_RPC_NAME: &str = "webstore";

/// Path expression addressing the whole document.
pub const ROOT_PATH: &str = "$";
