//! Common imports for typical client usage.
pub use crate::{
    AbortHandle, ClientConfig, ClientError, FinalResult, ProgressState, SessionSnapshot,
    SessionStream, SessionUpdate, StreamClient,
};
