//! Client for an agent pipeline that reports its progress as a `data:`
//! framed event stream.
//!
//! A session POSTs one chat message, decodes the streamed step events, and
//! keeps three derived views current: a step-by-step narrative, a progress
//! percentage, and a completion flag. When the stream ends it resolves the
//! final structured answer (or an error result).
//!
//! ```no_run
//! use agent_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let client = StreamClient::new(ClientConfig::new("http://127.0.0.1:8000/api/chat/stream"))?;
//! let mut session = client.start("ventas por mes en 2024").await;
//!
//! while let Some(update) = session.next_update().await {
//!     if let SessionUpdate::Progress { snapshot, .. } = update {
//!         println!("{}% {:?}", snapshot.progress.percentage, snapshot.narrative.last());
//!     }
//! }
//!
//! let snapshot = session.finish().await?;
//! println!("{:?}", snapshot.final_result);
//! # Ok(())
//! # }
//! ```

/// Event classification into pipeline step categories.
pub mod classify;
/// Stream client entry point.
pub mod client;
/// Terminal state detection.
pub mod completion;
/// Client configuration.
pub mod config;
/// Public error types.
pub mod errors;
/// Decoded stream events and step categories.
pub mod event;
/// Incremental frame decoding.
pub mod frame;
/// Human-readable step narration.
pub mod narrative;
/// Logging setup.
pub mod observability;
/// Typed per-step payload shapes and field fallback chains.
pub mod payload;
/// Common imports for typical usage.
pub mod prelude;
/// Step progress tracking.
pub mod progress;
/// Final answer type and resolution.
pub mod result;
/// Session task, update stream, and cancellation handle.
pub mod session;
/// Per-session state and snapshots.
pub mod state;
/// Byte transport contract and HTTP implementation.
pub mod transport;

pub use classify::classify;
pub use client::StreamClient;
pub use completion::is_complete;
pub use config::ClientConfig;
pub use errors::{ClientError, TransportError};
pub use event::{RawEvent, StepCategory};
pub use frame::FrameDecoder;
pub use narrative::narrate;
pub use payload::StepPayload;
pub use progress::{ProgressState, progress};
pub use result::{FinalResult, resolve};
pub use session::{AbortHandle, SessionStream, SessionUpdate};
pub use state::{SessionSnapshot, StreamSessionState};
pub use transport::{ChatRequest, ChunkStream, HttpTransport, Transport};
