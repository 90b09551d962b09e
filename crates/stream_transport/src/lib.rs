//! Transport-only primitives for streamed chat responses.
//!
//! This crate owns the wire vocabulary, incremental record decoding, and the
//! read-handle contract used to abort an in-flight read. It contains no UI or
//! rendering code.
//!
//! Malformed and unknown records never fail a stream: [`RecordDecoder`] skips
//! them and keeps a count for diagnostics.

pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod events;
pub mod handle;
pub mod mock;

pub use client::{await_or_abort, ChunkStream, StreamClient};
pub use config::TransportConfig;
pub use decoder::RecordDecoder;
pub use error::TransportError;
pub use events::{ToolPhase, TransportEvent};
pub use handle::ReadHandle;
pub use mock::ScriptedSource;
