//! Deterministic chunk sources for local development and tests.
//!
//! Contains no network logic; records are serialized once up front and then
//! handed out in caller-chosen chunk sizes.

use futures_util::stream;

use crate::client::ChunkStream;
use crate::error::TransportError;
use crate::events::TransportEvent;

#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    chunks: Vec<Result<Vec<u8>, String>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a source that emits one chunk per record.
    pub fn from_events(events: &[TransportEvent]) -> Self {
        let mut source = Self::new();
        for event in events {
            source = source.event(event);
        }
        source
    }

    /// Appends one record, newline-terminated, as its own chunk.
    pub fn event(mut self, event: &TransportEvent) -> Self {
        let mut line = serde_json::to_vec(event).unwrap_or_default();
        line.push(b'\n');
        self.chunks.push(Ok(line));
        self
    }

    /// Appends raw bytes as one chunk (useful for malformed or split records).
    pub fn raw(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.chunks.push(Ok(bytes.into()));
        self
    }

    /// Appends a read failure; the stream ends after it is delivered.
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.chunks.push(Err(message.into()));
        self
    }

    /// Re-slices all queued bytes into chunks of at most `size` bytes.
    ///
    /// Failures keep their position relative to the surrounding bytes.
    pub fn rechunk(self, size: usize) -> Self {
        let size = size.max(1);
        let mut chunks = Vec::new();
        let mut pending = Vec::new();

        for chunk in self.chunks {
            match chunk {
                Ok(bytes) => pending.extend(bytes),
                Err(message) => {
                    chunks.extend(pending.chunks(size).map(|slice| Ok(slice.to_vec())));
                    pending.clear();
                    chunks.push(Err(message));
                }
            }
        }
        chunks.extend(pending.chunks(size).map(|slice| Ok(slice.to_vec())));

        Self { chunks }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn into_stream(self) -> ChunkStream {
        let chunks = self
            .chunks
            .into_iter()
            .map(|chunk| chunk.map_err(TransportError::Read));
        Box::pin(stream::iter(chunks))
    }
}
