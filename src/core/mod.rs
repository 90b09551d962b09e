//! Pure text-level building blocks: scanning, normalization, segmentation,
//! table guarding and language lookup. Nothing here touches the output tree.

pub mod language;
pub mod normalize;
pub mod scanner;
pub mod segment;
pub mod table_guard;

/// Whether more input may still arrive for the buffer being processed.
///
/// While `Streaming`, anything touching the end of the buffer is provisional.
/// Once `Finished`, end of buffer terminates open constructs and render
/// failures become visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    #[default]
    Streaming,
    Finished,
}

impl Phase {
    pub fn is_streaming(self) -> bool {
        self == Phase::Streaming
    }
}

/// Phase information shared by the render and reconcile steps of one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassContext {
    pub phase: Phase,
    /// Set on the first pass after the stream finished.
    pub phase_transition: bool,
}

impl PassContext {
    pub fn streaming() -> Self {
        Self::default()
    }

    pub fn finished() -> Self {
        Self {
            phase: Phase::Finished,
            phase_transition: false,
        }
    }
}
