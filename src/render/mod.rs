//! Rendering pipeline: engines, the render cache and the deferred renderer.

pub mod cache;
pub mod deferred;
pub mod document;
pub mod engine;
pub mod highlight;
pub mod markup;
pub mod prose;

pub use cache::{CacheEntry, RenderCache};
pub use deferred::{DeferredRenderer, RenderOutcome, RenderedPass};
pub use engine::{BlockKind, ContentBlock, ContentEngine, EngineError, EngineSet, Highlighter, RenderEngine};
