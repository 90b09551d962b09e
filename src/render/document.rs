//! Sandboxed preview for embedded HTML/SVG documents.

use crate::render::engine::{EngineError, RenderEngine};
use crate::render::markup::escape_attr;

/// Wraps the document in a script-less sandboxed frame via `srcdoc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SandboxedDocument;

impl RenderEngine for SandboxedDocument {
    fn name(&self) -> &str {
        "sandboxed-document"
    }

    fn render(&self, source: &str, _display: bool) -> Result<String, EngineError> {
        if source.trim().is_empty() {
            return Err(EngineError::failed(self.name(), "empty document"));
        }
        Ok(format!(
            "<iframe sandbox=\"\" referrerpolicy=\"no-referrer\" srcdoc=\"{}\"></iframe>",
            escape_attr(source)
        ))
    }
}
