//! Contracts for the external engines the renderer drives.
//!
//! Every engine is optional. A missing engine means the segment renders as
//! escaped raw source.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use thiserror::Error;

use crate::config::EnvConfig;
use crate::core::language::Language;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("{engine}: {message}")]
    Failed { engine: String, message: String },
    #[error("{engine} panicked while rendering")]
    Panicked { engine: String },
}

impl EngineError {
    pub fn failed(engine: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Failed {
            engine: engine.into(),
            message: message.to_string(),
        }
    }
}

/// Math, diagram and document engines: `render(source) -> markup`, may fail.
pub trait RenderEngine: Send + Sync {
    fn name(&self) -> &str;

    /// `display` selects block layout (display math, full-size diagrams).
    fn render(&self, source: &str, display: bool) -> Result<String, EngineError>;

    /// Idempotent re-render of a source that already rendered once.
    fn rerender(&self, source: &str, display: bool) -> Result<String, EngineError> {
        self.render(source, display)
    }
}

pub trait Highlighter: Send + Sync {
    fn name(&self) -> &str;

    fn highlight(&self, source: &str, language: &Language) -> Result<String, EngineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Markup,
    Table,
    /// Stand-in for a table that is still waiting for its separator row.
    TablePlaceholder,
}

/// One top-level block of a prose segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBlock {
    pub kind: BlockKind,
    /// Byte range in the text handed to [`ContentEngine::blocks`].
    pub range: Range<usize>,
}

/// Prose engine: splits text into top-level blocks and renders each one.
pub trait ContentEngine: Send + Sync {
    fn name(&self) -> &str;

    fn blocks(&self, text: &str) -> Vec<ContentBlock>;

    fn render_block(&self, block: &str) -> Result<String, EngineError>;
}

#[derive(Clone, Default)]
pub struct EngineSet {
    pub math: Option<Arc<dyn RenderEngine>>,
    pub diagram: Option<Arc<dyn RenderEngine>>,
    pub document: Option<Arc<dyn RenderEngine>>,
    pub highlighter: Option<Arc<dyn Highlighter>>,
    pub content: Option<Arc<dyn ContentEngine>>,
}

impl EngineSet {
    /// No engines at all: every segment renders as escaped source.
    pub fn raw() -> Self {
        Self::default()
    }

    /// The engines that ship with the crate. Math and diagram engines are
    /// external and must be attached by the host.
    pub fn builtin(config: &EnvConfig) -> Self {
        let highlighter: Option<Arc<dyn Highlighter>> = if config.no_highlight {
            None
        } else {
            Some(Arc::new(crate::render::highlight::SyntectHighlighter))
        };
        Self {
            math: None,
            diagram: None,
            document: Some(Arc::new(crate::render::document::SandboxedDocument)),
            highlighter,
            content: Some(Arc::new(crate::render::prose::MarkdownContent)),
        }
    }

    pub fn with_math(mut self, engine: Arc<dyn RenderEngine>) -> Self {
        self.math = Some(engine);
        self
    }

    pub fn with_diagram(mut self, engine: Arc<dyn RenderEngine>) -> Self {
        self.diagram = Some(engine);
        self
    }

    pub fn with_document(mut self, engine: Arc<dyn RenderEngine>) -> Self {
        self.document = Some(engine);
        self
    }

    pub fn with_highlighter(mut self, engine: Arc<dyn Highlighter>) -> Self {
        self.highlighter = Some(engine);
        self
    }

    pub fn with_content(mut self, engine: Arc<dyn ContentEngine>) -> Self {
        self.content = Some(engine);
        self
    }
}

impl fmt::Debug for EngineSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineSet")
            .field("math", &self.math.as_ref().map(|engine| engine.name().to_string()))
            .field("diagram", &self.diagram.as_ref().map(|engine| engine.name().to_string()))
            .field("document", &self.document.as_ref().map(|engine| engine.name().to_string()))
            .field(
                "highlighter",
                &self.highlighter.as_ref().map(|engine| engine.name().to_string()),
            )
            .field("content", &self.content.as_ref().map(|engine| engine.name().to_string()))
            .finish()
    }
}
