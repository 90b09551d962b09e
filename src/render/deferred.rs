//! Deferred rendering of one segment pass into a candidate tree.
//!
//! Engines run synchronously per segment. Mid-stream failures never reach the
//! user: the last good output for the key is reused, or a transparent
//! placeholder is shown. Once the stream has finished, failures become a
//! visible annotation.

use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};

use crate::core::language::{resolve_language, Language};
use crate::core::segment::{Segment, SegmentKey, SegmentKind, SegmentPass};
use crate::core::table_guard::guard_tables_mapped;
use crate::core::PassContext;
use crate::render::cache::RenderCache;
use crate::render::engine::{BlockKind, EngineError, EngineSet, Highlighter, RenderEngine};
use crate::render::markup::{escape_attr, escape_html};
use crate::tree::node::{IslandKind, Node, Part, RenderStatus, TransformHandle};

/// How a segment's markup was obtained in one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// The engine ran and succeeded.
    Rendered,
    /// Cached output for the same source; the engine was not invoked.
    Cached,
    /// Older cached output reused after a failure or while incomplete.
    Stale,
    Placeholder,
    /// No engine configured; escaped source.
    Raw,
    /// Unterminated code shown without highlighting.
    Shell,
    Failed(String),
    Prose,
}

#[derive(Debug, Default)]
pub struct RenderedPass {
    pub nodes: Vec<Node>,
    pub outcomes: Vec<(SegmentKey, RenderOutcome)>,
    pub evicted: Vec<SegmentKey>,
}

impl RenderedPass {
    pub fn outcome(&self, key: &SegmentKey) -> Option<&RenderOutcome> {
        self.outcomes
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, outcome)| outcome)
    }
}

#[derive(Clone, Copy)]
enum EngineCall<'a> {
    Render {
        engine: &'a dyn RenderEngine,
        display: bool,
    },
    Highlight {
        engine: &'a dyn Highlighter,
        language: &'a Language,
    },
}

impl EngineCall<'_> {
    fn name(&self) -> &str {
        match self {
            EngineCall::Render { engine, .. } => engine.name(),
            EngineCall::Highlight { engine, .. } => engine.name(),
        }
    }

    fn invoke(&self, source: &str, rerender: bool) -> Result<String, EngineError> {
        let result = panic::catch_unwind(AssertUnwindSafe(|| match *self {
            EngineCall::Render { engine, display } if rerender => engine.rerender(source, display),
            EngineCall::Render { engine, display } => engine.render(source, display),
            EngineCall::Highlight { engine, language } => engine.highlight(source, language),
        }));
        result.unwrap_or_else(|_| {
            Err(EngineError::Panicked {
                engine: self.name().to_string(),
            })
        })
    }

    fn supports_rerender(&self) -> bool {
        matches!(self, EngineCall::Render { .. })
    }
}

struct Produced {
    markup: Option<String>,
    status: RenderStatus,
    outcome: RenderOutcome,
}

#[derive(Debug)]
pub struct DeferredRenderer {
    engines: EngineSet,
    cache: RenderCache,
}

impl DeferredRenderer {
    pub fn new(engines: EngineSet) -> Self {
        Self {
            engines,
            cache: RenderCache::new(),
        }
    }

    pub fn engines(&self) -> &EngineSet {
        &self.engines
    }

    pub fn cache(&self) -> &RenderCache {
        &self.cache
    }

    pub fn reset(&mut self) {
        self.cache.clear();
    }

    pub fn render_pass(&mut self, pass: &SegmentPass, context: PassContext) -> RenderedPass {
        let engines = self.engines.clone();
        let mut rendered = RenderedPass::default();
        let mut tables = 0usize;

        for segment in &pass.segments {
            let outcome = match segment.kind() {
                SegmentKind::Prose => {
                    self.render_prose(segment, &engines, context, &mut tables, &mut rendered.nodes);
                    RenderOutcome::Prose
                }
                SegmentKind::BlockMath | SegmentKind::InlineMath => {
                    let (node, outcome) = self.render_math(segment, &engines, context);
                    rendered.nodes.push(node);
                    outcome
                }
                SegmentKind::FencedCode => {
                    let (node, outcome) = self.render_code(segment, &engines, context);
                    rendered.nodes.push(node);
                    outcome
                }
                SegmentKind::Diagram => {
                    let (node, outcome) = self.render_diagram(segment, &engines, context);
                    rendered.nodes.push(node);
                    outcome
                }
                SegmentKind::EmbeddedDocument => {
                    let (node, outcome) = self.render_document(segment, &engines, context);
                    rendered.nodes.push(node);
                    outcome
                }
            };
            rendered.outcomes.push((segment.key.clone(), outcome));
        }

        rendered.evicted = self.cache.retain_keys(pass.keys());
        rendered
    }

    fn produce(
        &mut self,
        segment: &Segment,
        engine: Option<EngineCall<'_>>,
        context: PassContext,
    ) -> Produced {
        let key = &segment.key;
        let source = segment.source.as_str();
        let Some(engine) = engine else {
            return Produced {
                markup: Some(escape_html(source).into_owned()),
                status: RenderStatus::Raw,
                outcome: RenderOutcome::Raw,
            };
        };

        if !segment.complete && context.phase.is_streaming() {
            return self.fallback(key);
        }

        if let Some(entry) = self.cache.get_fresh(key, source) {
            let cached = entry.markup.clone();
            if context.phase_transition && engine.supports_rerender() {
                if let Ok(markup) = engine.invoke(source, true) {
                    self.cache.store(key.clone(), markup.clone(), source);
                    return ready(markup, RenderOutcome::Rendered);
                }
            }
            return ready(cached, RenderOutcome::Cached);
        }

        match engine.invoke(source, false) {
            Ok(markup) => {
                self.cache.store(key.clone(), markup.clone(), source);
                ready(markup, RenderOutcome::Rendered)
            }
            Err(error) if context.phase.is_streaming() => {
                tracing::debug!(key = %key, %error, "render deferred after engine failure");
                self.fallback(key)
            }
            Err(error) => {
                tracing::debug!(key = %key, %error, "render failed after stream finished");
                Produced {
                    markup: Some(error_annotation(source, &error)),
                    status: RenderStatus::Failed,
                    outcome: RenderOutcome::Failed(error.to_string()),
                }
            }
        }
    }

    fn fallback(&self, key: &SegmentKey) -> Produced {
        match self.cache.get(key) {
            Some(entry) => Produced {
                markup: Some(entry.markup.clone()),
                status: RenderStatus::Stale,
                outcome: RenderOutcome::Stale,
            },
            None => Produced {
                markup: None,
                status: RenderStatus::Pending,
                outcome: RenderOutcome::Placeholder,
            },
        }
    }

    fn render_prose(
        &mut self,
        segment: &Segment,
        engines: &EngineSet,
        context: PassContext,
        tables: &mut usize,
        nodes: &mut Vec<Node>,
    ) {
        if segment.source.trim().is_empty() {
            return;
        }
        let Some(content) = engines.content.as_deref() else {
            nodes.push(
                Node::new("p")
                    .class("prose")
                    .text(segment.source.clone())
                    .source(segment.source.clone())
                    .status(RenderStatus::Raw)
                    .span(segment.span.clone()),
            );
            return;
        };

        let guarded = guard_tables_mapped(&segment.source, context.phase);
        let base = segment.span.start;
        let to_span = |range: &Range<usize>| {
            base + guarded.original_offset(range.start)..base + guarded.original_offset(range.end)
        };

        for block in content.blocks(&guarded.text) {
            let Some(raw) = guarded.text.get(block.range.clone()) else {
                continue;
            };
            if raw.trim().is_empty() {
                continue;
            }
            let span = to_span(&block.range);

            let node = match block.kind {
                BlockKind::TablePlaceholder => Node::new("div")
                    .class("table-placeholder")
                    .status(RenderStatus::Pending)
                    .span(span),
                BlockKind::Table => {
                    let key = format!("table-{}", *tables);
                    *tables += 1;
                    let inner = block_markup(content.render_block(raw), raw);
                    Node::new("div")
                        .class("table-wrapper")
                        .island(IslandKind::Table, key)
                        .source(raw)
                        .span(span)
                        .children(vec![inner.part(Part::TableInner).class("table-inner").source(raw)])
                }
                BlockKind::Markup => block_markup(content.render_block(raw), raw)
                    .class("prose")
                    .source(raw)
                    .span(span),
            };
            nodes.push(node);
        }
    }

    fn render_math(&mut self, segment: &Segment, engines: &EngineSet, context: PassContext) -> (Node, RenderOutcome) {
        let display = segment.kind() == SegmentKind::BlockMath;
        let engine = engines
            .math
            .as_deref()
            .map(|engine| EngineCall::Render { engine, display });
        let produced = self.produce(segment, engine, context);

        let (tag, class) = if display {
            ("div", "math-block")
        } else {
            ("span", "math-inline")
        };
        let node = with_markup(Node::new(tag).class(class), produced.markup)
            .attr("data-complete", segment.complete.to_string())
            .source(segment.source.clone())
            .status(produced.status)
            .span(segment.span.clone());
        (node, produced.outcome)
    }

    fn render_code(&mut self, segment: &Segment, engines: &EngineSet, context: PassContext) -> (Node, RenderOutcome) {
        let language = resolve_language(segment.language.as_deref().unwrap_or(""));
        let label = segment.language.clone().unwrap_or_else(|| language.name.to_string());
        let header = Node::new("div")
            .part(Part::Header)
            .class("code-header")
            .attr("data-language", language.name)
            .attr("data-icon", language.icon)
            .text(label);

        let shell = !segment.complete && context.phase.is_streaming();
        let (body, outcome) = match engines.highlighter.as_deref() {
            _ if shell => (
                Node::new("pre")
                    .text(segment.source.clone())
                    .status(RenderStatus::Pending),
                RenderOutcome::Shell,
            ),
            None => (
                Node::new("pre")
                    .text(segment.source.clone())
                    .status(RenderStatus::Raw),
                RenderOutcome::Raw,
            ),
            Some(engine) => {
                let call = EngineCall::Highlight {
                    engine,
                    language: &language,
                };
                let produced = self.produce(segment, Some(call), context);
                let body = match produced.markup {
                    Some(markup) => Node::new("pre").markup(markup),
                    None => Node::new("pre").text(segment.source.clone()),
                };
                (body.status(produced.status), produced.outcome)
            }
        };

        let node = Node::new("div")
            .class("code-shell")
            .island(IslandKind::CodeShell, segment.key.to_string())
            .attr("data-complete", segment.complete.to_string())
            .source(segment.source.clone())
            .span(segment.span.clone())
            .children(vec![header, body.part(Part::Body).class("code-body")]);
        (node, outcome)
    }

    fn render_diagram(&mut self, segment: &Segment, engines: &EngineSet, context: PassContext) -> (Node, RenderOutcome) {
        let header = Node::new("div")
            .part(Part::Header)
            .class("diagram-header")
            .text(segment.language.clone().unwrap_or_else(|| "diagram".to_string()));
        let mut children = vec![header];

        let outcome = match engines.diagram.as_deref() {
            Some(engine) => {
                let call = EngineCall::Render {
                    engine,
                    display: true,
                };
                let produced = self.produce(segment, Some(call), context);
                let preview = with_markup(Node::new("div"), produced.markup)
                    .part(Part::Preview)
                    .class("diagram-preview")
                    .status(produced.status)
                    .transform(TransformHandle::new());
                children.push(preview);
                produced.outcome
            }
            None => RenderOutcome::Raw,
        };

        children.push(
            Node::new("pre")
                .part(Part::Body)
                .class("diagram-source")
                .text(segment.source.clone()),
        );

        let node = Node::new("div")
            .class("diagram")
            .island(IslandKind::Diagram, segment.key.to_string())
            .attr("data-complete", segment.complete.to_string())
            .source(segment.source.clone())
            .span(segment.span.clone())
            .children(children);
        (node, outcome)
    }

    fn render_document(&mut self, segment: &Segment, engines: &EngineSet, context: PassContext) -> (Node, RenderOutcome) {
        let header = Node::new("div")
            .part(Part::Header)
            .class("document-header")
            .text(segment.language.clone().unwrap_or_else(|| "html".to_string()));

        let call = engines.document.as_deref().map(|engine| EngineCall::Render {
            engine,
            display: true,
        });
        let produced = self.produce(segment, call, context);
        let preview = with_markup(Node::new("div"), produced.markup)
            .part(Part::Preview)
            .class("document-preview")
            .status(produced.status);

        let node = Node::new("div")
            .class("document")
            .island(IslandKind::Document, segment.key.to_string())
            .attr("data-complete", segment.complete.to_string())
            .source(segment.source.clone())
            .span(segment.span.clone())
            .children(vec![header, preview]);
        (node, produced.outcome)
    }
}

fn ready(markup: String, outcome: RenderOutcome) -> Produced {
    Produced {
        markup: Some(markup),
        status: RenderStatus::Ready,
        outcome,
    }
}

fn with_markup(node: Node, markup: Option<String>) -> Node {
    match markup {
        Some(markup) => node.markup(markup),
        None => node,
    }
}

fn block_markup(result: Result<String, EngineError>, raw: &str) -> Node {
    match result {
        Ok(markup) => Node::new("div").markup(markup),
        Err(error) => {
            tracing::debug!(%error, "content block rendered as text");
            Node::new("div").text(raw).status(RenderStatus::Raw)
        }
    }
}

fn error_annotation(source: &str, error: &EngineError) -> String {
    format!(
        "<span class=\"render-error\" title=\"{}\">{}</span>",
        escape_attr(&error.to_string()),
        escape_html(source)
    )
}
