//! Output tree nodes.
//!
//! A node's [`NodeId`] is its referential identity: the reconciler keeps a
//! committed node (and its id) whenever it patches instead of replacing.

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::runtime::lock_unpoisoned;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IslandKind {
    CodeShell,
    Diagram,
    Document,
    Table,
}

impl IslandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IslandKind::CodeShell => "code",
            IslandKind::Diagram => "diagram",
            IslandKind::Document => "document",
            IslandKind::Table => "table",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Island {
    pub kind: IslandKind,
    pub key: String,
}

/// Role of a child inside an island.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Part {
    Header,
    Preview,
    Body,
    TableInner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderStatus {
    /// Fresh engine output for the current source.
    #[default]
    Ready,
    /// Last good output for an older source.
    Stale,
    /// Escaped raw source because no engine is configured.
    Raw,
    /// Nothing rendered yet; transparent placeholder.
    Pending,
    /// Visible error annotation.
    Failed,
}

impl RenderStatus {
    pub fn is_success(self) -> bool {
        matches!(self, RenderStatus::Ready | RenderStatus::Stale | RenderStatus::Raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Empty,
    Text(String),
    Markup(String),
    Children(Vec<Node>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformState {
    pub pan_x: f64,
    pub pan_y: f64,
    pub zoom: f64,
}

impl Default for TransformState {
    fn default() -> Self {
        Self {
            pan_x: 0.0,
            pan_y: 0.0,
            zoom: 1.0,
        }
    }
}

/// Shared pan/zoom state owned by a preview and carried across replacements.
#[derive(Debug, Clone, Default)]
pub struct TransformHandle(Arc<Mutex<TransformState>>);

impl TransformHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> TransformState {
        *lock_unpoisoned(&self.0)
    }

    pub fn set(&self, state: TransformState) {
        *lock_unpoisoned(&self.0) = state;
    }

    pub fn ptr_eq(&self, other: &TransformHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Fade-in annotation for the part of a node's text that arrived recently.
#[derive(Debug, Clone, PartialEq)]
pub struct FadeMark {
    /// Byte range in the normalized buffer.
    pub range: Range<usize>,
    /// 0.0 when the range just arrived, approaching 1.0 at the end of the window.
    pub progress: f32,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub tag: &'static str,
    pub attrs: Vec<(String, String)>,
    pub body: Body,
    pub island: Option<Island>,
    pub part: Option<Part>,
    /// Decoded source the node was rendered from.
    pub source: Option<String>,
    pub status: RenderStatus,
    pub transform: Option<TransformHandle>,
    pub span: Option<Range<usize>>,
    pub fade: Option<FadeMark>,
}

impl Node {
    pub fn new(tag: &'static str) -> Self {
        Self {
            id: NodeId::next(),
            tag,
            attrs: Vec::new(),
            body: Body::Empty,
            island: None,
            part: None,
            source: None,
            status: RenderStatus::Ready,
            transform: None,
            span: None,
            fade: None,
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    pub fn class(self, value: impl Into<String>) -> Self {
        self.attr("class", value)
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.body = Body::Text(text.into());
        self
    }

    pub fn markup(mut self, markup: impl Into<String>) -> Self {
        self.body = Body::Markup(markup.into());
        self
    }

    pub fn children(mut self, children: Vec<Node>) -> Self {
        self.body = Body::Children(children);
        self
    }

    pub fn island(mut self, kind: IslandKind, key: impl Into<String>) -> Self {
        self.island = Some(Island {
            kind,
            key: key.into(),
        });
        self
    }

    pub fn part(mut self, part: Part) -> Self {
        self.part = Some(part);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn status(mut self, status: RenderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn span(mut self, span: Range<usize>) -> Self {
        self.span = Some(span);
        self
    }

    pub fn transform(mut self, handle: TransformHandle) -> Self {
        self.transform = Some(handle);
        self
    }

    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn island_kind(&self) -> Option<IslandKind> {
        self.island.as_ref().map(|island| island.kind)
    }

    pub fn child_nodes(&self) -> &[Node] {
        match &self.body {
            Body::Children(children) => children,
            _ => &[],
        }
    }

    pub fn child_nodes_mut(&mut self) -> Option<&mut Vec<Node>> {
        match &mut self.body {
            Body::Children(children) => Some(children),
            _ => None,
        }
    }

    pub fn find_part(&self, part: Part) -> Option<&Node> {
        self.child_nodes().iter().find(|child| child.part == Some(part))
    }

    pub fn part_index(&self, part: Part) -> Option<usize> {
        self.child_nodes()
            .iter()
            .position(|child| child.part == Some(part))
    }

    /// Plain text carried by this node and its descendants, in order.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match &self.body {
            Body::Empty => {}
            Body::Text(text) | Body::Markup(text) => out.push_str(text),
            Body::Children(children) => children.iter().for_each(|child| child.collect_text(out)),
        }
    }

    /// Visits this node and every descendant, parents first.
    pub fn walk(&self, visit: &mut impl FnMut(&Node)) {
        visit(self);
        for child in self.child_nodes() {
            child.walk(visit);
        }
    }

    /// Deep structural equality. Ids, transform handles and fade marks are
    /// not part of a node's structure.
    pub fn same_structure(&self, other: &Node) -> bool {
        self.tag == other.tag
            && self.attrs == other.attrs
            && self.island == other.island
            && self.part == other.part
            && self.source == other.source
            && self.status == other.status
            && self.span == other.span
            && same_body(&self.body, &other.body)
    }
}

fn same_body(left: &Body, right: &Body) -> bool {
    match (left, right) {
        (Body::Empty, Body::Empty) => true,
        (Body::Text(left), Body::Text(right)) => left == right,
        (Body::Markup(left), Body::Markup(right)) => left == right,
        (Body::Children(left), Body::Children(right)) => {
            left.len() == right.len()
                && left
                    .iter()
                    .zip(right)
                    .all(|(left, right)| left.same_structure(right))
        }
        _ => false,
    }
}

// Equality is structural so `Body` can derive `PartialEq`.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.same_structure(other)
    }
}

impl Eq for Node {}
