use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tape_stream::tree::TransformState;
use tape_stream::{
    segment_text, Body, DeferredRenderer, EngineError, EngineSet, IslandKind, MessageView, Mutation, Node, Part,
    PassContext, Phase, RenderEngine, RenderOutcome, RenderStatus, SegmentKey, SegmentKind,
};

const WINDOW: Duration = Duration::from_millis(400);

struct CountingEngine {
    calls: AtomicUsize,
    reject: &'static str,
}

impl CountingEngine {
    fn new(reject: &'static str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            reject,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RenderEngine for CountingEngine {
    fn name(&self) -> &str {
        "counting"
    }

    fn render(&self, source: &str, _display: bool) -> Result<String, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.reject.is_empty() && source.contains(self.reject) {
            return Err(EngineError::failed("counting", "syntax error"));
        }
        Ok(format!("<svg data-len=\"{}\"/>", source.len()))
    }
}

fn diagram_view(engine: Arc<CountingEngine>) -> MessageView {
    MessageView::new(1, EngineSet::raw().with_diagram(engine), WINDOW)
}

fn preview(view: &MessageView) -> &Node {
    view.committed()[0].find_part(Part::Preview).expect("preview")
}

fn markup(node: &Node) -> &str {
    match &node.body {
        Body::Markup(markup) => markup,
        _ => "",
    }
}

#[test]
fn unchanged_diagram_island_is_left_untouched() {
    let engine = CountingEngine::new("");
    let mut view = diagram_view(engine.clone());
    let now = Instant::now();

    view.set_text("```mermaid\ngraph TD\n```\n");
    view.render(now);
    let island = view.committed()[0].id;
    let preview_id = preview(&view).id;
    assert_eq!(view.committed()[0].island_kind(), Some(IslandKind::Diagram));

    view.set_text("```mermaid\ngraph TD\n```\nThat is the graph.");
    let mutations = view.render(now).expect("pass");

    assert_eq!(engine.calls(), 1);
    assert_eq!(view.committed()[0].id, island);
    assert_eq!(preview(&view).id, preview_id);
    assert_eq!(
        mutations,
        vec![Mutation::Append {
            index: 1,
            id: view.committed()[1].id
        }]
    );
}

#[test]
fn preview_swaps_in_once_rendered_and_keeps_pan_zoom() {
    let engine = CountingEngine::new("");
    let mut view = diagram_view(engine.clone());
    let now = Instant::now();

    view.set_text("```mermaid\ngraph TD\n  A-->B");
    view.render(now);
    assert_eq!(engine.calls(), 0);
    assert_eq!(preview(&view).status, RenderStatus::Pending);
    let handle = preview(&view).transform.clone().expect("transform handle");
    handle.set(TransformState {
        pan_x: 12.0,
        pan_y: -4.0,
        zoom: 1.25,
    });

    view.set_text("```mermaid\ngraph TD\n  A-->B\n```\n");
    let mutations = view.render(now).expect("pass");

    assert_eq!(engine.calls(), 1);
    assert!(mutations
        .iter()
        .any(|mutation| matches!(mutation, Mutation::SwapPreview { index: 0, .. })));
    let current = preview(&view);
    assert_eq!(current.status, RenderStatus::Ready);
    let carried = current.transform.as_ref().expect("carried handle");
    assert!(carried.ptr_eq(&handle));
    assert_eq!(carried.get().zoom, 1.25);
}

#[test]
fn failure_keeps_last_good_preview_until_the_stream_finishes() {
    let engine = CountingEngine::new("!!");
    let mut view = diagram_view(engine.clone());
    let now = Instant::now();

    view.set_text("```mermaid\ngraph TD\n```\n");
    view.render(now);
    let good = markup(preview(&view)).to_string();

    view.set_text("```mermaid\ngraph TD!!\n```\n");
    view.render(now);
    assert_eq!(markup(preview(&view)), good);
    assert!(preview(&view).status.is_success());

    view.set_phase(Phase::Finished);
    view.render(now);
    assert_eq!(preview(&view).status, RenderStatus::Failed);
    assert!(markup(preview(&view)).contains("render-error"));
    assert_eq!(engine.calls(), 3);
}

#[test]
fn cache_keeps_only_keys_still_present() {
    let engine = CountingEngine::new("");
    let mut renderer = DeferredRenderer::new(EngineSet::raw().with_diagram(engine.clone()));
    let block = "```mermaid\ngraph TD\n```\n";

    renderer.render_pass(&segment_text(&block.repeat(5), Phase::Finished), PassContext::finished());
    assert_eq!(renderer.cache().len(), 5);

    let rendered = renderer.render_pass(&segment_text(&block.repeat(3), Phase::Finished), PassContext::finished());
    let diagram = |index| SegmentKey::new(SegmentKind::Diagram, index);
    assert_eq!(rendered.evicted, vec![diagram(3), diagram(4)]);
    for index in 0..3 {
        assert!(renderer.cache().contains(&diagram(index)));
        assert_eq!(rendered.outcome(&diagram(index)), Some(&RenderOutcome::Cached));
    }
    assert_eq!(engine.calls(), 5);
}

#[test]
fn missing_engines_render_escaped_source() {
    let mut view = MessageView::new(1, EngineSet::raw(), WINDOW);
    view.set_text("$$a<b$$ ");
    view.render(Instant::now());

    let math = &view.committed()[0];
    assert_eq!(math.status, RenderStatus::Raw);
    assert_eq!(markup(math), "a&lt;b");
}

#[test]
fn builtin_engines_render_prose_tables_and_code() {
    let config = tape_stream::EnvConfig::default();
    let mut view = MessageView::new(1, EngineSet::builtin(&config), WINDOW);
    view.set_text("Some **bold** text\n\n|a|b|\n|-|-|\n|1|2|\n\n```rust\nfn main() {}\n```\n");
    view.set_phase(Phase::Finished);
    view.render(Instant::now());

    let kinds: Vec<Option<IslandKind>> = view.committed().iter().map(Node::island_kind).collect();
    assert_eq!(kinds, vec![None, Some(IslandKind::Table), Some(IslandKind::CodeShell)]);
    assert!(markup(&view.committed()[0]).contains("<strong>bold</strong>"));
    let code = view.committed()[2].find_part(Part::Header).expect("header");
    assert_eq!(code.get_attr("data-language"), Some("rust"));
}
