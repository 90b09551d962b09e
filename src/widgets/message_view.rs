//! Per-message rendering pipeline.
//!
//! Each pass re-segments the whole buffer, renders a candidate tree, patches
//! the committed tree and stamps fade marks onto it. Passes run only when the
//! text or phase changed (or a fade is still running); setting text several
//! times between passes collapses into one pass over the latest text.

use std::time::{Duration, Instant};

use crate::core::segment::Segmenter;
use crate::core::{PassContext, Phase};
use crate::render::deferred::{DeferredRenderer, RenderedPass};
use crate::render::engine::EngineSet;
use crate::runtime::fade::FadeTracker;
use crate::runtime::session::MessageId;
use crate::tree::node::Node;
use crate::tree::reconcile::{Mutation, Reconciler};

#[derive(Debug)]
pub struct MessageView {
    id: MessageId,
    text: String,
    phase: Phase,
    rendered_phase: Option<Phase>,
    normalized: String,
    dirty: bool,
    passes: usize,
    segmenter: Segmenter,
    renderer: DeferredRenderer,
    reconciler: Reconciler,
    fade: FadeTracker,
}

impl MessageView {
    pub fn new(id: MessageId, engines: EngineSet, fade_window: Duration) -> Self {
        Self {
            id,
            text: String::new(),
            phase: Phase::Streaming,
            rendered_phase: None,
            normalized: String::new(),
            dirty: false,
            passes: 0,
            segmenter: Segmenter::new(),
            renderer: DeferredRenderer::new(engines),
            reconciler: Reconciler::new(),
            fade: FadeTracker::new(fade_window),
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of passes run so far.
    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        if text != self.text {
            self.text = text;
            self.dirty = true;
        }
    }

    pub fn set_phase(&mut self, phase: Phase) {
        if phase != self.phase {
            self.phase = phase;
            self.dirty = true;
        }
    }

    pub fn committed(&self) -> &[Node] {
        self.reconciler.committed()
    }

    /// Attaches host-side teardown to a committed node.
    pub fn register_cleanup(&mut self, id: crate::tree::node::NodeId, cleanup: impl FnOnce() + Send + 'static) {
        self.reconciler.register_cleanup(id, cleanup);
    }

    pub fn renderer(&self) -> &DeferredRenderer {
        &self.renderer
    }

    pub fn segmenter_resets(&self) -> usize {
        self.segmenter.resets()
    }

    /// Runs one pass if anything changed. Returns the applied mutations, or
    /// `None` when no pass was needed.
    pub fn render(&mut self, now: Instant) -> Option<Vec<Mutation>> {
        if !self.dirty {
            if !self.fade.is_animating() {
                return None;
            }
            self.fade
                .annotate(self.reconciler.committed_mut(), &self.normalized, now);
            return Some(Vec::new());
        }

        let (mutations, _) = self.run_pass(now);
        Some(mutations)
    }

    /// Like [`MessageView::render`] but always runs a full pass and also
    /// returns the renderer's per-segment report.
    pub fn render_pass(&mut self, now: Instant) -> (Vec<Mutation>, RenderedPass) {
        self.run_pass(now)
    }

    fn run_pass(&mut self, now: Instant) -> (Vec<Mutation>, RenderedPass) {
        let context = PassContext {
            phase: self.phase,
            phase_transition: self
                .rendered_phase
                .is_some_and(|previous| previous != self.phase),
        };

        let pass = self.segmenter.segment(&self.text, self.phase);
        self.fade.observe(pass.text.len(), now);

        let mut rendered = self.renderer.render_pass(&pass, context);
        let candidate = std::mem::take(&mut rendered.nodes);
        let mutations = self.reconciler.reconcile(candidate, context);
        self.fade.annotate(self.reconciler.committed_mut(), &pass.text, now);

        self.normalized = pass.text;
        self.rendered_phase = Some(self.phase);
        self.dirty = false;
        self.passes += 1;
        tracing::trace!(
            message = self.id,
            mutations = mutations.len(),
            segments = rendered.outcomes.len(),
            "message pass"
        );
        (mutations, rendered)
    }

    /// Drops the committed tree, caches and fade state.
    pub fn reset(&mut self) {
        self.text.clear();
        self.normalized.clear();
        self.phase = Phase::Streaming;
        self.rendered_phase = None;
        self.dirty = false;
        self.segmenter.reset();
        self.renderer.reset();
        self.reconciler.reset();
        self.fade = FadeTracker::new(self.fade.window());
    }
}
