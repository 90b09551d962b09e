//! Fade-in tracking for freshly appended text.
//!
//! Independent of rendering: chunks are recorded when the committed length
//! grows, and every pass stamps the live ones onto the candidate tree.

use std::ops::Range;
use std::time::{Duration, Instant};

use unicode_segmentation::UnicodeSegmentation;

use crate::tree::node::{Body, FadeMark, Node};

/// One appended range and when it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub range: Range<usize>,
    pub inserted_at: Instant,
}

#[derive(Debug)]
pub struct FadeTracker {
    window: Duration,
    chunks: Vec<Chunk>,
    last_len: usize,
    /// Everything below this offset has finished fading.
    finalized: usize,
}

impl FadeTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            chunks: Vec::new(),
            last_len: 0,
            finalized: 0,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn finalized(&self) -> usize {
        self.finalized
    }

    /// True while any chunk is still inside the window.
    pub fn is_animating(&self) -> bool {
        !self.chunks.is_empty()
    }

    /// Records the committed content length.
    pub fn observe(&mut self, len: usize, now: Instant) {
        if len > self.last_len {
            self.chunks.push(Chunk {
                range: self.last_len..len,
                inserted_at: now,
            });
        } else if len < self.last_len {
            tracing::trace!(from = self.last_len, to = len, "content shrank; fade chunks discarded");
            self.chunks.clear();
            self.finalized = 0;
        }
        self.last_len = len;
    }

    pub fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.chunks
            .retain(|chunk| now.saturating_duration_since(chunk.inserted_at) < window);
        self.finalized = self
            .chunks
            .first()
            .map(|chunk| chunk.range.start)
            .unwrap_or(self.last_len);
    }

    /// Prunes expired chunks, then sets or clears the fade mark of every
    /// top-level node. Islands never fade.
    pub fn annotate(&mut self, nodes: &mut [Node], text: &str, now: Instant) {
        self.prune(now);
        for node in nodes {
            node.fade = if node.island.is_some() {
                None
            } else {
                node.span
                    .as_ref()
                    .and_then(|span| self.mark_for(span, node, text, now))
            };
        }
    }

    fn mark_for(&self, span: &Range<usize>, node: &Node, text: &str, now: Instant) -> Option<FadeMark> {
        if span.end <= self.finalized || matches!(node.body, Body::Empty) {
            return None;
        }

        let mut hit: Option<(Range<usize>, Instant)> = None;
        for chunk in &self.chunks {
            let start = chunk.range.start.max(span.start).max(self.finalized);
            let end = chunk.range.end.min(span.end);
            if start >= end {
                continue;
            }
            hit = Some(match hit {
                None => (start..end, chunk.inserted_at),
                Some((range, oldest)) => (range.start.min(start)..range.end.max(end), oldest),
            });
        }

        let (range, inserted_at) = hit?;
        let elapsed = now.saturating_duration_since(inserted_at).as_secs_f32();
        let progress = (elapsed / self.window.as_secs_f32()).clamp(0.0, 1.0);
        Some(FadeMark {
            range: snap_to_graphemes(text, range),
            progress,
        })
    }
}

/// Widens `range` so neither end splits a grapheme cluster.
fn snap_to_graphemes(text: &str, range: Range<usize>) -> Range<usize> {
    let mut start = range.start.min(text.len());
    let mut end = range.end.min(text.len());
    for (offset, grapheme) in text.grapheme_indices(true) {
        if offset >= range.end {
            break;
        }
        let grapheme_end = offset + grapheme.len();
        if offset < range.start && range.start < grapheme_end {
            start = offset;
        }
        if range.end < grapheme_end {
            end = grapheme_end;
        }
    }
    start..end
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::node::IslandKind;

    const WINDOW: Duration = Duration::from_millis(400);

    fn prose(span: Range<usize>) -> Node {
        Node::new("div").text("x").span(span)
    }

    #[test]
    fn growth_records_chunks_and_shrink_discards_them() {
        let start = Instant::now();
        let mut tracker = FadeTracker::new(WINDOW);
        tracker.observe(5, start);
        tracker.observe(9, start);
        tracker.observe(9, start);
        assert_eq!(
            tracker.chunks().iter().map(|chunk| chunk.range.clone()).collect::<Vec<_>>(),
            vec![0..5, 5..9]
        );

        tracker.observe(3, start);
        assert!(tracker.chunks().is_empty());
        tracker.observe(4, start);
        assert_eq!(tracker.chunks()[0].range, 3..4);
    }

    #[test]
    fn live_chunks_mark_intersecting_nodes_only() {
        let start = Instant::now();
        let text = "hello world";
        let mut tracker = FadeTracker::new(WINDOW);
        tracker.observe(6, start);
        tracker.prune(start + WINDOW);
        tracker.observe(11, start + WINDOW);

        let mut nodes = vec![
            prose(0..6),
            prose(6..11),
            Node::new("div").island(IslandKind::CodeShell, "code-0").span(6..11),
        ];
        tracker.annotate(&mut nodes, text, start + WINDOW + WINDOW / 2);

        assert!(nodes[0].fade.is_none());
        let mark = nodes[1].fade.as_ref().expect("fresh text fades");
        assert_eq!(mark.range, 6..11);
        assert!((mark.progress - 0.5).abs() < 0.01);
        assert!(nodes[2].fade.is_none());
    }

    #[test]
    fn expired_chunks_are_pruned_and_marks_cleared() {
        let start = Instant::now();
        let mut tracker = FadeTracker::new(WINDOW);
        tracker.observe(5, start);

        let mut nodes = vec![prose(0..5)];
        tracker.annotate(&mut nodes, "abcde", start);
        assert!(nodes[0].fade.is_some());

        tracker.annotate(&mut nodes, "abcde", start + WINDOW);
        assert!(nodes[0].fade.is_none());
        assert!(!tracker.is_animating());
        assert_eq!(tracker.finalized(), 5);
    }

    #[test]
    fn marks_do_not_split_graphemes() {
        let text = "cafe\u{301}!";
        assert_eq!(snap_to_graphemes(text, 4..7), 3..7);
        assert_eq!(snap_to_graphemes(text, 0..4), 0..6);
    }
}
