//! Tolerant segmentation of a growing content buffer.
//!
//! A pass carves the normalized buffer into ordered, non-overlapping segments.
//! Unterminated constructs are a normal intermediate state: they span to the
//! end of the buffer and stop the scan.

use std::fmt;
use std::ops::Range;

use crate::core::normalize::normalize;
use crate::core::scanner::{
    at_line_start, close_verbatim, find_closing, find_closing_streaming, find_next, line_end, run_length,
};
use crate::core::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SegmentKind {
    Prose,
    BlockMath,
    InlineMath,
    FencedCode,
    Diagram,
    EmbeddedDocument,
}

impl SegmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentKind::Prose => "prose",
            SegmentKind::BlockMath => "block-math",
            SegmentKind::InlineMath => "inline-math",
            SegmentKind::FencedCode => "code",
            SegmentKind::Diagram => "diagram",
            SegmentKind::EmbeddedDocument => "document",
        }
    }

    pub fn is_fence(&self) -> bool {
        matches!(
            self,
            SegmentKind::FencedCode | SegmentKind::Diagram | SegmentKind::EmbeddedDocument
        )
    }

    fn from_info(info: &str) -> Self {
        let tag = info.split_whitespace().next().unwrap_or("").to_ascii_lowercase();
        match tag.as_str() {
            "mermaid" => SegmentKind::Diagram,
            "html" | "htm" | "svg" | "xhtml" => SegmentKind::EmbeddedDocument,
            _ => SegmentKind::FencedCode,
        }
    }
}

/// `"{kind}-{n}"`, where `n` counts earlier segments of the same kind in the pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentKey {
    pub kind: SegmentKind,
    pub index: usize,
}

impl SegmentKey {
    pub fn new(kind: SegmentKind, index: usize) -> Self {
        Self { kind, index }
    }
}

impl fmt::Display for SegmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind.as_str(), self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub key: SegmentKey,
    /// Byte range in the normalized buffer, opener..closer inclusive.
    pub span: Range<usize>,
    /// Decoded payload: math source, code body, or the prose text itself.
    pub source: String,
    pub language: Option<String>,
    pub complete: bool,
    /// The token still being searched for while `complete` is false.
    pub closing: Option<String>,
}

impl Segment {
    pub fn kind(&self) -> SegmentKind {
        self.key.kind
    }

    pub fn raw<'a>(&self, text: &'a str) -> &'a str {
        text.get(self.span.clone()).unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentPass {
    /// The normalized buffer the spans index into.
    pub text: String,
    pub segments: Vec<Segment>,
}

impl SegmentPass {
    pub fn keys(&self) -> impl Iterator<Item = &SegmentKey> {
        self.segments.iter().map(|segment| &segment.key)
    }

    pub fn last(&self) -> Option<&Segment> {
        self.segments.last()
    }
}

#[derive(Debug, Clone)]
struct Committed {
    text: String,
    segments: Vec<Segment>,
    resume_at: usize,
}

/// Stateful segmenter that resumes after the committed prefix of the
/// previous pass when the buffer only grew.
#[derive(Debug, Default)]
pub struct Segmenter {
    committed: Option<Committed>,
    resets: usize,
}

impl Segmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the segmenter discarded its committed prefix because
    /// the buffer shrank or was edited.
    pub fn resets(&self) -> usize {
        self.resets
    }

    pub fn reset(&mut self) {
        self.committed = None;
    }

    pub fn segment(&mut self, text: &str, phase: Phase) -> SegmentPass {
        let normalized = normalize(text, phase).into_owned();

        let (mut segments, from) = match self.committed.take() {
            Some(committed) if extends(&committed, &normalized) => {
                (committed.segments, committed.resume_at)
            }
            Some(committed) => {
                self.resets += 1;
                tracing::debug!(
                    previous_len = committed.text.len(),
                    len = normalized.len(),
                    "segmenter buffer shrank or diverged; rescanning"
                );
                (Vec::new(), 0)
            }
            None => (Vec::new(), 0),
        };

        scan(&normalized, from, phase, &mut segments);

        if phase == Phase::Streaming {
            let committed_len = segments
                .iter()
                .rposition(|segment| segment.kind() != SegmentKind::Prose && segment.complete)
                .map(|index| index + 1)
                .unwrap_or(0);
            let resume_at = committed_len
                .checked_sub(1)
                .map(|index| segments[index].span.end)
                .unwrap_or(0);
            self.committed = Some(Committed {
                text: normalized.clone(),
                segments: segments[..committed_len].to_vec(),
                resume_at,
            });
        }

        SegmentPass {
            text: normalized,
            segments,
        }
    }
}

fn extends(committed: &Committed, text: &str) -> bool {
    if text.len() < committed.text.len() {
        return false;
    }
    let previous = committed.text.as_bytes();
    let stable = match previous.last() {
        Some(b'\\') => previous.len() - 1,
        _ => previous.len(),
    };
    committed.resume_at <= stable && text.as_bytes().starts_with(&previous[..stable])
}

/// Segments `text` once, with no resume state.
pub fn segment_text(text: &str, phase: Phase) -> SegmentPass {
    Segmenter::new().segment(text, phase)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Opener {
    BlockMath,
    Fence { run: usize },
    Verbatim { run: usize },
    InlineMath,
}

#[derive(Debug, Default)]
struct Lookahead {
    block: Option<Option<usize>>,
    inline: Option<Option<usize>>,
    tick: Option<Option<usize>>,
}

impl Lookahead {
    fn cached(
        slot: &mut Option<Option<usize>>,
        cursor: usize,
        search: impl FnOnce(usize) -> Option<usize>,
    ) -> Option<usize> {
        match *slot {
            Some(None) => None,
            Some(Some(found)) if found >= cursor => Some(found),
            _ => {
                let found = search(cursor);
                *slot = Some(found);
                found
            }
        }
    }

    fn next(&mut self, text: &str, cursor: usize) -> Option<(usize, Opener)> {
        let block = Self::cached(&mut self.block, cursor, |from| find_next(text, "$$", from));
        let inline = Self::cached(&mut self.inline, cursor, |from| next_inline_opener(text, from));
        let tick = Self::cached(&mut self.tick, cursor, |from| find_next(text, "`", from));

        let tick = tick.map(|at| (at, classify_backticks(text, at)));
        let block = block.map(|at| (at, Opener::BlockMath));
        let inline = inline.map(|at| (at, Opener::InlineMath));

        // Candidates are listed in priority order; `min_by_key` keeps the first on ties.
        [block, tick, inline]
            .into_iter()
            .flatten()
            .min_by_key(|(at, _)| *at)
    }
}

fn next_inline_opener(text: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut cursor = from;
    while let Some(at) = find_next(text, "$", cursor) {
        match bytes.get(at + 1) {
            Some(next) if next.is_ascii_whitespace() => cursor = at + 1,
            _ => return Some(at),
        }
    }
    None
}

fn classify_backticks(text: &str, at: usize) -> Opener {
    let run = run_length(text, at, b'`');
    if run >= 3 && at_line_start(text, at) {
        let info = &text[at + run..line_end(text, at)];
        if !info.contains('`') {
            return Opener::Fence { run };
        }
    }
    Opener::Verbatim { run }
}

fn push_segment(
    segments: &mut Vec<Segment>,
    kind: SegmentKind,
    span: Range<usize>,
    source: String,
    language: Option<String>,
    closing: Option<&str>,
) {
    let index = segments
        .iter()
        .filter(|segment| segment.kind() == kind)
        .count();
    segments.push(Segment {
        key: SegmentKey::new(kind, index),
        span,
        source,
        language,
        complete: closing.is_none(),
        closing: closing.map(str::to_string),
    });
}

fn push_prose(segments: &mut Vec<Segment>, text: &str, span: Range<usize>, complete: bool) {
    if span.is_empty() {
        return;
    }
    let source = text[span.clone()].to_string();
    let closing = if complete { None } else { Some("") };
    push_segment(segments, SegmentKind::Prose, span, source, None, closing);
}

fn scan(text: &str, from: usize, phase: Phase, segments: &mut Vec<Segment>) {
    let finished = phase == Phase::Finished;
    let mut lookahead = Lookahead::default();
    let mut cursor = from;
    let mut prose_start = from;

    while let Some((at, opener)) = lookahead.next(text, cursor) {
        let construct = match opener {
            Opener::Verbatim { run } => {
                match close_verbatim(text, at + run, run, finished) {
                    Some(end) => cursor = end,
                    None if finished => cursor = at + run,
                    None => break,
                }
                continue;
            }
            Opener::BlockMath => scan_math(text, at, "$$", SegmentKind::BlockMath, finished),
            Opener::InlineMath => scan_math(text, at, "$", SegmentKind::InlineMath, finished),
            Opener::Fence { run } => scan_fence(text, at, run, finished),
        };

        let complete = construct.closing.is_none();
        push_prose(segments, text, prose_start..at, complete);
        push_segment(
            segments,
            construct.kind,
            at..construct.end,
            construct.source,
            construct.language,
            construct.closing,
        );
        if !complete {
            return;
        }
        cursor = construct.end;
        prose_start = construct.end;
    }

    push_prose(segments, text, prose_start..text.len(), finished);
}

struct Construct {
    kind: SegmentKind,
    end: usize,
    source: String,
    language: Option<String>,
    closing: Option<&'static str>,
}

fn scan_math(text: &str, at: usize, token: &'static str, kind: SegmentKind, finished: bool) -> Construct {
    let body = at + token.len();
    let closer = if finished {
        find_closing(text, token, body)
    } else {
        find_closing_streaming(text, token, body)
    };

    match closer {
        Some(close) => Construct {
            kind,
            end: close + token.len(),
            source: text[body..close].trim().to_string(),
            language: None,
            closing: None,
        },
        None => Construct {
            kind,
            end: text.len(),
            source: text.get(body..).unwrap_or("").trim().to_string(),
            language: None,
            closing: Some(token),
        },
    }
}

const FENCE_CLOSING: &str = "```";

fn scan_fence(text: &str, at: usize, run: usize, finished: bool) -> Construct {
    let opener_end = line_end(text, at);
    let info = text[at + run..opener_end].trim();
    let language = (!info.is_empty()).then(|| info.split_whitespace().next().unwrap_or(info).to_string());
    let kind = SegmentKind::from_info(info);

    let incomplete = |source: &str| Construct {
        kind,
        end: text.len(),
        source: source.to_string(),
        language: language.clone(),
        closing: Some(FENCE_CLOSING),
    };

    if opener_end >= text.len() {
        return incomplete("");
    }

    let body_start = opener_end + 1;
    let mut line_start = body_start;
    while line_start <= text.len() {
        let end = line_end(text, line_start);
        let line = &text[line_start..end];
        let trimmed = line.trim_start_matches(' ');
        let indent = line.len() - trimmed.len();
        let ticks = run_length(trimmed, 0, b'`');
        let is_closer = indent <= 3 && ticks >= run && trimmed[ticks..].trim().is_empty();

        if is_closer {
            let terminated = end < text.len() || finished;
            if !terminated {
                break;
            }
            let source = text[body_start..line_start]
                .strip_suffix('\n')
                .unwrap_or(&text[body_start..line_start]);
            return Construct {
                kind,
                end,
                source: source.to_string(),
                language,
                closing: None,
            };
        }

        if end >= text.len() {
            break;
        }
        line_start = end + 1;
    }

    incomplete(&text[body_start..])
}
