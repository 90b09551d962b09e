use tape_stream::{
    find_closing, find_next, guard_tables, is_escaped, segment_text, Phase, SegmentKind, Segmenter,
    TABLE_PLACEHOLDER,
};

const BUFFERS: &[&str] = &[
    "Intro $$a+b$$ then $x$ and\n```py\nprint(1)\n```\nafter `inline $code$` done",
    "Price is \\$5 and $$\\frac{1}{2}$$ end",
    "```mermaid\ngraph TD\n  A-->B\n```\n| a | b |\n|---|---|\n| 1 | 2 |\n",
    "legacy \\[x^2\\] and \\(y\\) with \u{201c}quotes\u{201d}",
    "````\n```\nnested\n```\n````\ntail $z$",
    "code `printf \"\\(x\\)\"` then \\(y\\) done",
];

fn prefixes(buffer: &str) -> impl Iterator<Item = &str> {
    (0..=buffer.len())
        .filter(|end| buffer.is_char_boundary(*end))
        .map(|end| &buffer[..end])
}

#[test]
fn finalized_segments_are_never_retracted() {
    for buffer in BUFFERS {
        let full = segment_text(buffer, Phase::Streaming);
        for prefix in prefixes(buffer) {
            let pass = segment_text(prefix, Phase::Streaming);
            for segment in pass.segments.iter().filter(|segment| segment.complete) {
                assert!(
                    full.segments.contains(segment),
                    "{buffer:?}: {segment:?} from prefix {prefix:?} was retracted"
                );
            }
        }
    }
}

#[test]
fn incremental_segmenter_matches_a_fresh_scan() {
    for buffer in BUFFERS {
        let mut segmenter = Segmenter::new();
        for prefix in prefixes(buffer) {
            let incremental = segmenter.segment(prefix, Phase::Streaming);
            assert_eq!(incremental, segment_text(prefix, Phase::Streaming), "prefix {prefix:?}");
        }
        assert_eq!(segmenter.resets(), 0);
    }
}

#[test]
fn segments_cover_the_whole_buffer() {
    for buffer in BUFFERS {
        for phase in [Phase::Streaming, Phase::Finished] {
            let pass = segment_text(buffer, phase);
            let mut cursor = 0;
            for segment in &pass.segments {
                assert_eq!(segment.span.start, cursor, "{buffer:?} gap before {segment:?}");
                assert!(segment.span.end >= segment.span.start);
                cursor = segment.span.end;
            }
            assert_eq!(cursor, pass.text.len());
        }
    }
}

#[test]
fn mixed_content_segments_in_order() {
    let pass = segment_text("answer $$x^2$$ more $y$ end", Phase::Streaming);
    let summary: Vec<(String, &str, bool)> = pass
        .segments
        .iter()
        .map(|segment| (segment.key.to_string(), segment.source.as_str(), segment.complete))
        .collect();

    assert_eq!(
        summary,
        vec![
            ("prose-0".to_string(), "answer ", true),
            ("block-math-0".to_string(), "x^2", true),
            ("prose-1".to_string(), " more ", true),
            ("inline-math-0".to_string(), "y", true),
            ("prose-2".to_string(), " end", false),
        ]
    );
}

#[test]
fn unterminated_fence_spans_to_the_end() {
    let pass = segment_text("```py\nprint(1", Phase::Streaming);
    assert_eq!(pass.segments.len(), 1);
    let code = &pass.segments[0];
    assert_eq!(code.kind(), SegmentKind::FencedCode);
    assert!(!code.complete);
    assert_eq!(code.source, "print(1");
    assert_eq!(code.language.as_deref(), Some("py"));
    assert_eq!(code.span, 0..pass.text.len());
}

#[test]
fn escape_parity_follows_backslash_runs() {
    assert!(is_escaped(r"\$$", 1));
    assert!(!is_escaped(r"\\$$", 2));
    assert!(is_escaped(r"\\\$$", 3));

    assert_eq!(find_next(r"\$$ $$", "$$", 0), Some(4));
    assert_eq!(find_next(r"\\$$", "$$", 0), Some(2));
    assert_eq!(find_closing("a $$ b", "$", 0), None);
    assert_eq!(find_next("partial $", "$$", 0), None);
}

#[test]
fn inline_code_keeps_legacy_delimiters_verbatim() {
    for phase in [Phase::Streaming, Phase::Finished] {
        let pass = segment_text("run `printf \"\\(x\\)\"` now \\(y\\) ok", phase);
        assert_eq!(pass.segments[0].source, "run `printf \"\\(x\\)\"` now ");
        assert_eq!(pass.segments[1].kind(), SegmentKind::InlineMath);
        assert_eq!(pass.segments[1].source, "y");
    }
}

#[test]
fn table_rows_are_padded_to_the_header() {
    let guarded = guard_tables("|a|b|\n|--|--|\n|1|", Phase::Streaming);
    assert_eq!(guarded, "|a|b|\n|--|--|\n|1| |");
}

#[test]
fn separatorless_table_becomes_a_placeholder_while_streaming() {
    let guarded = guard_tables("intro\n|a|b|\n|1|2|", Phase::Streaming);
    assert!(guarded.contains(TABLE_PLACEHOLDER));
    assert!(!guarded.contains("|a|"));
    assert!(guarded.starts_with("intro\n"));
}
