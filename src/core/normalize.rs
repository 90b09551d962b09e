//! Buffer normalization applied before every segmentation pass.

use std::borrow::Cow;

use crate::core::scanner::{close_verbatim, is_escaped, run_length, FenceState};
use crate::core::Phase;

const SMART_QUOTES: [char; 8] = [
    '\u{2018}', '\u{2019}', '\u{201A}', '\u{201B}', '\u{201C}', '\u{201D}', '\u{201E}', '\u{201F}',
];

/// Folds typographic quotes to ASCII and legacy `\[ \]` / `\( \)` math
/// delimiters to `$$` / `$`. Fenced code and inline backtick spans are copied
/// verbatim. While streaming, an unclosed backtick span keeps the rest of the
/// buffer verbatim; once finished, the lone run is literal.
pub fn normalize(text: &str, phase: Phase) -> Cow<'_, str> {
    if !text.contains('\\') && !text.contains(SMART_QUOTES) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len());
    let mut fence = FenceState::default();
    // Bytes before this offset belong to an inline code span.
    let mut verbatim_until = 0usize;
    let mut start = 0usize;

    for line in text.split_inclusive('\n') {
        let end = start + line.len();
        if verbatim_until >= end {
            out.push_str(line);
        } else if verbatim_until > start {
            out.push_str(&text[start..verbatim_until]);
            verbatim_until = normalize_line(text, verbatim_until, end, phase, &mut out);
        } else if fence.feed(line) {
            out.push_str(line);
        } else {
            verbatim_until = normalize_line(text, start, end, phase, &mut out);
        }
        start = end;
    }

    Cow::Owned(out)
}

/// Normalizes `text[from..to]` into `out`. Returns the end of an inline code
/// span that runs past `to`, or 0.
fn normalize_line(text: &str, from: usize, to: usize, phase: Phase, out: &mut String) -> usize {
    let mut cursor = from;
    while let Some(ch) = text[cursor..to].chars().next() {
        match ch {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => out.push('"'),
            '`' if !is_escaped(text, cursor) => {
                let run = run_length(text, cursor, b'`');
                match close_verbatim(text, cursor + run, run, !phase.is_streaming()) {
                    Some(close) if close <= to => {
                        out.push_str(&text[cursor..close]);
                        cursor = close;
                    }
                    Some(close) => {
                        out.push_str(&text[cursor..to]);
                        return close;
                    }
                    None if phase.is_streaming() => {
                        out.push_str(&text[cursor..to]);
                        return text.len();
                    }
                    None => {
                        out.push_str(&text[cursor..cursor + run]);
                        cursor += run;
                    }
                }
                continue;
            }
            '\\' if !is_escaped(text, cursor) => {
                let replacement = match text[cursor + 1..to].chars().next() {
                    Some('[') | Some(']') => Some("$$"),
                    Some('(') | Some(')') => Some("$"),
                    _ => None,
                };
                if let Some(replacement) = replacement {
                    out.push_str(replacement);
                    cursor += 2;
                    continue;
                }
                out.push(ch);
            }
            _ => out.push(ch),
        }
        cursor += ch.len_utf8();
    }
    0
}
