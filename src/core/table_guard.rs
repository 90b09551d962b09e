//! Line-oriented guard for pipe tables.
//!
//! Rows are padded to the header's column count before the content engine
//! sees them. A block that has not received its separator row by the end of a
//! streaming buffer is swapped for [`TABLE_PLACEHOLDER`] so a half-formed
//! table never renders.

use std::borrow::Cow;

use crate::core::scanner::{is_escaped, FenceState};
use crate::core::Phase;

/// Inert stand-in for a table whose separator row has not arrived yet.
pub const TABLE_PLACEHOLDER: &str = "\u{FFFC}";

pub fn guard_tables(text: &str, phase: Phase) -> Cow<'_, str> {
    guard_tables_mapped(text, phase).text
}

/// Guarded text plus enough bookkeeping to map its offsets back onto the
/// input.
#[derive(Debug, Clone)]
pub struct Guarded<'a> {
    pub text: Cow<'a, str>,
    /// `(guarded, original)` start offsets of every emitted line or block,
    /// closed by the two end offsets.
    anchors: Vec<(usize, usize)>,
}

impl Guarded<'_> {
    /// Input offset for `offset` in the guarded text. Offsets inside padding
    /// or a placeholder land on the end of the line or block they replaced.
    pub fn original_offset(&self, offset: usize) -> usize {
        if matches!(self.text, Cow::Borrowed(_)) {
            return offset;
        }
        let at = self.anchors.partition_point(|&(guarded, _)| guarded <= offset);
        let Some(&(guarded, original)) = at.checked_sub(1).and_then(|index| self.anchors.get(index)) else {
            return 0;
        };
        match self.anchors.get(at) {
            Some(&(_, next)) => (original + (offset - guarded)).min(next),
            None => original,
        }
    }
}

pub fn guard_tables_mapped(text: &str, phase: Phase) -> Guarded<'_> {
    let unchanged = Guarded {
        text: Cow::Borrowed(text),
        anchors: Vec::new(),
    };
    if !text.contains('|') {
        return unchanged;
    }

    let lines: Vec<&str> = text.split_inclusive('\n').collect();
    let mut out = Emitter {
        text: String::with_capacity(text.len() + 16),
        anchors: Vec::new(),
        consumed: 0,
    };
    let mut fence = FenceState::default();
    let mut changed = false;
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index];
        if fence.feed(line) || !is_tabular(line) {
            out.line(line);
            index += 1;
            continue;
        }

        let start = index;
        while index < lines.len() && is_tabular(lines[index]) {
            index += 1;
        }
        let at_end = index == lines.len();
        changed |= guard_block(&lines[start..index], at_end, phase, &mut out);
    }

    if !changed {
        return unchanged;
    }
    out.anchor();
    Guarded {
        text: Cow::Owned(out.text),
        anchors: out.anchors,
    }
}

struct Emitter {
    text: String,
    anchors: Vec<(usize, usize)>,
    /// Input bytes accounted for so far.
    consumed: usize,
}

impl Emitter {
    fn anchor(&mut self) {
        self.anchors.push((self.text.len(), self.consumed));
    }

    fn line(&mut self, line: &str) {
        self.anchor();
        self.text.push_str(line);
        self.consumed += line.len();
    }
}

pub fn is_tabular(line: &str) -> bool {
    line.trim_start().starts_with('|')
}

/// Cells of one row with the edge pipes removed. Escaped pipes stay inside
/// their cell.
pub fn cells(line: &str) -> Vec<&str> {
    let row = line.trim();
    let row = row.strip_prefix('|').unwrap_or(row);
    let row = match row.strip_suffix('|') {
        Some(stripped) if !is_escaped(row, row.len() - 1) => stripped,
        _ => row,
    };

    let mut cells = Vec::new();
    let mut start = 0;
    for (index, byte) in row.bytes().enumerate() {
        if byte == b'|' && !is_escaped(row, index) {
            cells.push(row[start..index].trim());
            start = index + 1;
        }
    }
    cells.push(row[start..].trim());
    cells
}

pub fn is_separator(line: &str) -> bool {
    cells(line).iter().all(|cell| {
        !cell.is_empty()
            && cell.contains('-')
            && cell.chars().all(|ch| ch == '-' || ch == ':')
    })
}

fn guard_block(block: &[&str], at_end: bool, phase: Phase, out: &mut Emitter) -> bool {
    let has_separator = block.get(1).is_some_and(|line| is_separator(line));

    if !has_separator {
        if at_end && phase.is_streaming() {
            if !out.text.is_empty() && !out.text.ends_with("\n\n") {
                out.text.push('\n');
            }
            out.anchor();
            out.text.push_str(TABLE_PLACEHOLDER);
            if block.last().is_some_and(|line| line.ends_with('\n')) {
                out.text.push('\n');
            }
            out.consumed += block.iter().map(|line| line.len()).sum::<usize>();
            return true;
        }
        block.iter().for_each(|line| out.line(line));
        return false;
    }

    let columns = cells(block[0]).len();
    let mut changed = false;
    for (row, line) in block.iter().enumerate() {
        let have = cells(line).len();
        if have >= columns {
            out.line(line);
            continue;
        }
        let filler = if row == 1 { "---" } else { " " };
        out.anchor();
        pad_row(line, columns - have, filler, &mut out.text);
        out.consumed += line.len();
        changed = true;
    }
    changed
}

fn pad_row(line: &str, missing: usize, filler: &str, out: &mut String) {
    let (body, ending) = match line.strip_suffix("\r\n") {
        Some(body) => (body, "\r\n"),
        None => match line.strip_suffix('\n') {
            Some(body) => (body, "\n"),
            None => (line, ""),
        },
    };

    let body = body.trim_end();
    let base = match body.strip_suffix('|') {
        Some(stripped) if body.trim_start().len() > 1 && !is_escaped(body, body.len() - 1) => {
            stripped
        }
        _ => body,
    };

    out.push_str(base);
    for _ in 0..missing {
        out.push('|');
        out.push_str(filler);
    }
    out.push('|');
    out.push_str(ending);
}
