//! Delimiter cursor utilities shared by the segmenter, normalizer and table guard.
//!
//! All offsets are byte offsets. Tokens are ASCII, so every match position is a
//! char boundary even when the surrounding text is not ASCII.

/// Returns true when the byte at `index` is preceded by an odd run of backslashes.
pub fn is_escaped(text: &str, index: usize) -> bool {
    let bytes = text.as_bytes();
    if index > bytes.len() {
        return false;
    }

    let mut run = 0usize;
    let mut cursor = index;
    while cursor > 0 && bytes[cursor - 1] == b'\\' {
        run += 1;
        cursor -= 1;
    }
    run % 2 == 1
}

/// Finds the next unescaped `token` at or after `from`.
pub fn find_next(text: &str, token: &str, from: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let needle = token.as_bytes();
    if needle.is_empty() {
        return None;
    }

    let mut index = from;
    while index + needle.len() <= bytes.len() {
        if &bytes[index..index + needle.len()] == needle && !is_escaped(text, index) {
            return Some(index);
        }
        index += 1;
    }
    None
}

/// Finds the next unescaped `token` at or after `from` that is not part of a
/// longer run of the token's leading character.
///
/// A single `$` never matches inside `$$`, and `$$` never matches inside `$$$`.
pub fn find_closing(text: &str, token: &str, from: usize) -> Option<usize> {
    find_closing_in(text, token, from, true)
}

/// Like [`find_closing`], but treats a candidate that touches the end of the
/// buffer as ambiguous: more of the same character may still arrive.
pub fn find_closing_streaming(text: &str, token: &str, from: usize) -> Option<usize> {
    find_closing_in(text, token, from, false)
}

fn find_closing_in(text: &str, token: &str, from: usize, at_end: bool) -> Option<usize> {
    let bytes = text.as_bytes();
    let Some(&lead) = token.as_bytes().first() else {
        return None;
    };

    let mut cursor = from;
    while let Some(index) = find_next(text, token, cursor) {
        let end = index + token.len();
        let extends_right = match bytes.get(end) {
            // A trailing backslash may still fold into a legacy delimiter.
            Some(b'\\') if end + 1 == bytes.len() && lead != b'\\' => !at_end,
            Some(next) => *next == lead,
            None => !at_end,
        };
        let extends_left = index > from && bytes[index - 1] == lead && !is_escaped(text, index - 1);

        if !extends_right && !extends_left {
            return Some(index);
        }
        if end >= bytes.len() && !at_end {
            return None;
        }
        cursor = index + 1;
    }
    None
}

/// Length of the run of `byte` starting at `index`.
pub fn run_length(text: &str, index: usize, byte: u8) -> usize {
    text.as_bytes()
        .get(index..)
        .map(|rest| rest.iter().take_while(|candidate| **candidate == byte).count())
        .unwrap_or(0)
}

/// Returns true when `index` starts a line, allowing up to three spaces of indent.
pub fn at_line_start(text: &str, index: usize) -> bool {
    let bytes = text.as_bytes();
    if index > bytes.len() {
        return false;
    }

    let mut cursor = index;
    let mut indent = 0usize;
    while cursor > 0 && bytes[cursor - 1] == b' ' {
        indent += 1;
        cursor -= 1;
        if indent > 3 {
            return false;
        }
    }
    cursor == 0 || bytes[cursor - 1] == b'\n'
}

/// Byte offset of the end of the line containing `index` (position of `\n`, or `len`).
pub fn line_end(text: &str, index: usize) -> usize {
    let bytes = text.as_bytes();
    let start = index.min(bytes.len());
    bytes[start..]
        .iter()
        .position(|byte| *byte == b'\n')
        .map(|offset| start + offset)
        .unwrap_or(bytes.len())
}

/// End of the inline code span whose opening run of `run` backticks ends at
/// `from`: the first later run of exactly the same length. While streaming, a
/// run touching the end of the buffer may still grow and does not close.
pub fn close_verbatim(text: &str, from: usize, run: usize, finished: bool) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut cursor = from;
    while cursor < bytes.len() {
        if bytes[cursor] != b'`' {
            cursor += 1;
            continue;
        }
        let length = run_length(text, cursor, b'`');
        let end = cursor + length;
        if length == run {
            if end == bytes.len() && !finished {
                return None;
            }
            return Some(end);
        }
        cursor = end;
    }
    None
}

/// Tracks whether successive lines sit inside a fenced code block.
#[derive(Debug, Clone, Copy, Default)]
pub struct FenceState {
    open: Option<usize>,
}

impl FenceState {
    /// Feeds one line and returns true when it belongs to a fence (opener,
    /// body or closer).
    pub fn feed(&mut self, line: &str) -> bool {
        let trimmed = line.trim_start_matches(' ');
        let indent = line.len() - trimmed.len();
        let ticks = run_length(trimmed, 0, b'`');

        match self.open {
            Some(open) => {
                if indent <= 3 && ticks >= open && trimmed[ticks..].trim().is_empty() {
                    self.open = None;
                }
                true
            }
            None if indent <= 3 && ticks >= 3 && !trimmed[ticks..].contains('`') => {
                self.open = Some(ticks);
                true
            }
            None => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }
}
