//! Escaping helpers for markup assembled by hand.

use std::borrow::Cow;

pub fn escape_html(text: &str) -> Cow<'_, str> {
    escape(text, false)
}

pub fn escape_attr(text: &str) -> Cow<'_, str> {
    escape(text, true)
}

fn escape(text: &str, quotes: bool) -> Cow<'_, str> {
    let needs_escape = text
        .bytes()
        .any(|byte| matches!(byte, b'<' | b'>' | b'&') || (quotes && matches!(byte, b'"' | b'\'')));
    if !needs_escape {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' if quotes => out.push_str("&quot;"),
            '\'' if quotes => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}
