//! Class-based syntax highlighting backed by `syntect`.

use once_cell::sync::Lazy;
use syntect::html::{ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

use crate::core::language::Language;
use crate::render::engine::{EngineError, Highlighter};

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);

/// Emits `<span class="...">` markup; the host stylesheet supplies colors.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntectHighlighter;

impl Highlighter for SyntectHighlighter {
    fn name(&self) -> &str {
        "syntect"
    }

    fn highlight(&self, source: &str, language: &Language) -> Result<String, EngineError> {
        let syntax = SYNTAX_SET
            .find_syntax_by_token(language.token)
            .unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text());
        let mut generator =
            ClassedHTMLGenerator::new_with_class_style(syntax, &SYNTAX_SET, ClassStyle::Spaced);
        for line in LinesWithEndings::from(source) {
            generator
                .parse_html_for_line_which_includes_newline(line)
                .map_err(|error| EngineError::failed(self.name(), error))?;
        }
        Ok(generator.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::SyntectHighlighter;
    use crate::core::language::{resolve_language, Language};
    use crate::render::engine::Highlighter;

    #[test]
    fn known_language_gets_classed_spans() {
        let markup = SyntectHighlighter
            .highlight("fn main() {}\n", &resolve_language("rs"))
            .expect("highlight");
        assert!(markup.contains("<span class="));
        assert!(markup.contains("main"));
    }

    #[test]
    fn generic_language_still_escapes_markup() {
        let markup = SyntectHighlighter
            .highlight("<b>&</b>\n", &Language::generic())
            .expect("highlight");
        assert!(markup.contains("&lt;b&gt;"));
        assert!(!markup.contains("<b>"));
    }
}
