//! GFM prose through the `markdown` crate.

use markdown::{mdast, to_html_with_options, to_mdast, Options, ParseOptions};

use crate::core::table_guard::TABLE_PLACEHOLDER;
use crate::render::engine::{BlockKind, ContentBlock, ContentEngine, EngineError};

#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownContent;

impl ContentEngine for MarkdownContent {
    fn name(&self) -> &str {
        "markdown"
    }

    /// Top-level blocks of `text`. Ranges tile the whole input so no text is
    /// lost between blocks; a block without a known position is folded into
    /// the previous one.
    fn blocks(&self, text: &str) -> Vec<ContentBlock> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let children = match to_mdast(text, &ParseOptions::gfm()) {
            Ok(mdast::Node::Root(root)) => root.children,
            _ => {
                return vec![ContentBlock {
                    kind: BlockKind::Markup,
                    range: 0..text.len(),
                }]
            }
        };

        let mut starts: Vec<(usize, BlockKind)> = Vec::new();
        for child in &children {
            let Some(start) = node_start(child) else {
                continue;
            };
            let start = if starts.is_empty() { 0 } else { start.min(text.len()) };
            let kind = block_kind(child, text);
            starts.push((start, kind));
        }
        if starts.is_empty() {
            starts.push((0, BlockKind::Markup));
        }

        let mut blocks = Vec::with_capacity(starts.len());
        for (index, (start, kind)) in starts.iter().enumerate() {
            let end = starts
                .get(index + 1)
                .map(|(next, _)| *next)
                .unwrap_or(text.len());
            if end > *start {
                blocks.push(ContentBlock {
                    kind: *kind,
                    range: *start..end,
                });
            }
        }
        blocks
    }

    fn render_block(&self, block: &str) -> Result<String, EngineError> {
        to_html_with_options(block, &Options::gfm()).map_err(|message| EngineError::failed(self.name(), message))
    }
}

fn node_start(node: &mdast::Node) -> Option<usize> {
    let position = match node {
        mdast::Node::Heading(heading) => heading.position.as_ref(),
        mdast::Node::Paragraph(paragraph) => paragraph.position.as_ref(),
        mdast::Node::Code(code) => code.position.as_ref(),
        mdast::Node::List(list) => list.position.as_ref(),
        mdast::Node::Blockquote(blockquote) => blockquote.position.as_ref(),
        mdast::Node::ThematicBreak(thematic) => thematic.position.as_ref(),
        mdast::Node::Html(html) => html.position.as_ref(),
        mdast::Node::Table(table) => table.position.as_ref(),
        mdast::Node::Definition(definition) => definition.position.as_ref(),
        mdast::Node::FootnoteDefinition(footnote) => footnote.position.as_ref(),
        _ => None,
    };
    position.map(|pos| pos.start.offset)
}

fn block_kind(node: &mdast::Node, text: &str) -> BlockKind {
    match node {
        mdast::Node::Table(_) => BlockKind::Table,
        mdast::Node::Paragraph(paragraph) => {
            let is_placeholder = paragraph.position.as_ref().is_some_and(|pos| {
                text.get(pos.start.offset..pos.end.offset)
                    .is_some_and(|raw| raw.trim() == TABLE_PLACEHOLDER)
            });
            if is_placeholder {
                BlockKind::TablePlaceholder
            } else {
                BlockKind::Markup
            }
        }
        _ => BlockKind::Markup,
    }
}

#[cfg(test)]
mod tests {
    use super::MarkdownContent;
    use crate::core::table_guard::TABLE_PLACEHOLDER;
    use crate::render::engine::{BlockKind, ContentEngine};

    #[test]
    fn blocks_tile_the_input_and_flag_tables() {
        let text = "# Title\n\nsome *text*\n\n|a|b|\n|-|-|\n|1|2|\n";
        let blocks = MarkdownContent.blocks(text);
        let kinds: Vec<_> = blocks.iter().map(|block| block.kind).collect();
        assert_eq!(kinds, vec![BlockKind::Markup, BlockKind::Markup, BlockKind::Table]);
        assert_eq!(blocks[0].range.start, 0);
        assert_eq!(blocks[2].range.end, text.len());
        assert_eq!(blocks[1].range.end, blocks[2].range.start);
    }

    #[test]
    fn placeholder_paragraph_is_flagged() {
        let text = format!("intro\n\n{TABLE_PLACEHOLDER}");
        let blocks = MarkdownContent.blocks(&text);
        assert_eq!(blocks.last().map(|block| block.kind), Some(BlockKind::TablePlaceholder));
    }

    #[test]
    fn render_block_produces_html_without_raw_tags() {
        let html = MarkdownContent
            .render_block("hello **world** <script>")
            .expect("render");
        assert!(html.contains("<strong>world</strong>"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn blank_text_has_no_blocks() {
        assert!(MarkdownContent.blocks("  \n").is_empty());
    }
}
