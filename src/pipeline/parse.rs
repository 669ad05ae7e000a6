//! Parse normalized Markdown into [`MarkupBlock`]s.
//!
//! The parser walks pulldown-cmark events once, keeping a small amount of
//! state for the container it is in (paragraph, heading, list item, table
//! cell) and a stack of open inline spans. Blocks come out in document
//! order.
//!
//! Mapping:
//!
//! | Markdown                  | Block                                      |
//! |---------------------------|--------------------------------------------|
//! | ATX / setext heading      | `Heading` (text only, emphasis dropped)    |
//! | paragraph                 | `Paragraph`                                |
//! | `-` / `1.` list           | `List`, nested lists as `Nested` entries   |
//! | GFM table                 | `Table`, header row cells flagged          |
//! | fenced / indented code    | `Paragraph` holding one `Code` run         |
//! | block quote               | its child blocks, quote dropped            |
//! | HTML block, `---` rule    | skipped and counted                        |
//! | inline `<br>`             | line break; other inline HTML counted      |

use crate::error::FusionError;
use crate::model::markup::{plain_text, Inline, ListBlock, ListEntry, MarkupBlock, TableCell, TableRow};
use crate::pipeline::normalize::clamp_heading_levels;
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What the parser produced and what it dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseReport {
    pub blocks: usize,
    /// Nodes with no block counterpart (HTML blocks, thematic breaks,
    /// empty paragraphs, tables inside list items).
    pub skipped: usize,
}

/// Parsed blocks plus the parse report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMarkup {
    pub blocks: Vec<MarkupBlock>,
    pub report: ParseReport,
}

/// Parse Markdown into blocks.
///
/// Headings deeper than six `#` are clamped to level 6 here as well, so raw
/// model output parses the same as normalized output.
///
/// # Errors
/// [`FusionError::EmptyUpstreamContent`] when the input is empty after
/// trimming. Nothing else fails: unknown constructs are skipped.
pub fn parse_markup(markdown: &str) -> Result<ParsedMarkup, FusionError> {
    if markdown.trim().is_empty() {
        return Err(FusionError::EmptyUpstreamContent);
    }

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let markdown = clamp_heading_levels(markdown);
    let mut walk = MarkdownWalk::default();
    for event in Parser::new_ext(&markdown, options) {
        walk.handle_event(event);
    }

    let parsed = walk.finish();
    debug!(
        "Parsed {} blocks ({} skipped)",
        parsed.report.blocks, parsed.report.skipped
    );
    Ok(parsed)
}

// ── Walk state ───────────────────────────────────────────────────────────

/// An open inline container.
enum SpanKind {
    Root,
    Bold,
    Italic,
    Link(String),
    /// Strikethrough and image alt text: children are kept, wrapper dropped.
    Transparent,
}

struct OpenList {
    block: ListBlock,
    /// The current item already produced an entry (text before a nested
    /// list, or the nested list itself).
    item_emitted: bool,
}

#[derive(Default)]
struct OpenTable {
    rows: Vec<TableRow>,
    row: Option<TableRow>,
    header: bool,
}

#[derive(Default)]
struct MarkdownWalk {
    blocks: Vec<MarkupBlock>,
    skipped: usize,

    spans: Vec<(SpanKind, Vec<Inline>)>,
    heading: Option<u8>,
    lists: Vec<OpenList>,
    table: Option<OpenTable>,
    /// Inline state of the enclosing container while a table is open.
    saved_spans: Vec<(SpanKind, Vec<Inline>)>,
    code: Option<String>,
    html_depth: usize,
}

impl MarkdownWalk {
    fn handle_event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.handle_start(tag),
            Event::End(tag) => self.handle_end(tag),
            Event::Text(text) => self.handle_text(&text),
            Event::Code(code) => self.push_inline(Inline::Code(code.to_string())),
            Event::SoftBreak => self.push_text(" "),
            Event::HardBreak => self.push_text("\n"),
            Event::Rule => self.skipped += 1,
            Event::InlineHtml(html) => self.handle_inline_html(&html),
            _ => {}
        }
    }

    fn handle_start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.handle_paragraph_start(),
            Tag::Heading { level, .. } => self.handle_heading_start(level as u8),
            Tag::List(first) => self.handle_list_start(first.is_some()),
            Tag::Item => self.open_root(),
            Tag::Table(_) => self.handle_table_start(),
            Tag::TableHead => self.handle_row_start(true),
            Tag::TableRow => self.handle_row_start(false),
            Tag::TableCell => self.open_root(),
            Tag::CodeBlock(_) => self.code = Some(String::new()),
            Tag::HtmlBlock => {
                self.html_depth += 1;
                self.skipped += 1;
            }
            Tag::Emphasis => self.open_span(SpanKind::Italic),
            Tag::Strong => self.open_span(SpanKind::Bold),
            Tag::Link { dest_url, .. } => self.open_span(SpanKind::Link(dest_url.to_string())),
            Tag::Strikethrough | Tag::Image { .. } => self.open_span(SpanKind::Transparent),
            _ => {}
        }
    }

    fn handle_end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => self.handle_paragraph_end(),
            TagEnd::Heading(_) => self.handle_heading_end(),
            TagEnd::List(_) => self.handle_list_end(),
            TagEnd::Item => self.handle_item_end(),
            TagEnd::Table => self.handle_table_end(),
            TagEnd::TableHead | TagEnd::TableRow => self.handle_row_end(),
            TagEnd::TableCell => self.handle_cell_end(),
            TagEnd::CodeBlock => self.handle_code_block_end(),
            TagEnd::HtmlBlock => self.html_depth = self.html_depth.saturating_sub(1),
            TagEnd::Emphasis
            | TagEnd::Strong
            | TagEnd::Link
            | TagEnd::Strikethrough
            | TagEnd::Image => self.close_span(),
            _ => {}
        }
    }

    fn in_list(&self) -> bool {
        !self.lists.is_empty()
    }

    // ── Inline spans ─────────────────────────────────────────────────────

    fn open_root(&mut self) {
        self.spans.clear();
        self.spans.push((SpanKind::Root, Vec::new()));
    }

    fn open_span(&mut self, kind: SpanKind) {
        if !self.spans.is_empty() {
            self.spans.push((kind, Vec::new()));
        }
    }

    fn close_span(&mut self) {
        if self.spans.len() < 2 {
            return;
        }
        let Some((kind, children)) = self.spans.pop() else {
            return;
        };
        match kind {
            SpanKind::Bold => self.push_inline(Inline::Bold(children)),
            SpanKind::Italic => self.push_inline(Inline::Italic(children)),
            SpanKind::Link(href) => self.push_inline(Inline::Link { href, children }),
            SpanKind::Transparent | SpanKind::Root => {
                for child in children {
                    self.push_inline(child);
                }
            }
        }
    }

    /// Close any dangling spans and take the root runs.
    fn take_root(&mut self) -> Vec<Inline> {
        while self.spans.len() > 1 {
            self.close_span();
        }
        self.spans.pop().map(|(_, runs)| runs).unwrap_or_default()
    }

    fn root_is_empty(&self) -> bool {
        self.spans.iter().all(|(_, runs)| runs.is_empty())
    }

    fn push_inline(&mut self, inline: Inline) {
        let Some((_, runs)) = self.spans.last_mut() else {
            return;
        };
        match (runs.last_mut(), inline) {
            (Some(Inline::Text(prev)), Inline::Text(next)) => prev.push_str(&next),
            (_, inline) => runs.push(inline),
        }
    }

    fn push_text(&mut self, text: &str) {
        self.push_inline(Inline::Text(text.to_string()));
    }

    fn handle_text(&mut self, text: &str) {
        if self.html_depth > 0 {
            return;
        }
        if let Some(code) = self.code.as_mut() {
            code.push_str(text);
            return;
        }
        self.push_text(text);
    }

    fn handle_inline_html(&mut self, html: &str) {
        if is_line_break_tag(html) {
            self.push_text("\n");
        } else {
            self.skipped += 1;
        }
    }

    // ── Paragraphs and headings ──────────────────────────────────────────

    fn handle_paragraph_start(&mut self) {
        if self.in_list() {
            // Loose items wrap text in paragraphs; keep it in the item.
            if !self.root_is_empty() {
                self.push_text(" ");
            }
        } else {
            self.open_root();
        }
    }

    fn handle_paragraph_end(&mut self) {
        if self.in_list() {
            return;
        }
        let runs = self.take_root();
        if runs.is_empty() {
            self.skipped += 1;
        } else {
            self.blocks.push(MarkupBlock::Paragraph { runs });
        }
    }

    fn handle_heading_start(&mut self, level: u8) {
        if self.in_list() {
            self.handle_paragraph_start();
            return;
        }
        self.heading = Some(level);
        self.open_root();
    }

    fn handle_heading_end(&mut self) {
        let Some(level) = self.heading.take() else {
            return;
        };
        let runs = self.take_root();
        self.blocks.push(MarkupBlock::Heading {
            level,
            text: plain_text(&runs).trim().to_string(),
        });
    }

    fn handle_code_block_end(&mut self) {
        let Some(code) = self.code.take() else {
            return;
        };
        let code = code.trim_end_matches('\n').to_string();
        if self.in_list() {
            if !self.root_is_empty() {
                self.push_text(" ");
            }
            self.push_inline(Inline::Code(code));
        } else if code.is_empty() {
            self.skipped += 1;
        } else {
            self.blocks.push(MarkupBlock::Paragraph {
                runs: vec![Inline::Code(code)],
            });
        }
    }

    // ── Lists ────────────────────────────────────────────────────────────

    fn handle_list_start(&mut self, ordered: bool) {
        if self.in_list() {
            // Text before the nested list belongs to the parent item.
            let runs = self.take_root();
            if let Some(parent) = self.lists.last_mut() {
                if !runs.is_empty() {
                    parent.block.entries.push(ListEntry::Item(runs));
                }
                parent.item_emitted = true;
            }
        }
        self.lists.push(OpenList {
            block: ListBlock {
                ordered,
                entries: Vec::new(),
            },
            item_emitted: false,
        });
    }

    fn handle_item_end(&mut self) {
        let runs = self.take_root();
        if let Some(list) = self.lists.last_mut() {
            if !runs.is_empty() || !list.item_emitted {
                list.block.entries.push(ListEntry::Item(runs));
            }
            list.item_emitted = false;
        }
    }

    fn handle_list_end(&mut self) {
        let Some(done) = self.lists.pop() else {
            return;
        };
        match self.lists.last_mut() {
            Some(parent) => {
                parent.block.entries.push(ListEntry::Nested(done.block));
                // Text after the nested list continues the parent item.
                self.open_root();
            }
            None => self.blocks.push(MarkupBlock::List(done.block)),
        }
    }

    // ── Tables ───────────────────────────────────────────────────────────

    fn handle_table_start(&mut self) {
        self.saved_spans = std::mem::take(&mut self.spans);
        self.table = Some(OpenTable::default());
    }

    fn handle_row_start(&mut self, header: bool) {
        if let Some(table) = self.table.as_mut() {
            table.row = Some(TableRow::default());
            table.header = header;
        }
    }

    fn handle_cell_end(&mut self) {
        let runs = self.take_root();
        if let Some(table) = self.table.as_mut() {
            let header = table.header;
            if let Some(row) = table.row.as_mut() {
                row.cells.push(TableCell { header, runs });
            }
        }
    }

    fn handle_row_end(&mut self) {
        if let Some(table) = self.table.as_mut() {
            if let Some(row) = table.row.take() {
                table.rows.push(row);
            }
        }
    }

    fn handle_table_end(&mut self) {
        self.spans = std::mem::take(&mut self.saved_spans);
        let Some(table) = self.table.take() else {
            return;
        };
        if self.in_list() {
            self.skipped += 1;
        } else {
            self.blocks.push(MarkupBlock::Table { rows: table.rows });
        }
    }

    fn finish(self) -> ParsedMarkup {
        ParsedMarkup {
            report: ParseReport {
                blocks: self.blocks.len(),
                skipped: self.skipped,
            },
            blocks: self.blocks,
        }
    }
}

/// `<br>`, `<br/>`, `<br />` in any case.
fn is_line_break_tag(html: &str) -> bool {
    let tag = html.trim();
    let Some(inner) = tag.strip_prefix('<').and_then(|t| t.strip_suffix('>')) else {
        return false;
    };
    inner.trim_end_matches('/').trim().eq_ignore_ascii_case("br")
}
