//! Typed blocks parsed from the model's Markdown response.
//!
//! The set of block and inline variants is closed; anything the parser does
//! not recognise never reaches these types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A top-level structural unit of the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkupBlock {
    /// Heading with a level in `1..=6`.
    Heading { level: u8, text: String },
    Paragraph { runs: Vec<Inline> },
    List(ListBlock),
    Table { rows: Vec<TableRow> },
}

/// An ordered or unordered list. Nested lists appear as entries in the
/// position where they occur, directly after the item that owns them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListBlock {
    pub ordered: bool,
    pub entries: Vec<ListEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListEntry {
    Item(Vec<Inline>),
    Nested(ListBlock),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCell {
    pub header: bool,
    pub runs: Vec<Inline>,
}

/// Inline content. Containers may nest arbitrarily.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Inline {
    Text(String),
    Bold(Vec<Inline>),
    Italic(Vec<Inline>),
    Link { href: String, children: Vec<Inline> },
    Code(String),
}

/// Formatting accumulated while flattening nested inline containers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanStyle {
    pub bold: bool,
    pub italic: bool,
    pub code: bool,
    pub link: Option<String>,
}

/// A contiguous piece of text with one formatting treatment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub text: String,
    pub style: SpanStyle,
}

impl Inline {
    pub fn text(s: impl Into<String>) -> Self {
        Inline::Text(s.into())
    }
}

/// Flatten inline runs into styled spans, left to right.
///
/// Adjacent spans with identical style are merged, which undoes the
/// fragmentation CommonMark parsers introduce around punctuation.
pub fn flatten(runs: &[Inline]) -> Vec<Span> {
    let mut spans = Vec::new();
    flatten_into(runs, &SpanStyle::default(), &mut spans);
    spans
}

fn flatten_into(runs: &[Inline], style: &SpanStyle, out: &mut Vec<Span>) {
    for run in runs {
        match run {
            Inline::Text(text) => push_span(out, text, style.clone()),
            Inline::Code(code) => push_span(
                out,
                code,
                SpanStyle {
                    code: true,
                    ..style.clone()
                },
            ),
            Inline::Bold(children) => {
                let inner = SpanStyle {
                    bold: true,
                    ..style.clone()
                };
                flatten_into(children, &inner, out);
            }
            Inline::Italic(children) => {
                let inner = SpanStyle {
                    italic: true,
                    ..style.clone()
                };
                flatten_into(children, &inner, out);
            }
            Inline::Link { href, children } => {
                let inner = SpanStyle {
                    link: Some(href.clone()),
                    ..style.clone()
                };
                if children.is_empty() {
                    // Autolinks without text show their target.
                    push_span(out, href, inner);
                } else {
                    flatten_into(children, &inner, out);
                }
            }
        }
    }
}

fn push_span(out: &mut Vec<Span>, text: &str, style: SpanStyle) {
    if text.is_empty() {
        return;
    }
    if let Some(last) = out.last_mut() {
        if last.style == style {
            last.text.push_str(text);
            return;
        }
    }
    out.push(Span {
        text: text.to_string(),
        style,
    });
}

/// Concatenated text of inline runs with all formatting dropped.
pub fn plain_text(runs: &[Inline]) -> String {
    flatten(runs).into_iter().map(|s| s.text).collect()
}

/// Why a block cannot be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Malformation {
    HeadingLevel(u8),
    EmptyHeading,
    EmptyList,
    EmptyTable,
    EmptyHeaderRow,
}

impl fmt::Display for Malformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Malformation::HeadingLevel(level) => write!(f, "heading level {level} is outside 1..=6"),
            Malformation::EmptyHeading => f.write_str("heading has no text"),
            Malformation::EmptyList => f.write_str("list has no entries"),
            Malformation::EmptyTable => f.write_str("table has no rows"),
            Malformation::EmptyHeaderRow => f.write_str("first table row has no cells"),
        }
    }
}

impl MarkupBlock {
    /// Check the shape invariants the document builder relies on.
    pub fn validate(&self) -> Result<(), Malformation> {
        match self {
            MarkupBlock::Heading { level, text } => {
                if !(1..=6).contains(level) {
                    return Err(Malformation::HeadingLevel(*level));
                }
                if text.trim().is_empty() {
                    return Err(Malformation::EmptyHeading);
                }
                Ok(())
            }
            MarkupBlock::Paragraph { .. } => Ok(()),
            MarkupBlock::List(list) => list.validate(),
            MarkupBlock::Table { rows } => match rows.first() {
                None => Err(Malformation::EmptyTable),
                Some(first) if first.cells.is_empty() => Err(Malformation::EmptyHeaderRow),
                Some(_) => Ok(()),
            },
        }
    }

    /// Short name used in logs and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            MarkupBlock::Heading { .. } => "heading",
            MarkupBlock::Paragraph { .. } => "paragraph",
            MarkupBlock::List(_) => "list",
            MarkupBlock::Table { .. } => "table",
        }
    }
}

impl ListBlock {
    fn validate(&self) -> Result<(), Malformation> {
        if self.entries.is_empty() {
            return Err(Malformation::EmptyList);
        }
        self.entries.iter().try_for_each(|entry| match entry {
            ListEntry::Item(_) => Ok(()),
            ListEntry::Nested(nested) => nested.validate(),
        })
    }
}
