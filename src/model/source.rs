//! Source documents as read from a `.docx` body.
//!
//! A [`SourceDocument`] is produced by a single pass over `word/document.xml`
//! and already holds paragraphs and tables interleaved in body order, so no
//! later stage ever has to match structural markers back to objects.

use serde::{Deserialize, Serialize};

/// One top-level element of a document body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyElement {
    /// A body paragraph; text is the concatenation of its runs.
    Paragraph(String),
    /// A body table.
    Table(SourceTable),
}

/// A table as a grid of cells. Rows may be ragged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTable {
    pub rows: Vec<Vec<SourceCell>>,
}

/// A single table cell. Word stores cell content as one or more paragraphs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCell {
    pub paragraphs: Vec<String>,
}

impl SourceCell {
    /// Cell with a single paragraph.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            paragraphs: vec![text.into()],
        }
    }

    /// Paragraph lines joined by `\n` and trimmed.
    pub fn text(&self) -> String {
        self.paragraphs.join("\n").trim().to_string()
    }
}

impl SourceTable {
    /// Build a table from plain cell strings, one paragraph per cell.
    pub fn from_rows<R, C>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(SourceCell::new).collect())
                .collect(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// A loaded document: body elements in original order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub elements: Vec<BodyElement>,
    /// Structural markers the loader could not attach to a paragraph or
    /// table (orphaned cells/rows, unsupported body children). They are
    /// skipped, never fatal.
    pub skipped_markers: usize,
}

impl SourceDocument {
    pub fn new(elements: Vec<BodyElement>) -> Self {
        Self {
            elements,
            skipped_markers: 0,
        }
    }

    pub fn paragraphs(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().filter_map(|e| match e {
            BodyElement::Paragraph(text) => Some(text.as_str()),
            BodyElement::Table(_) => None,
        })
    }

    pub fn tables(&self) -> impl Iterator<Item = &SourceTable> {
        self.elements.iter().filter_map(|e| match e {
            BodyElement::Table(table) => Some(table),
            BodyElement::Paragraph(_) => None,
        })
    }
}
