//! The styled document: output of the document builder, input of the sinks.
//!
//! Every unit carries its resolved formatting so a sink never has to consult
//! the block it came from.

use crate::config::{Alignment, StyleConfig};
use crate::model::markup::Span;
use serde::{Deserialize, Serialize};

/// Resolved heading formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadingFormat {
    pub size_pt: f32,
    pub bold: bool,
    pub align: Alignment,
}

/// Resolved body paragraph formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParagraphFormat {
    pub align: Alignment,
    pub first_line_indent_pt: f32,
    pub line_spacing: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyledCell {
    pub spans: Vec<Span>,
    pub align: Alignment,
}

/// A rectangular grid; `rows[i].len() == columns` for every row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyledTable {
    pub columns: usize,
    pub rows: Vec<Vec<StyledCell>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StyledUnit {
    Heading {
        level: u8,
        text: String,
        format: HeadingFormat,
    },
    Paragraph {
        spans: Vec<Span>,
        format: ParagraphFormat,
    },
    /// One list item. `list_id` identifies the list instance so numbering
    /// restarts per list; `level` is the nesting depth starting at 0.
    ListItem {
        list_id: usize,
        ordered: bool,
        level: usize,
        spans: Vec<Span>,
    },
    Table(StyledTable),
    /// Empty spacer paragraph.
    Blank,
}

/// A fully built document, ready for a sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyledDocument {
    pub style: StyleConfig,
    pub units: Vec<StyledUnit>,
}

impl StyledDocument {
    pub fn new(style: StyleConfig) -> Self {
        Self {
            style,
            units: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Number of distinct list instances.
    pub fn list_count(&self) -> usize {
        self.units
            .iter()
            .filter_map(|u| match u {
                StyledUnit::ListItem { list_id, .. } => Some(*list_id + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }
}
