//! Linearize a [`SourceDocument`] into one plain-text stream.
//!
//! Paragraphs are emitted as-is; tables are wrapped in sentinel lines so the
//! model can tell them apart from running text:
//!
//! ```text
//! Intro text
//! === 表格开始 ===
//! H1|H2
//! ---|---
//! a|b
//! === 表格结束 ===
//! ```

use crate::model::{BodyElement, SourceDocument, SourceTable};
use crate::prompts::{CELL_SEPARATOR, TABLE_END, TABLE_START};
use serde::{Deserialize, Serialize};

/// What the linearizer emitted and what it left out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearizeReport {
    pub paragraphs: usize,
    pub tables: usize,
    /// Paragraphs dropped because their text was blank.
    pub blank_paragraphs: usize,
    /// Structural markers the loader could not attach (see
    /// [`SourceDocument::skipped_markers`]).
    pub skipped_markers: usize,
}

/// Linearized text of one document plus its report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Linearized {
    pub text: String,
    pub report: LinearizeReport,
}

/// Serialize one table between its sentinel lines.
///
/// A `---` separator row (one token per cell of the first row) follows the
/// first row when the table has more than one row. A table without rows
/// yields just the sentinel pair.
pub fn serialize_table(table: &SourceTable) -> String {
    let mut lines = Vec::with_capacity(table.rows.len() + 3);
    lines.push(TABLE_START.to_string());

    for (idx, row) in table.rows.iter().enumerate() {
        let cells: Vec<String> = row.iter().map(|cell| cell.text()).collect();
        lines.push(cells.join(CELL_SEPARATOR));

        if idx == 0 && table.rows.len() > 1 {
            lines.push(vec!["---"; row.len()].join(CELL_SEPARATOR));
        }
    }

    lines.push(TABLE_END.to_string());
    lines.join("\n")
}

/// Walk the body in order, dropping blank paragraphs and serializing tables.
///
/// Units are joined with `\n`. Tables are always emitted, even when empty.
pub fn linearize(doc: &SourceDocument) -> Linearized {
    let mut report = LinearizeReport {
        skipped_markers: doc.skipped_markers,
        ..LinearizeReport::default()
    };
    let mut units: Vec<String> = Vec::with_capacity(doc.elements.len());

    for element in &doc.elements {
        match element {
            BodyElement::Paragraph(text) if text.trim().is_empty() => {
                report.blank_paragraphs += 1;
            }
            BodyElement::Paragraph(text) => {
                report.paragraphs += 1;
                units.push(text.clone());
            }
            BodyElement::Table(table) => {
                report.tables += 1;
                units.push(serialize_table(table));
            }
        }
    }

    Linearized {
        text: units.join("\n"),
        report,
    }
}
