//! Build a [`StyledDocument`] from parsed blocks.
//!
//! Construction is best-effort: a block that fails
//! [`MarkupBlock::validate`] is skipped and recorded in the
//! [`BuildReport`], and every other block is still rendered.

use crate::config::{Alignment, StyleConfig};
use crate::error::BlockError;
use crate::model::markup::{flatten, ListBlock, ListEntry, MarkupBlock, Span, TableRow};
use crate::model::styled::{HeadingFormat, ParagraphFormat};
use crate::model::{StyledCell, StyledDocument, StyledTable, StyledUnit};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// What the builder produced and which blocks it skipped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildReport {
    pub units: usize,
    pub skipped: Vec<BlockError>,
}

/// Map blocks onto styled units.
pub fn build_document(blocks: &[MarkupBlock], style: &StyleConfig) -> (StyledDocument, BuildReport) {
    let mut builder = DocumentBuilder::new(style);
    let mut report = BuildReport::default();

    for (index, block) in blocks.iter().enumerate() {
        if let Err(reason) = block.validate() {
            warn!("Skipping block {} ({}): {}", index, block.kind(), reason);
            report.skipped.push(BlockError::MalformedBlock {
                index,
                kind: block.kind().to_string(),
                reason,
            });
            continue;
        }
        builder.add_block(block);
    }

    let doc = builder.finish();
    report.units = doc.units.len();
    (doc, report)
}

struct DocumentBuilder<'a> {
    style: &'a StyleConfig,
    units: Vec<StyledUnit>,
    next_list_id: usize,
    /// Section counters for heading numbering, one per level.
    sections: [usize; 6],
}

impl<'a> DocumentBuilder<'a> {
    fn new(style: &'a StyleConfig) -> Self {
        Self {
            style,
            units: Vec::new(),
            next_list_id: 0,
            sections: [0; 6],
        }
    }

    fn add_block(&mut self, block: &MarkupBlock) {
        match block {
            MarkupBlock::Heading { level, text } => self.add_heading(*level, text),
            MarkupBlock::Paragraph { runs } => {
                let spans = flatten(runs);
                let code_only = !spans.is_empty() && spans.iter().all(|s| s.style.code);
                self.units.push(StyledUnit::Paragraph {
                    spans,
                    format: self.paragraph_format(code_only),
                });
            }
            MarkupBlock::List(list) => self.add_list(list, 0),
            MarkupBlock::Table { rows } => {
                self.units.push(StyledUnit::Table(table_grid(rows)));
                self.units.push(StyledUnit::Blank);
            }
        }
    }

    fn add_heading(&mut self, level: u8, text: &str) {
        let text = text.trim();
        let text = if self.style.heading_numbering {
            format!("{} {}", self.next_section_number(level), text)
        } else {
            text.to_string()
        };
        self.units.push(StyledUnit::Heading {
            level,
            text,
            format: HeadingFormat {
                size_pt: self.style.heading_size(level),
                bold: self.style.heading_bold,
                align: self.style.heading_align,
            },
        });
    }

    /// `1.`, `1.1.`, `1.1.1.` … for the given level. Skipped parent levels
    /// count as 1 so a leading `##` still numbers as `1.1.`.
    fn next_section_number(&mut self, level: u8) -> String {
        let depth = usize::from(level.clamp(1, 6));
        for counter in &mut self.sections[..depth - 1] {
            if *counter == 0 {
                *counter = 1;
            }
        }
        self.sections[depth - 1] += 1;
        for counter in &mut self.sections[depth..] {
            *counter = 0;
        }
        self.sections[..depth]
            .iter()
            .map(|n| format!("{n}."))
            .collect()
    }

    fn paragraph_format(&self, code_only: bool) -> ParagraphFormat {
        ParagraphFormat {
            align: self.style.body_align,
            first_line_indent_pt: if code_only {
                0.0
            } else {
                self.style.first_line_indent_pt
            },
            line_spacing: self.style.line_spacing,
        }
    }

    /// Every list, nested ones included, gets its own id so numbering
    /// restarts per list.
    fn add_list(&mut self, list: &ListBlock, level: usize) {
        let list_id = self.next_list_id;
        self.next_list_id += 1;
        for entry in &list.entries {
            match entry {
                ListEntry::Item(runs) => self.units.push(StyledUnit::ListItem {
                    list_id,
                    ordered: list.ordered,
                    level,
                    spans: flatten(runs),
                }),
                ListEntry::Nested(nested) => self.add_list(nested, level + 1),
            }
        }
    }

    fn finish(self) -> StyledDocument {
        StyledDocument {
            style: self.style.clone(),
            units: self.units,
        }
    }
}

/// Grid sized rows × columns of the first row. Extra cells are dropped,
/// missing ones filled with empty cells. Header cells are bold and centred.
fn table_grid(rows: &[TableRow]) -> StyledTable {
    let columns = rows.first().map(|r| r.cells.len()).unwrap_or(0);
    let grid = rows
        .iter()
        .map(|row| {
            let mut cells: Vec<StyledCell> = row
                .cells
                .iter()
                .take(columns)
                .map(|cell| {
                    let mut spans = flatten(&cell.runs);
                    if cell.header {
                        embolden(&mut spans);
                    }
                    StyledCell {
                        spans,
                        align: if cell.header {
                            Alignment::Center
                        } else {
                            Alignment::Left
                        },
                    }
                })
                .collect();
            cells.resize_with(columns, || StyledCell {
                spans: Vec::new(),
                align: Alignment::Left,
            });
            cells
        })
        .collect();
    StyledTable {
        columns,
        rows: grid,
    }
}

fn embolden(spans: &mut [Span]) {
    for span in spans {
        span.style.bold = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::markup::{Inline, Malformation, TableCell};

    fn para(text: &str) -> MarkupBlock {
        MarkupBlock::Paragraph {
            runs: vec![Inline::text(text)],
        }
    }

    fn cell(header: bool, text: &str) -> TableCell {
        TableCell {
            header,
            runs: vec![Inline::text(text)],
        }
    }

    #[test]
    fn malformed_block_is_skipped_and_rest_rendered() {
        let blocks = vec![
            para("one"),
            para("two"),
            MarkupBlock::Table { rows: vec![] },
            para("four"),
            para("five"),
        ];
        let (doc, report) = build_document(&blocks, &StyleConfig::default());

        let texts: Vec<String> = doc
            .units
            .iter()
            .filter_map(|u| match u {
                StyledUnit::Paragraph { spans, .. } => Some(spans[0].text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["one", "two", "four", "five"]);
        assert_eq!(report.skipped.len(), 1);
        let BlockError::MalformedBlock { index, reason, .. } = &report.skipped[0];
        assert_eq!(*index, 2);
        assert_eq!(*reason, Malformation::EmptyTable);
        assert_eq!(report.units, 4);
    }

    #[test]
    fn heading_uses_configured_size() {
        let blocks = vec![MarkupBlock::Heading {
            level: 2,
            text: "Section".into(),
        }];
        let (doc, _) = build_document(&blocks, &StyleConfig::default());
        let StyledUnit::Heading { format, text, .. } = &doc.units[0] else {
            panic!("expected heading");
        };
        assert_eq!(text, "Section");
        assert_eq!(format.size_pt, 17.0);
        assert!(!format.bold);
    }

    #[test]
    fn heading_numbering() {
        let style = StyleConfig {
            heading_numbering: true,
            ..StyleConfig::default()
        };
        let h = |level, text: &str| MarkupBlock::Heading {
            level,
            text: text.into(),
        };
        let blocks = vec![h(1, "A"), h(2, "A.a"), h(2, "A.b"), h(1, "B"), h(3, "B.x")];
        let (doc, _) = build_document(&blocks, &style);
        let texts: Vec<&str> = doc
            .units
            .iter()
            .filter_map(|u| match u {
                StyledUnit::Heading { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["1. A", "1.1. A.a", "1.2. A.b", "2. B", "2.1.1. B.x"]);
    }

    #[test]
    fn nested_list_levels_and_ids() {
        let list = MarkupBlock::List(ListBlock {
            ordered: true,
            entries: vec![
                ListEntry::Item(vec![Inline::text("a")]),
                ListEntry::Nested(ListBlock {
                    ordered: false,
                    entries: vec![ListEntry::Item(vec![Inline::text("a.1")])],
                }),
                ListEntry::Item(vec![Inline::text("b")]),
            ],
        });
        let (doc, _) = build_document(&[list], &StyleConfig::default());
        let items: Vec<(usize, bool, usize, String)> = doc
            .units
            .iter()
            .filter_map(|u| match u {
                StyledUnit::ListItem {
                    list_id,
                    ordered,
                    level,
                    spans,
                } => Some((*list_id, *ordered, *level, spans[0].text.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            items,
            vec![
                (0, true, 0, "a".to_string()),
                (1, false, 1, "a.1".to_string()),
                (0, true, 0, "b".to_string()),
            ]
        );
        assert_eq!(doc.list_count(), 2);
    }

    #[test]
    fn table_is_rectangular_with_bold_centred_header() {
        let rows = vec![
            TableRow {
                cells: vec![cell(true, "H1"), cell(true, "H2")],
            },
            TableRow {
                cells: vec![cell(false, "a"), cell(false, "b"), cell(false, "extra")],
            },
            TableRow {
                cells: vec![cell(false, "c")],
            },
        ];
        let (doc, _) = build_document(&[MarkupBlock::Table { rows }], &StyleConfig::default());
        assert_eq!(doc.units.len(), 2);
        assert_eq!(doc.units[1], StyledUnit::Blank);

        let StyledUnit::Table(table) = &doc.units[0] else {
            panic!("expected table");
        };
        assert_eq!(table.columns, 2);
        assert!(table.rows.iter().all(|r| r.len() == 2));
        assert!(table.rows[0][0].spans[0].style.bold);
        assert_eq!(table.rows[0][0].align, Alignment::Center);
        assert!(!table.rows[1][0].spans[0].style.bold);
        assert!(table.rows[2][1].spans.is_empty());
    }

    #[test]
    fn code_paragraph_has_no_indent() {
        let blocks = vec![MarkupBlock::Paragraph {
            runs: vec![Inline::Code("let x = 1;".into())],
        }];
        let (doc, _) = build_document(&blocks, &StyleConfig::default());
        let StyledUnit::Paragraph { format, spans } = &doc.units[0] else {
            panic!("expected paragraph");
        };
        assert_eq!(format.first_line_indent_pt, 0.0);
        assert!(spans[0].style.code);
    }
}
