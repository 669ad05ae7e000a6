//! Word output via `docx-rs`.
//!
//! Styles are registered once per document: `Heading1`..`Heading6` as
//! paragraph styles, `Hyperlink` and `CodeInline` as character styles.
//! Body font and size go into the document defaults. Paragraph-level
//! formatting (alignment, spacing, indents) is written on each paragraph
//! from the resolved unit formats.

use crate::config::{Alignment, StyleConfig};
use crate::model::markup::Span;
use crate::model::styled::{HeadingFormat, ParagraphFormat};
use crate::model::{StyledCell, StyledDocument, StyledTable, StyledUnit};
use docx_rs::*;
use std::collections::BTreeMap;
use std::io::Cursor;

const TWIPS_PER_POINT: f32 = 20.0;
const TWIPS_PER_INCH: f32 = 1440.0;
/// `w:line` value for single spacing in auto mode.
const SINGLE_LINE: f32 = 240.0;

/// Render `doc` as a packed `.docx`.
pub fn render_docx(doc: &StyledDocument) -> std::io::Result<Vec<u8>> {
    let style = &doc.style;
    let mut docx = Docx::new()
        .default_fonts(fonts(&style.body_font))
        .default_size(half_points(style.body_size_pt))
        .page_size(inches(style.page.width_in) as u32, inches(style.page.height_in) as u32)
        .page_margin(
            PageMargin::new()
                .top(inches(style.page.margin_top_in) as _)
                .bottom(inches(style.page.margin_bottom_in) as _)
                .left(inches(style.page.margin_left_in) as _)
                .right(inches(style.page.margin_right_in) as _),
        );

    docx = register_styles(docx, style);
    docx = register_numbering(docx, doc);

    for unit in &doc.units {
        docx = match unit {
            StyledUnit::Heading {
                level,
                text,
                format,
            } => docx.add_paragraph(heading_paragraph(*level, text, format, style)),
            StyledUnit::Paragraph { spans, format } => {
                docx.add_paragraph(body_paragraph(spans, format, style))
            }
            StyledUnit::ListItem {
                list_id,
                level,
                spans,
                ..
            } => docx.add_paragraph(list_paragraph(*list_id, *level, spans, style)),
            StyledUnit::Table(table) => docx.add_table(table_of(table, style)),
            StyledUnit::Blank => docx.add_paragraph(Paragraph::new()),
        };
    }

    let mut buffer = Vec::new();
    docx.build()
        .pack(&mut Cursor::new(&mut buffer))
        .map_err(|e| std::io::Error::other(format!("failed to pack docx: {e}")))?;
    Ok(buffer)
}

// ── Styles ───────────────────────────────────────────────────────────────

fn register_styles(docx: Docx, style: &StyleConfig) -> Docx {
    let mut docx = docx;
    for level in 1..=6u8 {
        let mut heading = Style::new(&format!("Heading{level}"), StyleType::Paragraph)
            .name(&format!("Heading {level}"))
            .size(half_points(style.heading_size(level)))
            .color(&style.heading_color)
            .fonts(fonts(&style.body_font));
        if style.heading_bold {
            heading = heading.bold();
        }
        docx = docx.add_style(heading);
    }

    let hyperlink = Style::new("Hyperlink", StyleType::Character)
        .name("Hyperlink")
        .color(&style.link_color)
        .underline("single");

    let code_inline = Style::new("CodeInline", StyleType::Character)
        .name("Code Inline")
        .fonts(fonts(&style.code_font))
        .size(half_points(style.code_size_pt));

    docx.add_style(hyperlink).add_style(code_inline)
}

/// One abstract numbering per list instance, so numbering restarts for
/// every list. Numbering ids are `list_id + 1`.
fn register_numbering(docx: Docx, doc: &StyledDocument) -> Docx {
    let mut lists: BTreeMap<usize, bool> = BTreeMap::new();
    for unit in &doc.units {
        if let StyledUnit::ListItem {
            list_id, ordered, ..
        } = unit
        {
            lists.entry(*list_id).or_insert(*ordered);
        }
    }

    lists.into_iter().fold(docx, |docx, (list_id, ordered)| {
        let id = list_id + 1;
        let abstract_numbering = (0..9).fold(AbstractNumbering::new(id), |abs, level| {
            abs.add_level(list_level(level, ordered))
        });
        docx.add_abstract_numbering(abstract_numbering)
            .add_numbering(Numbering::new(id, id))
    })
}

fn list_level(level: usize, ordered: bool) -> Level {
    let (format, text) = if ordered {
        let format = ["decimal", "lowerLetter", "lowerRoman"][level % 3];
        (format, format!("%{}.", level + 1))
    } else {
        let bullet = ["•", "○", "▪", "▫", "◆", "◇"][level.min(5)];
        ("bullet", bullet.to_string())
    };
    Level::new(
        level,
        Start::new(1),
        NumberFormat::new(format),
        LevelText::new(&text),
        LevelJc::new("left"),
    )
    .indent(
        Some(720 * (level as i32 + 1)),
        Some(SpecialIndentType::Hanging(if ordered { 420 } else { 360 })),
        None,
        None,
    )
}

// ── Units ────────────────────────────────────────────────────────────────

fn heading_paragraph(level: u8, text: &str, format: &HeadingFormat, style: &StyleConfig) -> Paragraph {
    let mut run = Run::new()
        .add_text(text)
        .size(half_points(format.size_pt))
        .color(&style.heading_color);
    if format.bold {
        run = run.bold();
    }
    Paragraph::new()
        .style(&format!("Heading{}", level.clamp(1, 6)))
        .align(alignment(format.align))
        .line_spacing(
            LineSpacing::new()
                .line_rule(LineSpacingType::Auto)
                .line(line_value(style.heading_line_spacing) as _)
                .before(twips(style.heading_space_before_pt) as _)
                .after(twips(style.heading_space_after(level)) as _),
        )
        .add_run(run)
}

fn body_paragraph(spans: &[Span], format: &ParagraphFormat, style: &StyleConfig) -> Paragraph {
    let mut para = Paragraph::new()
        .align(alignment(format.align))
        .line_spacing(
            LineSpacing::new()
                .line_rule(LineSpacingType::Auto)
                .line(line_value(format.line_spacing) as _)
                .after(twips(style.paragraph_space_after_pt) as _),
        );
    if format.first_line_indent_pt > 0.0 {
        para = para.indent(
            None,
            Some(SpecialIndentType::FirstLine(twips(format.first_line_indent_pt) as _)),
            None,
            None,
        );
    }
    add_spans(para, spans, style)
}

fn list_paragraph(list_id: usize, level: usize, spans: &[Span], style: &StyleConfig) -> Paragraph {
    let para = Paragraph::new()
        .numbering(NumberingId::new(list_id + 1), IndentLevel::new(level.min(8)))
        .line_spacing(
            LineSpacing::new()
                .line_rule(LineSpacingType::Auto)
                .line(line_value(style.line_spacing) as _),
        );
    add_spans(para, spans, style)
}

fn table_of(table: &StyledTable, style: &StyleConfig) -> Table {
    // Default table properties carry single-line borders on every edge.
    let rows = table
        .rows
        .iter()
        .map(|row| TableRow::new(row.iter().map(|cell| table_cell(cell, style)).collect()))
        .collect();
    Table::new(rows)
}

fn table_cell(cell: &StyledCell, style: &StyleConfig) -> TableCell {
    let para = Paragraph::new().align(alignment(cell.align));
    TableCell::new().add_paragraph(add_spans(para, &cell.spans, style))
}

// ── Runs ─────────────────────────────────────────────────────────────────

fn add_spans(para: Paragraph, spans: &[Span], style: &StyleConfig) -> Paragraph {
    spans
        .iter()
        .fold(para, |para, span| para.add_run(span_run(span, style)))
}

fn span_run(span: &Span, style: &StyleConfig) -> Run {
    let mut run = Run::new();
    for (i, line) in span.text.split('\n').enumerate() {
        if i > 0 {
            run = run.add_break(BreakType::TextWrapping);
        }
        if !line.is_empty() {
            run = run.add_text(line);
        }
    }

    if span.style.code {
        run = run
            .style("CodeInline")
            .fonts(fonts(&style.code_font))
            .size(half_points(style.code_size_pt));
    } else if span.style.link.is_some() {
        run = run
            .style("Hyperlink")
            .color(&style.link_color)
            .underline("single");
    }
    if span.style.bold {
        run = run.bold();
    }
    if span.style.italic {
        run = run.italic();
    }
    run
}

// ── Units of measure ─────────────────────────────────────────────────────

fn fonts(name: &str) -> RunFonts {
    RunFonts::new()
        .ascii(name)
        .hi_ansi(name)
        .east_asia(name)
        .cs(name)
}

fn half_points(pt: f32) -> usize {
    (pt * 2.0).round().max(1.0) as usize
}

fn twips(pt: f32) -> i32 {
    (pt * TWIPS_PER_POINT).round() as i32
}

fn inches(value: f32) -> i32 {
    (value * TWIPS_PER_INCH).round() as i32
}

fn line_value(multiple: f32) -> i32 {
    (multiple * SINGLE_LINE).round() as i32
}

fn alignment(align: Alignment) -> AlignmentType {
    match align {
        Alignment::Left => AlignmentType::Left,
        Alignment::Center => AlignmentType::Center,
        Alignment::Right => AlignmentType::Right,
        Alignment::Justify => AlignmentType::Both,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::markup::SpanStyle;
    use crate::model::{BodyElement, SourceCell};
    use crate::pipeline::docx_reader::read_docx_from;
    use std::io::Read;

    fn span(text: &str) -> Span {
        Span {
            text: text.into(),
            style: SpanStyle::default(),
        }
    }

    fn sample() -> StyledDocument {
        let style = StyleConfig::default();
        let cell = |t: &str| StyledCell {
            spans: vec![span(t)],
            align: Alignment::Left,
        };
        StyledDocument {
            units: vec![
                StyledUnit::Heading {
                    level: 1,
                    text: "融合报告".into(),
                    format: HeadingFormat {
                        size_pt: 20.0,
                        bold: false,
                        align: Alignment::Left,
                    },
                },
                StyledUnit::Paragraph {
                    spans: vec![
                        span("Intro "),
                        Span {
                            text: "code".into(),
                            style: SpanStyle {
                                code: true,
                                ..SpanStyle::default()
                            },
                        },
                    ],
                    format: ParagraphFormat {
                        align: Alignment::Left,
                        first_line_indent_pt: 22.0,
                        line_spacing: 1.5,
                    },
                },
                StyledUnit::ListItem {
                    list_id: 0,
                    ordered: true,
                    level: 0,
                    spans: vec![span("first")],
                },
                StyledUnit::Table(StyledTable {
                    columns: 2,
                    rows: vec![vec![cell("H1"), cell("H2")], vec![cell("a"), cell("b")]],
                }),
                StyledUnit::Blank,
            ],
            style,
        }
    }

    #[test]
    fn produces_zip_with_document_part() {
        let bytes = render_docx(&sample()).unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut xml = String::new();
        archive
            .by_name("word/document.xml")
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        assert!(xml.contains("融合报告"));
        assert!(xml.contains("Heading1"));
        assert!(xml.contains("w:numPr"));
        assert!(archive.by_name("word/numbering.xml").is_ok());
    }

    #[test]
    fn output_reads_back_in_order() {
        let bytes = render_docx(&sample()).unwrap();
        let doc = read_docx_from(Cursor::new(bytes)).unwrap();

        let paragraphs: Vec<&str> = doc.paragraphs().collect();
        assert_eq!(&paragraphs[..3], &["融合报告", "Intro code", "first"]);
        assert!(matches!(doc.elements[3], BodyElement::Table(_)));
        let table = doc.tables().next().unwrap();
        assert_eq!(table.rows[1].iter().map(SourceCell::text).collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn unit_conversions() {
        assert_eq!(half_points(10.5), 21);
        assert_eq!(twips(22.0), 440);
        assert_eq!(inches(1.25), 1800);
        assert_eq!(line_value(1.5), 360);
    }
}
