//! Load a `.docx` body into a [`SourceDocument`].
//!
//! A `.docx` file is a ZIP container; the body lives in `word/document.xml`.
//! The body is walked once with a streaming XML reader. Paragraphs and
//! tables are emitted in the order their closing tags appear, which is body
//! order, so no later matching of markers to objects is ever needed.
//!
//! Text rules follow what Word shows in the paragraph itself:
//! `w:t` contributes text, `w:tab` a tab, `w:br`/`w:cr` a newline (page
//! breaks contribute nothing). Deleted text, field instructions, and the
//! `mc:Fallback` copies of drawing content are ignored.
//!
//! Structure the loader cannot attach to a body paragraph or table is
//! counted in [`SourceDocument::skipped_markers`]: text-box paragraphs,
//! nested tables (their paragraphs are kept in the enclosing cell), rows or
//! cells outside a table, and `w:altChunk` imports.

use crate::error::FusionError;
use crate::model::{BodyElement, SourceCell, SourceDocument, SourceTable};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

const DOCUMENT_PART: &str = "word/document.xml";

/// Reasons a container cannot be read as a Word document.
#[derive(Debug, Error)]
pub enum DocxReadError {
    #[error("not a ZIP container: {0}")]
    Container(#[from] zip::result::ZipError),

    #[error("missing {DOCUMENT_PART}")]
    MissingBody,

    #[error("cannot read {DOCUMENT_PART}: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed XML in {DOCUMENT_PART}: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// Read the body of the `.docx` file at `path`.
///
/// # Errors
/// * [`FusionError::InputNotFound`]: the file does not exist
/// * [`FusionError::PermissionDenied`]: the file is not readable
/// * [`FusionError::InvalidDocument`]: not a ZIP, no body part, or bad XML
pub fn read_docx(path: &Path) -> Result<SourceDocument, FusionError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => FusionError::InputNotFound {
            paths: vec![path.to_path_buf()],
        },
        std::io::ErrorKind::PermissionDenied => FusionError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => FusionError::InvalidDocument {
            path: path.to_path_buf(),
            detail: e.to_string(),
        },
    })?;

    let doc = read_docx_from(BufReader::new(file)).map_err(|e| FusionError::InvalidDocument {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    debug!(
        "Loaded {}: {} elements, {} skipped markers",
        path.display(),
        doc.elements.len(),
        doc.skipped_markers
    );
    Ok(doc)
}

/// Read a `.docx` container from any seekable source.
pub fn read_docx_from<R: Read + Seek>(reader: R) -> Result<SourceDocument, DocxReadError> {
    let mut archive = ZipArchive::new(reader)?;
    let xml = {
        let mut part = archive.by_name(DOCUMENT_PART).map_err(|e| match e {
            zip::result::ZipError::FileNotFound => DocxReadError::MissingBody,
            other => DocxReadError::Container(other),
        })?;
        let mut xml = String::new();
        part.read_to_string(&mut xml)?;
        xml
    };
    parse_document_xml(&xml)
}

/// Walk the XML of `word/document.xml`.
pub fn parse_document_xml(xml: &str) -> Result<SourceDocument, DocxReadError> {
    let mut walk = BodyWalk::default();

    let mut reader = Reader::from_str(xml);
    // w:t carries xml:space="preserve"; leading and trailing spaces matter.
    reader.trim_text(false);

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => walk.handle_start(&e),
            Event::Empty(e) => walk.handle_empty(&e),
            Event::Text(e) => {
                if walk.wants_text() {
                    let text = e.unescape()?;
                    walk.handle_text(&text);
                }
            }
            Event::End(e) => walk.handle_end(e.name().as_ref()),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(walk.finish())
}

// ── Walk state ───────────────────────────────────────────────────────────

#[derive(Default)]
struct BodyWalk {
    elements: Vec<BodyElement>,
    skipped: usize,

    in_body: bool,
    /// Depth inside `mc:Fallback`; everything there duplicates `mc:Choice`.
    fallback_depth: usize,
    /// Number of open `w:tbl` elements.
    table_depth: usize,
    table: Option<SourceTable>,
    row: Option<Vec<SourceCell>>,
    cell: Option<SourceCell>,
    /// `w:gridSpan` and `w:vMerge` of the open cell.
    cell_span: usize,
    cell_merge: Option<VMerge>,
    /// Grid column where the next cell of the open row starts.
    grid_col: usize,
    /// Content of the last `w:vMerge="restart"` cell per grid column.
    merge_origins: Vec<Option<SourceCell>>,
    /// Open paragraphs; more than one means a text box inside a paragraph.
    paragraphs: Vec<String>,
    /// Open `w:r` elements; text boxes nest runs inside runs.
    run_depth: usize,
    in_text: bool,
}

impl BodyWalk {
    fn active(&self) -> bool {
        self.in_body && self.fallback_depth == 0
    }

    fn in_run(&self) -> bool {
        self.run_depth > 0
    }

    fn wants_text(&self) -> bool {
        self.active() && self.in_text && !self.paragraphs.is_empty()
    }

    fn handle_start(&mut self, e: &BytesStart<'_>) {
        match e.name().as_ref() {
            b"w:body" => self.in_body = true,
            b"mc:Fallback" => self.fallback_depth += 1,
            _ if !self.active() => {}
            b"w:tbl" => self.handle_table_start(),
            b"w:tr" => self.handle_row_start(),
            b"w:tc" => self.handle_cell_start(),
            b"w:p" => self.paragraphs.push(String::new()),
            b"w:r" => self.run_depth += 1,
            b"w:t" if self.in_run() => self.in_text = true,
            b"w:gridSpan" | b"w:vMerge" => self.handle_cell_property(e),
            b"w:altChunk" => self.skipped += 1,
            _ => {}
        }
    }

    fn handle_empty(&mut self, e: &BytesStart<'_>) {
        if !self.active() {
            return;
        }
        match e.name().as_ref() {
            b"w:p" => {
                self.paragraphs.push(String::new());
                self.handle_paragraph_end();
            }
            b"w:tab" if self.in_run() => self.push_text("\t"),
            b"w:cr" if self.in_run() => self.push_text("\n"),
            b"w:br" if self.in_run() => {
                if !is_page_break(e) {
                    self.push_text("\n");
                }
            }
            b"w:gridSpan" | b"w:vMerge" => self.handle_cell_property(e),
            b"w:altChunk" => self.skipped += 1,
            _ => {}
        }
    }

    fn handle_text(&mut self, text: &str) {
        self.push_text(text);
    }

    fn handle_end(&mut self, name: &[u8]) {
        match name {
            b"w:body" => self.in_body = false,
            b"mc:Fallback" => self.fallback_depth = self.fallback_depth.saturating_sub(1),
            _ if !self.active() => {}
            b"w:t" => self.in_text = false,
            b"w:r" => {
                self.run_depth = self.run_depth.saturating_sub(1);
                self.in_text = false;
            }
            b"w:p" => self.handle_paragraph_end(),
            b"w:tc" => self.handle_cell_end(),
            b"w:tr" => self.handle_row_end(),
            b"w:tbl" => self.handle_table_end(),
            _ => {}
        }
    }

    fn push_text(&mut self, text: &str) {
        if let Some(current) = self.paragraphs.last_mut() {
            current.push_str(text);
        }
    }

    fn handle_table_start(&mut self) {
        self.table_depth += 1;
        if self.table_depth == 1 {
            self.table = Some(SourceTable::default());
            self.merge_origins.clear();
        } else {
            self.skipped += 1;
        }
    }

    fn handle_table_end(&mut self) {
        if self.table_depth == 0 {
            return;
        }
        self.table_depth -= 1;
        if self.table_depth == 0 {
            if let Some(table) = self.table.take() {
                self.elements.push(BodyElement::Table(table));
            }
        }
    }

    fn handle_row_start(&mut self) {
        match self.table_depth {
            0 => self.skipped += 1,
            1 => {
                self.row = Some(Vec::new());
                self.grid_col = 0;
            }
            _ => {}
        }
    }

    fn handle_row_end(&mut self) {
        if self.table_depth != 1 {
            return;
        }
        if let (Some(row), Some(table)) = (self.row.take(), self.table.as_mut()) {
            table.rows.push(row);
        }
    }

    fn handle_cell_start(&mut self) {
        match self.table_depth {
            0 => self.skipped += 1,
            1 if self.row.is_some() => {
                self.cell = Some(SourceCell::default());
                self.cell_span = 1;
                self.cell_merge = None;
            }
            1 => self.skipped += 1,
            _ => {}
        }
    }

    fn handle_cell_end(&mut self) {
        if self.table_depth != 1 {
            return;
        }
        let Some(cell) = self.cell.take() else {
            return;
        };
        let span = self.cell_span.max(1);
        let col = self.grid_col;
        self.grid_col += span;

        // A merged cell repeats once per grid column it covers, so rows
        // stay aligned with the header.
        let cell = match self.cell_merge.take() {
            Some(VMerge::Continue) => self
                .merge_origins
                .get(col)
                .cloned()
                .flatten()
                .unwrap_or(cell),
            Some(VMerge::Restart) => {
                if self.merge_origins.len() <= col {
                    self.merge_origins.resize(col + 1, None);
                }
                self.merge_origins[col] = Some(cell.clone());
                cell
            }
            None => cell,
        };
        if let Some(row) = self.row.as_mut() {
            row.extend(std::iter::repeat(cell).take(span));
        }
    }

    /// `w:gridSpan` / `w:vMerge` inside the `w:tcPr` of a top-level cell.
    fn handle_cell_property(&mut self, e: &BytesStart<'_>) {
        if self.table_depth != 1 || self.cell.is_none() {
            return;
        }
        let val = attr_value(e, b"w:val");
        match e.name().as_ref() {
            b"w:gridSpan" => {
                self.cell_span = val
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(1)
                    .clamp(1, MAX_GRID_SPAN);
            }
            b"w:vMerge" => {
                self.cell_merge = Some(match val.as_deref() {
                    Some("restart") => VMerge::Restart,
                    _ => VMerge::Continue,
                });
            }
            _ => {}
        }
    }

    fn handle_paragraph_end(&mut self) {
        let Some(text) = self.paragraphs.pop() else {
            return;
        };
        if !self.paragraphs.is_empty() {
            // Text-box content anchored inside another paragraph.
            self.skipped += 1;
            return;
        }
        if self.table_depth == 0 {
            self.elements.push(BodyElement::Paragraph(text));
        } else if let Some(cell) = self.cell.as_mut() {
            cell.paragraphs.push(text);
        } else {
            self.skipped += 1;
        }
    }

    fn finish(self) -> SourceDocument {
        SourceDocument {
            elements: self.elements,
            skipped_markers: self.skipped,
        }
    }
}

/// Word caps a table at 63 grid columns.
const MAX_GRID_SPAN: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VMerge {
    Restart,
    Continue,
}

fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

fn is_page_break(e: &BytesStart<'_>) -> bool {
    e.attributes()
        .flatten()
        .any(|a| a.key.as_ref() == b"w:type" && a.value.as_ref() == b"page")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn wrap(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006"><w:body>{body}<w:sectPr/></w:body></w:document>"#
        )
    }

    fn para(text: &str) -> String {
        format!(r#"<w:p><w:r><w:t xml:space="preserve">{text}</w:t></w:r></w:p>"#)
    }

    #[test]
    fn preserves_body_order() {
        let xml = wrap(&format!(
            "{}<w:tbl><w:tr><w:tc>{}</w:tc><w:tc>{}</w:tc></w:tr></w:tbl>{}",
            para("P1"),
            para("a"),
            para("b"),
            para("P2")
        ));
        let doc = parse_document_xml(&xml).unwrap();
        assert_eq!(doc.elements.len(), 3);
        assert_eq!(doc.elements[0], BodyElement::Paragraph("P1".into()));
        assert_eq!(
            doc.elements[1],
            BodyElement::Table(SourceTable::from_rows([["a", "b"]]))
        );
        assert_eq!(doc.elements[2], BodyElement::Paragraph("P2".into()));
        assert_eq!(doc.skipped_markers, 0);
    }

    #[test]
    fn runs_tabs_and_breaks() {
        let xml = wrap(
            r#"<w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="720"/></w:tabs></w:pPr><w:r><w:t>A </w:t></w:r><w:r><w:tab/><w:t>B</w:t><w:br/><w:t>C</w:t><w:br w:type="page"/></w:r><w:r><w:delText>gone</w:delText></w:r></w:p>"#,
        );
        let doc = parse_document_xml(&xml).unwrap();
        assert_eq!(doc.elements, vec![BodyElement::Paragraph("A \tB\nC".into())]);
    }

    #[test]
    fn unescapes_entities() {
        let xml = wrap(&para("a &amp; b &lt;c&gt;"));
        let doc = parse_document_xml(&xml).unwrap();
        assert_eq!(doc.paragraphs().next(), Some("a & b <c>"));
    }

    #[test]
    fn empty_paragraph_tag_is_kept() {
        let xml = wrap(&format!("<w:p/>{}", para("x")));
        let doc = parse_document_xml(&xml).unwrap();
        assert_eq!(doc.paragraphs().collect::<Vec<_>>(), vec!["", "x"]);
    }

    #[test]
    fn nested_table_is_flattened_into_cell_and_counted() {
        let inner = format!("<w:tbl><w:tr><w:tc>{}</w:tc></w:tr></w:tbl>", para("inner"));
        let xml = wrap(&format!(
            "<w:tbl><w:tr><w:tc>{}{}</w:tc></w:tr></w:tbl>",
            para("outer"),
            inner
        ));
        let doc = parse_document_xml(&xml).unwrap();
        let table = doc.tables().next().unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].len(), 1);
        assert_eq!(table.rows[0][0].text(), "outer\ninner");
        assert_eq!(doc.skipped_markers, 1);
    }

    #[test]
    fn merged_cells_repeat_across_their_grid_columns() {
        let tc = |props: &str, text: &str| {
            format!("<w:tc><w:tcPr>{props}</w:tcPr>{}</w:tc>", para(text))
        };
        let xml = wrap(&format!(
            "<w:tbl><w:tr>{}{}{}</w:tr><w:tr>{}{}</w:tr><w:tr>{}{}{}</w:tr></w:tbl>",
            tc(r#"<w:vMerge w:val="restart"/>"#, "区域"),
            tc("", "Q1"),
            tc("", "Q2"),
            tc(r#"<w:gridSpan w:val="2"/>"#, "合计"),
            tc("", "9"),
            r#"<w:tc><w:tcPr><w:vMerge/></w:tcPr><w:p/></w:tc>"#,
            tc("", "1"),
            tc("", "2"),
        ));
        let doc = parse_document_xml(&xml).unwrap();
        let table = doc.tables().next().unwrap();
        let texts: Vec<Vec<String>> = table
            .rows
            .iter()
            .map(|r| r.iter().map(SourceCell::text).collect())
            .collect();
        assert_eq!(
            texts,
            vec![
                vec!["区域", "Q1", "Q2"],
                vec!["合计", "合计", "9"],
                vec!["区域", "1", "2"],
            ]
        );
        assert_eq!(doc.skipped_markers, 0);
    }

    #[test]
    fn merge_properties_of_nested_tables_are_ignored() {
        let inner = format!(
            r#"<w:tbl><w:tr><w:tc><w:tcPr><w:gridSpan w:val="3"/></w:tcPr>{}</w:tc></w:tr></w:tbl>"#,
            para("inner")
        );
        let xml = wrap(&format!(
            "<w:tbl><w:tr><w:tc>{}{}</w:tc><w:tc>{}</w:tc></w:tr></w:tbl>",
            para("outer"),
            inner,
            para("b")
        ));
        let doc = parse_document_xml(&xml).unwrap();
        let table = doc.tables().next().unwrap();
        assert_eq!(table.rows[0].len(), 2);
        assert_eq!(table.rows[0][1].text(), "b");
    }

    #[test]
    fn text_boxes_and_fallbacks_are_skipped() {
        let xml = wrap(
            r#"<w:p><w:r><w:t>anchor</w:t></w:r><w:r><mc:AlternateContent><mc:Choice><w:drawing><w:txbxContent><w:p><w:r><w:t>box</w:t></w:r></w:p></w:txbxContent></w:drawing></mc:Choice><mc:Fallback><w:pict><w:txbxContent><w:p><w:r><w:t>box</w:t></w:r></w:p></w:txbxContent></w:pict></mc:Fallback></mc:AlternateContent></w:r></w:p>"#,
        );
        let doc = parse_document_xml(&xml).unwrap();
        assert_eq!(doc.elements, vec![BodyElement::Paragraph("anchor".into())]);
        assert_eq!(doc.skipped_markers, 1);
    }

    #[test]
    fn orphan_rows_are_counted() {
        let xml = wrap(&format!("<w:tr><w:tc>{}</w:tc></w:tr>{}", para("lost"), para("kept")));
        let doc = parse_document_xml(&xml).unwrap();
        assert_eq!(doc.skipped_markers, 2);
        assert!(doc.paragraphs().any(|p| p == "kept"));
    }

    #[test]
    fn rejects_non_zip() {
        let err = read_docx_from(Cursor::new(b"plain text".to_vec())).unwrap_err();
        assert!(matches!(err, DocxReadError::Container(_)), "got {err:?}");
    }

    #[test]
    fn reads_docx_rs_output() {
        use docx_rs::{Docx, Paragraph, Run, Table, TableCell, TableRow};

        let cell = |t: &str| TableCell::new().add_paragraph(Paragraph::new().add_run(Run::new().add_text(t)));
        let mut buf = Vec::new();
        Docx::new()
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Intro text")))
            .add_table(Table::new(vec![
                TableRow::new(vec![cell("H1"), cell("H2")]),
                TableRow::new(vec![cell("a"), cell("b")]),
            ]))
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Outro")))
            .build()
            .pack(&mut Cursor::new(&mut buf))
            .unwrap();

        let doc = read_docx_from(Cursor::new(buf)).unwrap();
        assert_eq!(doc.paragraphs().collect::<Vec<_>>(), vec!["Intro text", "Outro"]);
        let table = doc.tables().next().unwrap();
        let texts: Vec<Vec<String>> = table
            .rows
            .iter()
            .map(|r| r.iter().map(SourceCell::text).collect())
            .collect();
        assert_eq!(texts, vec![vec!["H1", "H2"], vec!["a", "b"]]);
        assert!(matches!(doc.elements[1], BodyElement::Table(_)));
    }

    #[test]
    fn read_docx_reports_missing_file() {
        let err = read_docx(Path::new("/definitely/not/here.docx")).unwrap_err();
        assert!(matches!(err, FusionError::InputNotFound { .. }));
    }
}
