//! Standalone HTML output.
//!
//! The page carries its own `<style>` block derived from [`StyleConfig`],
//! so the file opens the same in any browser and pastes into Word with the
//! configured fonts and sizes.

use crate::config::StyleConfig;
use crate::model::markup::Span;
use crate::model::{StyledDocument, StyledTable, StyledUnit};
use std::fmt::Write;

/// Render `doc` as a complete UTF-8 HTML page.
pub fn render_html(doc: &StyledDocument) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str("<!DOCTYPE html>\n<html lang=\"zh-CN\">\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str("<title>");
    out.push_str(&html_escape::encode_text(&document_title(doc)));
    out.push_str("</title>\n<style>\n");
    out.push_str(&stylesheet(&doc.style));
    out.push_str("</style>\n</head>\n<body>\n");

    let mut lists = ListWriter::default();
    for unit in &doc.units {
        if let StyledUnit::ListItem {
            list_id,
            ordered,
            level,
            spans,
        } = unit
        {
            lists.item(&mut out, *list_id, *ordered, *level, spans);
            continue;
        }
        lists.close_all(&mut out);

        match unit {
            StyledUnit::Heading {
                level,
                text,
                format,
            } => {
                let _ = writeln!(
                    out,
                    "<h{level} style=\"text-align: {}\">{}</h{level}>",
                    format.align.css(),
                    html_escape::encode_text(text)
                );
            }
            StyledUnit::Paragraph { spans, format } => {
                let indent = if format.first_line_indent_pt > 0.0 {
                    format!("; text-indent: {}pt", format.first_line_indent_pt)
                } else {
                    String::new()
                };
                let _ = writeln!(
                    out,
                    "<p style=\"text-align: {}{}\">{}</p>",
                    format.align.css(),
                    indent,
                    spans_html(spans)
                );
            }
            StyledUnit::Table(table) => write_table(&mut out, table),
            StyledUnit::Blank => out.push_str("<p class=\"blank\">&nbsp;</p>\n"),
            StyledUnit::ListItem { .. } => {}
        }
    }
    lists.close_all(&mut out);

    out.push_str("</body>\n</html>\n");
    out
}

/// First heading text, or a fixed fallback.
fn document_title(doc: &StyledDocument) -> String {
    doc.units
        .iter()
        .find_map(|u| match u {
            StyledUnit::Heading { text, .. } => Some(text.clone()),
            _ => None,
        })
        .unwrap_or_else(|| "融合文档".to_string())
}

fn stylesheet(style: &StyleConfig) -> String {
    let mut css = String::new();
    let page = &style.page;
    let _ = writeln!(
        css,
        "@page {{ size: {}in {}in; margin: {}in {}in {}in {}in; }}",
        page.width_in,
        page.height_in,
        page.margin_top_in,
        page.margin_right_in,
        page.margin_bottom_in,
        page.margin_left_in
    );
    let _ = writeln!(
        css,
        "body {{ font-family: \"{}\", serif; font-size: {}pt; line-height: {}; text-align: {}; }}",
        style.body_font,
        style.body_size_pt,
        style.line_spacing,
        style.body_align.css()
    );
    let _ = writeln!(
        css,
        "p {{ margin: 0 0 {}pt 0; }}",
        style.paragraph_space_after_pt
    );
    for level in 1..=6u8 {
        let _ = writeln!(
            css,
            "h{level} {{ font-size: {}pt; font-weight: {}; color: #{}; line-height: {}; margin: {}pt 0 {}pt 0; }}",
            style.heading_size(level),
            if style.heading_bold { "bold" } else { "normal" },
            style.heading_color,
            style.heading_line_spacing,
            style.heading_space_before_pt,
            style.heading_space_after(level)
        );
    }
    let _ = writeln!(
        css,
        "code {{ font-family: \"{}\", monospace; font-size: {}pt; }}",
        style.code_font, style.code_size_pt
    );
    let _ = writeln!(
        css,
        ".link {{ color: #{}; text-decoration: underline; }}",
        style.link_color
    );
    css.push_str("table { border-collapse: collapse; margin: 6pt 0; }\n");
    css.push_str("th, td { border: 1px solid #000; padding: 4pt 6pt; text-indent: 0; }\n");
    css.push_str("th { text-align: center; }\n");
    css
}

fn write_table(out: &mut String, table: &StyledTable) {
    out.push_str("<table>\n");
    for (index, row) in table.rows.iter().enumerate() {
        let tag = if index == 0 { "th" } else { "td" };
        out.push_str("<tr>");
        for cell in row {
            let _ = write!(
                out,
                "<{tag} style=\"text-align: {}\">{}</{tag}>",
                cell.align.css(),
                spans_html(&cell.spans)
            );
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</table>\n");
}

fn spans_html(spans: &[Span]) -> String {
    let mut html = String::new();
    for span in spans {
        let mut text = html_escape::encode_text(&span.text).replace('\n', "<br>");
        if span.style.code {
            text = format!("<code>{text}</code>");
        }
        if span.style.italic {
            text = format!("<em>{text}</em>");
        }
        if span.style.bold {
            text = format!("<strong>{text}</strong>");
        }
        if let Some(href) = &span.style.link {
            text = format!(
                "<span class=\"link\" title=\"{}\">{text}</span>",
                html_escape::encode_double_quoted_attribute(href)
            );
        }
        html.push_str(&text);
    }
    html
}

/// Rebuilds `<ol>`/`<ul>` nesting from flat list items. The stack holds the
/// open lists, innermost last; an item at `level` lives in a stack of
/// depth `level + 1`.
#[derive(Default)]
struct ListWriter {
    open: Vec<(usize, bool)>,
}

impl ListWriter {
    fn item(&mut self, out: &mut String, list_id: usize, ordered: bool, level: usize, spans: &[Span]) {
        while self.open.len() > level + 1 {
            self.close_one(out);
        }
        if self.open.len() == level + 1 && self.open.last().map(|(id, _)| *id) != Some(list_id) {
            self.close_one(out);
        }

        if self.open.len() == level + 1 {
            out.push_str("</li>\n<li>");
        } else {
            while self.open.len() < level + 1 {
                out.push_str(if ordered { "<ol>\n<li>" } else { "<ul>\n<li>" });
                self.open.push((list_id, ordered));
            }
        }
        out.push_str(&spans_html(spans));
    }

    fn close_one(&mut self, out: &mut String) {
        if let Some((_, ordered)) = self.open.pop() {
            out.push_str(if ordered { "</li>\n</ol>\n" } else { "</li>\n</ul>\n" });
        }
    }

    fn close_all(&mut self, out: &mut String) {
        while !self.open.is_empty() {
            self.close_one(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Alignment;
    use crate::model::markup::SpanStyle;
    use crate::model::styled::ParagraphFormat;
    use crate::model::StyledCell;

    fn span(text: &str) -> Span {
        Span {
            text: text.into(),
            style: SpanStyle::default(),
        }
    }

    fn item(list_id: usize, ordered: bool, level: usize, text: &str) -> StyledUnit {
        StyledUnit::ListItem {
            list_id,
            ordered,
            level,
            spans: vec![span(text)],
        }
    }

    fn doc(units: Vec<StyledUnit>) -> StyledDocument {
        StyledDocument {
            style: StyleConfig::default(),
            units,
        }
    }

    #[test]
    fn text_is_escaped() {
        let html = render_html(&doc(vec![StyledUnit::Paragraph {
            spans: vec![span("a < b & \"c\"")],
            format: ParagraphFormat {
                align: Alignment::Left,
                first_line_indent_pt: 22.0,
                line_spacing: 1.5,
            },
        }]));
        assert!(html.contains("a &lt; b &amp; \"c\""));
        assert!(html.contains("text-indent: 22pt"));
        assert!(html.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn nested_lists_nest() {
        let html = render_html(&doc(vec![
            item(0, true, 0, "a"),
            item(1, false, 1, "a.1"),
            item(0, true, 0, "b"),
        ]));
        let body = &html[html.find("<body>").unwrap()..];
        assert_eq!(
            body,
            "<body>\n<ol>\n<li>a<ul>\n<li>a.1</li>\n</ul>\n</li>\n<li>b</li>\n</ol>\n</body>\n</html>\n"
        );
    }

    #[test]
    fn adjacent_lists_stay_separate() {
        let html = render_html(&doc(vec![item(0, true, 0, "x"), item(1, true, 0, "y")]));
        assert_eq!(html.matches("<ol>").count(), 2);
    }

    #[test]
    fn table_header_uses_th() {
        let cell = |t: &str, align| StyledCell {
            spans: vec![span(t)],
            align,
        };
        let html = render_html(&doc(vec![StyledUnit::Table(StyledTable {
            columns: 1,
            rows: vec![vec![cell("H", Alignment::Center)], vec![cell("v", Alignment::Left)]],
        })]));
        assert!(html.contains("<th style=\"text-align: center\">H</th>"));
        assert!(html.contains("<td style=\"text-align: left\">v</td>"));
    }

    #[test]
    fn styles_come_from_config() {
        let html = render_html(&doc(vec![]));
        assert!(html.contains("h1 { font-size: 20pt"));
        assert!(html.contains("font-family: \"宋体\""));
        assert!(html.contains(".link { color: #0000FF"));
        assert!(html.contains("<title>融合文档</title>"));
    }
}
