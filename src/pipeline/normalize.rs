//! Normalization: deterministic cleanup of the model's Markdown.
//!
//! Models follow the format directive most of the time, but not always. They
//! wrap the answer in ` ```markdown ` fences, echo the table sentinels they
//! saw in the prompt, emit `#######` headings, forget the separator row under
//! a table header, or glue a table onto the preceding paragraph. Each rule
//! below repairs one such quirk without touching content, so the parser
//! only ever sees CommonMark + GFM tables.
//!
//! ## Rule Order
//!
//! Line endings are normalised before any line-based rule runs. Sentinel
//! regions are unwrapped before the table rules so the rows they contain
//! get the same repairs as native tables. Rules that look at block syntax
//! skip the inside of code fences.

use crate::prompts::{TABLE_END, TABLE_START};
use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all normalization rules to a raw model response.
///
/// Rules (applied in order):
/// 1. Strip outer markdown fences
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip invisible Unicode and control characters
/// 4. Trim trailing whitespace per line
/// 5. Unwrap `=== 表格开始 ===` / `=== 表格结束 ===` regions into pipe tables
/// 6. Clamp headings with more than six `#` to level 6
/// 7. Ensure heading lines have a blank line before them
/// 8. Ensure tables have a blank line before them
/// 9. Insert or repair the separator row under each table header
/// 10. Remove spurious mid-table separator rows
/// 11. Collapse 3+ consecutive blank lines down to 2
/// 12. Ensure the text ends with exactly one newline
pub fn normalize_markdown(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = unwrap_table_sentinels(&s);
    let s = clamp_heading_levels(&s);
    let s = normalise_heading_spacing(&s);
    let s = ensure_blank_before_tables(&s);
    let s = fix_broken_tables(&s);
    let s = remove_mid_table_separators(&s);
    let s = collapse_blank_lines(&s);
    ensure_final_newline(&s)
}

// ── Fence tracking ───────────────────────────────────────────────────────────

/// Tracks whether the current line belongs to a fenced code block.
#[derive(Default)]
struct FenceTracker {
    open: Option<char>,
}

impl FenceTracker {
    /// Feed one line; returns true when the line is a fence delimiter or sits
    /// inside a fenced block.
    fn observe(&mut self, line: &str) -> bool {
        let t = line.trim_start();
        let marker = if t.starts_with("```") {
            Some('`')
        } else if t.starts_with("~~~") {
            Some('~')
        } else {
            None
        };
        match (self.open, marker) {
            (None, Some(m)) => {
                self.open = Some(m);
                true
            }
            (Some(open), Some(m)) if open == m => {
                self.open = None;
                true
            }
            (Some(_), _) => true,
            (None, None) => false,
        }
    }
}

// ── Rule 1: Strip outer markdown fences ──────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:markdown|md)?[ \t]*\r?\n(.*)\r?\n```\s*$").expect("valid regex")
});

fn strip_markdown_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible and control characters ─────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|&c| {
            !matches!(
                c,
                '\u{200B}' | '\u{FEFF}' | '\u{00AD}' | '\u{200C}' | '\u{200D}' | '\u{2060}'
            ) && (c == '\n' || c == '\t' || !c.is_control())
        })
        .collect()
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Unwrap table sentinels ───────────────────────────────────────────
//
// Models sometimes echo the linearized form back: `a|b` rows between the
// sentinel lines. The sentinels become blank lines and each row gets outer
// pipes so the table rules below treat it as a GFM table.

fn unwrap_table_sentinels(input: &str) -> String {
    let mut result: Vec<String> = Vec::new();
    let mut in_region = false;

    for line in input.lines() {
        let trimmed = line.trim();
        if trimmed == TABLE_START {
            in_region = true;
            result.push(String::new());
        } else if trimmed == TABLE_END {
            in_region = false;
            result.push(String::new());
        } else if in_region {
            if !trimmed.is_empty() {
                result.push(to_pipe_row(trimmed));
            }
        } else {
            result.push(line.to_string());
        }
    }

    result.join("\n")
}

fn to_pipe_row(row: &str) -> String {
    if is_table_row(row) {
        return row.to_string();
    }
    let inner = row.strip_prefix('|').unwrap_or(row);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    let cells: Vec<&str> = inner.split('|').map(str::trim).collect();
    format!("| {} |", cells.join(" | "))
}

// ── Rule 6: Clamp heading levels ─────────────────────────────────────────────
//
// CommonMark stops recognising ATX headings after six `#`, so `####### x`
// would otherwise become a paragraph that starts with hashes.

static RE_DEEP_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^( {0,3})#{7,}([ \t].*)?$").expect("valid regex"));

pub(crate) fn clamp_heading_levels(input: &str) -> String {
    let mut fences = FenceTracker::default();
    input
        .lines()
        .map(|line| {
            if fences.observe(line) {
                line.to_string()
            } else {
                RE_DEEP_HEADING.replace(line, "${1}######${2}").into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 7: Normalise heading spacing ────────────────────────────────────────

static RE_ATX_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ {0,3}#{1,6}(?:[ \t]|$)").expect("valid regex"));

fn normalise_heading_spacing(input: &str) -> String {
    let mut fences = FenceTracker::default();
    let mut result = String::with_capacity(input.len() + 64);
    for line in input.lines() {
        let fenced = fences.observe(line);
        if !fenced && RE_ATX_HEADING.is_match(line) && !result.is_empty() {
            let trimmed = result.trim_end_matches('\n');
            result.truncate(trimmed.len());
            result.push_str("\n\n");
        }
        result.push_str(line);
        result.push('\n');
    }
    result
}

// ── Rule 8: Blank line before tables ─────────────────────────────────────────
//
// A GFM table cannot interrupt a paragraph; without the blank line the rows
// would be read as paragraph text.

fn ensure_blank_before_tables(input: &str) -> String {
    let mut fences = FenceTracker::default();
    let mut result: Vec<&str> = Vec::new();
    for line in input.lines() {
        let fenced = fences.observe(line);
        if !fenced && is_table_row(line) {
            if let Some(prev) = result.last() {
                if !prev.trim().is_empty() && !is_table_row(prev) {
                    result.push("");
                }
            }
        }
        result.push(line);
    }
    result.join("\n")
}

// ── Rule 9: Fix broken GFM tables ───────────────────────────────────────────

/// Ensures the first row of every table is followed by a separator row with
/// the same number of cells, inserting or rebuilding it as needed. A header
/// row alone becomes a one-row table.
fn fix_broken_tables(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut result: Vec<String> = Vec::with_capacity(lines.len() + 10);
    let mut fences = FenceTracker::default();
    let mut prev_is_row = false;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let fenced = fences.observe(line);
        let is_row = !fenced && is_table_row(line);

        if is_row && !prev_is_row && !is_separator_row(line) {
            let cols = cell_count(line);
            result.push(line.to_string());

            let next = lines.get(i + 1).copied().unwrap_or("");
            if is_separator_row(next) && is_table_row(next) {
                if cell_count(next) == cols {
                    result.push(next.to_string());
                } else {
                    result.push(separator_row(cols));
                }
                i += 1;
            } else {
                result.push(separator_row(cols));
            }
            prev_is_row = true;
            i += 1;
            continue;
        }

        result.push(line.to_string());
        prev_is_row = is_row;
        i += 1;
    }

    result.join("\n")
}

fn separator_row(cols: usize) -> String {
    std::iter::once("|")
        .chain(std::iter::repeat_n(" --- |", cols.max(1)))
        .collect()
}

fn cell_count(line: &str) -> usize {
    let t = line.trim();
    let inner = t.strip_prefix('|').unwrap_or(t);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').count()
}

fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 2
}

fn is_separator_row(line: &str) -> bool {
    let trimmed = line.trim();
    if !trimmed.starts_with('|') || !trimmed.contains('-') {
        return false;
    }
    trimmed
        .chars()
        .all(|c| c == '|' || c == '-' || c == ':' || c == ' ')
}

// ── Rule 10: Remove spurious mid-table separator rows ───────────────────────
//
// GFM only allows a separator directly after the header row. Extra ones in
// the body would render as a row of dashes.

fn remove_mid_table_separators(input: &str) -> String {
    let mut fences = FenceTracker::default();
    let mut result: Vec<&str> = Vec::new();
    let mut table_line_count = 0usize;

    for line in input.lines() {
        let fenced = fences.observe(line);
        if !fenced && is_table_row(line) {
            table_line_count += 1;
            if is_separator_row(line) && table_line_count != 2 {
                continue;
            }
        } else {
            table_line_count = 0;
        }
        result.push(line);
    }

    result.join("\n")
}

// ── Rule 11: Collapse excessive blank lines ──────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{4,}").expect("valid regex"));

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n\n").to_string()
}

// ── Rule 12: Ensure text ends with single newline ────────────────────────────

fn ensure_final_newline(input: &str) -> String {
    let trimmed = input.trim_end();
    if trimmed.is_empty() {
        String::from("\n")
    } else {
        format!("{}\n", trimmed.trim_start_matches('\n'))
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences() {
        let input = "```markdown\n# Hello\nWorld\n```";
        assert_eq!(strip_markdown_fences(input), "# Hello\nWorld");
    }

    #[test]
    fn test_strip_fences_no_lang() {
        let input = "```\n# Hello\nWorld\n```";
        assert_eq!(strip_markdown_fences(input), "# Hello\nWorld");
    }

    #[test]
    fn test_inner_code_fence_untouched() {
        let input = "# T\n\n```rust\nfn main() {}\n```\n\nAfter";
        assert_eq!(strip_markdown_fences(input), input);
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_remove_invisible_and_control() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar\u{0007}\tend\u{000B}";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar\tend");
    }

    #[test]
    fn test_trim_trailing_whitespace() {
        assert_eq!(
            trim_trailing_whitespace("  hello   \nworld  "),
            "  hello\nworld"
        );
    }

    #[test]
    fn test_unwrap_sentinels() {
        let input = "Intro\n=== 表格开始 ===\nH1|H2\n---|---\na|b\n=== 表格结束 ===\nOutro";
        assert_eq!(
            unwrap_table_sentinels(input),
            "Intro\n\n| H1 | H2 |\n| --- | --- |\n| a | b |\n\nOutro"
        );
    }

    #[test]
    fn test_sentinel_rows_with_pipes_kept() {
        assert_eq!(to_pipe_row("| x | y |"), "| x | y |");
        assert_eq!(to_pipe_row("x| y"), "| x | y |");
    }

    #[test]
    fn test_clamp_heading_levels() {
        assert_eq!(clamp_heading_levels("####### Deep"), "###### Deep");
        assert_eq!(clamp_heading_levels("#########"), "######");
        assert_eq!(clamp_heading_levels("###### Six"), "###### Six");
        assert_eq!(clamp_heading_levels("#######nospace"), "#######nospace");
    }

    #[test]
    fn test_clamp_skips_code() {
        let input = "```\n####### keep\n```";
        assert_eq!(clamp_heading_levels(input), input);
    }

    #[test]
    fn test_heading_spacing() {
        let input = "some text\n# Heading\nmore text";
        let result = normalise_heading_spacing(input);
        assert!(result.contains("\n\n# Heading\n"));
    }

    #[test]
    fn test_heading_spacing_ignores_code_comments() {
        let input = "```sh\necho hi\n# comment\n```";
        let result = normalise_heading_spacing(input);
        assert!(result.contains("echo hi\n# comment"));
    }

    #[test]
    fn test_blank_before_table() {
        let input = "Text\n| A | B |\n| --- | --- |";
        assert_eq!(ensure_blank_before_tables(input), "Text\n\n| A | B |\n| --- | --- |");
    }

    #[test]
    fn test_fix_broken_table() {
        let input = "| A | B |\n| 1 | 2 |";
        let result = fix_broken_tables(input);
        let lines: Vec<&str> = result.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1], "| --- | --- |");
    }

    #[test]
    fn test_single_row_table_gets_separator() {
        let result = fix_broken_tables("| only | row |");
        assert_eq!(result, "| only | row |\n| --- | --- |");
    }

    #[test]
    fn test_mismatched_separator_rebuilt() {
        let result = fix_broken_tables("| a | b | c |\n| --- |\n| 1 | 2 | 3 |");
        assert_eq!(result.lines().nth(1), Some("| --- | --- | --- |"));
        assert_eq!(result.lines().count(), 3);
    }

    #[test]
    fn test_table_with_separator_unchanged() {
        let input = "| A | B |\n|:---|---:|\n| 1 | 2 |";
        assert_eq!(fix_broken_tables(input), input);
    }

    #[test]
    fn test_remove_mid_table_separator() {
        let input = "| A | B |\n| --- | --- |\n| 1 | 2 |\n| --- | --- |\n| 3 | 4 |";
        let result = remove_mid_table_separators(input);
        let sep_count = result.lines().filter(|l| is_separator_row(l)).count();
        assert_eq!(sep_count, 1, "Only one separator should remain");
        assert!(result.contains("| 3 | 4 |"), "Data rows should remain");
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\n\nb"), "a\n\n\nb");
    }

    #[test]
    fn test_ensure_final_newline() {
        assert_eq!(ensure_final_newline("hello"), "hello\n");
        assert_eq!(ensure_final_newline("\n\nhello\n\n\n"), "hello\n");
        assert_eq!(ensure_final_newline(""), "\n");
    }

    #[test]
    fn test_full_pipeline() {
        let input = "```markdown\n# Title\r\nIntro\r\n=== 表格开始 ===\r\nH1|H2|H3\r\n---|---|---\r\na|b|c\r\n=== 表格结束 ===\r\n####### Deep   \n\n\n\n\n\nEnd\n```";
        let result = normalize_markdown(input);
        assert!(result.starts_with("# Title\nIntro\n\n| H1 | H2 | H3 |\n| --- | --- | --- |\n| a | b | c |\n"));
        assert!(result.contains("\n\n###### Deep\n"));
        assert!(!result.contains("\n\n\n\n"));
        assert!(result.ends_with("End\n"));
    }
}
