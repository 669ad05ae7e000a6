//! Prompt assembly.
//!
//! The layout is fixed so the model always sees unambiguous file boundaries:
//!
//! ```text
//! <preamble>
//! 文档 1 (a.docx):
//! <text of a.docx>
//!
//! 文档 2 (b.docx):
//! <text of b.docx>
//!
//! 额外说明: <instruction>
//!
//! <format directive>
//! ```

use crate::prompts::{FORMAT_DIRECTIVE, INSTRUCTION_LABEL, PREAMBLE};

/// A named linearized document ready for the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptDocument {
    /// Name shown in the document header, usually the file name.
    pub name: String,
    pub text: String,
}

impl PromptDocument {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// Build the user prompt. Documents are numbered from 1 in the given order;
/// a blank or absent instruction adds no line; the format directive is
/// always last.
pub fn assemble_prompt(documents: &[PromptDocument], instruction: Option<&str>) -> String {
    let body_len: usize = documents.iter().map(|d| d.name.len() + d.text.len() + 24).sum();
    let mut prompt = String::with_capacity(PREAMBLE.len() + body_len + FORMAT_DIRECTIVE.len());

    prompt.push_str(PREAMBLE);
    for (idx, doc) in documents.iter().enumerate() {
        prompt.push_str(&format!("文档 {} ({}):\n{}\n\n", idx + 1, doc.name, doc.text));
    }

    if let Some(instruction) = instruction.map(str::trim).filter(|s| !s.is_empty()) {
        prompt.push_str(INSTRUCTION_LABEL);
        prompt.push_str(instruction);
        prompt.push_str("\n\n");
    }

    prompt.push_str(FORMAT_DIRECTIVE);
    prompt
}
