//! Prompt text and linearization markers.
//!
//! Every string the model sees, and the sentinels the normalizer looks for
//! on the way back, live here. Callers can override the persona via
//! [`crate::config::FusionConfig::system_prompt`]; the format directive is
//! fixed because the Markdown parser and document builder depend on it.

/// Line opening a table region in linearized text.
pub const TABLE_START: &str = "=== 表格开始 ===";

/// Line closing a table region in linearized text.
pub const TABLE_END: &str = "=== 表格结束 ===";

/// Cell separator inside a linearized table row.
pub const CELL_SEPARATOR: &str = "|";

/// Opening line of every prompt.
pub const PREAMBLE: &str = "以下是多个文档的内容，包含段落和表格（表格用特殊标记标识）:\n\n";

/// Label in front of the caller's extra instruction.
pub const INSTRUCTION_LABEL: &str = "额外说明: ";

/// Default system persona for the completion call.
pub const DEFAULT_SYSTEM_PROMPT: &str = "你是一个专业的文档融合专家。请根据用户提供的多个文档内容，进行融合重写，确保内容连贯、逻辑清晰，并且保留原文的核心信息。对于表格数据，要准确保留数据关系和关键信息。";

/// Output contract appended as the last part of every prompt.
///
/// Each rule maps onto a block the Markdown parser recognises.
pub const FORMAT_DIRECTIVE: &str = r#"输出格式要求：
1. 只输出 Markdown 正文，不要使用 ```markdown 代码围栏包裹，不要添加任何解释或说明。
2. 标题：使用 # 表示文档总标题（全文仅一个），## 表示一级标题，### 表示二级标题，#### 表示三级标题，最多使用六级标题。
3. 正文：每个段落之间空一行，段落内不要手动换行。
4. 列表：无序列表使用 "- "，有序列表使用 "1. 2. 3."，嵌套列表缩进两个空格。
5. 表格：使用 GFM 管道表格，第一行为表头，表头下方必须有 | --- | 分隔行，每行单元格数量与表头一致，不要输出 "=== 表格开始 ===" 等标记。
6. 强调：加粗使用 **文字**，斜体使用 *文字*，行内代码使用 `代码`，链接使用 [文字](地址)。
7. 不要使用 HTML 标签、图片或分隔线。"#;
