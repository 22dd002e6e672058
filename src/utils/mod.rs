pub mod logger;

use thiserror::Error;

use crate::llm::StructuredOutputError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("模型输出解析失败: {0}")]
    StructuredOutput(#[from] StructuredOutputError),

    #[error("文档缺少正文: {0}")]
    MissingText(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// 按字符截断，不会切断多字节字符
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// 日志预览用：截断并在被截断时追加省略号
pub fn preview(text: &str, max_chars: usize) -> String {
    let cut = truncate_chars(text, max_chars);
    if cut.len() < text.len() {
        format!("{}...", cut)
    } else {
        cut.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("聚离子液体电解质", 3), "聚离子");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn preview_marks_truncation() {
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("abc", 3), "abc");
    }
}
