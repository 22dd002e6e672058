//! 从模型回复中取出第一个 JSON 值。
//!
//! 模型可能在 JSON 前后附带说明文字，或用 ```json 代码块包裹，所有阶段都用这里的
//! 同一套规则解析：代码块内容 → 整段文本 → 从任意 `{` / `[` 开始能解码的第一个值。

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::utils::preview;

const FENCE: &str = "```";

#[derive(Debug, Error)]
pub enum StructuredOutputError {
    #[error("模型返回为空")]
    Empty,

    #[error("未找到有效的 JSON: {preview}")]
    NoJson { preview: String },

    #[error("JSON 结构不符合预期: {0}")]
    Shape(#[source] serde_json::Error),

    #[error("JSON 中没有可用的记录")]
    NoRecords,
}

pub fn extract_json(raw: &str) -> Result<Value, StructuredOutputError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(StructuredOutputError::Empty);
    }

    if let Some(inner) = fenced_block(text) {
        if let Some(value) = parse_whole(inner).or_else(|| first_value(inner)) {
            return Ok(value);
        }
    }

    parse_whole(text)
        .or_else(|| first_value(text))
        .ok_or_else(|| StructuredOutputError::NoJson {
            preview: preview(text, 200),
        })
}

pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, StructuredOutputError> {
    let value = extract_json(raw)?;
    serde_json::from_value(value).map_err(StructuredOutputError::Shape)
}

/// 第一个代码块的内容，跳过语言标记；没有闭合标记时取到结尾
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find(FENCE)?;
    let after_open = &text[open + FENCE.len()..];
    let body_start = match after_open.find('\n') {
        Some(newline) if is_language_tag(&after_open[..newline]) => newline + 1,
        _ => 0,
    };
    let body = &after_open[body_start..];
    let inner = match body.find(FENCE) {
        Some(close) => &body[..close],
        None => body,
    };
    Some(inner.trim())
}

fn is_language_tag(line: &str) -> bool {
    line.trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn parse_whole(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text)
        .ok()
        .filter(|v| v.is_object() || v.is_array())
}

/// 优先返回对象或含对象的数组，避免把正文里的引用标号 `[1]` 当成结果。
/// 解码失败的候选整体跳过，不会退而取其内部的嵌套片段；括号不闭合说明回复被截断，扫描到此为止。
fn first_value(text: &str) -> Option<Value> {
    let mut fallback = None;
    let mut idx = 0;
    while let Some(offset) = text[idx..].find(['{', '[']) {
        let start = idx + offset;
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(value)) if holds_records(&value) => return Some(value),
            Some(Ok(value)) => {
                if fallback.is_none() {
                    fallback = Some(value);
                }
                idx = start + stream.byte_offset();
            }
            _ => match bracket_span(&text[start..]) {
                Some(span) => idx = start + span,
                None => break,
            },
        }
    }
    fallback
}

/// 从开头的括号起，到与之配对的闭括号之后的字节长度；忽略字符串内的括号
fn bracket_span(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

fn holds_records(value: &Value) -> bool {
    match value {
        Value::Object(_) => true,
        Value::Array(items) => items.iter().any(Value::is_object),
        _ => false,
    }
}
