//! 记录叶子值的类型。
//!
//! 程序内部用 `Option` 表示"未知"，只在读写 JSON 时与占位符 `"N/A"` 互相转换。
//! 反序列化一律宽松：模型把对象写成字符串、把字符串写成数字都不会让整条记录失败。

use serde::de::{DeserializeOwned, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

pub const PLACEHOLDER: &str = "N/A";

/// 可能未知的标量值
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Field(Option<String>);

impl Field {
    /// 占位符样式的文本同样视为未知
    pub fn known(value: impl Into<String>) -> Self {
        Self::from_text(value.into())
    }

    pub fn unknown() -> Self {
        Self(None)
    }

    pub fn is_known(&self) -> bool {
        self.0.is_some()
    }

    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }

    fn from_text(text: String) -> Self {
        let trimmed = text.trim();
        if is_placeholder(trimmed) {
            Self(None)
        } else if trimmed.len() == text.len() {
            Self(Some(text))
        } else {
            Self(Some(trimmed.to_string()))
        }
    }

    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self(None),
            Value::String(s) => Self::from_text(s),
            Value::Bool(b) => Self(Some(b.to_string())),
            Value::Number(n) => Self(Some(n.to_string())),
            Value::Array(ref items) if items.is_empty() => Self(None),
            Value::Object(ref map) if map.is_empty() => Self(None),
            other => Self(Some(other.to_string())),
        }
    }
}

fn is_placeholder(text: &str) -> bool {
    text.is_empty()
        || text.eq_ignore_ascii_case(PLACEHOLDER)
        || text.eq_ignore_ascii_case("null")
        || text.eq_ignore_ascii_case("none")
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0.as_deref().unwrap_or(PLACEHOLDER))
    }
}

impl<'de> Deserialize<'de> for Field {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Self::from_json(Value::deserialize(deserializer)?))
    }
}

/// 可能未知的布尔值
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flag(Option<bool>);

impl Flag {
    pub fn known(value: bool) -> Self {
        Self(Some(value))
    }

    pub fn is_known(&self) -> bool {
        self.0.is_some()
    }

    pub fn value(&self) -> Option<bool> {
        self.0
    }
}

impl Serialize for Flag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Some(b) => serializer.serialize_bool(b),
            None => serializer.serialize_str(PLACEHOLDER),
        }
    }
}

impl<'de> Deserialize<'de> for Flag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let flag = match Value::deserialize(deserializer)? {
            Value::Bool(b) => Some(b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Some(true),
                "false" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        };
        Ok(Self(flag))
    }
}

/// 列表元素的宽松转换；返回 None 的元素被丢弃
pub trait ListItem: Sized {
    fn from_json(value: Value) -> Option<Self>;
}

impl ListItem for String {
    fn from_json(value: Value) -> Option<Self> {
        match Field::from_json(value) {
            Field(Some(text)) => Some(text),
            Field(None) => None,
        }
    }
}

/// 接受数组、单个值或占位符
pub fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: ListItem,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    };
    Ok(items.into_iter().filter_map(T::from_json).collect())
}

/// 接受任意标量的文本字段，null 与占位符读作空串
pub fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Field::from_json(Value::deserialize(deserializer)?).0.unwrap_or_default())
}

/// 嵌套对象的宽松反序列化：标量交给 `from_scalar`，null 取默认值
pub trait Lenient: DeserializeOwned + Default {
    fn from_scalar(_value: Field) -> Self {
        Self::default()
    }
}

pub fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Lenient,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => T::default(),
        value @ Value::Object(_) => serde_json::from_value(value).unwrap_or_else(|e| {
            warn!("字段结构异常，按未知处理: {}", e);
            T::default()
        }),
        scalar => T::from_scalar(Field::from_json(scalar)),
    })
}
