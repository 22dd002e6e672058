//! 思维导图：一次模型调用生成树结构，再确定性地转换为 Mermaid mindmap 文本。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::llm::{parse_json, CompletionRequest, LlmClient, StructuredOutputError};
use crate::pipeline::field::{lenient_list, lenient_text, ListItem};
use crate::utils::truncate_chars;

const DEFAULT_TOPIC: &str = "文献分析";
const MAX_TITLE_CHARS: usize = 80;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MindmapNode {
    #[serde(deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(deserialize_with = "lenient_list")]
    pub details: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Branch {
    #[serde(deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(deserialize_with = "lenient_text")]
    pub color: String,
    #[serde(deserialize_with = "lenient_list")]
    pub children: Vec<MindmapNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mindmap {
    #[serde(deserialize_with = "lenient_text")]
    pub central_topic: String,
    #[serde(deserialize_with = "lenient_list")]
    pub branches: Vec<Branch>,
    #[serde(deserialize_with = "lenient_text")]
    pub summary: String,
}

/// 数组里不是对象的元素直接丢弃
impl ListItem for MindmapNode {
    fn from_json(value: Value) -> Option<Self> {
        value.is_object().then(|| serde_json::from_value(value).ok()).flatten()
    }
}

impl ListItem for Branch {
    fn from_json(value: Value) -> Option<Self> {
        value.is_object().then(|| serde_json::from_value(value).ok()).flatten()
    }
}

impl Mindmap {
    /// 深度优先逐行输出；细节只保留短于 `detail_max_chars` 的条目
    pub fn to_mermaid(&self, detail_max_chars: usize) -> String {
        let topic = non_empty(&self.central_topic).unwrap_or(DEFAULT_TOPIC);
        let mut lines = vec!["mindmap".to_string(), format!("  root(({}))", topic)];

        for (i, branch) in self.branches.iter().enumerate() {
            match non_empty(&branch.name) {
                Some(name) => lines.push(format!("    {}", name)),
                None => lines.push(format!("    分支{}", i + 1)),
            }

            for (j, child) in branch.children.iter().enumerate() {
                match non_empty(&child.name) {
                    Some(name) => lines.push(format!("      {}", name)),
                    None => lines.push(format!("      子分支{}", j + 1)),
                }

                for detail in &child.details {
                    if detail.chars().count() < detail_max_chars {
                        lines.push(format!("        {}", detail));
                    }
                }
            }
        }

        lines.join("\n")
    }
}

fn non_empty(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// 取正文中第一个一级标题
pub fn document_title(content: &str) -> Option<String> {
    static TITLE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = TITLE.get_or_init(|| Regex::new(r"(?m)^#[ \t]+(.+?)[ \t\r]*$").ok()).as_ref()?;
    re.captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| truncate_chars(m.as_str(), MAX_TITLE_CHARS).to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MindmapResult {
    pub mindmap: Mindmap,
    pub mermaid: String,
}

pub struct MindmapGenerator {
    llm: LlmClient,
    temperature: f32,
    detail_max_chars: usize,
}

impl MindmapGenerator {
    pub fn new(llm: LlmClient, temperature: f32, detail_max_chars: usize) -> Self {
        Self {
            llm,
            temperature,
            detail_max_chars,
        }
    }

    pub fn build_prompt(data: &Value, title: &str) -> String {
        let data = serde_json::to_string_pretty(data).unwrap_or_default();
        format!(
            r##"基于以下文献提取的信息，生成一个结构化的思维导图数据：

文献标题：{title}

文献数据：
{data}

请生成一个思维导图的JSON结构，包含以下要素：
1. 中心主题（文献标题或主要研究内容）
2. 主要分支（研究方法、关键发现、应用等）
3. 子分支（具体细节）
4. 颜色和样式建议

输出格式：
{{
  "central_topic": "中心主题",
  "branches": [
    {{
      "name": "分支名称",
      "color": "#颜色代码",
      "children": [
        {{
          "name": "子分支名称",
          "details": ["详细信息1", "详细信息2"]
        }}
      ]
    }}
  ],
  "summary": "思维导图总结"
}}

只返回JSON格式的结果。"##
        )
    }

    pub async fn generate(&self, data: &Value, title: &str) -> Result<MindmapResult, StructuredOutputError> {
        let request = CompletionRequest::new(Self::build_prompt(data, title)).with_temperature(self.temperature);
        let raw = self.llm.ask(&request).await;

        let mut mindmap: Mindmap = parse_json(&raw)?;
        if mindmap.central_topic.trim().is_empty() {
            mindmap.central_topic = title.to_string();
        }
        let mermaid = mindmap.to_mermaid(self.detail_max_chars);
        info!("✅ 思维导图生成成功: {} 个分支", mindmap.branches.len());

        Ok(MindmapResult { mindmap, mermaid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{self, ScriptedModel};
    use serde_json::json;

    fn sample() -> Mindmap {
        serde_json::from_value(json!({
            "central_topic": "PIL electrolytes",
            "branches": [
                {
                    "name": "Methods",
                    "color": "#ff0000",
                    "children": [
                        {"name": "Synthesis", "details": ["RAFT", "a detail that is far too long to show"]}
                    ]
                },
                {"name": "", "children": [{"details": "25 °C"}]}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn mermaid_outline_is_indented_by_depth() {
        let expected = "mindmap\n  root((PIL electrolytes))\n    Methods\n      Synthesis\n        RAFT\n    分支2\n      子分支1\n        25 °C";
        assert_eq!(sample().to_mermaid(20), expected);
    }

    #[test]
    fn empty_mindmap_uses_default_topic() {
        assert_eq!(Mindmap::default().to_mermaid(20), "mindmap\n  root((文献分析))");
    }

    #[test]
    fn title_is_first_level_one_heading() {
        let text = "## Not this\n# Poly(ionic liquid) electrolytes  \n# Second";
        assert_eq!(document_title(text).as_deref(), Some("Poly(ionic liquid) electrolytes"));
        assert_eq!(document_title("no heading here"), None);
    }

    #[tokio::test]
    async fn blank_topic_falls_back_to_title() {
        let model = ScriptedModel::with_replies(["```json\n{\"central_topic\": \"\", \"branches\": []}\n```"]);
        let generator = MindmapGenerator::new(testing::client(&model), 0.3, 20);

        let result = generator.generate(&json!({"a": 1}), "paper.pdf").await.unwrap();
        assert_eq!(result.mindmap.central_topic, "paper.pdf");
        assert_eq!(result.mermaid, "mindmap\n  root((paper.pdf))");
    }

    #[test]
    fn prompt_carries_the_color_field_example() {
        let prompt = MindmapGenerator::build_prompt(&json!({"title": "PIL"}), "PIL electrolytes");
        assert!(prompt.contains("文献标题：PIL electrolytes"));
        assert!(prompt.contains("\"color\": \"#颜色代码\""));
        assert!(prompt.ends_with("只返回JSON格式的结果。"));
    }

    #[test]
    fn null_names_fall_back_to_positional_labels() {
        let mindmap: Mindmap = serde_json::from_value(json!({
            "central_topic": null,
            "branches": [
                {"name": null, "color": null, "children": [{"name": null, "details": ["RAFT"]}, null]},
                "stray text",
                {"name": "Findings", "children": null}
            ],
            "summary": null
        }))
        .unwrap();

        assert_eq!(mindmap.branches.len(), 2);
        assert_eq!(
            mindmap.to_mermaid(20),
            "mindmap\n  root((文献分析))\n    分支1\n      子分支1\n        RAFT\n    Findings"
        );
    }

    #[tokio::test]
    async fn prose_reply_is_an_error() {
        let model = ScriptedModel::with_replies(["I cannot draw mind maps."]);
        let generator = MindmapGenerator::new(testing::client(&model), 0.3, 20);

        assert!(generator.generate(&json!({}), "t").await.is_err());
    }
}
