use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::llm::{parse_json, CompletionRequest, LlmClient, StructuredOutputError};
use crate::pipeline::field::lenient_list;

/// 根据用户需求生成的提取模板
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplate {
    pub extraction_prompt: String,
    pub target_json_structure: Value,
    #[serde(deserialize_with = "lenient_list")]
    pub validation_criteria: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pub special_instructions: Vec<String>,
}

impl PromptTemplate {
    pub fn is_usable(&self) -> bool {
        !self.extraction_prompt.trim().is_empty() || !self.target_json_structure.is_null()
    }

    /// 组装针对一篇文档的完整提取提示词
    pub fn render(&self, content: &str) -> String {
        let structure =
            serde_json::to_string_pretty(&self.target_json_structure).unwrap_or_else(|_| "{}".to_string());
        let mut prompt = format!(
            "{}\n\n目标JSON结构：\n{}\n",
            self.extraction_prompt.trim(),
            structure
        );

        if !self.special_instructions.is_empty() {
            prompt.push_str("\n特殊要求：\n");
            for instruction in &self.special_instructions {
                prompt.push_str(&format!("- {}\n", instruction));
            }
        }
        if !self.validation_criteria.is_empty() {
            prompt.push_str("\n验证标准：\n");
            for criterion in &self.validation_criteria {
                prompt.push_str(&format!("- {}\n", criterion));
            }
        }

        prompt.push_str(&format!(
            "\n文献内容：\n\"\"\"{}\"\"\"\n\n请严格按照上述JSON结构提取信息。如果某个字段在文献中没有提及，请使用\"N/A\"作为值。\n只返回JSON格式的结果，不要其他解释。",
            content
        ));
        prompt
    }
}

pub struct PromptGenerator {
    llm: LlmClient,
    temperature: f32,
}

impl PromptGenerator {
    pub fn new(llm: LlmClient, temperature: f32) -> Self {
        Self { llm, temperature }
    }

    pub fn meta_prompt(requirements: &str) -> String {
        format!(
            r#"你是一个专业的提示词工程师，需要根据用户的需求生成用于文献信息提取的提示词。

用户需求：
{requirements}

请生成一个详细的JSON格式提示词模板，用于从学术文献中提取用户所需的信息。

要求：
1. 提示词应该清晰、具体、结构化
2. 返回的JSON结构应该包含用户关心的所有信息字段
3. 考虑不同类型的文献（研究论文、综述等）
4. 包含适当的数据验证和格式要求
5. 提示词应该指导AI提取准确、完整的信息

请生成一个完整的提示词模板，格式如下：
{{
  "extraction_prompt": "详细的提取指令...",
  "target_json_structure": {{}},
  "validation_criteria": ["验证标准1", "验证标准2"],
  "special_instructions": ["特殊指令1", "特殊指令2"]
}}

只返回JSON格式的结果，不要其他解释。"#
        )
    }

    pub async fn generate(&self, requirements: &str) -> Result<PromptTemplate, StructuredOutputError> {
        info!("🧠 根据需求生成提取提示词...");
        let request = CompletionRequest::new(Self::meta_prompt(requirements)).with_temperature(self.temperature);
        let raw = self.llm.ask(&request).await;

        let template: PromptTemplate = parse_json(&raw)?;
        if !template.is_usable() {
            warn!("❌ 提示词模板缺少提取指令和目标结构");
            return Err(StructuredOutputError::NoRecords);
        }
        info!("✅ 提示词生成成功");
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{self, ScriptedModel};
    use serde_json::json;

    #[tokio::test]
    async fn fenced_template_is_parsed() {
        let reply = r#"好的，模板如下：
```json
{
  "extraction_prompt": "Extract the electrolyte composition.",
  "target_json_structure": {"electrolyte": "", "conductivity": ""},
  "validation_criteria": "单位必须是 S/cm",
  "special_instructions": ["保留原文数值"]
}
```"#;
        let model = ScriptedModel::with_replies([reply]);
        let generator = PromptGenerator::new(testing::client(&model), 0.3);

        let template = generator.generate("提取电解质组成和电导率").await.unwrap();
        assert_eq!(template.extraction_prompt, "Extract the electrolyte composition.");
        assert_eq!(template.validation_criteria, vec!["单位必须是 S/cm".to_string()]);
        assert_eq!(model.requests()[0].temperature, 0.3);
        assert!(model.requests()[0].prompt.contains("提取电解质组成和电导率"));
    }

    #[tokio::test]
    async fn empty_template_is_rejected() {
        let model = ScriptedModel::with_replies(["{\"special_instructions\": []}"]);
        let generator = PromptGenerator::new(testing::client(&model), 0.3);

        assert!(matches!(
            generator.generate("anything").await,
            Err(StructuredOutputError::NoRecords)
        ));
    }

    #[test]
    fn render_embeds_structure_and_content() {
        let template = PromptTemplate {
            extraction_prompt: "Extract the key findings.".to_string(),
            target_json_structure: json!({"findings": []}),
            validation_criteria: vec![],
            special_instructions: vec!["Use SI units".to_string()],
        };

        let prompt = template.render("paper body");
        assert!(prompt.starts_with("Extract the key findings."));
        assert!(prompt.contains("\"findings\""));
        assert!(prompt.contains("- Use SI units"));
        assert!(!prompt.contains("验证标准"));
        assert!(prompt.contains("\"\"\"paper body\"\"\""));
    }
}
