use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::llm::{extract_json, CompletionRequest, LlmClient, StructuredOutputError};

use super::merge::{merge_material_lists, Merge};
use super::schema::{ArticleType, MaterialRecord};

/// 综述文章期望提取的最少材料数，仅作提示
const REVIEW_EXPECTED_MIN_MATERIALS: usize = 3;

/// 一篇文档的提取结果：研究论文为单条记录，综述为记录数组
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Extraction {
    Single(MaterialRecord),
    Multiple(Vec<MaterialRecord>),
}

impl Extraction {
    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> &[MaterialRecord] {
        match self {
            Self::Single(record) => std::slice::from_ref(record),
            Self::Multiple(records) => records,
        }
    }

    pub fn into_records(self) -> Vec<MaterialRecord> {
        match self {
            Self::Single(record) => vec![record],
            Self::Multiple(records) => records,
        }
    }

    /// 单调地吸收一次补充结果，返回新增的材料数
    pub fn absorb(&mut self, update: Extraction) -> usize {
        match (self, update) {
            (Self::Single(current), Self::Single(newer)) => {
                current.merge_from(newer);
                0
            }
            (Self::Single(current), Self::Multiple(newer)) => {
                if let Some(first) = newer.into_iter().next() {
                    current.merge_from(first);
                }
                0
            }
            (Self::Multiple(current), update) => merge_material_lists(current, update.into_records()),
        }
    }
}

/// 按文章类型解释模型返回的 JSON；顶层不含任何记录分区的对象不算记录
pub fn parse_extraction(raw: &str, article_type: ArticleType) -> Result<Extraction, StructuredOutputError> {
    let records = match extract_json(raw)? {
        Value::Array(items) => items
            .into_iter()
            .filter(MaterialRecord::is_record_like)
            .map(serde_json::from_value::<MaterialRecord>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StructuredOutputError::Shape)?,
        object if MaterialRecord::is_record_like(&object) => {
            vec![serde_json::from_value(object).map_err(StructuredOutputError::Shape)?]
        }
        _ => Vec::new(),
    };

    if records.is_empty() {
        return Err(StructuredOutputError::NoRecords);
    }

    if article_type.is_review() {
        Ok(Extraction::Multiple(records))
    } else {
        if records.len() > 1 {
            warn!("研究论文返回了 {} 条记录，只保留第一条", records.len());
        }
        records
            .into_iter()
            .next()
            .map(Extraction::Single)
            .ok_or(StructuredOutputError::NoRecords)
    }
}

pub struct TextExtractor {
    llm: LlmClient,
    temperature: f32,
}

impl TextExtractor {
    pub fn new(llm: LlmClient, temperature: f32) -> Self {
        Self { llm, temperature }
    }

    pub fn build_prompt(content: &str, article_type: ArticleType) -> String {
        let template = MaterialRecord::prompt_template();
        if article_type.is_review() {
            let target = serde_json::to_string_pretty(&[template]).unwrap_or_default();
            format!(
                r#"You are an expert assistant trained to extract structured data from REVIEW articles on polyionic liquids (PILs) used in lithium-ion batteries.

This is a REVIEW article, so extract ALL mentioned materials, structures, and their properties. Return an array of materials with the same JSON structure format. If a field is not mentioned, use "N/A" as the value.

Target format - Return an ARRAY of materials:
{target}

Content:
"""{content}"""

Special instructions for REVIEW articles:
1. Extract information for ALL mentioned PIL materials and their variants
2. Look for comparative data tables and performance summaries
3. Extract structure-property relationships mentioned in the text
4. Pay attention to different ionic liquid types, polymer backbones, and their combinations
5. Include information about advantages and limitations of each material type
6. Generate SMILES for as many structures as possible from chemical names or descriptions

Return the complete JSON array with all extracted materials. Include at least 3-5 different materials if mentioned in the review.
Only return the JSON array, no explanations."#
            )
        } else {
            let target = serde_json::to_string_pretty(&template).unwrap_or_default();
            format!(
                r#"You are an expert assistant trained to extract structured data from materials science documents, especially on polyionic liquids (PILs) used in lithium-ion batteries.

Extract information from the text content only. If a field is not mentioned in the text, use "N/A" as the value.

Target format:
{target}

Content:
"""{content}"""

Pay special attention to:
1. Chemical names and formulas for SMILES generation
2. Molecular structures and components
3. Any mention of crystallographic data
4. Structural features affecting properties

Only return the filled JSON. Do not include any explanations."#
            )
        }
    }

    pub async fn extract_raw(&self, content: &str, article_type: ArticleType) -> String {
        let request = CompletionRequest::new(Self::build_prompt(content, article_type))
            .with_temperature(self.temperature);
        self.llm.ask(&request).await
    }

    /// 解析失败对该文档是致命的，由调用方记为提取失败
    pub async fn extract(
        &self,
        content: &str,
        article_type: ArticleType,
    ) -> Result<Extraction, StructuredOutputError> {
        let raw = self.extract_raw(content, article_type).await;
        let extraction = parse_extraction(&raw, article_type)?;

        match &extraction {
            Extraction::Multiple(records) => {
                info!("从综述中提取到 {} 个材料", records.len());
                if records.len() < REVIEW_EXPECTED_MIN_MATERIALS {
                    warn!(
                        "综述只提取到 {} 个材料（期望至少 {} 个）",
                        records.len(),
                        REVIEW_EXPECTED_MIN_MATERIALS
                    );
                }
            }
            Extraction::Single(record) => {
                info!("提取到单个材料: {}", record.name().unwrap_or("未命名"));
            }
        }
        Ok(extraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{self, ScriptedModel};
    use crate::pipeline::field::Field;

    #[test]
    fn research_reply_in_code_fence() {
        let raw = "```json\n{\"meta\": {\"name\": \"PDADMA-TFSI\"}}\n```";
        let extraction = parse_extraction(raw, ArticleType::Research).unwrap();
        assert_eq!(extraction.len(), 1);
        assert_eq!(extraction.records()[0].name(), Some("PDADMA-TFSI"));
    }

    #[test]
    fn review_object_is_wrapped_into_a_list() {
        let extraction = parse_extraction("{\"meta\": {\"name\": \"A\"}}", ArticleType::Review).unwrap();
        assert!(matches!(extraction, Extraction::Multiple(ref r) if r.len() == 1));
    }

    #[test]
    fn research_array_keeps_first_record() {
        let raw = "[{\"meta\": {\"name\": \"A\"}}, {\"meta\": {\"name\": \"B\"}}]";
        let extraction = parse_extraction(raw, ArticleType::Research).unwrap();
        assert!(matches!(extraction, Extraction::Single(ref r) if r.name() == Some("A")));
    }

    #[test]
    fn empty_array_and_prose_are_errors() {
        assert!(matches!(
            parse_extraction("[]", ArticleType::Review),
            Err(StructuredOutputError::NoRecords)
        ));
        assert!(matches!(
            parse_extraction("Sorry, I cannot help.", ArticleType::Research),
            Err(StructuredOutputError::NoJson { .. })
        ));
        assert!(matches!(
            parse_extraction("", ArticleType::Research),
            Err(StructuredOutputError::Empty)
        ));
    }

    #[test]
    fn trailing_comma_is_not_salvaged_from_a_nested_object() {
        let raw = r#"{"meta": {"name": "PIL-1", "chemical formula": "C8H11N2"}, "electrochemical_properties": {"ionic_conductivity": {"value": "1e-4"}},}"#;
        assert!(matches!(
            parse_extraction(raw, ArticleType::Research),
            Err(StructuredOutputError::NoJson { .. })
        ));
    }

    #[test]
    fn truncated_reply_is_an_error() {
        let raw = "```json\n{\"meta\": {\"name\": \"P(VBIm-TFSI)\"}, \"molecular_structures\": {\"anion\": {\"smiles\": \"[N-](S(=O)(=O)C(F)";
        assert!(parse_extraction(raw, ArticleType::Research).is_err());
        assert!(parse_extraction(raw, ArticleType::Review).is_err());
    }

    #[test]
    fn objects_without_record_sections_are_not_records() {
        assert!(matches!(
            parse_extraction("{\"name\": \"PIL-1\", \"value\": \"N/A\"}", ArticleType::Research),
            Err(StructuredOutputError::NoRecords)
        ));

        let raw = "[{\"note\": \"table 2\"}, {\"meta\": {\"name\": \"B\"}}]";
        let extraction = parse_extraction(raw, ArticleType::Review).unwrap();
        assert_eq!(extraction.len(), 1);
        assert_eq!(extraction.records()[0].name(), Some("B"));
    }

    #[test]
    fn prompts_embed_schema_by_article_type() {
        let research = TextExtractor::build_prompt("body text", ArticleType::Research);
        assert!(research.contains("\"molecular_structures\""));
        assert!(research.contains("\"\"\"body text\"\"\""));
        assert!(!research.contains("REVIEW"));

        let review = TextExtractor::build_prompt("body text", ArticleType::Review);
        assert!(review.contains("Return an ARRAY of materials"));
        assert!(review.contains("at least 3-5 different materials"));
    }

    #[tokio::test]
    async fn failed_model_call_is_fatal() {
        let model = ScriptedModel::new();
        model.push_error("timeout");
        let extractor = TextExtractor::new(testing::client(&model), 0.2);

        let result = extractor.extract("text", ArticleType::Research).await;
        assert!(matches!(result, Err(StructuredOutputError::Empty)));
    }

    #[test]
    fn absorbing_review_update_appends_new_materials() {
        let mut named = MaterialRecord::default();
        named.meta.name = Field::known("A");
        let mut extraction = Extraction::Multiple(vec![named.clone()]);

        let mut other = MaterialRecord::default();
        other.meta.name = Field::known("B");
        let added = extraction.absorb(Extraction::Multiple(vec![named, other]));

        assert_eq!(added, 1);
        assert_eq!(extraction.len(), 2);
    }
}
