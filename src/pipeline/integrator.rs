use std::path::PathBuf;

use tracing::{info, warn};

use crate::llm::{encode_images, CompletionRequest, LlmClient};

use super::extractor::{parse_extraction, Extraction};
use super::schema::ArticleType;

#[derive(Debug)]
pub struct IntegrationResult {
    pub extraction: Extraction,
    /// 实际随请求发送的图片数
    pub images_sent: usize,
    /// 模型补充结果是否被采纳
    pub applied: bool,
}

impl IntegrationResult {
    fn unchanged(extraction: Extraction, images_sent: usize) -> Self {
        Self {
            extraction,
            images_sent,
            applied: false,
        }
    }
}

/// 用文档图片补充文本提取结果。失败时总是退回输入结果。
pub struct ImageIntegrator {
    llm: LlmClient,
    max_images: usize,
    temperature: f32,
}

impl ImageIntegrator {
    pub fn new(llm: LlmClient, max_images: usize, temperature: f32) -> Self {
        Self {
            llm,
            max_images,
            temperature,
        }
    }

    pub async fn integrate(
        &self,
        extraction: Extraction,
        images: &[PathBuf],
        article_type: ArticleType,
    ) -> IntegrationResult {
        if images.is_empty() {
            return IntegrationResult::unchanged(extraction, 0);
        }

        let selected = &images[..images.len().min(self.max_images)];
        let encoded = encode_images(selected);
        if encoded.is_empty() {
            warn!("{} 张图片均无法编码，跳过图片整合", selected.len());
            return IntegrationResult::unchanged(extraction, 0);
        }
        let images_sent = encoded.len();

        let current = match serde_json::to_string_pretty(&extraction) {
            Ok(json) => json,
            Err(e) => {
                warn!("序列化当前结果失败，跳过图片整合: {}", e);
                return IntegrationResult::unchanged(extraction, 0);
            }
        };

        info!("分析 {} 张图片并整合结构/性质数据...", images_sent);
        let request = CompletionRequest::new(Self::build_prompt(&current, article_type))
            .with_temperature(self.temperature)
            .with_images(encoded);
        let raw = self.llm.ask(&request).await;

        match parse_extraction(&raw, article_type) {
            Ok(update) => {
                let mut merged = extraction;
                let materials_added = merged.absorb(update);
                if materials_added > 0 {
                    info!("图片中发现 {} 个新材料", materials_added);
                }
                IntegrationResult {
                    extraction: merged,
                    images_sent,
                    applied: true,
                }
            }
            Err(e) => {
                warn!("图片整合结果解析失败，保留纯文本结果: {}", e);
                IntegrationResult::unchanged(extraction, images_sent)
            }
        }
    }

    pub fn build_prompt(current_json: &str, article_type: ArticleType) -> String {
        if article_type.is_review() {
            format!(
                r#"You are an expert at analyzing scientific figures and integrating molecular structure and property information from REVIEW articles.

I have extracted information from a REVIEW article text, and now I have additional figures/images. Please analyze the images and UPDATE/SUPPLEMENT the existing JSON array with information from the figures.

Current JSON array from text:
{current_json}

Instructions for REVIEW articles:
1. Analyze the provided scientific figures/charts/diagrams from the review
2. Extract comparative data, structure-property relationships, and performance summaries
3. PRIORITY: Look for molecular structures, synthesis schemes, chemical formulas for generating SMILES
4. UPDATE existing materials in the array by filling in "N/A" values where you find corresponding data
5. KEEP every existing material and every existing non-"N/A" value; never replace a value with "N/A"
6. ADD new materials to the END of the array if images show additional PIL structures not captured in text

Return the UPDATED complete JSON array with the same format. Only return the JSON array, no explanations."#
            )
        } else {
            format!(
                r#"You are an expert at analyzing scientific figures and integrating molecular structure and property information.

I have extracted some information from text, and now I have additional figures/images from the same scientific paper. Please analyze the images and UPDATE/SUPPLEMENT the existing JSON data with information from the figures.

Current JSON data from text:
{current_json}

Instructions:
1. Analyze the provided scientific figures/charts/diagrams
2. Extract numerical data, experimental conditions, and material properties
3. PRIORITY: Look for molecular structures, synthesis schemes, chemical formulas, and structural diagrams to generate SMILES strings
4. UPDATE the existing JSON by filling in "N/A" values where you find corresponding data in the images
5. KEEP all existing non-"N/A" values unchanged unless the image provides more precise/complete information
6. If images contain structural data, update the "molecular_structures" section with valid SMILES
7. Look for crystallographic information if any crystal structures are shown

Return the UPDATED complete JSON structure with the same format. Only return the JSON, no explanations."#
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{self, ScriptedModel};
    use crate::pipeline::field::Field;
    use crate::pipeline::schema::MaterialRecord;

    fn write_images(dir: &std::path::Path, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("fig{}.png", i));
                std::fs::write(&path, [0x89, b'P', b'N', b'G', i as u8]).unwrap();
                path
            })
            .collect()
    }

    fn research_record() -> Extraction {
        let mut record = MaterialRecord::default();
        record.meta.name = Field::known("P(VBIm-TFSI)");
        record.electrochemical_properties.ionic_conductivity.value = Field::known("1e-4");
        Extraction::Single(record)
    }

    #[tokio::test]
    async fn no_images_means_no_call() {
        let model = ScriptedModel::new();
        let integrator = ImageIntegrator::new(testing::client(&model), 10, 0.2);

        let result = integrator.integrate(research_record(), &[], ArticleType::Research).await;
        assert_eq!(model.calls(), 0);
        assert!(!result.applied);
        assert_eq!(result.extraction, research_record());
    }

    #[tokio::test]
    async fn unreadable_images_are_skipped_without_a_call() {
        let dir = tempfile::tempdir().unwrap();
        let model = ScriptedModel::new();
        let integrator = ImageIntegrator::new(testing::client(&model), 10, 0.2);

        let missing = vec![dir.path().join("gone.png")];
        let result = integrator.integrate(research_record(), &missing, ArticleType::Research).await;
        assert_eq!(model.calls(), 0);
        assert_eq!(result.images_sent, 0);
    }

    #[tokio::test]
    async fn at_most_max_images_are_sent() {
        let dir = tempfile::tempdir().unwrap();
        let images = write_images(dir.path(), 12);
        let model = ScriptedModel::with_replies(["{\"meta\": {\"name\": \"P(VBIm-TFSI)\"}}"]);
        let integrator = ImageIntegrator::new(testing::client(&model), 10, 0.2);

        let result = integrator.integrate(research_record(), &images, ArticleType::Research).await;
        assert_eq!(result.images_sent, 10);
        assert_eq!(model.requests()[0].images.len(), 10);
        assert!(result.applied);
    }

    #[tokio::test]
    async fn regressions_in_the_reply_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let images = write_images(dir.path(), 2);
        let model = ScriptedModel::with_replies([r#"```json
{"meta": {"name": "N/A"},
 "electrochemical_properties": {"ionic_conductivity": {"value": "N/A", "unit": "S/cm"}},
 "molecular_structures": {"anion": {"smiles": "[N-](S(=O)(=O)C(F)(F)F)S(=O)(=O)C(F)(F)F"}}}
```"#]);
        let integrator = ImageIntegrator::new(testing::client(&model), 10, 0.2);

        let result = integrator.integrate(research_record(), &images, ArticleType::Research).await;
        let record = &result.extraction.records()[0];
        assert_eq!(record.name(), Some("P(VBIm-TFSI)"));
        let conductivity = &record.electrochemical_properties.ionic_conductivity;
        assert_eq!(conductivity.value.as_deref(), Some("1e-4"));
        assert_eq!(conductivity.unit.as_deref(), Some("S/cm"));
        assert!(record.molecular_structures.anion.has_smiles());
    }

    #[tokio::test]
    async fn unparseable_reply_keeps_text_result() {
        let dir = tempfile::tempdir().unwrap();
        let images = write_images(dir.path(), 1);
        let model = ScriptedModel::with_replies(["The figure shows a Nyquist plot."]);
        let integrator = ImageIntegrator::new(testing::client(&model), 10, 0.2);

        let result = integrator.integrate(research_record(), &images, ArticleType::Research).await;
        assert!(!result.applied);
        assert_eq!(result.images_sent, 1);
        assert_eq!(result.extraction, research_record());
    }

    #[tokio::test]
    async fn invalid_reply_is_not_applied_through_a_nested_fragment() {
        let dir = tempfile::tempdir().unwrap();
        let images = write_images(dir.path(), 1);
        let model = ScriptedModel::with_replies([
            "{\"meta\": {\"name\": \"N/A\"}, \"electrochemical_properties\": {\"ionic_conductivity\": {\"value\": \"2e-4\"}},}",
        ]);
        let integrator = ImageIntegrator::new(testing::client(&model), 10, 0.2);

        let result = integrator.integrate(research_record(), &images, ArticleType::Research).await;
        assert!(!result.applied);
        assert_eq!(result.extraction, research_record());
    }
}
