use std::path::PathBuf;

use serde_json::Value;
use tracing::{info, warn};

use crate::llm::{encode_images, extract_json, CompletionRequest, LlmClient, StructuredOutputError};

use super::prompt_generator::PromptTemplate;

const IMAGE_SYSTEM_PROMPT: &str =
    "You are a precise extractor for academic literature with image analysis capabilities.";
const TEXT_SYSTEM_PROMPT: &str = "You are a precise extractor for academic literature and an expert assistant.";

/// 按动态模板提取任意结构的信息
pub struct GeneralExtractor {
    llm: LlmClient,
    max_images: usize,
    temperature: f32,
}

impl GeneralExtractor {
    pub fn new(llm: LlmClient, max_images: usize, temperature: f32) -> Self {
        Self {
            llm,
            max_images,
            temperature,
        }
    }

    pub async fn extract(
        &self,
        template: &PromptTemplate,
        content: &str,
        images: &[PathBuf],
    ) -> Result<Value, StructuredOutputError> {
        let prompt = template.render(content);

        let selected = &images[..images.len().min(self.max_images)];
        let encoded = encode_images(selected);
        if !encoded.is_empty() {
            info!("🖼️ 结合 {} 张图片提取信息...", encoded.len());
            let request = CompletionRequest::new(prompt.clone())
                .with_system(IMAGE_SYSTEM_PROMPT)
                .with_temperature(self.temperature)
                .with_images(encoded);
            match extract_json(&self.llm.ask(&request).await) {
                Ok(value) => return Ok(value),
                Err(e) => warn!("图片增强提取失败，改用纯文本提取: {}", e),
            }
        }

        let request = CompletionRequest::new(prompt)
            .with_system(TEXT_SYSTEM_PROMPT)
            .with_temperature(self.temperature);
        extract_json(&self.llm.ask(&request).await)
    }
}
