//! 通用文献处理 Agent：按用户需求动态生成提示词，提取信息并生成思维导图。

pub mod extractor;
pub mod mindmap;
pub mod prompt_generator;

pub use extractor::GeneralExtractor;
pub use mindmap::{document_title, Mindmap, MindmapGenerator};
pub use prompt_generator::{PromptGenerator, PromptTemplate};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::generator;
use crate::llm::LlmClient;
use crate::parser::{document_id, ParsedLayout};
use crate::storage::{sanitize_component, write_json_atomic, write_text_atomic};
use crate::utils::{PipelineError, PipelineResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRunInfo {
    pub source: String,
    pub user_requirements: String,
    pub processing_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_index: Option<usize>,
    pub dynamic_prompts: PromptTemplate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    pub processing_info: AgentRunInfo,
    pub extracted_data: Value,
    pub mindmap_data: Option<Mindmap>,
    pub mermaid_code: Option<String>,
}

/// `extracted_information.json` 的内容
#[derive(Serialize)]
struct ExtractedInformation<'a> {
    processing_info: &'a AgentRunInfo,
    extracted_data: &'a Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchInfo {
    pub total_files: usize,
    pub successfully_processed: usize,
    pub user_requirements: String,
    pub processing_time: String,
    pub dynamic_prompts: PromptTemplate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResults {
    pub batch_info: BatchInfo,
    pub results: Vec<DocumentResult>,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub report_dir: PathBuf,
    pub processed: usize,
    pub total: usize,
}

pub struct LiteratureAgent {
    layout: ParsedLayout,
    prompts: PromptGenerator,
    extractor: GeneralExtractor,
    mindmaps: MindmapGenerator,
    batch_size: usize,
    cooldown: Duration,
}

impl LiteratureAgent {
    pub fn new(llm: LlmClient, config: &AppConfig) -> Self {
        let agent = &config.agent;
        Self {
            layout: ParsedLayout::from_config(&config.parser),
            prompts: PromptGenerator::new(llm.clone(), agent.prompt_temperature),
            extractor: GeneralExtractor::new(llm.clone(), agent.max_images, agent.temperature),
            mindmaps: MindmapGenerator::new(llm, agent.prompt_temperature, agent.mindmap_detail_max_chars),
            batch_size: agent.batch_size.max(1),
            cooldown: Duration::from_secs(agent.cooldown_secs),
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub async fn prepare(&self, requirements: &str) -> PipelineResult<PromptTemplate> {
        Ok(self.prompts.generate(requirements).await?)
    }

    /// 提取失败返回错误；思维导图失败只记录警告
    pub async fn analyze(
        &self,
        doc_dir: &Path,
        requirements: &str,
        template: &PromptTemplate,
        batch_index: Option<usize>,
    ) -> PipelineResult<DocumentResult> {
        let Some(doc) = self.layout.load(doc_dir)? else {
            return Err(PipelineError::MissingText(doc_dir.display().to_string()));
        };
        info!("📄 文档长度: {} 字符, 🖼️ 图片: {} 张", doc.text.chars().count(), doc.images.len());

        info!("🔍 提取文献信息...");
        let extracted_data = self.extractor.extract(template, &doc.text, &doc.images).await?;
        info!("✅ 信息提取成功");

        let title = document_title(&doc.text).unwrap_or_else(|| doc.id.clone());
        let (mindmap_data, mermaid_code) = match self.mindmaps.generate(&extracted_data, &title).await {
            Ok(result) => (Some(result.mindmap), Some(result.mermaid)),
            Err(e) => {
                warn!("❌ 思维导图生成失败: {}", e);
                (None, None)
            }
        };

        Ok(DocumentResult {
            processing_info: AgentRunInfo {
                source: doc.dir.display().to_string(),
                user_requirements: requirements.to_string(),
                processing_time: Local::now().to_rfc3339(),
                batch_index,
                dynamic_prompts: template.clone(),
            },
            extracted_data,
            mindmap_data,
            mermaid_code,
        })
    }

    /// 处理单篇文档，返回结果目录
    pub async fn process_single(&self, doc_dir: &Path, requirements: &str, output_dir: &Path) -> PipelineResult<PathBuf> {
        info!("🚀 开始处理: {}", doc_dir.display());
        let template = self.prepare(requirements).await?;
        let result = self.analyze(doc_dir, requirements, &template, None).await?;

        let name = document_id(doc_dir);
        let result_dir = output_dir.join(format!("{}_{}", sanitize_component(&name), timestamp()));
        write_document_outputs(&result_dir, &name, &result)?;
        info!("✅ 处理完成! 结果保存在: {}", result_dir.display());
        Ok(result_dir)
    }

    /// 提示词只生成一次；单篇失败不会中断批处理
    pub async fn process_batch(
        &self,
        doc_dirs: &[PathBuf],
        requirements: &str,
        output_dir: &Path,
    ) -> PipelineResult<BatchOutcome> {
        let total = doc_dirs.len();
        info!("🚀 开始批量处理 {} 篇文档", total);
        let template = self.prepare(requirements).await?;

        let mut results = Vec::new();
        for (index, doc_dir) in doc_dirs.iter().enumerate() {
            let position = index + 1;
            info!("📖 处理文件 {}/{}: {}", position, total, doc_dir.display());

            match self.analyze(doc_dir, requirements, &template, Some(position)).await {
                Ok(result) => {
                    let path = doc_dir.join(format!("processing_result_{}.json", timestamp()));
                    match write_json_atomic(&path, &result) {
                        Ok(()) => info!("  ✅ 处理完成"),
                        Err(e) => warn!("  保存单篇结果失败 {}: {}", path.display(), e),
                    }
                    results.push(result);
                }
                Err(e) => error!("  ❌ 处理失败: {}", e),
            }

            if position % self.batch_size == 0 && position < total && !self.cooldown.is_zero() {
                info!("  ⏸️ 已处理 {} 个文件，暂停 {} 秒", position, self.cooldown.as_secs());
                tokio::time::sleep(self.cooldown).await;
            }
        }

        let batch = BatchResults {
            batch_info: BatchInfo {
                total_files: total,
                successfully_processed: results.len(),
                user_requirements: requirements.to_string(),
                processing_time: Local::now().to_rfc3339(),
                dynamic_prompts: template,
            },
            results,
        };

        let report_dir = output_dir.join(format!("batch_report_{}", timestamp()));
        fs::create_dir_all(&report_dir)?;
        write_json_atomic(&report_dir.join("batch_results.json"), &batch)?;
        write_text_atomic(&report_dir.join("batch_report.md"), &generator::batch_report(&batch))?;

        info!("✅ 批量处理完成! 成功 {}/{}", batch.batch_info.successfully_processed, total);
        info!("📊 批量报告保存在: {}", report_dir.display());
        Ok(BatchOutcome {
            report_dir,
            processed: batch.batch_info.successfully_processed,
            total,
        })
    }
}

fn timestamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

fn write_document_outputs(result_dir: &Path, name: &str, result: &DocumentResult) -> PipelineResult<()> {
    fs::create_dir_all(result_dir)?;
    write_json_atomic(
        &result_dir.join("extracted_information.json"),
        &ExtractedInformation {
            processing_info: &result.processing_info,
            extracted_data: &result.extracted_data,
        },
    )?;
    if let Some(mindmap) = &result.mindmap_data {
        write_json_atomic(&result_dir.join("mindmap.json"), mindmap)?;
    }
    if let Some(mermaid) = &result.mermaid_code {
        write_text_atomic(&result_dir.join("mindmap.mmd"), mermaid)?;
    }
    write_text_atomic(
        &result_dir.join("processing_report.md"),
        &generator::document_report(name, result),
    )?;
    Ok(())
}
