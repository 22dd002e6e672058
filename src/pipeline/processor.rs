use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use tracing::{error, info, warn};

use crate::config::{AppConfig, KeywordConfig};
use crate::llm::LlmClient;
use crate::parser::{document_id, ParsedLayout};
use crate::storage::{output_file_name, read_json, write_json_atomic};
use crate::utils::{preview, PipelineResult};

use super::extractor::TextExtractor;
use super::filter::{AbstractExtractor, DocumentFilter};
use super::integrator::ImageIntegrator;
use super::schema::{ArticleType, MaterialRecord, ProcessingMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// 目录中没有正文文件
    MissingText,
    AbstractMissing,
    NotRelevant,
    TextExtractionFailed,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingText => "missing_text",
            Self::AbstractMissing => "abstract_missing",
            Self::NotRelevant => "not_relevant",
            Self::TextExtractionFailed => "text_extraction_failed",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentOutcome {
    /// 输出文件已存在，未做任何处理
    Existing {
        path: PathBuf,
        article_type: ArticleType,
    },
    Finalized {
        path: PathBuf,
        article_type: ArticleType,
        records: usize,
    },
    Skipped(SkipReason),
}

impl DocumentOutcome {
    pub fn output_path(&self) -> Option<&Path> {
        match self {
            Self::Existing { path, .. } | Self::Finalized { path, .. } => Some(path),
            Self::Skipped(_) => None,
        }
    }
}

/// 单篇文档的完整流程：筛选 → 文本提取 → 图片整合 → 写出
pub struct DocumentProcessor {
    layout: ParsedLayout,
    abstracts: AbstractExtractor,
    filter: DocumentFilter,
    extractor: TextExtractor,
    integrator: ImageIntegrator,
    output_suffix: String,
    max_images_per_document: usize,
    batch_size: usize,
    cooldown: Duration,
}

impl DocumentProcessor {
    pub fn new(llm: LlmClient, config: &AppConfig, keywords: KeywordConfig) -> Self {
        let pipeline = &config.pipeline;
        Self {
            layout: ParsedLayout::from_config(&config.parser),
            abstracts: AbstractExtractor::from_config(pipeline),
            filter: DocumentFilter::new(
                llm.clone(),
                keywords,
                config.llm.classification_retries,
                pipeline.classification_temperature,
            ),
            extractor: TextExtractor::new(llm.clone(), pipeline.extraction_temperature),
            integrator: ImageIntegrator::new(llm, pipeline.max_images_per_call, pipeline.extraction_temperature),
            output_suffix: pipeline.output_suffix.clone(),
            max_images_per_document: pipeline.max_images_per_document,
            batch_size: pipeline.batch_size.max(1),
            cooldown: Duration::from_secs(pipeline.cooldown_secs),
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn output_path(&self, doc_dir: &Path) -> PathBuf {
        doc_dir.join(output_file_name(&document_id(doc_dir), &self.output_suffix))
    }

    pub async fn process(&self, doc_dir: &Path) -> PipelineResult<DocumentOutcome> {
        let doc_id = document_id(doc_dir);
        let output_path = self.output_path(doc_dir);

        if output_path.exists() {
            info!("已处理过，跳过: {}", preview(&doc_id, 30));
            let article_type = peek_article_type(&output_path);
            return Ok(DocumentOutcome::Existing {
                path: output_path,
                article_type,
            });
        }

        let Some(text) = self.layout.read_text(doc_dir)? else {
            warn!("未找到 {}: {}", self.layout.text_file, preview(&doc_id, 30));
            return Ok(DocumentOutcome::Skipped(SkipReason::MissingText));
        };
        info!("处理文档: {}", preview(&doc_id, 30));

        let Some(abstract_text) = self.abstracts.extract(&text) else {
            info!("❌ 未找到摘要，跳过");
            return Ok(DocumentOutcome::Skipped(SkipReason::AbstractMissing));
        };
        let abstract_length = abstract_text.chars().count();
        info!("摘要长度: {} 字符", abstract_length);

        let relevance = self.filter.check_relevance(abstract_text).await;
        if !relevance.value {
            info!("❌ 与锂电池聚离子液体无关（{}判定），跳过", relevance.source);
            return Ok(DocumentOutcome::Skipped(SkipReason::NotRelevant));
        }
        info!("✅ 与锂电池聚离子液体相关（{}判定）", relevance.source);

        let article_type = self.filter.classify(abstract_text).await.value;

        let extraction = match self.extractor.extract(&text, article_type).await {
            Ok(extraction) => extraction,
            Err(e) => {
                error!("❌ 文本提取失败: {}", e);
                return Ok(DocumentOutcome::Skipped(SkipReason::TextExtractionFailed));
            }
        };

        let images = self.layout.list_images(doc_dir);
        info!("发现 {} 张图片", images.len());
        let (extraction, images_analyzed, structure_analysis) = if images.is_empty() {
            (extraction, 0, false)
        } else if images.len() > self.max_images_per_document {
            info!(
                "图片数量超过 {} 张，跳过图片整合",
                self.max_images_per_document
            );
            (extraction, 0, false)
        } else {
            let result = self.integrator.integrate(extraction, &images, article_type).await;
            (result.extraction, result.images_sent, result.applied)
        };

        let metadata = ProcessingMetadata {
            processing_date: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            num_images_analyzed: images_analyzed,
            total_images: images.len(),
            includes_structure_analysis: structure_analysis,
            original_folder_name: doc_id,
            article_type,
            is_review: article_type.is_review(),
            abstract_length,
            pils_relevant: true,
            material_index: None,
        };
        let records = finalize_records(extraction.into_records(), &metadata);

        let total_smiles: usize = records
            .iter()
            .filter_map(|r| r.structure_completeness.as_ref())
            .map(|c| c.filled_smiles_count)
            .sum();
        write_json_atomic(&output_path, &records)?;
        info!(
            "✅ 已保存 {} 数据: {} 条记录, {} 个 SMILES",
            article_type,
            records.len(),
            total_smiles
        );

        Ok(DocumentOutcome::Finalized {
            path: output_path,
            article_type,
            records: records.len(),
        })
    }

    /// 逐篇顺序处理；单篇文档的错误只计入失败数
    pub async fn process_all(&self, base_dir: &Path) -> PipelineResult<RunSummary> {
        let dirs = self.layout.document_dirs(base_dir)?;
        let total = dirs.len();
        info!("发现 {} 个文档目录", total);

        let mut summary = RunSummary::default();
        for (index, dir) in dirs.iter().enumerate() {
            let position = index + 1;
            info!("[{}/{}] {}", position, total, dir.display());

            match self.process(dir).await {
                Ok(outcome) => summary.record(&outcome),
                Err(e) => {
                    error!("❌ 处理失败 {}: {}", dir.display(), e);
                    summary.examined += 1;
                    summary.failed += 1;
                }
            }

            if position % self.batch_size == 0 && position < total && !self.cooldown.is_zero() {
                info!("⏸️ 已处理 {} 个目录，暂停 {} 秒", position, self.cooldown.as_secs());
                tokio::time::sleep(self.cooldown).await;
            }
        }

        summary.log();
        Ok(summary)
    }
}

fn finalize_records(records: Vec<MaterialRecord>, metadata: &ProcessingMetadata) -> Vec<MaterialRecord> {
    records
        .into_iter()
        .enumerate()
        .map(|(index, mut record)| {
            let mut info = metadata.clone();
            if metadata.is_review {
                info.material_index = Some(index);
            }
            record.finalize(info);
            record
        })
        .collect()
}

fn peek_article_type(path: &Path) -> ArticleType {
    read_json::<Vec<MaterialRecord>>(path)
        .ok()
        .and_then(|records| records.first().map(MaterialRecord::article_type))
        .unwrap_or_default()
}

/// 一次批处理的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub examined: usize,
    pub finalized: usize,
    pub existing: usize,
    pub review_articles: usize,
    pub research_articles: usize,
    pub missing_text: usize,
    pub abstract_missing: usize,
    pub not_relevant: usize,
    pub extraction_failed: usize,
    pub failed: usize,
    pub outputs: Vec<PathBuf>,
}

impl RunSummary {
    pub fn record(&mut self, outcome: &DocumentOutcome) {
        self.examined += 1;
        match outcome {
            DocumentOutcome::Existing { path, article_type } => {
                self.existing += 1;
                self.count_type(*article_type);
                self.outputs.push(path.clone());
            }
            DocumentOutcome::Finalized { path, article_type, .. } => {
                self.finalized += 1;
                self.count_type(*article_type);
                self.outputs.push(path.clone());
            }
            DocumentOutcome::Skipped(reason) => match reason {
                SkipReason::MissingText => self.missing_text += 1,
                SkipReason::AbstractMissing => self.abstract_missing += 1,
                SkipReason::NotRelevant => self.not_relevant += 1,
                SkipReason::TextExtractionFailed => self.extraction_failed += 1,
            },
        }
    }

    fn count_type(&mut self, article_type: ArticleType) {
        match article_type {
            ArticleType::Review => self.review_articles += 1,
            ArticleType::Research => self.research_articles += 1,
            ArticleType::Unknown => {}
        }
    }

    pub fn has_outputs(&self) -> bool {
        !self.outputs.is_empty()
    }

    pub fn skipped(&self) -> usize {
        self.missing_text + self.abstract_missing + self.not_relevant + self.extraction_failed
    }

    pub fn log(&self) {
        info!("📂 检查目录: {}", self.examined);
        info!("✅ 成功: {} (新处理 {}, 已存在 {})", self.finalized + self.existing, self.finalized, self.existing);
        info!("   📚 综述: {}", self.review_articles);
        info!("   📄 研究论文: {}", self.research_articles);
        info!(
            "⏭️ 跳过: {} (无正文 {}, 无摘要 {}, 不相关 {}, 提取失败 {})",
            self.skipped(),
            self.missing_text,
            self.abstract_missing,
            self.not_relevant,
            self.extraction_failed
        );
        info!("❌ 异常: {}", self.failed);
    }
}
