use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::storage::{read_json, write_json_atomic};
use crate::utils::PipelineResult;

use super::schema::{ArticleType, MaterialRecord};

const PURPOSE: &str = "Filtered structure-property relationship database for polyionic liquid inverse design";
const FILTERING_CRITERIA: [&str; 4] = [
    "Abstracts must contain polyionic liquid (PIL) keywords",
    "Must be relevant to lithium-ion battery applications",
    "Review articles extract multiple materials",
    "Research articles extract single materials",
];

/// 单篇输出文件：新格式总是数组，旧文件可能是单个对象
#[derive(Deserialize)]
#[serde(untagged)]
enum OutputFile {
    Many(Vec<MaterialRecord>),
    One(Box<MaterialRecord>),
}

impl OutputFile {
    fn into_records(self) -> Vec<MaterialRecord> {
        match self {
            Self::Many(records) => records,
            Self::One(record) => vec![*record],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleTypeBreakdown {
    pub review_articles: usize,
    pub research_articles: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub creation_date: String,
    pub total_records: usize,
    pub article_type_breakdown: ArticleTypeBreakdown,
    pub records_with_smiles: usize,
    pub total_smiles_extracted: usize,
    pub ml_ready_records: usize,
    pub structure_completeness_ratio: f64,
    pub purpose: String,
    pub filtering_criteria: Vec<String>,
    pub source_files: usize,
    pub skipped_files: usize,
}

impl DatabaseInfo {
    fn compute(data: &[MaterialRecord], source_files: usize, skipped_files: usize) -> Self {
        let mut breakdown = ArticleTypeBreakdown::default();
        let mut records_with_smiles = 0;
        let mut total_smiles_extracted = 0;
        let mut ml_ready_records = 0;

        for record in data {
            match record.article_type() {
                ArticleType::Review => breakdown.review_articles += 1,
                ArticleType::Research => breakdown.research_articles += 1,
                ArticleType::Unknown => {}
            }
            if let Some(completeness) = &record.structure_completeness {
                total_smiles_extracted += completeness.filled_smiles_count;
                if completeness.filled_smiles_count > 0 {
                    records_with_smiles += 1;
                }
                if completeness.ready_for_ml {
                    ml_ready_records += 1;
                }
            }
        }

        let structure_completeness_ratio = if data.is_empty() {
            0.0
        } else {
            ml_ready_records as f64 / data.len() as f64
        };

        Self {
            creation_date: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            total_records: data.len(),
            article_type_breakdown: breakdown,
            records_with_smiles,
            total_smiles_extracted,
            ml_ready_records,
            structure_completeness_ratio,
            purpose: PURPOSE.to_string(),
            filtering_criteria: FILTERING_CRITERIA.iter().map(|c| c.to_string()).collect(),
            source_files,
            skipped_files,
        }
    }
}

/// 合并后的数据库文件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Corpus {
    pub database_info: DatabaseInfo,
    pub data: Vec<MaterialRecord>,
}

/// 汇总所有单篇输出。每次运行都从头扫描，只读单篇文件，只写合并文件。
pub struct CorpusAggregator {
    output_suffix: String,
    merged_file_name: String,
}

impl CorpusAggregator {
    pub fn new(output_suffix: impl Into<String>, merged_file_name: impl Into<String>) -> Self {
        Self {
            output_suffix: output_suffix.into(),
            merged_file_name: merged_file_name.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.output_suffix.clone(), config.merged_file_name.clone())
    }

    pub fn merged_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.merged_file_name)
    }

    /// 每个子目录只取第一个匹配的输出文件（按文件名排序）
    fn find_output(&self, dir: &Path) -> Option<PathBuf> {
        let mut matches: Vec<PathBuf> = fs::read_dir(dir)
            .ok()?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|name| name.ends_with(&self.output_suffix))
            })
            .collect();
        matches.sort();
        matches.into_iter().next()
    }

    pub fn collect(&self, base_dir: &Path) -> PipelineResult<Corpus> {
        let mut dirs: Vec<PathBuf> = fs::read_dir(base_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();

        let mut data = Vec::new();
        let mut source_files = 0;
        let mut skipped_files = 0;

        for dir in &dirs {
            let Some(path) = self.find_output(dir) else {
                continue;
            };
            match read_json::<OutputFile>(&path) {
                Ok(file) => {
                    source_files += 1;
                    data.extend(file.into_records());
                }
                Err(e) => {
                    warn!("❌ 读取失败，跳过 {}: {}", path.display(), e);
                    skipped_files += 1;
                }
            }
        }

        let database_info = DatabaseInfo::compute(&data, source_files, skipped_files);
        Ok(Corpus { database_info, data })
    }

    pub fn write(&self, base_dir: &Path, corpus: &Corpus) -> PipelineResult<PathBuf> {
        let path = self.merged_path(base_dir);
        write_json_atomic(&path, corpus)?;
        Ok(path)
    }

    pub fn aggregate(&self, base_dir: &Path) -> PipelineResult<PathBuf> {
        let corpus = self.collect(base_dir)?;
        let path = self.write(base_dir, &corpus)?;
        log_corpus(&path, &corpus.database_info);
        Ok(path)
    }
}

fn log_corpus(path: &Path, info: &DatabaseInfo) {
    info!("🎯 结构-性质数据库已生成: {}", path.display());
    info!("📊 总记录数: {} (来自 {} 个文件)", info.total_records, info.source_files);
    info!("📚 综述记录: {}", info.article_type_breakdown.review_articles);
    info!("📄 研究论文记录: {}", info.article_type_breakdown.research_articles);
    info!("🧬 含 SMILES 的记录: {}", info.records_with_smiles);
    info!("🔬 SMILES 总数: {}", info.total_smiles_extracted);
    info!(
        "🤖 可用于机器学习: {} ({:.1}%)",
        info.ml_ready_records,
        info.structure_completeness_ratio * 100.0
    );
    if info.skipped_files > 0 {
        warn!("⚠️ {} 个文件无法读取，已跳过", info.skipped_files);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::field::Field;
    use crate::pipeline::schema::ProcessingMetadata;

    const SUFFIX: &str = "_structure_property.json";

    fn record(name: &str, article_type: ArticleType, smiles: &[&str]) -> MaterialRecord {
        let mut record = MaterialRecord::default();
        record.meta.name = Field::known(name);
        let structures = &mut record.molecular_structures;
        let slots = [
            &mut structures.polymer_backbone,
            &mut structures.ionic_liquid_cation,
            &mut structures.anion,
        ];
        for (slot, smiles) in slots.into_iter().zip(smiles) {
            slot.smiles = Field::known(*smiles);
        }
        record.finalize(ProcessingMetadata {
            article_type,
            is_review: article_type.is_review(),
            ..ProcessingMetadata::default()
        });
        record
    }

    fn write_output(base: &Path, doc: &str, records: &[MaterialRecord]) {
        let dir = base.join(doc);
        fs::create_dir_all(&dir).unwrap();
        write_json_atomic(&dir.join(format!("{}{}", doc, SUFFIX)), records).unwrap();
    }

    fn aggregator() -> CorpusAggregator {
        CorpusAggregator::new(SUFFIX, "merged.json")
    }

    #[test]
    fn totals_are_the_sum_of_every_file() {
        let base = tempfile::tempdir().unwrap();
        write_output(
            base.path(),
            "review",
            &[
                record("A", ArticleType::Review, &["C=C", "C[n+]1ccn(C)c1"]),
                record("B", ArticleType::Review, &["C=C"]),
                record("C", ArticleType::Review, &[]),
            ],
        );
        write_output(base.path(), "paper1", &[record("D", ArticleType::Research, &["C", "CC", "CCC"])]);
        write_output(base.path(), "paper2", &[record("E", ArticleType::Research, &[])]);
        fs::create_dir_all(base.path().join("unprocessed")).unwrap();

        let corpus = aggregator().collect(base.path()).unwrap();
        let info = &corpus.database_info;
        assert_eq!(info.total_records, 5);
        assert_eq!(info.article_type_breakdown.review_articles, 3);
        assert_eq!(info.article_type_breakdown.research_articles, 2);
        assert_eq!(info.records_with_smiles, 3);
        assert_eq!(info.total_smiles_extracted, 6);
        assert_eq!(info.ml_ready_records, 2);
        assert!((info.structure_completeness_ratio - 0.4).abs() < 1e-9);
        assert_eq!(info.source_files, 3);
        assert_eq!(info.filtering_criteria.len(), 4);
    }

    #[test]
    fn corrupt_and_legacy_files_do_not_stop_aggregation() {
        let base = tempfile::tempdir().unwrap();
        write_output(base.path(), "good", &[record("A", ArticleType::Research, &[])]);

        let broken = base.path().join("broken");
        fs::create_dir_all(&broken).unwrap();
        fs::write(broken.join(format!("broken{}", SUFFIX)), "{\"meta\": ").unwrap();

        let legacy = base.path().join("legacy");
        fs::create_dir_all(&legacy).unwrap();
        write_json_atomic(
            &legacy.join(format!("legacy{}", SUFFIX)),
            &record("L", ArticleType::Review, &[]),
        )
        .unwrap();

        let corpus = aggregator().collect(base.path()).unwrap();
        assert_eq!(corpus.database_info.total_records, 2);
        assert_eq!(corpus.database_info.skipped_files, 1);
        assert_eq!(corpus.database_info.article_type_breakdown.review_articles, 1);
    }

    #[test]
    fn empty_base_writes_zero_ratio_database() {
        let base = tempfile::tempdir().unwrap();
        let path = aggregator().aggregate(base.path()).unwrap();

        let corpus: Corpus = read_json(&path).unwrap();
        assert_eq!(path, base.path().join("merged.json"));
        assert_eq!(corpus.database_info.total_records, 0);
        assert_eq!(corpus.database_info.structure_completeness_ratio, 0.0);
        assert!(corpus.data.is_empty());
    }

    #[test]
    fn merged_file_keeps_records_in_directory_order() {
        let base = tempfile::tempdir().unwrap();
        write_output(base.path(), "b_doc", &[record("second", ArticleType::Research, &[])]);
        write_output(base.path(), "a_doc", &[record("first", ArticleType::Research, &[])]);

        let path = aggregator().aggregate(base.path()).unwrap();
        let raw: serde_json::Value = read_json(&path).unwrap();
        assert_eq!(raw["data"][0]["meta"]["name"], "first");
        assert_eq!(raw["data"][1]["meta"]["name"], "second");
        assert_eq!(raw["database_info"]["article_type_breakdown"]["research_articles"], 2);
    }
}
