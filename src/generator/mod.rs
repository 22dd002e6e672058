//! 处理报告的 Markdown 渲染。

use std::fmt::Write;

use crate::agent::{BatchResults, DocumentResult};
use crate::utils::preview;

const DOCUMENT_PREVIEW_CHARS: usize = 500;
const BATCH_PREVIEW_CHARS: usize = 200;

fn status(ok: bool) -> &'static str {
    if ok {
        "✅"
    } else {
        "❌"
    }
}

fn json_preview(value: &serde_json::Value, max_chars: usize) -> String {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_default();
    preview(&pretty, max_chars)
}

/// 单篇文档的 `processing_report.md`
pub fn document_report(name: &str, result: &DocumentResult) -> String {
    let info = &result.processing_info;
    let mut md = String::new();

    md.push_str("# 文献处理报告\n\n");
    md.push_str("## 基本信息\n");
    let _ = writeln!(md, "- **文档**: {}", name);
    let _ = writeln!(md, "- **处理时间**: {}", info.processing_time);
    let _ = writeln!(md, "- **用户需求**: {}\n", info.user_requirements);

    md.push_str("## 处理结果\n");
    let _ = writeln!(md, "- **信息提取**: {}", status(!result.extracted_data.is_null()));
    let _ = writeln!(md, "- **思维导图生成**: {}\n", status(result.mindmap_data.is_some()));

    md.push_str("## 输出文件\n");
    md.push_str("- `extracted_information.json`: 提取的结构化信息\n");
    md.push_str("- `mindmap.json`: 思维导图数据\n");
    md.push_str("- `mindmap.mmd`: Mermaid格式思维导图代码\n\n");

    md.push_str("## 提取到的信息概览\n");
    let _ = writeln!(md, "{}\n", json_preview(&result.extracted_data, DOCUMENT_PREVIEW_CHARS));

    md.push_str("## 思维导图预览\n");
    md.push_str("```mermaid\n");
    let _ = writeln!(md, "{}", result.mermaid_code.as_deref().unwrap_or("思维导图生成失败"));
    md.push_str("```\n");
    md
}

/// 批处理的 `batch_report.md`
pub fn batch_report(batch: &BatchResults) -> String {
    let info = &batch.batch_info;
    let mut md = String::new();

    md.push_str("# 批量文献处理报告\n\n");
    md.push_str("## 基本信息\n");
    let _ = writeln!(md, "- **处理时间**: {}", info.processing_time);
    let _ = writeln!(md, "- **用户需求**: {}", info.user_requirements);
    let _ = writeln!(md, "- **总文件数**: {}", info.total_files);
    let _ = writeln!(md, "- **成功处理**: {}\n", info.successfully_processed);

    md.push_str("## 处理结果概览\n");
    for (i, result) in batch.results.iter().enumerate() {
        let source = std::path::Path::new(&result.processing_info.source)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| result.processing_info.source.clone());
        let _ = writeln!(md, "\n### {}. {}", i + 1, source);
        let _ = writeln!(md, "- **状态**: {}", status(!result.extracted_data.is_null()));
        let _ = writeln!(md, "- **思维导图**: {}", status(result.mindmap_data.is_some()));
        if !result.extracted_data.is_null() {
            let _ = writeln!(
                md,
                "- **提取信息预览**: {}",
                json_preview(&result.extracted_data, BATCH_PREVIEW_CHARS)
            );
        }
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentRunInfo, BatchInfo, PromptTemplate};
    use serde_json::json;

    fn result(source: &str, mermaid: Option<&str>) -> DocumentResult {
        DocumentResult {
            processing_info: AgentRunInfo {
                source: source.to_string(),
                user_requirements: "提取电导率".to_string(),
                processing_time: "2026-01-01T00:00:00+08:00".to_string(),
                batch_index: None,
                dynamic_prompts: PromptTemplate::default(),
            },
            extracted_data: json!({"conductivity": "x".repeat(600)}),
            mindmap_data: None,
            mermaid_code: mermaid.map(str::to_string),
        }
    }

    #[test]
    fn document_report_sections() {
        let report = document_report("paper.pdf", &result("/tmp/paper", Some("mindmap\n  root((A))")));
        assert!(report.starts_with("# 文献处理报告\n"));
        assert!(report.contains("- **文档**: paper.pdf"));
        assert!(report.contains("- **用户需求**: 提取电导率"));
        assert!(report.contains("- **思维导图生成**: ❌"));
        assert!(report.contains("```mermaid\nmindmap\n  root((A))\n```"));
        assert!(report.contains("..."));
    }

    #[test]
    fn document_report_marks_missing_mindmap() {
        let report = document_report("p", &result("p", None));
        assert!(report.contains("```mermaid\n思维导图生成失败\n```"));
    }

    #[test]
    fn batch_report_lists_each_result() {
        let batch = BatchResults {
            batch_info: BatchInfo {
                total_files: 3,
                successfully_processed: 2,
                user_requirements: "req".to_string(),
                processing_time: "now".to_string(),
                dynamic_prompts: PromptTemplate::default(),
            },
            results: vec![result("/data/a_doc", None), result("/data/b_doc", None)],
        };

        let report = batch_report(&batch);
        assert!(report.contains("- **总文件数**: 3"));
        assert!(report.contains("### 1. a_doc"));
        assert!(report.contains("### 2. b_doc"));
        assert_eq!(report.matches("- **提取信息预览**").count(), 2);
    }
}
