use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lopdf::Document;
use regex::Regex;
use tracing::{debug, info, warn};

use super::{ImageExtractor, ParsedLayout};
use crate::storage::sanitize_component;

/// 本地解析：把 PDF 转成与远程解析服务相同的目录结构
pub struct LocalPdfParser {
    layout: ParsedLayout,
    images: ImageExtractor,
}

impl LocalPdfParser {
    pub fn new(layout: ParsedLayout) -> Self {
        Self {
            layout,
            images: ImageExtractor::new(),
        }
    }

    /// 在 `out_base` 下创建以 PDF 文件名命名的目录，返回该目录
    pub fn parse(&self, pdf_path: &Path, out_base: &Path) -> Result<PathBuf> {
        info!("解析PDF: {}", pdf_path.display());
        if !pdf_path.is_file() {
            anyhow::bail!("PDF文件不存在: {}", pdf_path.display());
        }

        let stem = pdf_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let doc_dir = out_base.join(sanitize_component(&stem));

        let text = pdf_extract::extract_text(pdf_path)
            .with_context(|| format!("提取PDF文本失败: {}", pdf_path.display()))?;
        info!("提取文本长度: {} 字符", text.chars().count());

        let document = match Document::load(pdf_path) {
            Ok(doc) => Some(doc),
            Err(e) => {
                warn!("无法读取PDF对象，跳过图片提取: {}", e);
                None
            }
        };

        self.write_layout(&doc_dir, &text, document.as_ref())?;
        Ok(doc_dir)
    }

    pub fn write_layout(&self, doc_dir: &Path, text: &str, document: Option<&Document>) -> Result<()> {
        fs::create_dir_all(doc_dir)?;
        fs::write(self.layout.text_path(doc_dir), normalize_text(text))?;

        let images_dir = self.layout.images_path(doc_dir);
        fs::create_dir_all(&images_dir)?;
        if let Some(document) = document {
            match self.images.extract_from(document, &images_dir) {
                Ok(images) => {
                    for image in &images {
                        debug!("第 {} 页图片 {}x{}: {}", image.page, image.width, image.height, image.path.display());
                    }
                }
                Err(e) => warn!("图片提取失败: {}", e),
            }
        }
        Ok(())
    }
}

/// 去掉行尾空白，连续空行压缩为一个，便于按段落定位摘要
fn normalize_text(text: &str) -> String {
    let trimmed_lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    let joined = trimmed_lines.join("\n");
    match Regex::new(r"\n{3,}") {
        Ok(re) => re.replace_all(joined.trim(), "\n\n").into_owned(),
        Err(_) => joined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::image_extractor::tests::sample_document;

    #[test]
    fn collapses_blank_runs() {
        assert_eq!(normalize_text("Title  \n\n\n\nAbstract\nbody \n\n"), "Title\n\nAbstract\nbody");
    }

    #[test]
    fn writes_text_and_images_in_parsed_layout() {
        let base = tempfile::tempdir().unwrap();
        let doc_dir = base.path().join("paper");
        let layout = ParsedLayout::default();
        let parser = LocalPdfParser::new(layout.clone());

        parser
            .write_layout(&doc_dir, "Abstract\nPolymerized ionic liquids...", Some(&sample_document()))
            .unwrap();

        let loaded = layout.load(&doc_dir).unwrap().unwrap();
        assert!(loaded.text.starts_with("Abstract"));
        assert_eq!(loaded.images.len(), 2);
    }

    #[test]
    fn missing_pdf_is_an_error() {
        let base = tempfile::tempdir().unwrap();
        let parser = LocalPdfParser::new(ParsedLayout::default());
        assert!(parser.parse(&base.path().join("absent.pdf"), base.path()).is_err());
    }
}
