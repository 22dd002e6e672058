//! 文档解析结果的目录约定：每篇文档一个目录，内含一个正文文件和 `images/` 子目录。

pub mod image_extractor;
pub mod pdf_parser;

pub use image_extractor::ImageExtractor;
pub use pdf_parser::LocalPdfParser;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::ParserConfig;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// 已加载的一篇文档
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// 文档目录名
    pub id: String,
    pub dir: PathBuf,
    pub text: String,
    pub images: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ParsedLayout {
    pub text_file: String,
    pub images_dir: String,
}

impl Default for ParsedLayout {
    fn default() -> Self {
        Self::from_config(&ParserConfig::default())
    }
}

impl ParsedLayout {
    pub fn from_config(config: &ParserConfig) -> Self {
        Self {
            text_file: config.text_file.clone(),
            images_dir: config.images_dir.clone(),
        }
    }

    pub fn text_path(&self, doc_dir: &Path) -> PathBuf {
        doc_dir.join(&self.text_file)
    }

    pub fn images_path(&self, doc_dir: &Path) -> PathBuf {
        doc_dir.join(&self.images_dir)
    }

    /// 基础目录下的直接子目录，按名称排序
    pub fn document_dirs(&self, base_dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut dirs: Vec<PathBuf> = fs::read_dir(base_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        dirs.sort();
        Ok(dirs)
    }

    /// 正文文件不存在时返回 None
    pub fn read_text(&self, doc_dir: &Path) -> io::Result<Option<String>> {
        let path = self.text_path(doc_dir);
        if !path.is_file() {
            return Ok(None);
        }
        fs::read_to_string(path).map(Some)
    }

    pub fn list_images(&self, doc_dir: &Path) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(self.images_path(doc_dir)) else {
            return Vec::new();
        };
        let mut images: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_image(path))
            .collect();
        images.sort();
        images
    }

    pub fn load(&self, doc_dir: &Path) -> io::Result<Option<ParsedDocument>> {
        let Some(text) = self.read_text(doc_dir)? else {
            return Ok(None);
        };
        Ok(Some(ParsedDocument {
            id: document_id(doc_dir),
            dir: doc_dir.to_path_buf(),
            text,
            images: self.list_images(doc_dir),
        }))
    }
}

pub fn document_id(doc_dir: &Path) -> String {
    doc_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| doc_dir.display().to_string())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_documents_text_and_images() {
        let base = tempfile::tempdir().unwrap();
        let doc = base.path().join("paper_b");
        fs::create_dir_all(doc.join("images")).unwrap();
        fs::create_dir_all(base.path().join("paper_a")).unwrap();
        fs::write(base.path().join("notes.txt"), "not a document").unwrap();
        fs::write(doc.join("full.md"), "# Title\n\nAbstract text").unwrap();
        for name in ["b.PNG", "a.jpg", "c.jpeg", "table.gif", "data.json"] {
            fs::write(doc.join("images").join(name), [0u8]).unwrap();
        }

        let layout = ParsedLayout::default();
        let dirs = layout.document_dirs(base.path()).unwrap();
        assert_eq!(dirs.len(), 2);
        assert!(dirs[0].ends_with("paper_a"));

        let images = layout.list_images(&doc);
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.PNG", "c.jpeg"]);

        let loaded = layout.load(&doc).unwrap().unwrap();
        assert_eq!(loaded.id, "paper_b");
        assert_eq!(loaded.images.len(), 3);
        assert!(layout.load(&dirs[0]).unwrap().is_none());
    }
}
