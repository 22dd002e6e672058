use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub const KEYWORDS_PATH: &str = "config/keywords.toml";

/// 相关性与文章类型判断的关键词兜底规则
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KeywordConfig {
    /// 聚离子液体 / 聚合物电解质术语（子串匹配，忽略大小写）
    pub pil_terms: Vec<String>,
    /// 缩写，按整词且区分大小写匹配
    pub pil_acronyms: Vec<String>,
    pub battery_terms: Vec<String>,
    /// 与电池术语同时出现即视为相关
    pub bridge_terms: Vec<String>,
    pub review_phrases: Vec<String>,
}

impl KeywordConfig {
    pub fn load() -> Result<Self> {
        Self::load_from(KEYWORDS_PATH)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: KeywordConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// 有 PIL 术语，或电池术语与桥接术语同时出现
    pub fn is_relevant(&self, abstract_text: &str) -> bool {
        let lower = abstract_text.to_lowercase();

        let has_pil = contains_any(&lower, &self.pil_terms)
            || self
                .pil_acronyms
                .iter()
                .any(|acronym| contains_word(abstract_text, acronym));
        let has_battery = contains_any(&lower, &self.battery_terms);
        let has_bridge = contains_any(&lower, &self.bridge_terms);

        has_pil || (has_battery && has_bridge)
    }

    pub fn is_review(&self, abstract_text: &str) -> bool {
        contains_any(&abstract_text.to_lowercase(), &self.review_phrases)
    }
}

fn contains_any(lower_text: &str, terms: &[String]) -> bool {
    terms
        .iter()
        .any(|term| !term.is_empty() && lower_text.contains(&term.to_lowercase()))
}

fn contains_word(text: &str, word: &str) -> bool {
    !word.is_empty()
        && text
            .split(|c: char| !c.is_alphanumeric())
            .any(|token| token == word)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            pil_terms: strings(&[
                "polyionic liquid",
                "poly ionic liquid",
                "poly(ionic liquid)",
                "polymeric ionic liquid",
                "ionic liquid polymer",
                "polymerized ionic liquid",
                "polymer electrolyte",
                "solid polymer electrolyte",
            ]),
            pil_acronyms: strings(&["PIL", "PILs"]),
            battery_terms: strings(&[
                "lithium",
                "battery",
                "electrolyte",
                "ionic conductivity",
                "electrochemical",
                "energy storage",
                "lithium ion",
                "li-ion",
                "solid electrolyte",
                "separator",
            ]),
            bridge_terms: strings(&["ionic liquid", "polymer"]),
            review_phrases: strings(&[
                "review",
                "overview",
                "survey",
                "perspective",
                "progress",
                "recent advances",
                "recent developments",
                "state of the art",
                "comprehensive",
                "critical review",
                "mini review",
                "brief review",
                "current status",
                "recent progress",
                "advances in",
                "developments in",
            ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pil_terms_alone_are_relevant() {
        let keywords = KeywordConfig::default();
        assert!(keywords.is_relevant("A Polymerized Ionic Liquid membrane for gas separation"));
    }

    #[test]
    fn battery_terms_need_a_bridge_term() {
        let keywords = KeywordConfig::default();
        assert!(keywords.is_relevant("An ionic liquid additive for lithium metal anodes"));
        assert!(!keywords.is_relevant("Cathode coatings for lithium batteries"));
        assert!(!keywords.is_relevant("Ionic liquid solvents in organic synthesis"));
    }

    #[test]
    fn acronyms_match_whole_words_only() {
        let keywords = KeywordConfig::default();
        assert!(keywords.is_relevant("Imidazolium PILs were prepared by RAFT."));
        assert!(!keywords.is_relevant("Capillary flow in pillared clays"));
    }

    #[test]
    fn review_phrases_detected() {
        let keywords = KeywordConfig::default();
        assert!(keywords.is_review("This review summarizes recent progress in PIL electrolytes."));
        assert!(!keywords.is_review("We synthesized a new imidazolium monomer."));
    }

    #[test]
    fn keyword_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keywords.toml");
        std::fs::write(&path, "review_phrases = [\"tutorial\"]\n").unwrap();

        let keywords = KeywordConfig::load_from(&path).unwrap();
        assert!(keywords.is_review("A tutorial on electrolytes"));
        assert!(!keywords.is_review("A review on electrolytes"));
        assert!(!keywords.pil_terms.is_empty());
    }
}
