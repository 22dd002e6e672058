//! 预筛选：摘要提取、主题相关性与文章类型判断。

use tracing::{debug, info, warn};

use crate::config::{KeywordConfig, PipelineConfig};
use crate::llm::{CompletionRequest, LlmClient, RetryPolicy};
use crate::utils::{preview, truncate_chars};

use super::schema::ArticleType;

const ABSTRACT_MARKER: &str = "abstract";
const ABSTRACT_END_MARKERS: [&str; 7] = [
    "\n\n",
    "\n#",
    "\n##",
    "\nintroduction",
    "\nkeywords",
    "\n1.",
    "\n1 ",
];

/// 摘要提取策略，按顺序尝试
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbstractStrategy {
    /// "abstract" 标记之后到第一个段落/章节分隔符
    Marker,
    /// 文档开头的固定长度
    LeadingText,
}

pub struct AbstractExtractor {
    strategies: Vec<AbstractStrategy>,
    min_chars: usize,
    fallback_chars: usize,
}

impl AbstractExtractor {
    pub fn new(min_chars: usize, fallback_chars: usize) -> Self {
        Self {
            strategies: vec![AbstractStrategy::Marker, AbstractStrategy::LeadingText],
            min_chars,
            fallback_chars,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.min_abstract_chars, config.fallback_abstract_chars)
    }

    /// 所有策略都失败时返回 None，文档应被跳过
    pub fn extract<'a>(&self, content: &'a str) -> Option<&'a str> {
        self.strategies.iter().find_map(|strategy| {
            let candidate = match strategy {
                AbstractStrategy::Marker => self.after_marker(content),
                AbstractStrategy::LeadingText => self.leading_text(content),
            };
            if let Some(text) = candidate {
                debug!("摘要提取策略 {:?} 命中: {} 字符", strategy, text.chars().count());
            }
            candidate
        })
    }

    fn after_marker<'a>(&self, content: &'a str) -> Option<&'a str> {
        // ASCII 小写不改变字节偏移，可直接用于切片原文
        let lower = content.to_ascii_lowercase();
        let start = lower.find(ABSTRACT_MARKER)? + ABSTRACT_MARKER.len();

        let body = &content[start..];
        let skipped = body.len()
            - body
                .trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '.' | '-'))
                .len();
        let body_start = start + skipped;

        let end = ABSTRACT_END_MARKERS
            .iter()
            .filter_map(|marker| lower[body_start..].find(marker))
            .min()
            .map_or(content.len(), |offset| body_start + offset);

        let text = content[body_start..end].trim();
        (text.chars().count() > self.min_chars).then_some(text)
    }

    fn leading_text<'a>(&self, content: &'a str) -> Option<&'a str> {
        (content.chars().count() > self.min_chars)
            .then(|| truncate_chars(content, self.fallback_chars))
    }
}

/// 判定结果及其来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision<T> {
    pub value: T,
    pub source: DecisionSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    Model,
    KeywordFallback,
}

impl std::fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Model => f.write_str("模型"),
            Self::KeywordFallback => f.write_str("关键词兜底"),
        }
    }
}

/// 二选一回答的解析结果；两者都出现或都没出现时为 None
pub fn parse_binary_answer(response: &str, positive: &str, negative: &str) -> Option<bool> {
    let normalized = response
        .to_ascii_uppercase()
        .replace("NOT RELEVANT", "NOT_RELEVANT")
        .replace("NOT-RELEVANT", "NOT_RELEVANT");
    let tokens = normalized
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty());

    let mut saw_positive = false;
    let mut saw_negative = false;
    for token in tokens {
        if token == positive {
            saw_positive = true;
        } else if token == negative {
            saw_negative = true;
        }
    }

    match (saw_positive, saw_negative) {
        (true, false) => Some(true),
        (false, true) => Some(false),
        _ => None,
    }
}

pub struct DocumentFilter {
    llm: LlmClient,
    keywords: KeywordConfig,
    retry: RetryPolicy,
    temperature: f32,
}

impl DocumentFilter {
    pub fn new(llm: LlmClient, keywords: KeywordConfig, classification_retries: u32, temperature: f32) -> Self {
        let retry = llm.retry_policy().with_attempts(classification_retries);
        Self {
            llm,
            keywords,
            retry,
            temperature,
        }
    }

    pub async fn check_relevance(&self, abstract_text: &str) -> Decision<bool> {
        if abstract_text.trim().is_empty() {
            return Decision {
                value: false,
                source: DecisionSource::KeywordFallback,
            };
        }

        let response = self.ask(relevance_prompt(abstract_text)).await;
        match parse_binary_answer(&response, "RELEVANT", "NOT_RELEVANT") {
            Some(value) => Decision {
                value,
                source: DecisionSource::Model,
            },
            None => {
                warn!("相关性回答不明确 '{}'，使用关键词兜底", preview(response.trim(), 60));
                Decision {
                    value: self.keywords.is_relevant(abstract_text),
                    source: DecisionSource::KeywordFallback,
                }
            }
        }
    }

    pub async fn classify(&self, abstract_text: &str) -> Decision<ArticleType> {
        if abstract_text.trim().is_empty() {
            return Decision {
                value: ArticleType::Research,
                source: DecisionSource::KeywordFallback,
            };
        }

        let response = self.ask(classification_prompt(abstract_text)).await;
        let (is_review, source) = match parse_binary_answer(&response, "REVIEW", "RESEARCH") {
            Some(value) => (value, DecisionSource::Model),
            None => {
                warn!("文章类型回答不明确 '{}'，使用关键词兜底", preview(response.trim(), 60));
                (self.keywords.is_review(abstract_text), DecisionSource::KeywordFallback)
            }
        };

        let value = ArticleType::from_review_flag(is_review);
        info!("文章类型: {} ({})", value, source);
        Decision { value, source }
    }

    async fn ask(&self, prompt: String) -> String {
        let request = CompletionRequest::new(prompt).with_temperature(self.temperature);
        self.llm.ask_with(&request, self.retry).await
    }
}

fn relevance_prompt(abstract_text: &str) -> String {
    format!(
        r#"You are an expert in materials science and battery technology. Please analyze the given abstract and determine if it is relevant to "polyionic liquids (PILs) used in lithium-ion batteries".

Abstract to analyze:
"""{abstract_text}"""

Criteria for relevance:
1. The research should involve polyionic liquids (PILs), polymeric ionic liquids, or ionic liquid polymers
2. The application should be related to lithium-ion batteries, energy storage, or electrochemical systems
3. Alternative terms include: polymer electrolytes with ionic liquid components, solid polymer electrolytes with ionic liquids, etc.

Please respond with ONLY one word: "RELEVANT" or "NOT_RELEVANT"

Your answer:"#
    )
}

fn classification_prompt(abstract_text: &str) -> String {
    format!(
        r#"You are an expert in academic literature classification. Please analyze the given abstract and determine if it describes a REVIEW article or a RESEARCH article.

Abstract to analyze:
"""{abstract_text}"""

Criteria for REVIEW articles:
1. Provides an overview, summary, or survey of existing research
2. Discusses multiple studies, methods, or materials from different sources
3. Uses terms like "review", "overview", "survey", "recent advances", "state of the art", "progress", "perspective"
4. Focuses on summarizing and analyzing existing knowledge rather than presenting new experimental results

Criteria for RESEARCH articles:
1. Presents new experimental results, synthesis, or novel findings
2. Describes specific materials, methods, and experimental procedures
3. Reports original data, measurements, or characterizations

Please respond with ONLY one word: "REVIEW" or "RESEARCH"

Your answer:"#
    )
}
