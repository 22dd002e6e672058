pub mod keywords;

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::utils::PipelineError;

pub use keywords::{KeywordConfig, KEYWORDS_PATH};

pub const SETTINGS_PATH: &str = "config/settings.toml";
pub const ENV_PREFIX: &str = "PILMINE";

/// 模板中的占位密钥，视同未配置
const TEMPLATE_API_KEY: &str = "your-api-key";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub parser: ParserConfig,
    pub pipeline: PipelineConfig,
    pub agent: AgentConfig,
}

/// 大模型服务（OpenAI 兼容接口）
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub proxy: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub classification_retries: u32,
}

/// 文档解析服务及其输出目录约定
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ParserConfig {
    pub api_key: String,
    pub base_url: String,
    pub text_file: String,
    pub images_dir: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub base_dir: String,
    pub batch_size: usize,
    pub cooldown_secs: u64,
    pub max_images_per_call: usize,
    pub max_images_per_document: usize,
    pub min_abstract_chars: usize,
    pub fallback_abstract_chars: usize,
    pub output_suffix: String,
    pub merged_file_name: String,
    pub extraction_temperature: f32,
    pub classification_temperature: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    pub output_dir: String,
    pub max_images: usize,
    pub batch_size: usize,
    pub cooldown_secs: u64,
    pub temperature: f32,
    pub prompt_temperature: f32,
    pub mindmap_detail_max_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            proxy: String::new(),
            timeout_secs: 180,
            max_retries: 3,
            retry_delay_secs: 5,
            classification_retries: 2,
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.mineru.com".to_string(),
            text_file: "full.md".to_string(),
            images_dir: "images".to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_dir: "data/parsed".to_string(),
            batch_size: 20,
            cooldown_secs: 15,
            max_images_per_call: 10,
            max_images_per_document: 50,
            min_abstract_chars: 50,
            fallback_abstract_chars: 800,
            output_suffix: "_structure_property.json".to_string(),
            merged_file_name: "complete_structure_property_database.json".to_string(),
            extraction_temperature: 0.2,
            classification_temperature: 0.1,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            output_dir: "data/agent_results".to_string(),
            max_images: 5,
            batch_size: 5,
            cooldown_secs: 10,
            temperature: 0.2,
            prompt_temperature: 0.3,
            mindmap_detail_max_chars: 20,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_from(SETTINGS_PATH)
    }

    /// 默认值 < 配置文件 < 环境变量（PILMINE_LLM__API_KEY 形式）
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("读取配置失败: {}", path.display()))?;

        settings
            .try_deserialize()
            .with_context(|| format!("配置格式错误: {}", path.display()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn llm_key_configured(&self) -> bool {
        let key = self.llm.api_key.trim();
        !key.is_empty() && key != TEMPLATE_API_KEY
    }

    /// 所有阶段都依赖大模型，缺少密钥时拒绝启动
    pub fn require_llm_credentials(&self) -> Result<(), PipelineError> {
        if self.llm_key_configured() {
            Ok(())
        } else {
            Err(PipelineError::Config(format!(
                "未配置大模型 API 密钥，请在 {} 的 [llm] api_key 中设置，或设置环境变量 {}_LLM__API_KEY",
                SETTINGS_PATH, ENV_PREFIX
            )))
        }
    }

    pub fn missing_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.llm_key_configured() {
            missing.push("llm.api_key");
        }
        if self.parser.api_key.trim().is_empty() {
            missing.push("parser.api_key");
        }
        missing
    }

    /// 配置状态摘要，密钥只显示前缀
    pub fn status_lines(&self) -> Vec<String> {
        vec![
            format!("LLM API Key: {}", mask_key(&self.llm.api_key)),
            format!("LLM Base URL: {}", self.llm.base_url),
            format!("LLM Model: {}", self.llm.model),
            format!("Parser API Key: {}", mask_key(&self.parser.api_key)),
            format!("Parser Base URL: {}", self.parser.base_url),
            format!("Parsed documents: {}", self.pipeline.base_dir),
        ]
    }
}

fn mask_key(key: &str) -> String {
    let key = key.trim();
    if key.is_empty() || key == TEMPLATE_API_KEY {
        return "未配置".to_string();
    }
    let prefix: String = key.chars().take(8).collect();
    format!("{}...", prefix)
}
