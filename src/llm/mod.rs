//! 大模型调用：统一的请求类型、单次调用 trait 与共享重试策略。

pub mod chat;
pub mod json;

#[cfg(test)]
pub mod testing;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::LlmConfig;

pub use chat::ChatCompletionsBackend;
pub use json::{extract_json, parse_json, StructuredOutputError};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a precise extractor for scientific literature and an expert chemist \
specializing in polyionic liquids and molecular structures.";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API 返回错误 {status}: {body}")]
    Api { status: u16, body: String },
}

/// 随请求发送的图片（base64）
#[derive(Debug, Clone)]
pub struct ImageInput {
    pub media_type: &'static str,
    pub data: String,
}

impl ImageInput {
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self {
            media_type: media_type_for(path),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        })
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

fn media_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// 逐个编码图片，编码失败的单张图片只记录日志
pub fn encode_images(paths: &[impl AsRef<Path>]) -> Vec<ImageInput> {
    paths
        .iter()
        .filter_map(|path| {
            let path = path.as_ref();
            match ImageInput::from_path(path) {
                Ok(image) => Some(image),
                Err(e) => {
                    warn!("图片编码失败 {}: {}", path.display(), e);
                    None
                }
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub images: Vec<ImageInput>,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
            prompt: prompt.into(),
            images: Vec::new(),
            temperature: 0.2,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_images(mut self, images: Vec<ImageInput>) -> Self {
        self.images = images;
        self
    }
}

/// 单次调用，不含重试
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;

    fn model_id(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            delay: Duration::from_secs(config.retry_delay_secs),
        }
    }

    pub fn with_attempts(self, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..self
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// 各阶段共享的模型句柄：重试耗尽后返回空字符串，由调用方按自身策略处理
#[derive(Clone)]
pub struct LlmClient {
    model: Arc<dyn LanguageModel>,
    retry: RetryPolicy,
}

impl LlmClient {
    pub fn new(model: Arc<dyn LanguageModel>, retry: RetryPolicy) -> Self {
        Self { model, retry }
    }

    pub fn from_config(config: &LlmConfig) -> anyhow::Result<Self> {
        let backend = ChatCompletionsBackend::new(config)?;
        info!("使用模型: {} ({})", backend.model_id(), config.base_url);
        Ok(Self::new(Arc::new(backend), RetryPolicy::from_config(config)))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub async fn ask(&self, request: &CompletionRequest) -> String {
        self.ask_with(request, self.retry).await
    }

    pub async fn ask_with(&self, request: &CompletionRequest, policy: RetryPolicy) -> String {
        for attempt in 1..=policy.max_attempts {
            match self.model.complete(request).await {
                Ok(content) => return content,
                Err(e) => {
                    warn!("模型调用失败 (尝试 {}/{}): {}", attempt, policy.max_attempts, e);
                    if attempt < policy.max_attempts && !policy.delay.is_zero() {
                        tokio::time::sleep(policy.delay).await;
                    }
                }
            }
        }

        warn!("模型调用重试 {} 次后仍失败，返回空结果", policy.max_attempts);
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedModel;
    use super::*;

    #[tokio::test]
    async fn retries_until_a_reply_arrives() {
        let model = ScriptedModel::new();
        model.push_error("timeout");
        model.push_error("502");
        model.push_reply("RELEVANT");
        let client = LlmClient::new(model.clone(), RetryPolicy { max_attempts: 3, delay: Duration::ZERO });

        let reply = client.ask(&CompletionRequest::new("q")).await;
        assert_eq!(reply, "RELEVANT");
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_yield_empty_string() {
        let model = ScriptedModel::new();
        for _ in 0..5 {
            model.push_error("down");
        }
        let client = LlmClient::new(model.clone(), RetryPolicy { max_attempts: 3, delay: Duration::ZERO });

        let reply = client.ask_with(&CompletionRequest::new("q"), client.retry_policy().with_attempts(2)).await;
        assert_eq!(reply, "");
        assert_eq!(model.calls(), 2);
    }

    #[test]
    fn encodes_images_and_skips_unreadable_ones() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("fig1.PNG");
        std::fs::write(&png, [0x89, b'P', b'N', b'G']).unwrap();
        let missing = dir.path().join("missing.jpg");

        let images = encode_images(&[png, missing][..]);
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].media_type, "image/png");
        assert!(images[0].data_url().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn retry_policy_never_drops_below_one_attempt() {
        let policy = RetryPolicy::default().with_attempts(0);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.delay, Duration::from_secs(5));
    }
}
