use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{CompletionRequest, LanguageModel, LlmError};
use crate::config::LlmConfig;

/// OpenAI 兼容的 chat/completions 请求体
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

/// 纯文本时直接发送字符串，带图片时发送内容分段
#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct ChatCompletionsBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsBackend {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs));

        if !config.proxy.is_empty() {
            match reqwest::Proxy::all(&config.proxy) {
                Ok(proxy) => {
                    info!("使用代理: {}", config.proxy);
                    builder = builder.proxy(proxy);
                }
                Err(e) => {
                    warn!("代理配置无效 '{}': {}", config.proxy, e);
                }
            }
        }

        let client = builder.build().context("创建 HTTP 客户端失败")?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn build_messages(request: &CompletionRequest) -> Vec<ChatMessage> {
        let user_content = if request.images.is_empty() {
            MessageContent::Text(request.prompt.clone())
        } else {
            let mut parts = vec![ContentPart::Text {
                text: request.prompt.clone(),
            }];
            parts.extend(request.images.iter().map(|image| ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image.data_url(),
                },
            }));
            MessageContent::Parts(parts)
        };

        vec![
            ChatMessage {
                role: "system",
                content: MessageContent::Text(request.system.clone()),
            },
            ChatMessage {
                role: "user",
                content: user_content,
            },
        ]
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            messages: Self::build_messages(request),
            temperature: request.temperature,
        };
        debug!(
            "请求模型 {}: prompt {} 字符, {} 张图片",
            self.model,
            request.prompt.len(),
            request.images.len()
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let chat_response: ChatResponse = response.json().await?;
        Ok(chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
