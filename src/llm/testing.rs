use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{CompletionRequest, LanguageModel, LlmClient, LlmError, RetryPolicy};

/// 按顺序回放预设回复，并记录收到的请求
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_replies<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let model = Self::new();
        for reply in replies {
            model.push_reply(reply);
        }
        model
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
    }

    pub fn push_error(&self, message: impl Into<String>) {
        self.replies.lock().unwrap().push_back(Err(message.into()));
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(body)) => Err(LlmError::Api { status: 503, body }),
            None => Err(LlmError::Api {
                status: 503,
                body: "no scripted reply left".to_string(),
            }),
        }
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}

/// 不等待、只尝试一次的客户端
pub fn client(model: &Arc<ScriptedModel>) -> LlmClient {
    LlmClient::new(
        model.clone(),
        RetryPolicy {
            max_attempts: 1,
            delay: Duration::ZERO,
        },
    )
}
