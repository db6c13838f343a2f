use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::errors::{ErrorKind, LlmError, LlmResult, StreamError};
use crate::models::message::{AssistantMessage, RawMessage};
use crate::providers::base::{CallRequest, Provider, ProviderReply};
use crate::stream::{AsyncChunkSource, ChunkItem};

/// A mock provider that returns pre-configured replies for testing.
///
/// Replies and stream scripts are consumed in order; every received
/// request is recorded for assertions. An exhausted reply queue yields an
/// empty assistant message.
pub struct MockProvider {
    id: String,
    replies: Mutex<VecDeque<LlmResult<ProviderReply>>>,
    streams: Mutex<VecDeque<Vec<Result<ChunkItem, StreamError>>>>,
    requests: Mutex<Vec<CallRequest>>,
}

impl MockProvider {
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            replies: Mutex::new(VecDeque::new()),
            streams: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_replies<S: Into<String>>(id: S, replies: Vec<ProviderReply>) -> Self {
        let provider = Self::new(id);
        for reply in replies {
            provider.push_reply(reply);
        }
        provider
    }

    pub fn reply(message: AssistantMessage) -> ProviderReply {
        ProviderReply {
            assistant_message: message,
            finish_reason: None,
            usage: None,
        }
    }

    pub fn reply_text<S: Into<String>>(text: S) -> ProviderReply {
        Self::reply(AssistantMessage::text(text))
    }

    pub fn push_reply(&self, reply: ProviderReply) {
        self.replies.lock().unwrap().push_back(Ok(reply));
    }

    pub fn push_error(&self, error: LlmError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub fn push_stream(&self, items: Vec<Result<ChunkItem, StreamError>>) {
        self.streams.lock().unwrap().push_back(items);
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<CallRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn decode(&self, raw: &RawMessage, model_id: &str) -> LlmResult<ProviderReply> {
        let text = raw
            .as_json()
            .and_then(|value| value["text"].as_str())
            .ok_or_else(|| {
                LlmError::provider(&self.id, ErrorKind::Api, "raw payload missing 'text'")
            })?;
        let message = AssistantMessage::text(text)
            .with_provenance(&self.id, model_id, self.provider_model_name(model_id))
            .with_raw_message(raw.clone());
        Ok(Self::reply(message))
    }

    async fn complete(&self, request: &CallRequest) -> LlmResult<ProviderReply> {
        self.requests.lock().unwrap().push(request.clone());
        let scripted = self.replies.lock().unwrap().pop_front();
        match scripted {
            Some(Ok(mut reply)) => {
                if reply.assistant_message.provider_id.is_none() {
                    reply.assistant_message = reply.assistant_message.with_provenance(
                        &self.id,
                        &request.model_id,
                        self.provider_model_name(&request.model_id),
                    );
                }
                Ok(reply)
            }
            Some(Err(error)) => Err(error),
            None => Ok(Self::reply(
                AssistantMessage::text("").with_provenance(
                    &self.id,
                    &request.model_id,
                    self.provider_model_name(&request.model_id),
                ),
            )),
        }
    }

    async fn stream(&self, request: &CallRequest) -> LlmResult<AsyncChunkSource> {
        self.requests.lock().unwrap().push(request.clone());
        let scripted = self.streams.lock().unwrap().pop_front().ok_or_else(|| {
            LlmError::provider(&self.id, ErrorKind::Api, "no scripted stream available")
        })?;
        Ok(Box::pin(tokio_stream::iter(scripted)))
    }
}
