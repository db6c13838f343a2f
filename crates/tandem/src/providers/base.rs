use async_trait::async_trait;

use crate::errors::LlmResult;
use crate::models::format::Format;
use crate::models::message::{AssistantMessage, Message, RawMessage};
use crate::models::tool::ToolSchema;
use crate::models::usage::Usage;
use crate::response::{FinishReason, Params};
use crate::stream::AsyncChunkSource;

/// One logical request, fully normalized: everything a provider adapter
/// needs to issue its native call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    pub model_id: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub format: Option<Format>,
    pub params: Option<Params>,
}

impl CallRequest {
    pub fn new<M: Into<String>>(model_id: M, messages: Vec<Message>) -> Self {
        Self {
            model_id: model_id.into(),
            messages,
            tools: Vec::new(),
            format: None,
            params: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = Some(params);
        self
    }
}

/// What an adapter hands back from one completed native call: the decoded
/// assistant message plus termination and accounting metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderReply {
    pub assistant_message: AssistantMessage,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<Usage>,
}

/// Base trait for provider adapters (OpenAI, Anthropic, etc).
///
/// Implementations own the vendor client. `complete` and `stream` issue
/// one native call; `decode` maps an already-obtained raw payload, so a
/// stored `raw_message` can be reinterpreted without a network round
/// trip.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier, also the scope prefix in `provider:model` ids.
    fn id(&self) -> &str;

    /// The vendor's own name for a scoped model id. Defaults to
    /// stripping this provider's scope prefix.
    fn provider_model_name(&self, model_id: &str) -> String {
        model_id
            .strip_prefix(&format!("{}:", self.id()))
            .unwrap_or(model_id)
            .to_string()
    }

    /// Decode a provider-native payload into the canonical reply shape.
    fn decode(&self, raw: &RawMessage, model_id: &str) -> LlmResult<ProviderReply>;

    /// Issue one native call and return the decoded reply.
    async fn complete(&self, request: &CallRequest) -> LlmResult<ProviderReply>;

    /// Issue one native streaming call. Chunks must be yielded in the
    /// order the vendor emitted them.
    async fn stream(&self, request: &CallRequest) -> LlmResult<AsyncChunkSource>;
}
