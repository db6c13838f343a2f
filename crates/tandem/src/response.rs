use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{LlmError, ValidationError};
use crate::models::content::{Content, ToolCall};
use crate::models::format::Format;
use crate::models::message::{AssistantMessage, Message, UserMessage};
use crate::models::tool::ToolSchema;
use crate::models::usage::Usage;
use crate::providers::base::CallRequest;
use crate::structured;

/// Request parameters forwarded to the provider (temperature, max tokens,
/// and the like). Values are primitives or sequences of primitives.
pub type Params = Map<String, Value>;

/// Why the model stopped. `None` on a `Response` means a natural stop.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    MaxTokens,
    Refusal,
}

/// One finished exchange: N input messages plus exactly one assistant
/// message, with full provenance. Immutable once constructed; everything
/// else on it is a derived view.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub provider_id: String,
    pub model_id: String,
    pub provider_model_name: String,
    pub params: Option<Params>,
    pub tools: Vec<ToolSchema>,
    pub format: Option<Format>,
    pub input_messages: Vec<Message>,
    pub assistant_message: AssistantMessage,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<Usage>,
}

impl Response {
    /// The assistant message's content parts.
    pub fn content(&self) -> &[Content] {
        &self.assistant_message.content
    }

    /// Every tool call the model requested, in emission order.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.assistant_message.tool_calls()
    }

    /// Every surfaced thought, in emission order.
    pub fn thoughts(&self) -> Vec<&str> {
        self.assistant_message
            .content
            .iter()
            .filter_map(|c| c.as_thought())
            .collect()
    }

    /// The individual text parts.
    pub fn texts(&self) -> Vec<&str> {
        self.assistant_message
            .content
            .iter()
            .filter_map(|c| c.as_text())
            .collect()
    }

    /// Concatenation of all text parts.
    pub fn text(&self) -> String {
        self.assistant_message.text_joined()
    }

    /// The full message history: input messages plus the assistant
    /// message.
    pub fn messages(&self) -> Vec<Message> {
        let mut messages = self.input_messages.clone();
        messages.push(Message::Assistant(self.assistant_message.clone()));
        messages
    }

    /// Validate the assistant output against the requested format and
    /// return the schema instance.
    pub fn parse(&self) -> Result<Value, LlmError> {
        let format = self.format.as_ref().ok_or_else(|| {
            LlmError::Validation(ValidationError::single(
                "response was produced without a format",
            ))
        })?;
        structured::parse_output(format, &self.assistant_message).map_err(LlmError::Validation)
    }

    /// `parse()` deserialized into a concrete type.
    pub fn parse_into<T: DeserializeOwned>(&self) -> Result<T, LlmError> {
        let value = self.parse()?;
        serde_json::from_value(value).map_err(|e| {
            LlmError::Validation(ValidationError::single(format!(
                "parsed value did not deserialize: {e}"
            )))
        })
    }

    /// Build the continuation request that appends new user content to
    /// this exchange. Returns a fresh request; `self` is not mutated.
    pub fn resume(&self, content: Vec<Content>) -> CallRequest {
        let mut messages = self.messages();
        messages.push(Message::User(UserMessage::new(content)));
        CallRequest {
            model_id: self.model_id.clone(),
            messages,
            tools: self.tools.clone(),
            format: self.format.clone(),
            params: self.params.clone(),
        }
    }
}
