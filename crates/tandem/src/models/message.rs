use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::content::{Content, ToolCall, ToolOutput};

/// An opaque provider-native payload, kept verbatim.
///
/// Only the provider that produced it can interpret it; the core carries
/// it so a follow-up request to the same provider can resume with exact
/// fidelity. JSON payloads stay structured; anything else travels as
/// base64 bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "lowercase")]
pub enum RawMessage {
    Json { value: Value },
    Bytes { data: String },
}

impl RawMessage {
    pub fn json(value: Value) -> Self {
        RawMessage::Json { value }
    }

    pub fn bytes(data: &[u8]) -> Self {
        RawMessage::Bytes {
            data: BASE64.encode(data),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            RawMessage::Json { value } => Some(value),
            RawMessage::Bytes { .. } => None,
        }
    }

    pub fn decode_bytes(&self) -> Option<Vec<u8>> {
        match self {
            RawMessage::Bytes { data } => BASE64.decode(data).ok(),
            RawMessage::Json { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMessage {
    pub content: Content,
}

impl SystemMessage {
    pub fn new<S: Into<String>>(text: S) -> Self {
        Self {
            content: Content::text(text),
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_text().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMessage {
    pub content: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl UserMessage {
    pub fn new(content: Vec<Content>) -> Self {
        Self {
            content,
            name: None,
        }
    }

    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::new(vec![Content::text(text)])
    }

    pub fn with_content(mut self, content: Content) -> Self {
        self.content.push(content);
        self
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn tool_outputs(&self) -> Vec<&ToolOutput> {
        self.content
            .iter()
            .filter_map(|c| c.as_tool_output())
            .collect()
    }
}

/// The message a provider adapter builds from a decoded native payload.
///
/// `content`, `provider_id`, and `model_id` are the canonical fields every
/// adapter must populate; `raw_message` is the optional opaque escape
/// hatch for same-provider resumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantMessage {
    pub content: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_model_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_message: Option<RawMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl AssistantMessage {
    pub fn new(content: Vec<Content>) -> Self {
        Self {
            content,
            provider_id: None,
            model_id: None,
            provider_model_name: None,
            raw_message: None,
            name: None,
        }
    }

    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::new(vec![Content::text(text)])
    }

    pub fn with_content(mut self, content: Content) -> Self {
        self.content.push(content);
        self
    }

    pub fn with_provenance<P, M, N>(
        mut self,
        provider_id: P,
        model_id: M,
        provider_model_name: N,
    ) -> Self
    where
        P: Into<String>,
        M: Into<String>,
        N: Into<String>,
    {
        self.provider_id = Some(provider_id.into());
        self.model_id = Some(model_id.into());
        self.provider_model_name = Some(provider_model_name.into());
        self
    }

    pub fn with_raw_message(mut self, raw: RawMessage) -> Self {
        self.raw_message = Some(raw);
        self
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Every tool call in this message, in the order the model emitted
    /// them.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.content
            .iter()
            .filter_map(|c| c.as_tool_call())
            .collect()
    }

    /// Concatenation of all text parts.
    pub fn text_joined(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| c.as_text())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// A message to or from a model, tagged by role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System(SystemMessage),
    User(UserMessage),
    Assistant(AssistantMessage),
}

impl Message {
    pub fn system<S: Into<String>>(text: S) -> Self {
        Message::System(SystemMessage::new(text))
    }

    pub fn user<S: Into<String>>(text: S) -> Self {
        Message::User(UserMessage::text(text))
    }

    pub fn assistant<S: Into<String>>(text: S) -> Self {
        Message::Assistant(AssistantMessage::text(text))
    }

    pub fn as_system(&self) -> Option<&SystemMessage> {
        match self {
            Message::System(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_user(&self) -> Option<&UserMessage> {
        match self {
            Message::User(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match self {
            Message::Assistant(m) => Some(m),
            _ => None,
        }
    }
}

impl From<SystemMessage> for Message {
    fn from(message: SystemMessage) -> Self {
        Message::System(message)
    }
}

impl From<UserMessage> for Message {
    fn from(message: UserMessage) -> Self {
        Message::User(message)
    }
}

impl From<AssistantMessage> for Message {
    fn from(message: AssistantMessage) -> Self {
        Message::Assistant(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_tags() -> anyhow::Result<()> {
        let messages = vec![
            Message::system("be brief"),
            Message::user("hi"),
            Message::assistant("hello"),
        ];
        let serialized = serde_json::to_string(&messages)?;
        let values: Vec<Value> = serde_json::from_str(&serialized)?;
        let roles: Vec<&str> = values.iter().map(|v| v["role"].as_str().unwrap()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);

        let deserialized: Vec<Message> = serde_json::from_str(&serialized)?;
        assert_eq!(messages, deserialized);
        Ok(())
    }

    #[test]
    fn test_assistant_builder() {
        let message = AssistantMessage::new(vec![
            Content::text("Calling a tool."),
            Content::tool_call("c1", "search", "{}"),
        ])
        .with_provenance("acme", "acme:fast-1", "fast-1-2025")
        .with_raw_message(RawMessage::json(json!({"native": true})));

        assert_eq!(message.tool_calls().len(), 1);
        assert_eq!(message.tool_calls()[0].id, "c1");
        assert_eq!(message.text_joined(), "Calling a tool.");
        assert_eq!(message.provider_id.as_deref(), Some("acme"));
        assert_eq!(
            message.raw_message.as_ref().unwrap().as_json().unwrap()["native"],
            json!(true)
        );
    }

    #[test]
    fn test_raw_message_bytes_roundtrip() {
        let raw = RawMessage::bytes(b"\x00\x01binary");
        let serialized = serde_json::to_string(&raw).unwrap();
        let back: RawMessage = serde_json::from_str(&serialized).unwrap();
        assert_eq!(back.decode_bytes().unwrap(), b"\x00\x01binary");
    }

    #[test]
    fn test_raw_message_survives_message_roundtrip() {
        let message = Message::Assistant(
            AssistantMessage::text("ok").with_raw_message(RawMessage::json(json!({
                "vendor_field": [1, 2, 3]
            }))),
        );
        let serialized = serde_json::to_string(&message).unwrap();
        let back: Message = serde_json::from_str(&serialized).unwrap();
        assert_eq!(message, back);
    }

    #[test]
    fn test_user_tool_outputs() {
        let message = UserMessage::new(vec![
            Content::tool_output("c1", "search", json!("found")),
            Content::text("continue"),
        ]);
        assert_eq!(message.tool_outputs().len(), 1);
        assert_eq!(message.tool_outputs()[0].id, "c1");
    }
}
