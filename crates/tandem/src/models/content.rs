use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextContent {
    pub text: String,
}

/// Reasoning the model chose to surface alongside its answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThoughtContent {
    pub thought: String,
}

/// A function invocation requested by the model.
///
/// `args` is the raw JSON argument text exactly as the model produced it.
/// Keeping the text (rather than a parsed value) lets streamed argument
/// deltas concatenate losslessly and lets strict-mode validation see the
/// model's actual output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub args: String,
}

impl ToolCall {
    pub fn new<I, N, A>(id: I, name: N, args: A) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        A: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            args: args.into(),
        }
    }

    /// Create a call with a generated id, for synthetic invocations the
    /// core constructs itself rather than receives from a provider.
    pub fn generated<N, A>(name: N, args: A) -> Self
    where
        N: Into<String>,
        A: Into<String>,
    {
        Self::new(uuid::Uuid::new_v4().to_string(), name, args)
    }
}

/// The result of executing one `ToolCall`, paired by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    pub id: String,
    pub name: String,
    pub value: Value,
}

impl ToolOutput {
    pub fn new<I, N>(id: I, name: N, value: Value) -> Self
    where
        I: Into<String>,
        N: Into<String>,
    {
        Self {
            id: id.into(),
            name: name.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ImageSource {
    Base64 { data: String, mime_type: String },
    Url { url: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AudioSource {
    Base64 { data: String, mime_type: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContent {
    pub source: ImageSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioContent {
    pub source: AudioSource,
}

/// Content passed to or from a model.
///
/// The `type` tag is a stable discriminator preserved across
/// encode/decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Content {
    Text(TextContent),
    Thought(ThoughtContent),
    ToolCall(ToolCall),
    ToolOutput(ToolOutput),
    Image(ImageContent),
    Audio(AudioContent),
}

impl Content {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Content::Text(TextContent { text: text.into() })
    }

    pub fn thought<S: Into<String>>(thought: S) -> Self {
        Content::Thought(ThoughtContent {
            thought: thought.into(),
        })
    }

    pub fn tool_call<I, N, A>(id: I, name: N, args: A) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        A: Into<String>,
    {
        Content::ToolCall(ToolCall::new(id, name, args))
    }

    pub fn tool_output<I, N>(id: I, name: N, value: Value) -> Self
    where
        I: Into<String>,
        N: Into<String>,
    {
        Content::ToolOutput(ToolOutput::new(id, name, value))
    }

    pub fn image_base64<D, M>(data: D, mime_type: M) -> Self
    where
        D: Into<String>,
        M: Into<String>,
    {
        Content::Image(ImageContent {
            source: ImageSource::Base64 {
                data: data.into(),
                mime_type: mime_type.into(),
            },
        })
    }

    pub fn image_url<U: Into<String>>(url: U) -> Self {
        Content::Image(ImageContent {
            source: ImageSource::Url { url: url.into() },
        })
    }

    pub fn audio_base64<D, M>(data: D, mime_type: M) -> Self
    where
        D: Into<String>,
        M: Into<String>,
    {
        Content::Audio(AudioContent {
            source: AudioSource::Base64 {
                data: data.into(),
                mime_type: mime_type.into(),
            },
        })
    }

    /// Get the text if this is a Text variant
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(&text.text),
            _ => None,
        }
    }

    pub fn as_thought(&self) -> Option<&str> {
        match self {
            Content::Thought(thought) => Some(&thought.thought),
            _ => None,
        }
    }

    pub fn as_tool_call(&self) -> Option<&ToolCall> {
        match self {
            Content::ToolCall(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_tool_output(&self) -> Option<&ToolOutput> {
        match self {
            Content::ToolOutput(output) => Some(output),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_accessor() {
        let content = Content::text("hello");
        assert_eq!(content.as_text(), Some("hello"));
        assert_eq!(content.as_thought(), None);
    }

    #[test]
    fn test_tag_is_stable_across_roundtrip() {
        let parts = vec![
            Content::text("hi"),
            Content::thought("hmm"),
            Content::tool_call("call_1", "search", r#"{"query":"rust"}"#),
            Content::tool_output("call_1", "search", json!(["a", "b"])),
            Content::image_base64("aGVsbG8=", "image/png"),
            Content::audio_base64("aGVsbG8=", "audio/wav"),
        ];
        let serialized = serde_json::to_string(&parts).unwrap();
        let deserialized: Vec<Content> = serde_json::from_str(&serialized).unwrap();
        assert_eq!(parts, deserialized);

        let values: Vec<Value> = serde_json::from_str(&serialized).unwrap();
        let tags: Vec<&str> = values.iter().map(|v| v["type"].as_str().unwrap()).collect();
        assert_eq!(
            tags,
            vec!["text", "thought", "toolCall", "toolOutput", "image", "audio"]
        );
    }

    #[test]
    fn test_tool_call_args_kept_verbatim() {
        let call = ToolCall::new("c1", "lookup", "{\"key\": 1}");
        let serialized = serde_json::to_string(&call).unwrap();
        let back: ToolCall = serde_json::from_str(&serialized).unwrap();
        assert_eq!(back.args, "{\"key\": 1}");
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = ToolCall::generated("echo", "{}");
        let b = ToolCall::generated("echo", "{}");
        assert_ne!(a.id, b.id);
    }
}
