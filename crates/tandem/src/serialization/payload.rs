use serde::{Deserialize, Serialize};

use crate::errors::DecodeError;
use crate::models::format::Format;
use crate::models::message::Message;
use crate::models::tool::ToolSchema;
use crate::models::usage::Usage;
use crate::response::{FinishReason, Params};

/// Schema tag prefix; the major payload version is appended.
pub const SCHEMA_PREFIX: &str = "tandem/response/v";

/// Current payload version. Payloads sharing a major version decode.
pub const CURRENT_VERSION: &str = "1.0";

pub fn current_schema() -> String {
    let major = CURRENT_VERSION.split('.').next().unwrap_or("1");
    format!("{SCHEMA_PREFIX}{major}")
}

/// `major.minor` payload version with major-compatibility semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializationVersion {
    pub major: u32,
    pub minor: u32,
}

impl SerializationVersion {
    pub fn parse(version: &str) -> Result<Self, DecodeError> {
        let mut parts = version.split('.');
        let major = parts.next().and_then(|p| p.parse().ok());
        let minor = parts.next().and_then(|p| p.parse().ok());
        match (major, minor, parts.next()) {
            (Some(major), Some(minor), None) => Ok(Self { major, minor }),
            _ => Err(DecodeError::InvalidPayload(format!(
                "invalid version format: {version}"
            ))),
        }
    }

    pub fn is_compatible_with(&self, decoder: &SerializationVersion) -> bool {
        self.major == decoder.major
    }
}

impl std::fmt::Display for SerializationVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub serialized_at: String,
    pub library_version: String,
}

/// The wire shape of one encoded exchange.
///
/// Messages reuse the canonical serde representation, so every content
/// tag and `raw_message` round-trips byte-exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedResponse {
    #[serde(rename = "$schema")]
    pub schema: String,
    pub version: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub provider: String,
    pub model_id: String,
    pub provider_model_name: String,
    pub messages: Vec<Message>,
    pub metadata: Metadata,
    pub finish_reason: Option<FinishReason>,
    pub params: Option<Params>,
    pub tools: Option<Vec<ToolSchema>>,
    pub format: Option<Format>,
    pub usage: Option<Usage>,
}
